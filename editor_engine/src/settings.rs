//! Editor preferences, produced by a host-supplied loader.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Structured preferences. The engine never reads preference files itself;
/// a host passes a loaded `Settings` in at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub font_family: String,
    pub font_fallbacks: Vec<String>,
    pub font_ligatures: bool,
    pub font_size: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            font_family: "monospace".to_string(),
            font_fallbacks: Vec::new(),
            font_ligatures: true,
            font_size: 14.0,
        }
    }
}

/// Host-supplied settings loader: a pure `path -> Settings` function from
/// the engine's point of view.
pub trait SettingsSource {
    fn load(&self, path: &Path) -> io::Result<Settings>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = Settings::default();
        assert_eq!(settings.font_family, "monospace");
        assert!(settings.font_ligatures);
    }
}
