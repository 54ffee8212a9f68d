//! Quill Engine - The facade the UI talks to.
//!
//! Composes the text core (store + history) with the language-server
//! registry behind one API, and declares the interfaces the host injects:
//! syntax highlighting and settings loading.

pub mod engine;
pub mod highlight;
pub mod settings;

pub use engine::{Engine, EngineConfig};
pub use highlight::{Highlighter, PlainHighlighter, SpanStyle, StyledSpan};
pub use settings::{Settings, SettingsSource};
