//! Host-injected syntax highlighting.
//!
//! Highlighting is computed outside the engine (tree-sitter, textmate,
//! whatever the platform ships) and consumed here as a pure function from
//! text to styled spans.

/// Visual attributes for a span of text. Colors are packed RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanStyle {
    pub foreground: u32,
    pub background: u32,
    pub bold: bool,
    pub italic: bool,
}

impl Default for SpanStyle {
    fn default() -> Self {
        Self {
            foreground: 0xFFFF_FFFF,
            background: 0x0000_0000,
            bold: false,
            italic: false,
        }
    }
}

/// A styled region of the highlighted text. `start` and `end` are byte
/// offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyledSpan {
    pub start: usize,
    pub end: usize,
    pub style: SpanStyle,
}

/// Produces styled spans for a document. One implementation per rendering
/// backend, injected into the engine at construction.
pub trait Highlighter {
    fn highlight(&self, text: &str) -> Vec<StyledSpan>;
}

/// Highlighter that styles nothing, for hosts without syntax support.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, _text: &str) -> Vec<StyledSpan> {
        Vec::new()
    }
}
