//! Editor-facing types for language-server results.
//!
//! These are simplified mirrors of the wire types in `lsp-types`, carrying
//! only what the editor consumes.

use serde::{Deserialize, Serialize};

/// A position in a document as it crosses the wire (0-indexed line and
/// column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

impl From<lsp_types::Position> for Position {
    fn from(pos: lsp_types::Position) -> Self {
        Self {
            line: pos.line,
            character: pos.character,
        }
    }
}

impl From<Position> for lsp_types::Position {
    fn from(pos: Position) -> Self {
        Self {
            line: pos.line,
            character: pos.character,
        }
    }
}

/// A range in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

impl From<lsp_types::Range> for Range {
    fn from(range: lsp_types::Range) -> Self {
        Self {
            start: range.start.into(),
            end: range.end.into(),
        }
    }
}

/// A location in some document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

impl From<lsp_types::Location> for Location {
    fn from(loc: lsp_types::Location) -> Self {
        Self {
            uri: loc.uri.as_str().to_string(),
            range: loc.range.into(),
        }
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

impl From<lsp_types::DiagnosticSeverity> for DiagnosticSeverity {
    fn from(severity: lsp_types::DiagnosticSeverity) -> Self {
        match severity {
            lsp_types::DiagnosticSeverity::ERROR => Self::Error,
            lsp_types::DiagnosticSeverity::WARNING => Self::Warning,
            lsp_types::DiagnosticSeverity::INFORMATION => Self::Information,
            lsp_types::DiagnosticSeverity::HINT => Self::Hint,
            _ => Self::Information,
        }
    }
}

/// A server-produced annotation for a document range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub code: Option<String>,
    pub source: Option<String>,
}

impl From<lsp_types::Diagnostic> for Diagnostic {
    fn from(diag: lsp_types::Diagnostic) -> Self {
        Self {
            range: diag.range.into(),
            severity: diag
                .severity
                .map(|s| s.into())
                .unwrap_or(DiagnosticSeverity::Information),
            message: diag.message,
            code: diag.code.map(|c| match c {
                lsp_types::NumberOrString::Number(n) => n.to_string(),
                lsp_types::NumberOrString::String(s) => s,
            }),
            source: diag.source,
        }
    }
}

/// Hover information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoverInfo {
    /// The hover content (may contain markdown).
    pub contents: String,
    /// Range the hover applies to, when the server reports one.
    pub range: Option<Range>,
}

/// Completion item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionKind {
    Text,
    Method,
    Function,
    Constructor,
    Field,
    Variable,
    Class,
    Interface,
    Module,
    Property,
    Unit,
    Value,
    Enum,
    Keyword,
    Snippet,
    Color,
    File,
    Reference,
    Folder,
    EnumMember,
    Constant,
    Struct,
    Event,
    Operator,
    TypeParameter,
}

impl From<lsp_types::CompletionItemKind> for CompletionKind {
    fn from(kind: lsp_types::CompletionItemKind) -> Self {
        match kind {
            lsp_types::CompletionItemKind::TEXT => Self::Text,
            lsp_types::CompletionItemKind::METHOD => Self::Method,
            lsp_types::CompletionItemKind::FUNCTION => Self::Function,
            lsp_types::CompletionItemKind::CONSTRUCTOR => Self::Constructor,
            lsp_types::CompletionItemKind::FIELD => Self::Field,
            lsp_types::CompletionItemKind::VARIABLE => Self::Variable,
            lsp_types::CompletionItemKind::CLASS => Self::Class,
            lsp_types::CompletionItemKind::INTERFACE => Self::Interface,
            lsp_types::CompletionItemKind::MODULE => Self::Module,
            lsp_types::CompletionItemKind::PROPERTY => Self::Property,
            lsp_types::CompletionItemKind::UNIT => Self::Unit,
            lsp_types::CompletionItemKind::VALUE => Self::Value,
            lsp_types::CompletionItemKind::ENUM => Self::Enum,
            lsp_types::CompletionItemKind::KEYWORD => Self::Keyword,
            lsp_types::CompletionItemKind::SNIPPET => Self::Snippet,
            lsp_types::CompletionItemKind::COLOR => Self::Color,
            lsp_types::CompletionItemKind::FILE => Self::File,
            lsp_types::CompletionItemKind::REFERENCE => Self::Reference,
            lsp_types::CompletionItemKind::FOLDER => Self::Folder,
            lsp_types::CompletionItemKind::ENUM_MEMBER => Self::EnumMember,
            lsp_types::CompletionItemKind::CONSTANT => Self::Constant,
            lsp_types::CompletionItemKind::STRUCT => Self::Struct,
            lsp_types::CompletionItemKind::EVENT => Self::Event,
            lsp_types::CompletionItemKind::OPERATOR => Self::Operator,
            lsp_types::CompletionItemKind::TYPE_PARAMETER => Self::TypeParameter,
            _ => Self::Text,
        }
    }
}

/// A completion item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    /// Label displayed in the completion list.
    pub label: String,
    pub kind: Option<CompletionKind>,
    /// Detailed information (type signature, etc.).
    pub detail: Option<String>,
    pub documentation: Option<String>,
    /// Text to insert when this item is selected.
    pub insert_text: Option<String>,
    pub is_snippet: bool,
}

impl From<lsp_types::CompletionItem> for CompletionItem {
    fn from(item: lsp_types::CompletionItem) -> Self {
        let documentation = item.documentation.map(|doc| match doc {
            lsp_types::Documentation::String(s) => s,
            lsp_types::Documentation::MarkupContent(m) => m.value,
        });

        let is_snippet =
            item.insert_text_format == Some(lsp_types::InsertTextFormat::SNIPPET);

        Self {
            label: item.label,
            kind: item.kind.map(|k| k.into()),
            detail: item.detail,
            documentation,
            insert_text: item.insert_text,
            is_snippet,
        }
    }
}

/// Symbol kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    File,
    Module,
    Namespace,
    Package,
    Class,
    Method,
    Property,
    Field,
    Constructor,
    Enum,
    Interface,
    Function,
    Variable,
    Constant,
    String,
    Number,
    Boolean,
    Array,
    Object,
    Key,
    Null,
    EnumMember,
    Struct,
    Event,
    Operator,
    TypeParameter,
}

impl From<lsp_types::SymbolKind> for SymbolKind {
    fn from(kind: lsp_types::SymbolKind) -> Self {
        match kind {
            lsp_types::SymbolKind::FILE => Self::File,
            lsp_types::SymbolKind::MODULE => Self::Module,
            lsp_types::SymbolKind::NAMESPACE => Self::Namespace,
            lsp_types::SymbolKind::PACKAGE => Self::Package,
            lsp_types::SymbolKind::CLASS => Self::Class,
            lsp_types::SymbolKind::METHOD => Self::Method,
            lsp_types::SymbolKind::PROPERTY => Self::Property,
            lsp_types::SymbolKind::FIELD => Self::Field,
            lsp_types::SymbolKind::CONSTRUCTOR => Self::Constructor,
            lsp_types::SymbolKind::ENUM => Self::Enum,
            lsp_types::SymbolKind::INTERFACE => Self::Interface,
            lsp_types::SymbolKind::FUNCTION => Self::Function,
            lsp_types::SymbolKind::VARIABLE => Self::Variable,
            lsp_types::SymbolKind::CONSTANT => Self::Constant,
            lsp_types::SymbolKind::STRING => Self::String,
            lsp_types::SymbolKind::NUMBER => Self::Number,
            lsp_types::SymbolKind::BOOLEAN => Self::Boolean,
            lsp_types::SymbolKind::ARRAY => Self::Array,
            lsp_types::SymbolKind::OBJECT => Self::Object,
            lsp_types::SymbolKind::KEY => Self::Key,
            lsp_types::SymbolKind::NULL => Self::Null,
            lsp_types::SymbolKind::ENUM_MEMBER => Self::EnumMember,
            lsp_types::SymbolKind::STRUCT => Self::Struct,
            lsp_types::SymbolKind::EVENT => Self::Event,
            lsp_types::SymbolKind::OPERATOR => Self::Operator,
            lsp_types::SymbolKind::TYPE_PARAMETER => Self::TypeParameter,
            _ => Self::Variable,
        }
    }
}

/// A document symbol (function, class, etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Full extent of the symbol.
    pub range: Range,
    /// Range of the identifier itself.
    pub selection_range: Range,
    pub children: Vec<DocumentSymbol>,
}

/// An error returned by the server for a request, or synthesized locally
/// when a request can no longer complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// JSON-RPC code delivered when a pending request is cancelled because
    /// its client shut down or its server exited.
    pub const REQUEST_CANCELLED: i64 = -32800;
}
