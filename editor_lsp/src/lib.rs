//! Quill LSP - Language Server Protocol client layer.
//!
//! One poll-driven [`ProtocolClient`] per server process, multiplexed by a
//! [`ServerRegistry`] that routes documents to servers by language. No
//! thread or event loop is owned here: the host advances every client by
//! calling `tick`.

pub mod client;
pub mod registry;
pub mod transport;
pub mod types;

pub use client::{ClientState, DiagnosticsHandler, ProtocolClient};
pub use registry::{ServerConfig, ServerRegistry};
pub use types::{
    CompletionItem, CompletionKind, Diagnostic, DiagnosticSeverity, DocumentSymbol, HoverInfo,
    Location, Position, Range, RpcError, SymbolKind,
};
