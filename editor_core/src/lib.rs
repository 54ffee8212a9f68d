//! Quill Core - Pure text editing logic.
//!
//! This crate contains the text store, coordinate mapping, and undo history
//! without any dependencies on windowing, rendering, or language servers.

pub mod grapheme;
pub mod history;
pub mod text_store;
pub mod types;

pub use history::UndoHistory;
pub use text_store::TextStore;
pub use types::{Edit, Position, Range};
