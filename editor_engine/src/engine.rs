//! The engine facade.
//!
//! Owns the text store, the undo history, and the server registry, and
//! exposes the one API the UI collaborator consumes: document lifecycle,
//! edits, coordinates, undo, and language features for the open document.
//! Every mutation is recorded for undo and re-announced to the routed
//! language server as a full-document change.

use crate::highlight::{Highlighter, StyledSpan};
use crate::settings::Settings;
use quill_core::{Position, TextStore, UndoHistory};
use quill_lsp::{
    CompletionItem, Diagnostic, DocumentSymbol, HoverInfo, Location, ServerConfig, ServerRegistry,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Everything the engine needs at construction. Nothing here is global:
/// hosts that want several engines give each its own config.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Workspace root advertised to language servers.
    pub root_uri: String,
    /// Host-loaded editor preferences.
    pub settings: Settings,
}

/// The document currently open in the engine.
struct OpenDocument {
    path: PathBuf,
    uri: String,
    language_id: Option<String>,
}

/// The headless editor engine.
pub struct Engine {
    store: TextStore,
    history: UndoHistory,
    servers: ServerRegistry,
    highlighter: Box<dyn Highlighter>,
    config: EngineConfig,
    document: Option<OpenDocument>,
    modified: bool,
}

impl Engine {
    pub fn new(config: EngineConfig, highlighter: Box<dyn Highlighter>) -> Self {
        Self {
            store: TextStore::new(),
            history: UndoHistory::new(),
            servers: ServerRegistry::new(),
            highlighter,
            config,
            document: None,
            modified: false,
        }
    }

    // ----- server lifecycle -------------------------------------------------

    /// Registers a language server; nothing is launched until
    /// [`start_servers`](Self::start_servers).
    pub fn register_server(&mut self, name: impl Into<String>, config: ServerConfig) {
        self.servers.register(name, config);
    }

    /// Starts and initializes every registered server against the
    /// configured workspace root.
    pub fn start_servers(&mut self) {
        let root_uri = self.config.root_uri.clone();
        self.servers.initialize_servers(&root_uri);
    }

    /// Registers the diagnostics callback fanned out to all servers.
    pub fn on_diagnostics(&mut self, callback: impl Fn(&str, &[Diagnostic]) + 'static) {
        self.servers.on_diagnostics(callback);
    }

    /// Advances every language-server client once. Call this from the host
    /// loop; nothing in the engine runs in the background.
    pub fn tick(&mut self) {
        self.servers.tick();
    }

    /// Stops every language server.
    pub fn shutdown(&mut self) {
        self.servers.shutdown();
    }

    // ----- document lifecycle -----------------------------------------------

    /// Opens a file: the store is replaced wholesale, history cleared, and
    /// the document announced to the server registered for its extension.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;

        if let Some(open) = self.document.take() {
            self.servers.close_document(&open.uri);
        }

        self.store = TextStore::from_text(text.clone());
        self.history.clear();
        self.modified = false;

        let uri = path_to_uri(path);
        let language_id = self
            .servers
            .language_id_for_path(&uri)
            .map(|id| id.to_string());
        if let Some(language_id) = &language_id {
            self.servers.open_document(&uri, language_id, &text);
        }
        log::info!("opened {} ({} bytes)", path.display(), text.len());

        self.document = Some(OpenDocument {
            path: path.to_path_buf(),
            uri,
            language_id,
        });
        Ok(())
    }

    /// Writes the store back to the open file and notifies its server.
    pub fn save_file(&mut self) -> io::Result<()> {
        let Some(document) = &self.document else {
            return Err(io::Error::new(io::ErrorKind::Other, "no file open"));
        };
        fs::write(&document.path, self.store.text())?;
        let uri = document.uri.clone();
        self.modified = false;
        self.servers.save_document(&uri);
        Ok(())
    }

    /// Closes the open document and resets to an empty one.
    pub fn close_file(&mut self) {
        if let Some(document) = self.document.take() {
            self.servers.close_document(&document.uri);
        }
        self.store = TextStore::new();
        self.history.clear();
        self.modified = false;
    }

    /// Replaces the document content wholesale, clearing history.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.store = TextStore::from_text(text);
        self.history.clear();
        self.modified = self.document.is_some();
        self.sync_document();
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.document.as_ref().map(|d| d.path.as_path())
    }

    /// Language id of the open document, when a server claims it.
    pub fn language_id(&self) -> Option<&str> {
        self.document
            .as_ref()
            .and_then(|d| d.language_id.as_deref())
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    // ----- edits ------------------------------------------------------------

    /// Inserts `text` at a byte offset.
    pub fn insert(&mut self, offset: usize, text: &str) {
        let edit = self.store.replace(offset, 0, text);
        self.history.push(edit);
        self.after_edit();
    }

    /// Erases up to `length` bytes at `offset`.
    pub fn erase(&mut self, offset: usize, length: usize) {
        let edit = self.store.replace(offset, length, "");
        self.history.push(edit);
        self.after_edit();
    }

    /// Atomic erase-then-insert.
    pub fn replace(&mut self, offset: usize, length: usize, text: &str) {
        let edit = self.store.replace(offset, length, text);
        self.history.push(edit);
        self.after_edit();
    }

    /// Deletes the grapheme cluster before `offset`, joining lines when the
    /// cursor sits at column 0. Returns the offset the cursor lands on.
    pub fn delete_backward(&mut self, offset: usize) -> usize {
        if offset == 0 {
            return 0;
        }
        let pos = self.store.position_at(offset);
        let prev = if pos.column == 0 {
            if pos.line == 0 {
                return offset;
            }
            let prev_line = pos.line - 1;
            let prev_column = self.store.line_grapheme_count(prev_line as usize) as u32;
            Position::new(prev_line, prev_column)
        } else {
            Position::new(pos.line, pos.column - 1)
        };
        let prev_offset = self.store.offset_at(prev);
        self.erase(prev_offset, offset - prev_offset);
        prev_offset
    }

    // ----- undo -------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Reverts the most recent edit. Returns false when there is nothing
    /// to undo.
    pub fn undo(&mut self) -> bool {
        let Some(edit) = self.history.undo() else {
            return false;
        };
        self.store
            .replace(edit.offset, edit.inserted.len(), &edit.removed);
        self.after_edit();
        true
    }

    /// Re-applies the most recently undone edit. Returns false when there
    /// is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(edit) = self.history.redo() else {
            return false;
        };
        self.store
            .replace(edit.offset, edit.removed.len(), &edit.inserted);
        self.after_edit();
        true
    }

    // ----- coordinates and content ------------------------------------------

    pub fn text(&self) -> String {
        self.store.text()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.store.line_count()
    }

    pub fn line_text(&self, line_index: usize) -> String {
        self.store.line_text(line_index)
    }

    pub fn line_grapheme_count(&self, line_index: usize) -> usize {
        self.store.line_grapheme_count(line_index)
    }

    pub fn position_at(&self, offset: usize) -> Position {
        self.store.position_at(offset)
    }

    pub fn offset_at(&self, pos: Position) -> usize {
        self.store.offset_at(pos)
    }

    /// Read access to the underlying store for renderers.
    pub fn store(&self) -> &TextStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.config.settings
    }

    /// Runs the injected highlighter over the current text.
    pub fn highlight(&self) -> Vec<StyledSpan> {
        self.highlighter.highlight(&self.store.text())
    }

    // ----- language features for the open document --------------------------

    /// Requests completions at a position of the open document. Yields an
    /// empty list synchronously when no document is open or routed.
    pub fn completion(
        &mut self,
        position: Position,
        callback: impl FnOnce(Vec<CompletionItem>) + 'static,
    ) {
        let Some(uri) = self.document_uri() else {
            callback(Vec::new());
            return;
        };
        self.servers
            .completion(&uri, wire_position(position), callback);
    }

    /// Requests hover info at a position of the open document.
    pub fn hover(
        &mut self,
        position: Position,
        callback: impl FnOnce(Option<HoverInfo>) + 'static,
    ) {
        let Some(uri) = self.document_uri() else {
            callback(None);
            return;
        };
        self.servers.hover(&uri, wire_position(position), callback);
    }

    /// Requests definition locations for the symbol at a position.
    pub fn goto_definition(
        &mut self,
        position: Position,
        callback: impl FnOnce(Vec<Location>) + 'static,
    ) {
        let Some(uri) = self.document_uri() else {
            callback(Vec::new());
            return;
        };
        self.servers
            .goto_definition(&uri, wire_position(position), callback);
    }

    /// Requests reference locations for the symbol at a position.
    pub fn references(
        &mut self,
        position: Position,
        callback: impl FnOnce(Vec<Location>) + 'static,
    ) {
        let Some(uri) = self.document_uri() else {
            callback(Vec::new());
            return;
        };
        self.servers
            .references(&uri, wire_position(position), callback);
    }

    /// Requests the symbol outline of the open document.
    pub fn document_symbols(&mut self, callback: impl FnOnce(Vec<DocumentSymbol>) + 'static) {
        let Some(uri) = self.document_uri() else {
            callback(Vec::new());
            return;
        };
        self.servers.document_symbols(&uri, callback);
    }

    // ----- internals --------------------------------------------------------

    fn document_uri(&self) -> Option<String> {
        self.document.as_ref().map(|d| d.uri.clone())
    }

    fn after_edit(&mut self) {
        self.modified = true;
        self.sync_document();
    }

    /// Re-announces the whole document to its server after a mutation.
    fn sync_document(&mut self) {
        if let Some(document) = &self.document {
            let text = self.store.text();
            self.servers.change_document(&document.uri, &text);
        }
    }
}

/// Converts a filesystem path to a `file://` uri.
fn path_to_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Core positions count grapheme columns; they cross the wire unchanged.
fn wire_position(pos: Position) -> quill_lsp::Position {
    quill_lsp::Position::new(pos.line, pos.column)
}
