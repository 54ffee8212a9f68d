//! Routing layer over every configured language-server client.
//!
//! The registry owns one [`ProtocolClient`] per registered server, routes
//! documents to servers by language id, and keeps a `uri -> server` route
//! table for everything that follows an open. One server failing to start
//! never affects the others; routing misses degrade to empty results.

use crate::client::{DiagnosticsHandler, ProtocolClient};
use crate::types::{CompletionItem, Diagnostic, DocumentSymbol, HoverInfo, Location, Position, RpcError};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Launch configuration for one language server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Executable to launch.
    pub command: String,
    /// Arguments to the command.
    pub args: Vec<String>,
    /// File extensions (with dot) handled by this server, e.g. ".rs".
    pub extensions: Vec<String>,
    /// Language id announced for matching documents, e.g. "rust".
    pub language_id: String,
}

impl ServerConfig {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        extensions: Vec<String>,
        language_id: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            extensions,
            language_id: language_id.into(),
        }
    }

    /// Configuration for rust-analyzer.
    pub fn rust_analyzer() -> Self {
        Self::new("rust-analyzer", vec![], vec![".rs".to_string()], "rust")
    }
}

/// One registered server: the client plus its launch configuration. The session
/// exists from registration until registry shutdown and is never restarted
/// automatically.
struct ServerSession {
    client: ProtocolClient,
    config: ServerConfig,
}

/// Route entry for an open document.
struct DocumentRoute {
    server: String,
    version: i32,
}

/// Owns named client sessions and the document routing between them.
#[derive(Default)]
pub struct ServerRegistry {
    sessions: HashMap<String, ServerSession>,
    routes: HashMap<String, DocumentRoute>,
    diagnostics: Option<DiagnosticsHandler>,
    root_uri: Option<String>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a session without launching anything.
    pub fn register(&mut self, name: impl Into<String>, config: ServerConfig) {
        let name = name.into();
        log::debug!(
            "registered language server '{}' for '{}'",
            name,
            config.language_id
        );
        self.sessions.insert(
            name,
            ServerSession {
                client: ProtocolClient::new(),
                config,
            },
        );
    }

    /// Starts and initializes every registered session. A session that
    /// fails to spawn is logged and skipped; partial failure is the
    /// normal, tolerated case.
    pub fn initialize_servers(&mut self, root_uri: &str) {
        self.root_uri = Some(root_uri.to_string());
        for (name, session) in &mut self.sessions {
            match session
                .client
                .start(&session.config.command, &session.config.args)
            {
                Ok(()) => {
                    if let Some(handler) = &self.diagnostics {
                        session.client.on_diagnostics(handler.clone());
                    }
                    let server = name.clone();
                    let failed = name.clone();
                    session.client.initialize(
                        root_uri,
                        move |_| log::info!("language server '{}' initialized", server),
                        move |err| {
                            log::error!(
                                "failed to initialize language server '{}': {} ({})",
                                failed,
                                err.message,
                                err.code
                            )
                        },
                    );
                }
                Err(err) => log::warn!("skipping language server '{}': {}", name, err),
            }
        }
    }

    /// Maps a file extension to the configured language id.
    pub fn language_id_for_path(&self, path: &str) -> Option<&str> {
        let dot = path.rfind('.')?;
        let ext = &path[dot..];
        self.sessions.values().find_map(|session| {
            session
                .config
                .extensions
                .iter()
                .any(|e| e == ext)
                .then(|| session.config.language_id.as_str())
        })
    }

    /// Announces a document to the server registered for its language and
    /// records the route. Silent no-op when no initialized server matches.
    pub fn open_document(&mut self, uri: &str, language_id: &str, text: &str) {
        let Some(name) = self.server_for_language(language_id) else {
            log::debug!("no initialized server for language '{}'", language_id);
            return;
        };
        if let Some(session) = self.sessions.get_mut(&name) {
            session.client.did_open(uri, language_id, 1, text);
        }
        self.routes.insert(
            uri.to_string(),
            DocumentRoute {
                server: name,
                version: 1,
            },
        );
    }

    /// Sends the full document text to the routed server, bumping the
    /// document version. No-op for unrouted uris.
    pub fn change_document(&mut self, uri: &str, text: &str) {
        let Some(route) = self.routes.get_mut(uri) else {
            return;
        };
        route.version += 1;
        let version = route.version;
        let Some(session) = self.sessions.get_mut(&route.server) else {
            return;
        };
        if session.client.is_initialized() {
            session.client.did_change(uri, version, text);
        }
    }

    /// Notifies the routed server that the document was closed and drops
    /// the route.
    pub fn close_document(&mut self, uri: &str) {
        if let Some(client) = self.routed_client_mut(uri) {
            client.did_close(uri);
        }
        self.routes.remove(uri);
    }

    /// Notifies the routed server that the document was saved.
    pub fn save_document(&mut self, uri: &str) {
        if let Some(client) = self.routed_client_mut(uri) {
            client.did_save(uri);
        }
    }

    /// Requests completions; an unrouted uri or a server error yields an
    /// empty list through the callback.
    pub fn completion(
        &mut self,
        uri: &str,
        position: Position,
        callback: impl FnOnce(Vec<CompletionItem>) + 'static,
    ) {
        let Some(client) = self.routed_client_mut(uri) else {
            callback(Vec::new());
            return;
        };
        let (on_success, on_error) = split_callback(callback, Vec::new());
        client.completion(uri, position, on_success, on_error);
    }

    /// Requests hover info; absent for unrouted uris and server errors.
    pub fn hover(
        &mut self,
        uri: &str,
        position: Position,
        callback: impl FnOnce(Option<HoverInfo>) + 'static,
    ) {
        let Some(client) = self.routed_client_mut(uri) else {
            callback(None);
            return;
        };
        let (on_success, on_error) = split_callback(callback, None);
        client.hover(uri, position, on_success, on_error);
    }

    /// Requests definition locations.
    pub fn goto_definition(
        &mut self,
        uri: &str,
        position: Position,
        callback: impl FnOnce(Vec<Location>) + 'static,
    ) {
        let Some(client) = self.routed_client_mut(uri) else {
            callback(Vec::new());
            return;
        };
        let (on_success, on_error) = split_callback(callback, Vec::new());
        client.goto_definition(uri, position, on_success, on_error);
    }

    /// Requests reference locations.
    pub fn references(
        &mut self,
        uri: &str,
        position: Position,
        callback: impl FnOnce(Vec<Location>) + 'static,
    ) {
        let Some(client) = self.routed_client_mut(uri) else {
            callback(Vec::new());
            return;
        };
        let (on_success, on_error) = split_callback(callback, Vec::new());
        client.references(uri, position, on_success, on_error);
    }

    /// Requests the document symbol outline.
    pub fn document_symbols(
        &mut self,
        uri: &str,
        callback: impl FnOnce(Vec<DocumentSymbol>) + 'static,
    ) {
        let Some(client) = self.routed_client_mut(uri) else {
            callback(Vec::new());
            return;
        };
        let (on_success, on_error) = split_callback(callback, Vec::new());
        client.document_symbols(uri, on_success, on_error);
    }

    /// Registers one diagnostics callback fanned out to all current and
    /// future sessions.
    pub fn on_diagnostics(&mut self, callback: impl Fn(&str, &[Diagnostic]) + 'static) {
        let handler: DiagnosticsHandler = Rc::new(callback);
        for session in self.sessions.values_mut() {
            session.client.on_diagnostics(handler.clone());
        }
        self.diagnostics = Some(handler);
    }

    /// Advances every running session's client exactly once.
    pub fn tick(&mut self) {
        for session in self.sessions.values_mut() {
            if session.client.is_running() {
                session.client.tick();
            }
        }
    }

    /// Stops every session and clears all tables. Safe to invoke
    /// repeatedly.
    pub fn shutdown(&mut self) {
        for session in self.sessions.values_mut() {
            session.client.shutdown();
        }
        self.sessions.clear();
        self.routes.clear();
    }

    /// The server name a document is routed to, if any.
    pub fn server_for_document(&self, uri: &str) -> Option<&str> {
        self.routes.get(uri).map(|route| route.server.as_str())
    }

    /// Whether the named session has completed initialization.
    pub fn is_initialized(&self, name: &str) -> bool {
        self.sessions
            .get(name)
            .map(|session| session.client.is_initialized())
            .unwrap_or(false)
    }

    /// Workspace root the servers were initialized with.
    pub fn root_uri(&self) -> Option<&str> {
        self.root_uri.as_deref()
    }

    fn server_for_language(&self, language_id: &str) -> Option<String> {
        self.sessions
            .iter()
            .find(|(_, session)| {
                session.config.language_id == language_id && session.client.is_initialized()
            })
            .map(|(name, _)| name.clone())
    }

    fn routed_client_mut(&mut self, uri: &str) -> Option<&mut ProtocolClient> {
        let route = self.routes.get(uri)?;
        let session = self.sessions.get_mut(&route.server)?;
        if !session.client.is_initialized() {
            return None;
        }
        Some(&mut session.client)
    }
}

/// Splits one result callback into the success/error pair a client request
/// takes. Whichever side fires first consumes the callback; an error
/// degrades to `fallback` instead of surfacing.
fn split_callback<T: 'static>(
    callback: impl FnOnce(T) + 'static,
    fallback: T,
) -> (impl FnOnce(T) + 'static, impl FnOnce(RpcError) + 'static) {
    let slot: Rc<RefCell<Option<Box<dyn FnOnce(T)>>>> =
        Rc::new(RefCell::new(Some(Box::new(callback))));
    let on_success = {
        let slot = slot.clone();
        move |value: T| {
            if let Some(callback) = slot.borrow_mut().take() {
                callback(value);
            }
        }
    };
    let on_error = move |err: RpcError| {
        log::debug!("language request failed: {} ({})", err.message, err.code);
        if let Some(callback) = slot.borrow_mut().take() {
            callback(fallback);
        }
    };
    (on_success, on_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::io::Write as _;
    use std::rc::Rc;
    use std::time::Duration;

    fn ts_config(command: &str) -> ServerConfig {
        ServerConfig::new(
            command,
            vec![],
            vec![".ts".to_string(), ".tsx".to_string()],
            "typescript",
        )
    }

    #[test]
    fn completion_for_unopened_uri_is_empty_and_synchronous() {
        let mut registry = ServerRegistry::new();
        let result = Rc::new(RefCell::new(None));
        let result_clone = result.clone();
        registry.completion("file:///never-opened.ts", Position::new(0, 0), move |items| {
            *result_clone.borrow_mut() = Some(items);
        });
        assert_eq!(result.borrow().as_deref(), Some(&[][..]));
    }

    #[test]
    fn hover_for_unrouted_uri_is_absent_and_synchronous() {
        let mut registry = ServerRegistry::new();
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();
        registry.hover("file:///b.css", Position::new(0, 0), move |info| {
            assert!(info.is_none());
            called_clone.set(true);
        });
        assert!(called.get());
    }

    #[test]
    fn open_without_matching_server_is_a_noop() {
        let mut registry = ServerRegistry::new();
        registry.open_document("file:///a.py", "python", "print()");
        assert!(registry.server_for_document("file:///a.py").is_none());
    }

    #[test]
    fn open_with_uninitialized_server_is_a_noop() {
        let mut registry = ServerRegistry::new();
        registry.register("ts", ts_config("quill-no-such-server"));
        // Registered but never initialized: no route may be recorded.
        registry.open_document("file:///a.ts", "typescript", "let x = 1;");
        assert!(registry.server_for_document("file:///a.ts").is_none());
        assert!(!registry.is_initialized("ts"));
    }

    #[test]
    fn extension_maps_to_language_id() {
        let mut registry = ServerRegistry::new();
        registry.register("ts", ts_config("tsserver"));
        registry.register(
            "css",
            ServerConfig::new("css-ls", vec![], vec![".css".to_string()], "css"),
        );
        assert_eq!(registry.language_id_for_path("/src/app.ts"), Some("typescript"));
        assert_eq!(registry.language_id_for_path("/src/app.tsx"), Some("typescript"));
        assert_eq!(registry.language_id_for_path("style.css"), Some("css"));
        assert_eq!(registry.language_id_for_path("readme.md"), None);
        assert_eq!(registry.language_id_for_path("no-extension"), None);
    }

    #[test]
    fn failed_spawn_is_skipped() {
        let mut registry = ServerRegistry::new();
        registry.register("broken", ts_config("quill-no-such-server"));
        registry.initialize_servers("file:///workspace");
        assert!(!registry.is_initialized("broken"));
        // Feature calls against the broken session degrade gracefully.
        registry.open_document("file:///a.ts", "typescript", "");
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();
        registry.completion("file:///a.ts", Position::new(0, 0), move |items| {
            assert!(items.is_empty());
            called_clone.set(true);
        });
        assert!(called.get());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut registry = ServerRegistry::new();
        registry.register("ts", ts_config("quill-no-such-server"));
        registry.shutdown();
        registry.shutdown();
        assert!(registry.server_for_document("file:///a.ts").is_none());
    }

    /// Writes a `sh` script that emits the given frames on startup (the
    /// first one answers request id 1), then stays alive until stdin
    /// closes.
    #[cfg(unix)]
    fn fake_server(bodies: &[&str]) -> tempfile::NamedTempFile {
        let mut script = tempfile::NamedTempFile::new().unwrap();
        for (i, body) in bodies.iter().enumerate() {
            writeln!(script, "b{}='{}'", i, body).unwrap();
            writeln!(
                script,
                "printf 'Content-Length: %s\\r\\n\\r\\n%s' \"${{#b{}}}\" \"$b{}\"",
                i, i
            )
            .unwrap();
        }
        writeln!(script, "cat >/dev/null").unwrap();
        script.flush().unwrap();
        script
    }

    #[cfg(unix)]
    fn sh_config(script: &tempfile::NamedTempFile, extensions: &[&str], language: &str) -> ServerConfig {
        ServerConfig::new(
            "sh",
            vec![script.path().to_string_lossy().into_owned()],
            extensions.iter().map(|e| e.to_string()).collect(),
            language,
        )
    }

    #[cfg(unix)]
    fn tick_until(registry: &mut ServerRegistry, mut done: impl FnMut(&ServerRegistry) -> bool) {
        for _ in 0..200 {
            registry.tick();
            if done(registry) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[cfg(unix)]
    const INIT_OK: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{"hoverProvider":true}}}"#;

    #[cfg(unix)]
    #[test]
    fn documents_route_to_their_own_server() {
        let script_a = fake_server(&[INIT_OK]);
        let script_b = fake_server(&[INIT_OK]);

        let mut registry = ServerRegistry::new();
        registry.register("A", sh_config(&script_a, &[".ts"], "typescript"));
        registry.register("B", sh_config(&script_b, &[".css"], "css"));
        registry.initialize_servers("file:///workspace");
        tick_until(&mut registry, |r| {
            r.is_initialized("A") && r.is_initialized("B")
        });
        assert!(registry.is_initialized("A"));
        assert!(registry.is_initialized("B"));

        registry.open_document("file:///a.ts", "typescript", "let x = 1;");
        registry.change_document("file:///a.ts", "let x = 2;");
        assert_eq!(registry.server_for_document("file:///a.ts"), Some("A"));
        assert!(registry.server_for_document("file:///b.css").is_none());

        // Hover on a document B never opened: synchronously absent.
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();
        registry.hover("file:///b.css", Position::new(0, 0), move |info| {
            assert!(info.is_none());
            called_clone.set(true);
        });
        assert!(called.get());

        registry.open_document("file:///b.css", "css", "body {}");
        assert_eq!(registry.server_for_document("file:///b.css"), Some("B"));

        registry.close_document("file:///a.ts");
        assert!(registry.server_for_document("file:///a.ts").is_none());

        registry.shutdown();
    }

    #[cfg(unix)]
    #[test]
    fn one_broken_server_does_not_block_the_other() {
        let script = fake_server(&[INIT_OK]);
        let mut registry = ServerRegistry::new();
        registry.register("good", sh_config(&script, &[".ts"], "typescript"));
        registry.register("bad", ts_config("quill-no-such-server"));
        registry.initialize_servers("file:///workspace");
        tick_until(&mut registry, |r| r.is_initialized("good"));
        assert!(registry.is_initialized("good"));
        assert!(!registry.is_initialized("bad"));
        registry.shutdown();
    }

    #[cfg(unix)]
    #[test]
    fn diagnostics_fan_out_to_sessions() {
        let diag = r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{"uri":"file:///a.ts","diagnostics":[{"range":{"start":{"line":1,"character":0},"end":{"line":1,"character":4}},"message":"unused"}]}}"#;
        let script = fake_server(&[INIT_OK, diag]);

        let mut registry = ServerRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        registry.on_diagnostics(move |uri, diagnostics| {
            seen_clone
                .borrow_mut()
                .push((uri.to_string(), diagnostics.len()));
        });
        registry.register("ts", sh_config(&script, &[".ts"], "typescript"));
        registry.initialize_servers("file:///workspace");
        tick_until(&mut registry, |_| !seen.borrow().is_empty());

        assert_eq!(seen.borrow().as_slice(), &[("file:///a.ts".to_string(), 1)]);
        registry.shutdown();
    }
}
