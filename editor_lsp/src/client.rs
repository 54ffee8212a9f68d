//! Language-server client: one instance per external server process.
//!
//! The client owns the child process, frames outbound messages, and drains
//! the server's stdout on every `tick`. There is no background thread and
//! no event loop: the read pipe is non-blocking and the host drives the
//! client by polling. Responses are correlated to pending requests purely
//! by id; notifications are fanned out to registered callbacks.

use crate::transport::{
    self, FrameBuffer, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};
use crate::types::{
    CompletionItem, Diagnostic, DocumentSymbol, HoverInfo, Location, Position, RpcError,
};
use lsp_types::*;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::rc::Rc;

/// Handler for `textDocument/publishDiagnostics`, shared across clients so
/// a registry can fan one callback out to every session.
pub type DiagnosticsHandler = Rc<dyn Fn(&str, &[Diagnostic])>;

/// Lifecycle of a client. `Stopped` is terminal; a client is never
/// restarted automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    NotStarted,
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// An outstanding request: exactly one of the two continuations fires when
/// the matching response id arrives, or the error continuation fires with a
/// cancellation when the client goes away first.
struct PendingRequest {
    method: String,
    on_success: Box<dyn FnOnce(Option<Value>)>,
    on_error: Box<dyn FnOnce(RpcError)>,
}

/// A client for one language-server process.
pub struct ProtocolClient {
    state: ClientState,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    frames: FrameBuffer,
    next_request_id: i64,
    pending: HashMap<i64, PendingRequest>,
    capabilities: Option<ServerCapabilities>,
    diagnostics: Option<DiagnosticsHandler>,
    notifications: Option<Box<dyn FnMut(&str, &Value)>>,
}

impl Default for ProtocolClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolClient {
    pub fn new() -> Self {
        Self {
            state: ClientState::NotStarted,
            child: None,
            stdin: None,
            stdout: None,
            frames: FrameBuffer::new(),
            next_request_id: 1,
            pending: HashMap::new(),
            capabilities: None,
            diagnostics: None,
            notifications: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClientState::Running
    }

    /// True once an `initialize` response has been received and recorded.
    pub fn is_initialized(&self) -> bool {
        self.capabilities.is_some()
    }

    /// Capabilities the server advertised during initialization.
    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.capabilities.as_ref()
    }

    /// Spawns the server process with piped stdin/stdout (stderr stays
    /// attached to the host's own error stream) and marks the read pipe
    /// non-blocking. A spawn failure leaves the client startable again and
    /// is never fatal to the host.
    pub fn start(&mut self, command: &str, args: &[String]) -> io::Result<()> {
        if self.state != ClientState::NotStarted {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot start a client in state {:?}", self.state),
            ));
        }
        self.state = ClientState::Starting;

        let mut child = match Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                self.state = ClientState::NotStarted;
                log::error!("failed to start language server '{}': {}", command, err);
                return Err(err);
            }
        };

        let stdin = child.stdin.take().expect("child stdin was piped");
        let stdout = child.stdout.take().expect("child stdout was piped");

        if let Err(errno) = set_nonblocking(&stdout) {
            self.state = ClientState::NotStarted;
            let _ = child.kill();
            let _ = child.wait();
            log::error!("failed to configure pipe for '{}': {}", command, errno);
            return Err(io::Error::from_raw_os_error(errno as i32));
        }

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stdout = Some(stdout);
        self.frames = FrameBuffer::new();
        self.state = ClientState::Running;
        log::info!("started language server: {}", command);
        Ok(())
    }

    /// Sends the `initialize` request. Server capabilities are recorded and
    /// the `initialized` notification is sent only when a non-error
    /// response arrives, before `on_success` runs; no document traffic is
    /// valid until then.
    #[allow(deprecated)] // root_uri: the servers we target still expect it
    pub fn initialize(
        &mut self,
        root_uri: &str,
        on_success: impl FnOnce(Option<Value>) + 'static,
        on_error: impl FnOnce(RpcError) + 'static,
    ) {
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: root_uri.parse().ok(),
            capabilities: client_capabilities(),
            ..Default::default()
        };
        self.send_request(
            "initialize",
            serde_json::to_value(params).unwrap(),
            Box::new(on_success),
            Box::new(on_error),
        );
    }

    /// Notifies the server that a document was opened. Fire-and-forget.
    pub fn did_open(&mut self, uri: &str, language_id: &str, version: i32, text: &str) {
        let Some(uri) = parse_uri(uri) else { return };
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri,
                language_id: language_id.to_string(),
                version,
                text: text.to_string(),
            },
        };
        self.send_notification(
            "textDocument/didOpen",
            Some(serde_json::to_value(params).unwrap()),
        );
    }

    /// Notifies the server of a change, carrying the full document text.
    pub fn did_change(&mut self, uri: &str, version: i32, text: &str) {
        let Some(uri) = parse_uri(uri) else { return };
        let params = DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier { uri, version },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: text.to_string(),
            }],
        };
        self.send_notification(
            "textDocument/didChange",
            Some(serde_json::to_value(params).unwrap()),
        );
    }

    /// Notifies the server that a document was saved.
    pub fn did_save(&mut self, uri: &str) {
        let Some(uri) = parse_uri(uri) else { return };
        let params = DidSaveTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
            text: None,
        };
        self.send_notification(
            "textDocument/didSave",
            Some(serde_json::to_value(params).unwrap()),
        );
    }

    /// Notifies the server that a document was closed.
    pub fn did_close(&mut self, uri: &str) {
        let Some(uri) = parse_uri(uri) else { return };
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
        };
        self.send_notification(
            "textDocument/didClose",
            Some(serde_json::to_value(params).unwrap()),
        );
    }

    /// Requests completions at a position.
    pub fn completion(
        &mut self,
        uri: &str,
        position: Position,
        on_success: impl FnOnce(Vec<CompletionItem>) + 'static,
        on_error: impl FnOnce(RpcError) + 'static,
    ) {
        let Some(params) = position_params(uri, position) else { return };
        self.send_request(
            "textDocument/completion",
            params,
            Box::new(move |result| on_success(parse_completion_response(result))),
            Box::new(on_error),
        );
    }

    /// Requests hover information at a position.
    pub fn hover(
        &mut self,
        uri: &str,
        position: Position,
        on_success: impl FnOnce(Option<HoverInfo>) + 'static,
        on_error: impl FnOnce(RpcError) + 'static,
    ) {
        let Some(params) = position_params(uri, position) else { return };
        self.send_request(
            "textDocument/hover",
            params,
            Box::new(move |result| {
                let hover = result.and_then(|v| serde_json::from_value::<Hover>(v).ok());
                on_success(hover.map(convert_hover))
            }),
            Box::new(on_error),
        );
    }

    /// Requests the definition sites of the symbol at a position.
    pub fn goto_definition(
        &mut self,
        uri: &str,
        position: Position,
        on_success: impl FnOnce(Vec<Location>) + 'static,
        on_error: impl FnOnce(RpcError) + 'static,
    ) {
        let Some(params) = position_params(uri, position) else { return };
        self.send_request(
            "textDocument/definition",
            params,
            Box::new(move |result| on_success(parse_location_response(result))),
            Box::new(on_error),
        );
    }

    /// Requests all references to the symbol at a position, declaration
    /// included.
    pub fn references(
        &mut self,
        uri: &str,
        position: Position,
        on_success: impl FnOnce(Vec<Location>) + 'static,
        on_error: impl FnOnce(RpcError) + 'static,
    ) {
        let Some(uri) = parse_uri(uri) else { return };
        let params = ReferenceParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: position.into(),
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context: ReferenceContext {
                include_declaration: true,
            },
        };
        self.send_request(
            "textDocument/references",
            serde_json::to_value(params).unwrap(),
            Box::new(move |result| on_success(parse_location_response(result))),
            Box::new(on_error),
        );
    }

    /// Requests the symbol outline of a document.
    pub fn document_symbols(
        &mut self,
        uri: &str,
        on_success: impl FnOnce(Vec<DocumentSymbol>) + 'static,
        on_error: impl FnOnce(RpcError) + 'static,
    ) {
        let Some(uri) = parse_uri(uri) else { return };
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        self.send_request(
            "textDocument/documentSymbol",
            serde_json::to_value(params).unwrap(),
            Box::new(move |result| on_success(parse_document_symbols(result))),
            Box::new(on_error),
        );
    }

    /// Registers the diagnostics handler.
    pub fn on_diagnostics(&mut self, handler: DiagnosticsHandler) {
        self.diagnostics = Some(handler);
    }

    /// Registers a handler that sees every server notification.
    pub fn on_notification(&mut self, handler: impl FnMut(&str, &Value) + 'static) {
        self.notifications = Some(Box::new(handler));
    }

    /// Drains the server pipe without blocking: polls the read end, buffers
    /// whatever bytes are ready, then dispatches every complete frame.
    /// Incomplete frames stay buffered for the next tick.
    pub fn tick(&mut self) {
        if self.state != ClientState::Running {
            return;
        }

        let mut saw_eof = false;
        if let Some(stdout) = self.stdout.as_mut() {
            let ready = {
                let mut fds = [PollFd::new(stdout.as_fd(), PollFlags::POLLIN)];
                match poll(&mut fds, PollTimeout::ZERO) {
                    Ok(n) => n > 0,
                    Err(errno) => {
                        log::error!("poll on language server pipe failed: {}", errno);
                        false
                    }
                }
            };
            if ready {
                let mut chunk = [0u8; 4096];
                loop {
                    match stdout.read(&mut chunk) {
                        Ok(0) => {
                            saw_eof = true;
                            break;
                        }
                        Ok(n) => self.frames.extend(&chunk[..n]),
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            log::error!("read from language server failed: {}", err);
                            break;
                        }
                    }
                }
            }
        }

        while let Some(body) = self.frames.next_frame() {
            self.dispatch_frame(&body);
        }

        if saw_eof {
            self.handle_server_exit();
        }
    }

    /// Stops the server: `shutdown` and `exit` go out, both pipe ends
    /// close, and the call blocks until the child is reaped. Pending
    /// requests complete with a cancellation error.
    pub fn shutdown(&mut self) {
        if self.state != ClientState::Running {
            return;
        }
        self.state = ClientState::ShuttingDown;

        self.send_notification("shutdown", None);
        self.send_notification("exit", None);

        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) => log::info!("language server exited: {}", status),
                Err(err) => log::warn!("failed to wait for language server: {}", err),
            }
        }

        self.fail_pending("client shut down");
        self.capabilities = None;
        self.state = ClientState::Stopped;
    }

    fn send_request(
        &mut self,
        method: &str,
        params: Value,
        on_success: Box<dyn FnOnce(Option<Value>)>,
        on_error: Box<dyn FnOnce(RpcError)>,
    ) {
        let id = self.next_request_id;
        self.next_request_id += 1;
        self.pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                on_success,
                on_error,
            },
        );

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::Number(id),
            method: method.to_string(),
            params: Some(params),
        };
        self.write_message(&serde_json::to_value(request).unwrap());
    }

    fn send_notification(&mut self, method: &str, params: Option<Value>) {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        };
        self.write_message(&serde_json::to_value(notification).unwrap());
    }

    /// Writes one framed message. Failures are logged, never retried.
    fn write_message(&mut self, message: &Value) {
        let Some(stdin) = self.stdin.as_mut() else {
            log::debug!("dropping outbound message: no server pipe");
            return;
        };
        if let Err(err) = transport::write_message(stdin, message) {
            log::error!("failed to write to language server: {}", err);
        }
    }

    fn dispatch_frame(&mut self, body: &[u8]) {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("discarding undecodable message body: {}", err);
                return;
            }
        };
        log::trace!("received: {}", value);

        match transport::parse_message(&value) {
            Some(JsonRpcMessage::Response(response)) => self.dispatch_response(response),
            Some(JsonRpcMessage::Notification(notification)) => {
                self.dispatch_notification(notification)
            }
            Some(JsonRpcMessage::Request(request)) => {
                // Server-initiated requests (workspace/configuration and
                // friends) are outside the supported subset.
                log::debug!(
                    "ignoring server request {} (id {:?})",
                    request.method,
                    request.id
                );
            }
            None => log::warn!("message with unrecognized shape"),
        }
    }

    fn dispatch_response(&mut self, response: JsonRpcResponse) {
        let RequestId::Number(id) = response.id else {
            log::warn!("response with non-numeric id: {:?}", response.id);
            return;
        };
        let Some(request) = self.pending.remove(&id) else {
            log::warn!("response for unknown request id {}", id);
            return;
        };

        if let Some(error) = response.error {
            log::debug!(
                "request '{}' failed: {} ({})",
                request.method,
                error.message,
                error.code
            );
            (request.on_error)(RpcError {
                code: error.code,
                message: error.message,
            });
            return;
        }

        if request.method == "initialize" {
            self.finish_initialize(response.result.clone());
        }
        (request.on_success)(response.result);
    }

    /// Records negotiated capabilities and acknowledges with `initialized`.
    /// Runs before the caller's success continuation: document traffic is
    /// only valid once this ordering has happened.
    fn finish_initialize(&mut self, result: Option<Value>) {
        let init: InitializeResult = result
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        log::info!(
            "language server ready ({})",
            summarize_capabilities(&init.capabilities)
        );
        self.capabilities = Some(init.capabilities);
        self.send_notification("initialized", Some(json!({})));
    }

    fn dispatch_notification(&mut self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "textDocument/publishDiagnostics" => {
                if let Some(params) = notification.params.clone() {
                    match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                        Ok(publish) => {
                            let diagnostics: Vec<Diagnostic> =
                                publish.diagnostics.into_iter().map(Into::into).collect();
                            if let Some(handler) = self.diagnostics.clone() {
                                handler(publish.uri.as_str(), &diagnostics);
                            }
                        }
                        Err(err) => log::warn!("malformed publishDiagnostics params: {}", err),
                    }
                }
            }
            "window/logMessage" => {
                if let Some(params) = notification.params.clone() {
                    if let Ok(message) = serde_json::from_value::<LogMessageParams>(params) {
                        match message.typ {
                            MessageType::ERROR => log::error!("server: {}", message.message),
                            MessageType::WARNING => log::warn!("server: {}", message.message),
                            _ => log::debug!("server: {}", message.message),
                        }
                    }
                }
            }
            _ => {}
        }

        // Every notification, diagnostics included, also reaches the
        // generic handler.
        if let Some(handler) = self.notifications.as_mut() {
            let params = notification.params.unwrap_or(Value::Null);
            handler(&notification.method, &params);
        }
    }

    /// The server closed its output pipe. The session is invalid from here
    /// on; it is never restarted automatically.
    fn handle_server_exit(&mut self) {
        log::warn!("language server closed its output pipe");
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(status)) => log::warn!("language server exited: {}", status),
                Ok(None) => log::warn!("language server alive with closed pipes, abandoning it"),
                Err(err) => log::warn!("failed to reap language server: {}", err),
            }
        }
        self.fail_pending("language server exited");
        self.capabilities = None;
        self.state = ClientState::Stopped;
    }

    /// Completes every pending request with a cancellation error so no
    /// continuation is silently dropped.
    fn fail_pending(&mut self, reason: &str) {
        if self.pending.is_empty() {
            return;
        }
        log::debug!("cancelling {} pending requests", self.pending.len());
        for (_, request) in self.pending.drain() {
            (request.on_error)(RpcError {
                code: RpcError::REQUEST_CANCELLED,
                message: reason.to_string(),
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn inject_bytes(&mut self, bytes: &[u8]) {
        self.frames.extend(bytes);
        while let Some(body) = self.frames.next_frame() {
            self.dispatch_frame(&body);
        }
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn set_nonblocking(pipe: &ChildStdout) -> nix::Result<()> {
    let flags = fcntl(pipe, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(pipe, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

fn parse_uri(uri: &str) -> Option<Uri> {
    match uri.parse() {
        Ok(uri) => Some(uri),
        Err(err) => {
            log::warn!("invalid uri '{}': {}", uri, err);
            None
        }
    }
}

fn position_params(uri: &str, position: Position) -> Option<Value> {
    let uri = parse_uri(uri)?;
    let params = TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri },
        position: position.into(),
    };
    Some(serde_json::to_value(params).unwrap())
}

/// The fixed capability subset advertised to every server.
fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        text_document: Some(TextDocumentClientCapabilities {
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
            }),
            completion: Some(CompletionClientCapabilities {
                dynamic_registration: Some(false),
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(true),
                    documentation_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(true),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(false),
                hierarchical_document_symbol_support: Some(true),
                ..Default::default()
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Formats advertised capabilities for the lifecycle log line.
fn summarize_capabilities(caps: &ServerCapabilities) -> String {
    let mut features = Vec::new();
    if caps.hover_provider.is_some() {
        features.push("hover");
    }
    if caps.completion_provider.is_some() {
        features.push("completion");
    }
    if caps.definition_provider.is_some() {
        features.push("definition");
    }
    if caps.references_provider.is_some() {
        features.push("references");
    }
    if caps.document_symbol_provider.is_some() {
        features.push("symbols");
    }
    if features.is_empty() {
        "no features advertised".to_string()
    } else {
        features.join(", ")
    }
}

/// Converts a wire hover to the editor type.
fn convert_hover(hover: Hover) -> HoverInfo {
    let contents = match hover.contents {
        HoverContents::Scalar(marked) => match marked {
            MarkedString::String(s) => s,
            MarkedString::LanguageString(ls) => format!("```{}\n{}\n```", ls.language, ls.value),
        },
        HoverContents::Array(arr) => arr
            .into_iter()
            .map(|m| match m {
                MarkedString::String(s) => s,
                MarkedString::LanguageString(ls) => {
                    format!("```{}\n{}\n```", ls.language, ls.value)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        HoverContents::Markup(markup) => markup.value,
    };

    HoverInfo {
        contents,
        range: hover.range.map(|r| r.into()),
    }
}

/// Parses a completion response, which may be a bare list or a
/// `CompletionList`.
fn parse_completion_response(result: Option<Value>) -> Vec<CompletionItem> {
    let Some(value) = result else {
        return vec![];
    };

    if let Ok(list) = serde_json::from_value::<CompletionList>(value.clone()) {
        return list.items.into_iter().map(|i| i.into()).collect();
    }

    if let Ok(items) = serde_json::from_value::<Vec<lsp_types::CompletionItem>>(value) {
        return items.into_iter().map(|i| i.into()).collect();
    }

    vec![]
}

/// Parses a location response (definition, references): scalar, array, or
/// location links.
fn parse_location_response(result: Option<Value>) -> Vec<Location> {
    let Some(value) = result else {
        return vec![];
    };

    if let Ok(response) = serde_json::from_value::<GotoDefinitionResponse>(value.clone()) {
        return match response {
            GotoDefinitionResponse::Scalar(loc) => vec![loc.into()],
            GotoDefinitionResponse::Array(locs) => locs.into_iter().map(Into::into).collect(),
            GotoDefinitionResponse::Link(links) => links
                .into_iter()
                .map(|link| Location {
                    uri: link.target_uri.as_str().to_string(),
                    range: link.target_selection_range.into(),
                })
                .collect(),
        };
    }

    if let Ok(locs) = serde_json::from_value::<Vec<lsp_types::Location>>(value) {
        return locs.into_iter().map(Into::into).collect();
    }

    vec![]
}

/// Parses a document-symbol response, flattening the legacy flat form into
/// the hierarchical editor type.
fn parse_document_symbols(result: Option<Value>) -> Vec<DocumentSymbol> {
    let Some(value) = result else {
        return vec![];
    };

    if let Ok(response) = serde_json::from_value::<DocumentSymbolResponse>(value) {
        return match response {
            DocumentSymbolResponse::Flat(symbols) => symbols
                .into_iter()
                .map(|s| DocumentSymbol {
                    name: s.name,
                    kind: s.kind.into(),
                    range: s.location.range.into(),
                    selection_range: s.location.range.into(),
                    children: vec![],
                })
                .collect(),
            DocumentSymbolResponse::Nested(symbols) => {
                symbols.into_iter().map(convert_document_symbol).collect()
            }
        };
    }

    vec![]
}

fn convert_document_symbol(sym: lsp_types::DocumentSymbol) -> DocumentSymbol {
    DocumentSymbol {
        name: sym.name,
        kind: sym.kind.into(),
        range: sym.range.into(),
        selection_range: sym.selection_range.into(),
        children: sym
            .children
            .unwrap_or_default()
            .into_iter()
            .map(convert_document_symbol)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    #[test]
    fn response_fires_success_continuation_once() {
        let mut client = ProtocolClient::new();
        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        client.send_request(
            "textDocument/hover",
            json!({}),
            Box::new(move |result| *got_clone.borrow_mut() = Some(result)),
            Box::new(|_| panic!("error continuation must not fire")),
        );

        client.inject_bytes(&frame(r#"{"jsonrpc":"2.0","id":1,"result":{"x":7}}"#));
        assert_eq!(*got.borrow(), Some(Some(json!({"x": 7}))));
        assert!(client.pending.is_empty());

        // A duplicate response for the same id is ignored.
        client.inject_bytes(&frame(r#"{"jsonrpc":"2.0","id":1,"result":{"x":8}}"#));
        assert_eq!(*got.borrow(), Some(Some(json!({"x": 7}))));
    }

    #[test]
    fn error_response_fires_error_continuation() {
        let mut client = ProtocolClient::new();
        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        client.send_request(
            "textDocument/completion",
            json!({}),
            Box::new(|_| panic!("success continuation must not fire")),
            Box::new(move |err| *got_clone.borrow_mut() = Some(err)),
        );

        client.inject_bytes(&frame(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#,
        ));
        let err = got.borrow().clone().unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "no such method");
        assert!(client.pending.is_empty());
    }

    #[test]
    fn request_ids_are_monotonic() {
        let mut client = ProtocolClient::new();
        for _ in 0..3 {
            client.send_request("textDocument/hover", json!({}), Box::new(|_| {}), Box::new(|_| {}));
        }
        let mut ids: Vec<i64> = client.pending.keys().copied().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn initialize_response_records_capabilities() {
        let mut client = ProtocolClient::new();
        let ok = Rc::new(Cell::new(false));
        let ok_clone = ok.clone();
        client.initialize(
            "file:///workspace",
            move |_| ok_clone.set(true),
            |_| panic!("initialize must not error"),
        );
        assert!(!client.is_initialized());

        client.inject_bytes(&frame(
            r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{"hoverProvider":true}}}"#,
        ));
        assert!(ok.get());
        assert!(client.is_initialized());
        assert_eq!(
            client.capabilities().unwrap().hover_provider,
            Some(HoverProviderCapability::Simple(true))
        );
    }

    #[test]
    fn diagnostics_notification_reaches_both_handlers() {
        let mut client = ProtocolClient::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        client.on_diagnostics(Rc::new(move |uri: &str, diags: &[Diagnostic]| {
            seen_clone.borrow_mut().push((uri.to_string(), diags.len()));
        }));
        let methods = Rc::new(RefCell::new(Vec::new()));
        let methods_clone = methods.clone();
        client.on_notification(move |method, _| {
            methods_clone.borrow_mut().push(method.to_string());
        });

        let body = r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{"uri":"file:///a.rs","diagnostics":[{"range":{"start":{"line":0,"character":0},"end":{"line":0,"character":1}},"message":"bad"}]}}"#;
        client.inject_bytes(&frame(body));

        assert_eq!(seen.borrow().as_slice(), &[("file:///a.rs".to_string(), 1)]);
        assert_eq!(
            methods.borrow().as_slice(),
            &["textDocument/publishDiagnostics".to_string()]
        );
    }

    #[test]
    fn server_request_is_ignored() {
        let mut client = ProtocolClient::new();
        client.send_request("textDocument/hover", json!({}), Box::new(|_| {}), Box::new(|_| {}));
        // A server-initiated request reusing our id must not resolve our
        // pending request.
        client.inject_bytes(&frame(
            r#"{"jsonrpc":"2.0","id":1,"method":"workspace/configuration","params":{}}"#,
        ));
        assert_eq!(client.pending.len(), 1);
    }

    #[test]
    fn malformed_header_then_good_frame() {
        let mut client = ProtocolClient::new();
        let got = Rc::new(Cell::new(false));
        let got_clone = got.clone();
        client.send_request(
            "textDocument/hover",
            json!({}),
            Box::new(move |_| got_clone.set(true)),
            Box::new(|_| {}),
        );

        client.inject_bytes(b"Content-Type: junk\r\n\r\ngarbage");
        client.inject_bytes(&frame(r#"{"jsonrpc":"2.0","id":1,"result":null}"#));
        assert!(got.get());
    }

    #[test]
    fn undecodable_body_is_skipped() {
        let mut client = ProtocolClient::new();
        let got = Rc::new(Cell::new(false));
        let got_clone = got.clone();
        client.send_request(
            "textDocument/hover",
            json!({}),
            Box::new(move |_| got_clone.set(true)),
            Box::new(|_| {}),
        );

        client.inject_bytes(&frame("this is not json"));
        client.inject_bytes(&frame(r#"{"jsonrpc":"2.0","id":1,"result":null}"#));
        assert!(got.get());
    }

    #[test]
    fn spawn_failure_is_recoverable() {
        let mut client = ProtocolClient::new();
        let err = client
            .start("quill-no-such-language-server", &[])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(client.state(), ClientState::NotStarted);
        // The client is startable again after a failed spawn.
        assert!(client.start("quill-still-no-such-server", &[]).is_err());
        assert_eq!(client.state(), ClientState::NotStarted);
    }

    #[cfg(unix)]
    #[test]
    fn shutdown_cancels_pending_requests() {
        let mut client = ProtocolClient::new();
        client.start("cat", &[]).unwrap();

        let cancelled = Rc::new(RefCell::new(None));
        let cancelled_clone = cancelled.clone();
        client.hover(
            "file:///a.rs",
            Position::new(0, 0),
            |_| panic!("no response can arrive"),
            move |err| *cancelled_clone.borrow_mut() = Some(err),
        );

        client.shutdown();
        assert_eq!(client.state(), ClientState::Stopped);
        let err = cancelled.borrow().clone().unwrap();
        assert_eq!(err.code, RpcError::REQUEST_CANCELLED);

        // Shutting down again is a no-op.
        client.shutdown();
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[cfg(unix)]
    #[test]
    fn tick_reads_a_real_server_response() {
        use std::io::Write as _;
        use std::time::Duration;

        // A canned server: ignores its stdin, answers request id 1.
        let mut script = tempfile::NamedTempFile::new().unwrap();
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#;
        writeln!(script, "body='{}'", body).unwrap();
        writeln!(script, "printf 'Content-Length: %s\\r\\n\\r\\n%s' \"${{#body}}\" \"$body\"").unwrap();
        writeln!(script, "sleep 2").unwrap();
        script.flush().unwrap();

        let mut client = ProtocolClient::new();
        client
            .start("sh", &[script.path().to_string_lossy().into_owned()])
            .unwrap();

        let ok = Rc::new(Cell::new(false));
        let ok_clone = ok.clone();
        client.initialize("file:///tmp", move |_| ok_clone.set(true), |err| {
            panic!("initialize failed: {}", err.message)
        });

        for _ in 0..100 {
            client.tick();
            if ok.get() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(ok.get());
        assert!(client.is_initialized());
        client.shutdown();
    }
}
