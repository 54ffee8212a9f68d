//! JSON-RPC wire format: message types and Content-Length framing.
//!
//! Messages travel over the server's stdin/stdout as a header block of
//! `Key: Value` lines, a blank line, then a JSON body of exactly
//! `Content-Length` bytes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};

/// JSON-RPC message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

/// JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request ID (can be number or string).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

/// Writes one framed message.
pub fn write_message(writer: &mut impl Write, message: &Value) -> io::Result<()> {
    let content = serde_json::to_string(message)?;
    write!(writer, "Content-Length: {}\r\n\r\n", content.len())?;
    writer.write_all(content.as_bytes())?;
    writer.flush()?;
    log::trace!("sent: {}", content);
    Ok(())
}

/// Classifies a parsed JSON value as request, response, or notification.
pub fn parse_message(value: &Value) -> Option<JsonRpcMessage> {
    // A response has an id but no method.
    if value.get("id").is_some() && value.get("method").is_none() {
        return serde_json::from_value(value.clone())
            .ok()
            .map(JsonRpcMessage::Response);
    }

    // A server-initiated request has both id and method.
    if value.get("id").is_some() && value.get("method").is_some() {
        return serde_json::from_value(value.clone())
            .ok()
            .map(JsonRpcMessage::Request);
    }

    // A notification has a method but no id.
    if value.get("method").is_some() && value.get("id").is_none() {
        return serde_json::from_value(value.clone())
            .ok()
            .map(JsonRpcMessage::Notification);
    }

    None
}

/// Accumulates raw pipe bytes and yields complete message bodies.
///
/// Incomplete frames stay buffered across reads. A terminated header block
/// that carries no parseable `Content-Length` poisons the stream up to an
/// unknown point, so the whole buffer is dropped: at most one message is
/// lost and the stream resynchronizes on the next well-formed frame.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extracts the next complete message body, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let header_end = find_subsequence(&self.buf, b"\r\n\r\n")?;

        let Some(content_length) = parse_content_length(&self.buf[..header_end]) else {
            log::warn!("discarding {} buffered bytes: unparseable header block", self.buf.len());
            self.buf.clear();
            return None;
        };

        let body_start = header_end + 4;
        if self.buf.len() < body_start + content_length {
            // Header complete, body still in flight.
            return None;
        }

        let body = self.buf[body_start..body_start + content_length].to_vec();
        self.buf.drain(..body_start + content_length);
        Some(body)
    }
}

/// Parses the `Content-Length` header out of a header block.
fn parse_content_length(header_block: &[u8]) -> Option<usize> {
    let header = std::str::from_utf8(header_block).ok()?;
    for line in header.split("\r\n") {
        if let Some((key, value)) = line.split_once(':') {
            if key.eq_ignore_ascii_case("Content-Length") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
