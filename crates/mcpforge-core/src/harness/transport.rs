//! Transports used by the protocol harness.
//!
//! The harness speaks MCP's streamable HTTP transport: JSON-RPC messages
//! are POSTed to the endpoint and answered either with a JSON body or a
//! `text/event-stream` body whose `data:` events carry the response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use thiserror::Error;

use super::protocol;

pub const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No connection could be established.
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// A reply to a POSTed message.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    pub status: u16,
    pub session_id: Option<String>,
    /// The JSON-RPC message in the body, if one could be decoded.
    pub message: Option<Value>,
}

#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Plain GET used as a liveness probe. Returns the HTTP status.
    async fn probe(&self, endpoint: &Url) -> Result<u16, TransportError>;

    /// POST a raw body. The body is not required to be valid JSON.
    async fn post(
        &self,
        endpoint: &Url,
        body: String,
        session_id: Option<&str>,
    ) -> Result<RpcReply, TransportError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn McpTransport) {}
};

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn probe(&self, endpoint: &Url) -> Result<u16, TransportError> {
        // The body is never read: a GET may open a long-lived event stream.
        let response = self.client.get(endpoint.clone()).send().await?;
        Ok(response.status().as_u16())
    }

    async fn post(
        &self,
        endpoint: &Url,
        body: String,
        session_id: Option<&str>,
    ) -> Result<RpcReply, TransportError> {
        let mut request = self
            .client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(body);
        if let Some(id) = session_id {
            request = request.header(SESSION_HEADER, id);
        }

        let mut response = request.send().await?;
        let status = response.status().as_u16();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let message = if is_sse {
            // Stop at the first response event; the stream may stay open.
            let mut buf: Vec<u8> = Vec::new();
            let mut found = None;
            while let Some(chunk) = response.chunk().await? {
                buf.extend_from_slice(&chunk);
                let events = parse_sse_messages(&String::from_utf8_lossy(&buf));
                if let Some(reply) = events.into_iter().find(protocol::is_response) {
                    found = Some(reply);
                    break;
                }
            }
            found.or_else(|| {
                parse_sse_messages(&String::from_utf8_lossy(&buf))
                    .into_iter()
                    .next()
            })
        } else {
            let text = response.text().await?;
            serde_json::from_str(&text).ok()
        };

        Ok(RpcReply {
            status,
            session_id,
            message,
        })
    }
}

/// Decode the JSON payload of every complete-or-parseable SSE event.
pub fn parse_sse_messages(stream: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut data = String::new();

    let mut flush = |data: &mut String| {
        if !data.is_empty() {
            if let Ok(value) = serde_json::from_str(data) {
                messages.push(value);
            }
            data.clear();
        }
    };

    for line in stream.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            flush(&mut data);
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    flush(&mut data);
    messages
}
