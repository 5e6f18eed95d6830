//! [`ProtocolHarness`]: the MCP compliance check sequence.
//!
//! Checks run in order and every failure is collected:
//!
//! 1. `liveness`      GET answers below 500
//! 2. `handshake`     `initialize` + `notifications/initialized`
//! 3. `tools_list`    non-empty `tools/list`, each tool validated as `tool_schema:<name>`
//! 4. `invoke:<name>` one `tools/call` per valid tool with minimal arguments
//! 5. `error_path`    malformed JSON and an unknown method yield JSON-RPC errors
//!
//! Checks 3 and 4 need a session and are skipped when the handshake fails.
//! Each check gets `check_timeout` or whatever is left of the run budget,
//! whichever is shorter; a check reached after the budget is spent fails
//! without being sent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::args::minimal_args;
use super::protocol::{self, DEFAULT_PROTOCOL_VERSION, JsonRpcRequest, RpcOutcome};
use super::trait_def::TestHarness;
use super::transport::{HttpTransport, McpTransport, TransportError};
use crate::error::HarnessError;
use crate::state::{CheckFailure, TestResult};

pub const LIVENESS: &str = "liveness";
pub const HANDSHAKE: &str = "handshake";
pub const TOOLS_LIST: &str = "tools_list";
pub const ERROR_PATH: &str = "error_path";

/// Method name no server is expected to implement.
const UNKNOWN_METHOD: &str = "mcpforge/does-not-exist";
/// Body that is not valid JSON.
const MALFORMED_BODY: &str = r#"{"jsonrpc": "2.0", "id": 1, "method": "#;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Budget for each individual check.
    pub check_timeout: Duration,
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
    /// Upper bound on `tools/list` pages followed through `nextCursor`.
    pub max_tool_pages: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            check_timeout: Duration::from_secs(10),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_owned(),
            client_name: "mcpforge".to_owned(),
            client_version: env!("CARGO_PKG_VERSION").to_owned(),
            max_tool_pages: 10,
        }
    }
}

pub struct ProtocolHarness {
    transport: Arc<dyn McpTransport>,
    config: HarnessConfig,
}

/// A tool that passed schema validation.
#[derive(Debug, Clone)]
struct ToolSpec {
    name: String,
    input_schema: Value,
}

/// Per-run JSON-RPC session state.
struct Session<'a> {
    transport: &'a dyn McpTransport,
    endpoint: Url,
    session_id: Option<String>,
    next_id: u64,
}

impl<'a> Session<'a> {
    fn new(transport: &'a dyn McpTransport, endpoint: Url) -> Self {
        Self {
            transport,
            endpoint,
            session_id: None,
            next_id: 1,
        }
    }

    async fn send(&mut self, body: String) -> Result<super::transport::RpcReply, String> {
        let reply = self
            .transport
            .post(&self.endpoint, body, self.session_id.as_deref())
            .await
            .map_err(|e| e.to_string())?;
        if let Some(id) = &reply.session_id {
            self.session_id = Some(id.clone());
        }
        Ok(reply)
    }

    /// Send a request and return the validated outcome.
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<RpcOutcome, String> {
        let id = self.next_id;
        self.next_id += 1;
        let body = serde_json::to_string(&JsonRpcRequest::call(id, method, params))
            .map_err(|e| format!("failed to encode {method} request: {e}"))?;

        let reply = self.send(body).await.map_err(|e| format!("{method}: {e}"))?;
        let message = reply.message.ok_or_else(|| {
            format!("{method}: HTTP {} without a JSON-RPC response body", reply.status)
        })?;
        protocol::parse_response(&message, Some(id)).map_err(|e| format!("{method}: {e}"))
    }

    /// Send a request that must succeed and return its `result`.
    async fn call(&mut self, method: &str, params: Option<Value>) -> Result<Value, String> {
        match self.request(method, params).await? {
            RpcOutcome::Result(result) => Ok(result),
            RpcOutcome::Error(e) => Err(format!(
                "{method} returned error {}: {}",
                e.code, e.message
            )),
        }
    }

    async fn notify(&mut self, method: &str) -> Result<(), String> {
        let body = serde_json::to_string(&JsonRpcRequest::notification(method, None))
            .map_err(|e| format!("failed to encode {method}: {e}"))?;
        let reply = self.send(body).await.map_err(|e| format!("{method}: {e}"))?;
        if reply.status >= 400 {
            return Err(format!("{method} rejected with HTTP {}", reply.status));
        }
        Ok(())
    }
}

impl ProtocolHarness {
    pub fn new(transport: Arc<dyn McpTransport>, config: HarnessConfig) -> Self {
        Self { transport, config }
    }

    /// Harness over [`HttpTransport`].
    pub fn http(config: HarnessConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(config.check_timeout)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Time allowed for the next check, or a failure when the run
    /// budget is already spent.
    fn limit(&self, check_name: &str, deadline: Instant) -> Result<Duration, CheckFailure> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CheckFailure::new(check_name, "not run: test budget exhausted"));
        }
        Ok(remaining.min(self.config.check_timeout))
    }

    /// Run `check` under its time limit, labelling any failure.
    async fn timed<T, F>(
        &self,
        check_name: &str,
        deadline: Instant,
        check: F,
    ) -> Result<T, CheckFailure>
    where
        F: Future<Output = Result<T, String>>,
    {
        let limit = self.limit(check_name, deadline)?;
        match tokio::time::timeout(limit, check).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(detail)) => Err(CheckFailure::new(check_name, detail)),
            Err(_) => Err(CheckFailure::new(
                check_name,
                format!("no answer within {limit:?}"),
            )),
        }
    }

    async fn handshake(&self, session: &mut Session<'_>) -> Result<(), String> {
        let params = json!({
            "protocolVersion": self.config.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": self.config.client_name,
                "version": self.config.client_version,
            },
        });
        let result = session.call("initialize", Some(params)).await?;

        if result.get("protocolVersion").and_then(Value::as_str).is_none() {
            return Err("initialize result has no protocolVersion".to_owned());
        }
        if !result.get("capabilities").is_some_and(Value::is_object) {
            return Err("initialize result has no capabilities object".to_owned());
        }
        let server_name = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| "initialize result has no serverInfo.name".to_owned())?;
        debug!(server = server_name, session = ?session.session_id, "handshake complete");

        session.notify("notifications/initialized").await
    }

    async fn list_tools(&self, session: &mut Session<'_>) -> Result<Vec<Value>, String> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.config.max_tool_pages.max(1) {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = session.call("tools/list", params).await?;
            let page = result
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| "tools/list result has no tools array".to_owned())?;
            tools.extend(page.iter().cloned());

            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_owned);
            if cursor.is_none() {
                break;
            }
        }

        if tools.is_empty() {
            return Err("server advertises no tools".to_owned());
        }
        Ok(tools)
    }

    async fn invoke(&self, session: &mut Session<'_>, tool: &ToolSpec) -> Result<(), String> {
        let params = json!({
            "name": tool.name,
            "arguments": minimal_args(&tool.input_schema),
        });
        let result = session.call("tools/call", Some(params)).await?;
        validate_call_result(&result)
    }

    async fn error_path(&self, session: &mut Session<'_>) -> Result<(), String> {
        let mut problems = Vec::new();

        match session.send(MALFORMED_BODY.to_owned()).await {
            Ok(reply) => match reply.message {
                Some(message) => match message.get("error") {
                    Some(error) => {
                        if let Err(e) = protocol::parse_error_object(error) {
                            problems.push(format!("malformed JSON: {e}"));
                        }
                    }
                    None => problems.push("malformed JSON: reply has no error object".to_owned()),
                },
                None => problems.push(format!(
                    "malformed JSON: HTTP {} without a JSON-RPC error body",
                    reply.status
                )),
            },
            Err(e) => problems.push(format!("malformed JSON: {e}")),
        }

        match session.request(UNKNOWN_METHOD, None).await {
            Ok(RpcOutcome::Error(_)) => {}
            Ok(RpcOutcome::Result(_)) => {
                problems.push(format!("unknown method {UNKNOWN_METHOD} returned a result"));
            }
            Err(e) => problems.push(format!("unknown method: {e}")),
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

#[async_trait]
impl TestHarness for ProtocolHarness {
    fn name(&self) -> &str {
        "protocol"
    }

    async fn run_tests(&self, url: &str, budget: Duration) -> Result<TestResult, HarnessError> {
        let endpoint = parse_endpoint(url)?;
        let deadline = Instant::now() + budget;
        let mut failures = Vec::new();

        // 1. liveness
        let limit = budget.min(self.config.check_timeout);
        match tokio::time::timeout(limit, self.transport.probe(&endpoint)).await {
            Ok(Ok(status)) if status >= 500 => failures.push(CheckFailure::new(
                LIVENESS,
                format!("endpoint answered HTTP {status}"),
            )),
            Ok(Ok(_)) => {}
            Ok(Err(TransportError::Connect(cause))) => {
                return Err(HarnessError::Unreachable {
                    url: url.to_owned(),
                    cause,
                });
            }
            Ok(Err(e)) => failures.push(CheckFailure::new(LIVENESS, e.to_string())),
            Err(_) => failures.push(CheckFailure::new(
                LIVENESS,
                format!("no answer within {limit:?}"),
            )),
        }

        let mut session = Session::new(self.transport.as_ref(), endpoint);

        // 2. handshake
        let handshake = self.timed(HANDSHAKE, deadline, self.handshake(&mut session)).await;
        let connected = match handshake {
            Ok(()) => true,
            Err(failure) => {
                failures.push(failure);
                false
            }
        };

        // 3 + 4. tools
        if connected {
            match self.timed(TOOLS_LIST, deadline, self.list_tools(&mut session)).await {
                Ok(listed) => {
                    let mut valid = Vec::new();
                    for (index, tool) in listed.iter().enumerate() {
                        match validate_tool(tool) {
                            Ok(spec) => valid.push(spec),
                            Err(detail) => failures.push(CheckFailure::new(
                                format!("tool_schema:{}", tool_label(tool, index)),
                                detail,
                            )),
                        }
                    }
                    for tool in &valid {
                        let check = format!("invoke:{}", tool.name);
                        if let Err(failure) =
                            self.timed(&check, deadline, self.invoke(&mut session, tool)).await
                        {
                            failures.push(failure);
                        }
                    }
                }
                Err(failure) => failures.push(failure),
            }
        }

        // 5. error path
        if let Err(failure) = self.timed(ERROR_PATH, deadline, self.error_path(&mut session)).await {
            failures.push(failure);
        }

        if Instant::now() >= deadline {
            warn!(url, ?budget, "test budget ran out before every check finished");
        }
        info!(url, failures = failures.len(), "compliance checks finished");
        Ok(TestResult::from_failures(failures))
    }
}

fn parse_endpoint(url: &str) -> Result<Url, HarnessError> {
    let invalid = |reason: String| HarnessError::InvalidUrl {
        url: url.to_owned(),
        reason,
    };
    let endpoint = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", endpoint.scheme())));
    }
    Ok(endpoint)
}

fn tool_label(tool: &Value, index: usize) -> String {
    tool.get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .map_or_else(|| format!("#{index}"), str::to_owned)
}

fn validate_tool(tool: &Value) -> Result<ToolSpec, String> {
    let name = tool
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| "tool has no name".to_owned())?;
    let schema = tool
        .get("inputSchema")
        .filter(|s| s.is_object())
        .ok_or_else(|| "inputSchema is missing or not an object".to_owned())?;
    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err("inputSchema.type must be \"object\"".to_owned());
    }
    if schema.get("properties").is_some_and(|p| !p.is_object()) {
        return Err("inputSchema.properties must be an object".to_owned());
    }
    Ok(ToolSpec {
        name: name.to_owned(),
        input_schema: schema.clone(),
    })
}

fn validate_call_result(result: &Value) -> Result<(), String> {
    let content = result
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| "tools/call result has no content array".to_owned())?;
    for (index, item) in content.iter().enumerate() {
        if item.get("type").and_then(Value::as_str).is_none() {
            return Err(format!("content item {index} has no string type"));
        }
    }
    Ok(())
}
