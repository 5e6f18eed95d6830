//! ProtocolHarness against an in-process MCP server over real HTTP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};

use mcpforge_core::error::HarnessError;
use mcpforge_core::harness::checks::{ERROR_PATH, HANDSHAKE, LIVENESS, TOOLS_LIST};
use mcpforge_core::harness::transport::SESSION_HEADER;
use mcpforge_core::harness::{HarnessConfig, ProtocolHarness, TestHarness};
use mcpforge_core::state::TestResult;

// ===========================================================================
// Fake MCP server
// ===========================================================================

struct Behavior {
    liveness_status: StatusCode,
    /// Pages returned by successive `tools/list` calls.
    tool_pages: Vec<Value>,
    sse: bool,
    /// Issue a session id on initialize and reject requests without it.
    sessions: bool,
    omit_server_info: bool,
    /// Answer unknown methods with a result and malformed JSON with HTML.
    sloppy_errors: bool,
    /// Tools whose calls hang past any check timeout.
    slow_tools: &'static [&'static str],
    seen: Mutex<Vec<(String, Option<String>)>>,
    arguments: Mutex<Vec<Value>>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            liveness_status: StatusCode::METHOD_NOT_ALLOWED,
            tool_pages: vec![json!([forecast_tool()])],
            sse: false,
            sessions: false,
            omit_server_info: false,
            sloppy_errors: false,
            slow_tools: &[],
            seen: Mutex::default(),
            arguments: Mutex::default(),
        }
    }
}

const SESSION: &str = "sess-42";

fn forecast_tool() -> Value {
    json!({
        "name": "forecast",
        "description": "Weather forecast for a city",
        "inputSchema": {
            "type": "object",
            "properties": {
                "city": {"type": "string"},
                "days": {"type": "integer"}
            },
            "required": ["city"]
        }
    })
}

fn rpc_result(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn rpc_error(id: &Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

async fn liveness(State(b): State<Arc<Behavior>>) -> StatusCode {
    b.liveness_status
}

async fn mcp(State(b): State<Arc<Behavior>>, headers: HeaderMap, body: String) -> Response {
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let Ok(message) = serde_json::from_str::<Value>(&body) else {
        b.seen.lock().unwrap().push(("<malformed>".to_owned(), session));
        if b.sloppy_errors {
            return (StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>").into_response();
        }
        return reply(&b, rpc_error(&Value::Null, -32700, "Parse error"), false);
    };

    let method = message["method"].as_str().unwrap_or_default().to_owned();
    let id = message.get("id").cloned().unwrap_or(Value::Null);
    b.seen.lock().unwrap().push((method.clone(), session.clone()));

    if b.sessions && method != "initialize" && session.as_deref() != Some(SESSION) {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(rpc_error(&id, -32000, "missing session")),
        )
            .into_response();
    }

    let payload = match method.as_str() {
        "initialize" => {
            let mut result = json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "weather", "version": "1.0.0"}
            });
            if b.omit_server_info {
                result.as_object_mut().unwrap().remove("serverInfo");
            }
            return reply(&b, rpc_result(&id, result), b.sessions);
        }
        "notifications/initialized" => return StatusCode::ACCEPTED.into_response(),
        "tools/list" => {
            let page = match message.pointer("/params/cursor").and_then(Value::as_str) {
                None => 0,
                Some(cursor) => cursor.trim_start_matches('p').parse().unwrap_or(0),
            };
            let mut result = json!({"tools": b.tool_pages.get(page).cloned().unwrap_or(json!([]))});
            if page + 1 < b.tool_pages.len() {
                result["nextCursor"] = json!(format!("p{}", page + 1));
            }
            rpc_result(&id, result)
        }
        "tools/call" => {
            let name = message.pointer("/params/name").and_then(Value::as_str);
            if let Some(args) = message.pointer("/params/arguments") {
                b.arguments.lock().unwrap().push(args.clone());
            }
            if name.is_some_and(|n| b.slow_tools.contains(&n)) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            match name {
                Some("broken") => rpc_result(&id, json!({"text": "no content array"})),
                Some(_) => rpc_result(&id, json!({"content": [{"type": "text", "text": "ok"}]})),
                None => rpc_error(&id, -32602, "missing tool name"),
            }
        }
        _ if b.sloppy_errors => rpc_result(&id, json!({})),
        _ => rpc_error(&id, -32601, "Method not found"),
    };
    reply(&b, payload, false)
}

fn reply(b: &Behavior, payload: Value, with_session: bool) -> Response {
    let mut response = if b.sse {
        // A keep-alive comment and an unrelated notification precede the reply.
        let body = format!(
            ": ping\n\nevent: message\ndata: {}\n\nevent: message\ndata: {}\n\n",
            json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {}}),
            payload
        );
        (
            [(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"))],
            body,
        )
            .into_response()
    } else {
        axum::Json(payload).into_response()
    };
    if with_session {
        response
            .headers_mut()
            .insert(SESSION_HEADER, HeaderValue::from_static(SESSION));
    }
    response
}

async fn serve(behavior: Arc<Behavior>) -> String {
    let app = Router::new()
        .route("/mcp", get(liveness).post(mcp))
        .with_state(behavior);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/mcp")
}

const BUDGET: Duration = Duration::from_secs(60);

async fn run(behavior: Behavior) -> (TestResult, Arc<Behavior>) {
    run_with(behavior, HarnessConfig::default(), BUDGET).await
}

async fn run_with(
    behavior: Behavior,
    config: HarnessConfig,
    budget: Duration,
) -> (TestResult, Arc<Behavior>) {
    let behavior = Arc::new(behavior);
    let url = serve(behavior.clone()).await;
    let harness = ProtocolHarness::http(config).unwrap();
    let result = harness.run_tests(&url, budget).await.unwrap();
    (result, behavior)
}

fn failed_checks(result: &TestResult) -> Vec<&str> {
    result
        .failures()
        .iter()
        .map(|f| f.check_name.as_str())
        .collect()
}

fn methods(behavior: &Behavior) -> Vec<String> {
    behavior
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|(m, _)| m.clone())
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn compliant_server_passes_every_check() {
    let (result, behavior) = run(Behavior::default()).await;

    assert!(result.passed(), "unexpected failures: {:?}", result.failures());
    assert_eq!(
        methods(&behavior),
        vec![
            "initialize",
            "notifications/initialized",
            "tools/list",
            "tools/call",
            "<malformed>",
            "mcpforge/does-not-exist",
        ]
    );
}

#[tokio::test]
async fn tool_call_uses_minimal_required_arguments() {
    let (result, behavior) = run(Behavior::default()).await;
    assert!(result.passed());

    // Only the required string property is filled in.
    let arguments = behavior.arguments.lock().unwrap();
    assert_eq!(*arguments, vec![json!({"city": "test"})]);
}

#[tokio::test]
async fn sse_replies_are_decoded() {
    let (result, _) = run(Behavior {
        sse: true,
        ..Behavior::default()
    })
    .await;
    assert!(result.passed(), "unexpected failures: {:?}", result.failures());
}

#[tokio::test]
async fn session_id_is_echoed_after_initialize() {
    let (result, behavior) = run(Behavior {
        sessions: true,
        ..Behavior::default()
    })
    .await;

    assert!(result.passed(), "unexpected failures: {:?}", result.failures());
    let seen = behavior.seen.lock().unwrap();
    assert_eq!(seen[0], ("initialize".to_owned(), None));
    assert!(
        seen[1..].iter().all(|(_, s)| s.as_deref() == Some(SESSION)),
        "{seen:?}"
    );
}

#[tokio::test]
async fn empty_tool_list_fails_tools_check() {
    let (result, behavior) = run(Behavior {
        tool_pages: vec![json!([])],
        ..Behavior::default()
    })
    .await;

    assert_eq!(failed_checks(&result), vec![TOOLS_LIST]);
    assert!(result.failures()[0].detail.contains("no tools"));
    assert!(!methods(&behavior).contains(&"tools/call".to_owned()));
}

#[tokio::test]
async fn tool_pages_are_followed() {
    let second = json!({
        "name": "alerts",
        "inputSchema": {"type": "object", "properties": {}}
    });
    let (result, behavior) = run(Behavior {
        tool_pages: vec![json!([forecast_tool()]), json!([second])],
        ..Behavior::default()
    })
    .await;

    assert!(result.passed(), "unexpected failures: {:?}", result.failures());
    let calls = methods(&behavior);
    assert_eq!(calls.iter().filter(|m| *m == "tools/list").count(), 2);
    assert_eq!(calls.iter().filter(|m| *m == "tools/call").count(), 2);
}

#[tokio::test]
async fn invalid_tool_schema_and_bad_call_result_are_reported_per_tool() {
    let tools = json!([
        forecast_tool(),
        {"name": "noschema"},
        {"inputSchema": {"type": "object"}},
        {"name": "broken", "inputSchema": {"type": "object"}}
    ]);
    let (result, behavior) = run(Behavior {
        tool_pages: vec![tools],
        ..Behavior::default()
    })
    .await;

    assert_eq!(
        failed_checks(&result),
        vec!["tool_schema:noschema", "tool_schema:#2", "invoke:broken"]
    );
    // Tools with invalid schemas are never invoked.
    let calls = methods(&behavior);
    assert_eq!(calls.iter().filter(|m| *m == "tools/call").count(), 2);
}

#[tokio::test]
async fn failed_handshake_skips_tool_checks() {
    let (result, behavior) = run(Behavior {
        omit_server_info: true,
        ..Behavior::default()
    })
    .await;

    assert_eq!(failed_checks(&result), vec![HANDSHAKE]);
    assert!(result.failures()[0].detail.contains("serverInfo.name"));
    let calls = methods(&behavior);
    assert!(!calls.contains(&"tools/list".to_owned()));
    assert!(calls.contains(&"mcpforge/does-not-exist".to_owned()));
}

#[tokio::test]
async fn sloppy_error_handling_fails_error_path() {
    let (result, _) = run(Behavior {
        sloppy_errors: true,
        ..Behavior::default()
    })
    .await;

    assert_eq!(failed_checks(&result), vec![ERROR_PATH]);
    let detail = &result.failures()[0].detail;
    assert!(detail.contains("malformed JSON"), "{detail}");
    assert!(detail.contains("returned a result"), "{detail}");
}

#[tokio::test]
async fn server_error_on_liveness_is_a_failure() {
    let (result, _) = run(Behavior {
        liveness_status: StatusCode::SERVICE_UNAVAILABLE,
        ..Behavior::default()
    })
    .await;

    assert_eq!(failed_checks(&result), vec![LIVENESS]);
    assert!(result.failures()[0].detail.contains("503"));
}

#[tokio::test]
async fn hanging_tool_fails_its_check_within_budget() {
    let config = HarnessConfig {
        check_timeout: Duration::from_millis(300),
        ..HarnessConfig::default()
    };
    let (result, _) = run_with(
        Behavior {
            slow_tools: &["forecast"],
            ..Behavior::default()
        },
        config,
        BUDGET,
    )
    .await;

    assert_eq!(failed_checks(&result), vec!["invoke:forecast"]);
    assert!(result.failures()[0].detail.contains("no answer within"));
}

#[tokio::test]
async fn spent_budget_reports_remaining_checks_as_failures() {
    let names = ["a", "b", "c", "d", "e", "f"];
    let tools = Value::Array(
        names
            .iter()
            .map(|n| json!({"name": n, "inputSchema": {"type": "object"}}))
            .collect(),
    );
    let config = HarnessConfig {
        check_timeout: Duration::from_millis(300),
        ..HarnessConfig::default()
    };
    let started = std::time::Instant::now();
    let (result, _) = run_with(
        Behavior {
            tool_pages: vec![tools],
            slow_tools: &["a", "b", "c", "d", "e", "f"],
            ..Behavior::default()
        },
        config,
        Duration::from_millis(800),
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert_eq!(
        failed_checks(&result),
        vec![
            "invoke:a",
            "invoke:b",
            "invoke:c",
            "invoke:d",
            "invoke:e",
            "invoke:f",
            ERROR_PATH
        ]
    );
    let skipped = result
        .failures()
        .iter()
        .filter(|f| f.detail.contains("test budget exhausted"))
        .count();
    assert!(skipped >= 3, "{:?}", result.failures());
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let harness = ProtocolHarness::http(HarnessConfig::default()).unwrap();
    let err = harness
        .run_tests(&format!("http://{addr}/mcp"), BUDGET)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Unreachable { .. }), "{err:?}");
}

#[tokio::test]
async fn non_http_url_is_rejected() {
    let harness = ProtocolHarness::http(HarnessConfig::default()).unwrap();
    let err = harness.run_tests("file:///etc/passwd", BUDGET).await.unwrap_err();
    assert!(matches!(err, HarnessError::InvalidUrl { .. }));
}
