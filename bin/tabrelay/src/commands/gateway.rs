use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tabrelay_core::{Config, Error, Paths, TaskRequest};
use tabrelay_dispatch::{Dispatcher, DispatcherStats};
use tabrelay_storage::TabStore;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Shared state passed to HTTP handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct GatewayState {
    dispatcher: Dispatcher,
    poll_interval_secs: u64,
    started_at: Instant,
}

// ---------------------------------------------------------------------------
// HTTP request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportResultRequest {
    task_id: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportErrorRequest {
    task_id: String,
    #[serde(default)]
    error: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    poll_interval_secs: u64,
    #[serde(flatten)]
    stats: DispatcherStats,
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Execution(_) => StatusCode::BAD_GATEWAY,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Shutdown(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: Error) -> Response {
    (
        status_for(&error),
        Json(json!({
            "success": false,
            "error": error.to_string(),
            "kind": error.kind(),
        })),
    )
        .into_response()
}

/// Unwrap a JSON body, turning extractor rejections (bad syntax, wrong content type)
/// into the same validation payload as every other bad request.
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, Response> {
    body.map(|Json(value)| value).map_err(|rejection| {
        error_response(Error::Validation(format!(
            "invalid JSON body: {}",
            rejection.body_text()
        )))
    })
}

fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, Response> {
    serde_json::from_value(body)
        .map_err(|e| error_response(Error::Validation(format!("invalid request body: {}", e))))
}

// ---------------------------------------------------------------------------
// Task endpoints
// ---------------------------------------------------------------------------

/// POST /v1/tasks: submit a task and hold the request until the executor reports.
async fn handle_submit_task(
    State(state): State<GatewayState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let request = match TaskRequest::from_value(&body) {
        Ok(r) => r,
        Err(e) => return error_response(e),
    };
    match state.dispatcher.submit_task(request).await {
        Ok((task, result)) => Json(json!({
            "success": true,
            "task": task,
            "result": result,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/tasks/next: next queued task, or `{}`.
async fn handle_next_task(State(state): State<GatewayState>) -> impl IntoResponse {
    match state.dispatcher.pull_next_task().await {
        Some(task) => Json(serde_json::to_value(task).unwrap_or_else(|_| json!({}))),
        None => Json(json!({})),
    }
}

/// POST /v1/tasks/result: executor reports success, or an ambient tab event.
async fn handle_task_result(
    State(state): State<GatewayState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let req: ReportResultRequest = match parse_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    state.dispatcher.report_success(&req.task_id, req.data).await;
    Json(json!({ "success": true })).into_response()
}

/// POST /v1/tasks/error: executor reports a failed command.
async fn handle_task_error(
    State(state): State<GatewayState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let req: ReportErrorRequest = match parse_body(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let message = match &req.error {
        Value::String(s) => s.clone(),
        Value::Null => "executor reported an error without a message".to_string(),
        other => other.to_string(),
    };
    state.dispatcher.report_failure(&req.task_id, &message).await;
    Json(json!({ "success": true })).into_response()
}

// ---------------------------------------------------------------------------
// Tab endpoints
// ---------------------------------------------------------------------------

/// POST /v1/tabs/sync: replace tracked state with the executor's full tab list.
async fn handle_tabs_sync(
    State(state): State<GatewayState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let tabs = body.get("tabs").cloned().unwrap_or(Value::Null);
    match state.dispatcher.resync(&tabs).await {
        Ok(synced) => Json(json!({ "success": true, "syncedTabs": synced })).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/tabs
async fn handle_tabs_list(State(state): State<GatewayState>) -> impl IntoResponse {
    let tabs = state.dispatcher.list_tabs().await;
    Json(json!({ "success": true, "tabs": tabs }))
}

async fn handle_health(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        poll_interval_secs: state.poll_interval_secs,
        stats: state.dispatcher.stats().await,
    })
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .gateway
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return CorsLayer::permissive().allow_credentials(false);
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

fn build_router(dispatcher: Dispatcher, config: &Config) -> Router {
    let state = GatewayState {
        dispatcher,
        poll_interval_secs: config.dispatch.poll_interval_secs,
        started_at: Instant::now(),
    };
    Router::new()
        .route("/v1/health", get(handle_health))
        .route("/v1/tasks", post(handle_submit_task))
        .route("/v1/tasks/next", get(handle_next_task))
        .route("/v1/tasks/result", post(handle_task_result))
        .route("/v1/tasks/error", post(handle_task_error))
        .route("/v1/tabs", get(handle_tabs_list))
        .route("/v1/tabs/sync", post(handle_tabs_sync))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
        .with_state(state)
}

/// Resolve on Ctrl+C, or on SIGTERM where the platform has it.
async fn shutdown_signal() -> anyhow::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                Ok("SIGINT")
            }
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

pub async fn run(cli_host: Option<String>, cli_port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;

    let host = cli_host.unwrap_or_else(|| config.gateway.host.clone());
    let port = cli_port.unwrap_or(config.gateway.port);

    let store = TabStore::open(config.snapshot_path(&paths)).await?;
    let dispatcher = Dispatcher::from_config(&config.dispatch, store);
    let app = build_router(dispatcher.clone(), &config);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(
        addr = %bind_addr,
        task_timeout_secs = config.dispatch.task_timeout_secs,
        poll_interval_secs = config.dispatch.poll_interval_secs,
        "Gateway listening"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let http_shutdown_rx = shutdown_tx.subscribe();
    let mut http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = http_shutdown_rx;
                let _ = rx.recv().await;
            })
            .await
            .ok();
    });

    println!();
    println!("tabrelay gateway");
    println!("  Listening:    http://{}", bind_addr);
    println!("  Snapshot:     {}", config.snapshot_path(&paths).display());
    println!("  Task timeout: {}s", config.dispatch.task_timeout_secs);
    println!();
    println!("Press Ctrl+C (or send SIGTERM) to stop.");

    let signal = shutdown_signal().await?;
    info!(signal, "Shutdown signal received, failing outstanding waits...");

    let _ = shutdown_tx.send(());
    // Blocked submitters hold their connections open; release them before draining.
    dispatcher.shutdown().await;

    if tokio::time::timeout(GRACEFUL_TIMEOUT, &mut http_handle).await.is_err() {
        warn!("HTTP server did not drain in time, aborting");
        http_handle.abort();
    }
    // Anything that slipped in while draining.
    dispatcher.shutdown().await;

    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app_with_timeout(timeout: Duration) -> (Router, Dispatcher) {
        let dispatcher = Dispatcher::new(TabStore::in_memory(), timeout);
        (build_router(dispatcher.clone(), &Config::default()), dispatcher)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_pull_on_empty_queue_returns_empty_object() {
        let (app, _) = app_with_timeout(Duration::from_secs(30));
        let (status, body) = call(&app, "GET", "/v1/tasks/next", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_invalid_submission_is_400() {
        let (app, dispatcher) = app_with_timeout(Duration::from_secs(30));
        let (status, body) = call(&app, "POST", "/v1/tasks", Some(json!({"command": "openTab"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "validation");
        assert_eq!(dispatcher.stats().await.queued_tasks, 0);
    }

    #[tokio::test]
    async fn test_submit_blocks_until_executor_reports() {
        let (app, dispatcher) = app_with_timeout(Duration::from_secs(30));
        let submit_app = app.clone();
        let submit = tokio::spawn(async move {
            call(
                &submit_app,
                "POST",
                "/v1/tasks",
                Some(json!({"command": "openTab", "url": "https://example.com"})),
            )
            .await
        });

        let task = loop {
            let (_, body) = call(&app, "GET", "/v1/tasks/next", None).await;
            if body.get("taskId").is_some() {
                break body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(task["command"], "openTab");

        let (status, _) = call(
            &app,
            "POST",
            "/v1/tasks/result",
            Some(json!({"taskId": task["taskId"], "data": {"tabId": 5, "windowId": 1, "url": "https://example.com"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = submit.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["task"]["taskId"], task["taskId"]);
        assert_eq!(body["result"]["tabId"], 5);

        let (_, tabs) = call(&app, "GET", "/v1/tabs", None).await;
        assert_eq!(tabs["tabs"][0]["tabId"], 5);
        assert_eq!(dispatcher.stats().await.pending_waits, 0);
    }

    #[tokio::test]
    async fn test_executor_error_and_timeout_statuses() {
        let (app, _) = app_with_timeout(Duration::from_millis(50));

        let (status, body) = call(&app, "POST", "/v1/tasks", Some(json!({"command": "closeTab", "tabId": 3}))).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["kind"], "timeout");

        let (app, _) = app_with_timeout(Duration::from_secs(30));
        let submit_app = app.clone();
        let submit = tokio::spawn(async move {
            call(&submit_app, "POST", "/v1/tasks", Some(json!({"taskId": "c1", "command": "closeTab", "tabId": 3}))).await
        });
        loop {
            let (_, body) = call(&app, "GET", "/v1/tasks/next", None).await;
            if body.get("taskId").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        call(&app, "POST", "/v1/tasks/error", Some(json!({"taskId": "c1", "error": "No tab with id: 3."}))).await;

        let (status, body) = submit.await.unwrap();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("No tab with id: 3."));
    }

    #[tokio::test]
    async fn test_resync_and_list() {
        let (app, _) = app_with_timeout(Duration::from_secs(30));
        let (status, body) = call(
            &app,
            "POST",
            "/v1/tabs/sync",
            Some(json!({"tabs": [{"tabId": 1, "windowId": 1, "url": "a"}, {"tabId": 2, "windowId": 1, "url": "b"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["syncedTabs"], 2);

        let (status, _) = call(&app, "POST", "/v1/tabs/sync", Some(json!({"tabs": "nope"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(&app, "GET", "/v1/tabs", None).await;
        assert_eq!(body["tabs"].as_array().unwrap().len(), 2);

        let (_, health) = call(&app, "GET", "/v1/health", None).await;
        assert_eq!(health["trackedTabs"], 2);
        assert_eq!(health["trackedWindows"], 1);
        assert_eq!(health["pollIntervalSecs"], 3);
    }

    #[tokio::test]
    async fn test_report_without_task_id_is_rejected() {
        let (app, _) = app_with_timeout(Duration::from_secs(30));
        let (status, body) = call(&app, "POST", "/v1/tasks/result", Some(json!({"data": {}}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    async fn call_raw(app: &Router, uri: &str, content_type: Option<&str>, raw: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        let req = builder.body(Body::from(raw.to_string())).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_malformed_json_gets_validation_payload() {
        let (app, dispatcher) = app_with_timeout(Duration::from_secs(30));

        let cases = [
            ("/v1/tasks", Some("application/json"), "{not json"),
            ("/v1/tasks", None, r#"{"command": "openTab", "url": "https://a"}"#),
            ("/v1/tasks/result", Some("application/json"), "{\"taskId\": "),
            ("/v1/tasks/error", Some("text/plain"), "boom"),
            ("/v1/tabs/sync", Some("application/json"), "[1,"),
        ];
        for (uri, content_type, raw) in cases {
            let (status, body) = call_raw(&app, uri, content_type, raw).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{} {:?}", uri, content_type);
            assert_eq!(body["success"], false, "{}", uri);
            assert_eq!(body["kind"], "validation", "{}", uri);
            assert!(body["error"].as_str().unwrap().contains("invalid JSON body"));
        }
        assert_eq!(dispatcher.stats().await.queued_tasks, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_resolves_shutdown_signal() {
        use tokio::signal::unix::{signal, SignalKind};

        // Keep a handler installed so the signal never falls through to the default action.
        let _installed = signal(SignalKind::terminate()).unwrap();
        let waiter = tokio::spawn(shutdown_signal());
        let pid = std::process::id().to_string();

        let delivered = tokio::time::timeout(Duration::from_secs(5), async {
            while !waiter.is_finished() {
                let _ = std::process::Command::new("kill").args(["-TERM", &pid]).status();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert!(delivered.is_ok());
        assert_eq!(waiter.await.unwrap().unwrap(), "SIGTERM");
    }
}
