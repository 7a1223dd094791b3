//! HTTP relay server for the operator UI.
//!
//! Exposes the WhatsApp session readiness check, the streaming batch-send
//! endpoint, and the SMS endpoints. Batch sends stream per-recipient
//! progress back as server-sent events.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use simcha_channels::pace::Pacer;
use simcha_channels::sms::{dispatch::send_bulk, SmsGateway};
use simcha_channels::whatsapp::{
    dispatch::{relay_batch, RelayEvent},
    Messenger,
};
use simcha_core::invite::{BatchReport, Invitation, Progress, Recipient};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub messenger: Arc<dyn Messenger>,
    pub pacer: Arc<dyn Pacer>,
    pub sms: Option<Arc<SmsGateway>>,
    pub base_url: String,
    pub message_template: String,
    pub delay_ms: (u64, u64),
    /// Serializes batch sends. One authenticated session cannot safely
    /// interleave two batches, so a second `/send` waits its turn.
    pub send_lock: Arc<Mutex<()>>,
}

/// Body of `POST /send` and `POST /sms/send`.
#[derive(Debug, Deserialize)]
struct SendRequest {
    users: Vec<Recipient>,
}

/// Events streamed by the SMS batch endpoint.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SmsEvent {
    Progress {
        current: usize,
        total: usize,
        percentage: u32,
    },
    Complete {
        results: BatchReport,
    },
    Error {
        error: String,
    },
}

/// Serialize one event into an SSE `data:` frame. A serialization failure
/// degrades to the stream's typed error event rather than killing the
/// stream.
fn sse_frame<T: Serialize>(ev: &T, on_err: fn(String) -> T) -> Event {
    Event::default().json_data(ev).unwrap_or_else(|e| {
        let fallback = on_err(format!("event serialization failed: {e}"));
        Event::default().json_data(&fallback).unwrap_or_else(|_| {
            Event::default()
                .data(json!({"type": "error", "error": "event serialization failed"}).to_string())
        })
    })
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

/// `GET /status` — whether the WhatsApp session can send right now.
async fn status(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({ "ready": state.messenger.is_ready().await }))
}

/// `POST /send` — relay a batch over WhatsApp, streaming progress as SSE.
async fn send(
    State(state): State<ApiState>,
    body: Result<Json<SendRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("invalid request: {e}")),
    };

    if !state.messenger.is_ready().await {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "WhatsApp session not ready",
        );
    }

    let invitations: Vec<Invitation> = request
        .users
        .into_iter()
        .map(|user| Invitation::new(&state.base_url, &state.message_template, user))
        .collect();

    info!("whatsapp batch accepted: {} recipients", invitations.len());

    let (tx, rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();
    let messenger = state.messenger.clone();
    let pacer = state.pacer.clone();
    let delay_ms = state.delay_ms;
    let send_lock = state.send_lock.clone();

    tokio::spawn(async move {
        let _guard = send_lock.lock().await;
        relay_batch(
            messenger.as_ref(),
            pacer.as_ref(),
            &invitations,
            delay_ms,
            &cancel,
            &tx,
        )
        .await;
    });

    let stream = ReceiverStream::new(rx)
        .map(|ev| Ok::<_, Infallible>(sse_frame(&ev, |error| RelayEvent::Error { error })));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// `POST /sms/send` — dispatch a batch over the SMS gateway, streaming
/// progress as SSE.
async fn sms_send(
    State(state): State<ApiState>,
    body: Result<Json<SendRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("invalid request: {e}")),
    };

    let Some(gateway) = state.sms.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "SMS gateway not configured");
    };

    let invitations: Vec<Invitation> = request
        .users
        .into_iter()
        .map(|user| Invitation::new(&state.base_url, &state.message_template, user))
        .collect();

    info!("sms batch accepted: {} recipients", invitations.len());

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    tokio::spawn(async move {
        let progress_tx = tx.clone();
        let report = send_bulk(&gateway, &invitations, &cancel, |p: Progress| {
            let _ = progress_tx.send(SmsEvent::Progress {
                current: p.current,
                total: p.total,
                percentage: p.percentage,
            });
        })
        .await;
        let _ = tx.send(SmsEvent::Complete { results: report });
    });

    let stream = UnboundedReceiverStream::new(rx)
        .map(|ev| Ok::<_, Infallible>(sse_frame(&ev, |error| SmsEvent::Error { error })));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// `GET /sms/balance` — remaining message balance for the account.
async fn sms_balance(State(state): State<ApiState>) -> Response {
    let Some(gateway) = state.sms.clone() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "SMS gateway not configured");
    };

    match gateway.balance().await {
        Ok(balance) => Json(json!({ "balance": balance })).into_response(),
        Err(e) => {
            error!("sms balance query failed: {e}");
            error_response(StatusCode::BAD_GATEWAY, &format!("balance query failed: {e}"))
        }
    }
}

/// Build the axum router with shared state.
fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/send", post(send))
        .route("/sms/send", post(sms_send))
        .route("/sms/balance", get(sms_balance))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Start the relay server. Runs until the process exits.
pub async fn serve(state: ApiState, host: &str, port: u16) {
    let app = build_router(state);
    let addr = format!("{host}:{port}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("relay server failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("relay server listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("relay server error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use simcha_channels::sms::Transport;
    use simcha_core::config::SmsConfig;
    use simcha_core::error::SimchaError;
    use tower::ServiceExt;

    /// Messenger double with a fixed readiness flag; every resolvable number
    /// is delivered, numbers in `unknown` have no account.
    struct MockMessenger {
        ready: bool,
        unknown: Vec<String>,
    }

    #[async_trait]
    impl Messenger for MockMessenger {
        async fn is_ready(&self) -> bool {
            self.ready
        }

        async fn resolve(&self, phone_number: &str) -> Result<Option<String>, SimchaError> {
            if self.unknown.iter().any(|p| p == phone_number) {
                return Ok(None);
            }
            Ok(simcha_core::phone::to_international(phone_number)
                .map(|d| format!("{d}@s.whatsapp.net")))
        }

        async fn send_text(&self, _address: &str, _text: &str) -> Result<(), SimchaError> {
            Ok(())
        }
    }

    /// Pacer double that returns immediately.
    struct InstantPacer;

    #[async_trait]
    impl Pacer for InstantPacer {
        async fn pause(&self, _min_ms: u64, _max_ms: u64) {}
    }

    /// Transport double answering every gateway call with a fixed status.
    struct FixedTransport(i64);

    #[async_trait]
    impl Transport for FixedTransport {
        async fn post_json(&self, _url: &str, _body: &Value) -> Result<Value, SimchaError> {
            Ok(json!({ "status": self.0, "message": "" }))
        }
    }

    fn sms_gateway(status: i64) -> Arc<SmsGateway> {
        let config = SmsConfig {
            enabled: true,
            key: "key".into(),
            user: "user".into(),
            pass: "pass".into(),
            sender: "Dana&Yossi".into(),
        };
        Arc::new(SmsGateway::with_transport(config, Box::new(FixedTransport(status))).unwrap())
    }

    fn test_state(ready: bool, unknown: Vec<String>, sms: Option<Arc<SmsGateway>>) -> ApiState {
        ApiState {
            messenger: Arc::new(MockMessenger { ready, unknown }),
            pacer: Arc::new(InstantPacer),
            sms,
            base_url: "https://w.example.com".to_string(),
            message_template: "{name}: {link}".to_string(),
            delay_ms: (3000, 8000),
            send_lock: Arc::new(Mutex::new(())),
        }
    }

    fn send_request(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::http::Response<Body>) -> Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    /// Collect an SSE body and parse each `data:` frame as JSON.
    async fn sse_frames(resp: axum::http::Response<Body>) -> Vec<Value> {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        text.split("\n\n")
            .filter_map(|chunk| chunk.trim().strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    const TWO_USERS: &str = r#"{"users":[
        {"id":"g1","name":"Dana","phoneNumber":"0501234567"},
        {"id":"g2","name":"Yossi","phoneNumber":"0521234567"}
    ]}"#;

    #[tokio::test]
    async fn test_status_ready() {
        let app = build_router(test_state(true, vec![], None));
        let req = Request::get("/status").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["ready"], true);
    }

    #[tokio::test]
    async fn test_status_not_ready() {
        let app = build_router(test_state(false, vec![], None));
        let req = Request::get("/status").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(body_json(resp).await["ready"], false);
    }

    #[tokio::test]
    async fn test_send_not_ready_returns_503() {
        let app = build_router(test_state(false, vec![], None));
        let resp = app.oneshot(send_request("/send", TWO_USERS)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("not ready"));
    }

    #[tokio::test]
    async fn test_send_invalid_json_returns_400() {
        let app = build_router(test_state(true, vec![], None));
        let resp = app
            .oneshot(send_request("/send", "not json at all"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_streams_progress_then_complete() {
        let app = build_router(test_state(true, vec![], None));
        let resp = app.oneshot(send_request("/send", TWO_USERS)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );

        let frames = sse_frames(resp).await;
        assert_eq!(frames.len(), 3, "two progress frames plus complete");

        assert_eq!(frames[0]["type"], "progress");
        assert_eq!(frames[0]["current"], 1);
        assert_eq!(frames[0]["total"], 2);
        assert_eq!(frames[0]["status"], "success");
        assert_eq!(frames[0]["user"], "Dana");

        assert_eq!(frames[1]["current"], 2);

        assert_eq!(frames[2]["type"], "complete");
        assert_eq!(frames[2]["results"]["success"].as_array().unwrap().len(), 2);
        assert_eq!(frames[2]["results"]["failed"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_send_reports_missing_account_in_stream() {
        let app = build_router(test_state(true, vec!["0501234567".to_string()], None));
        let resp = app.oneshot(send_request("/send", TWO_USERS)).await.unwrap();

        let frames = sse_frames(resp).await;
        assert_eq!(frames[0]["status"], "failed");
        assert_eq!(frames[0]["error"], "Not on WhatsApp");
        assert_eq!(frames[1]["status"], "success");

        let results = &frames[2]["results"];
        assert_eq!(results["success"].as_array().unwrap().len(), 1);
        assert_eq!(results["failed"][0]["user"]["name"], "Dana");
    }

    #[tokio::test]
    async fn test_sms_send_unconfigured_returns_503() {
        let app = build_router(test_state(true, vec![], None));
        let resp = app
            .oneshot(send_request("/sms/send", TWO_USERS))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn test_sms_send_streams_progress_then_complete() {
        let app = build_router(test_state(true, vec![], Some(sms_gateway(1))));
        let resp = app
            .oneshot(send_request("/sms/send", TWO_USERS))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let frames = sse_frames(resp).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["type"], "progress");
        assert_eq!(frames[0]["percentage"], 50);
        assert_eq!(frames[1]["percentage"], 100);
        assert_eq!(frames[2]["type"], "complete");
        assert_eq!(frames[2]["results"]["total"], 2);
        assert_eq!(
            frames[2]["results"]["successful"].as_array().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_sms_send_gateway_failure_lands_in_complete() {
        // Gateway answers -4 (insufficient balance) for every call.
        let app = build_router(test_state(true, vec![], Some(sms_gateway(-4))));
        let resp = app
            .oneshot(send_request("/sms/send", TWO_USERS))
            .await
            .unwrap();

        let frames = sse_frames(resp).await;
        let results = &frames[2]["results"];
        assert_eq!(results["successful"].as_array().unwrap().len(), 0);
        assert_eq!(results["failed"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sms_balance() {
        let app = build_router(test_state(true, vec![], Some(sms_gateway(42))));
        let req = Request::get("/sms/balance").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["balance"], 42);
    }

    #[tokio::test]
    async fn test_sms_balance_unconfigured_returns_503() {
        let app = build_router(test_state(true, vec![], None));
        let req = Request::get("/sms/balance").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_send_get_method_returns_405() {
        let app = build_router(test_state(true, vec![], None));
        let req = Request::get("/send").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
