#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parrot::{app, build_state, AppState, BotConfig, Credentials};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const SECRET: &str = "test_channel_secret";
pub const TOKEN: &str = "test_access_token";

/// Sets the two LINE credential variables for a test and puts the previous
/// values back on drop.
pub struct CredentialEnv {
    saved: Vec<(&'static str, Option<String>)>,
}

impl CredentialEnv {
    /// `None` unsets the variable.
    pub fn apply(secret: Option<&str>, token: Option<&str>) -> Self {
        let wanted = [
            ("LINE_CHANNEL_SECRET", secret),
            ("LINE_CHANNEL_ACCESS_TOKEN", token),
        ];
        let saved = wanted
            .iter()
            .map(|(name, _)| (*name, std::env::var(name).ok()))
            .collect();
        for (name, value) in wanted {
            match value {
                Some(v) => std::env::set_var(name, v),
                None => std::env::remove_var(name),
            }
        }
        Self { saved }
    }
}

impl Drop for CredentialEnv {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..) {
            match value {
                Some(v) => std::env::set_var(name, v),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Collects formatted log output so a test can assert on it.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Install an error-level subscriber for the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// One call received by the stand-in reply endpoint.
#[derive(Debug, Clone)]
pub struct RecordedReply {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

impl RecordedReply {
    pub fn reply_token(&self) -> Option<&str> {
        self.body.get("replyToken").and_then(|v| v.as_str())
    }

    pub fn texts(&self) -> Vec<String> {
        self.body
            .get("messages")
            .and_then(|v| v.as_array())
            .map(|msgs| {
                msgs.iter()
                    .filter_map(|m| m.get("text").and_then(|t| t.as_str()))
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct MockState {
    calls: Arc<Mutex<Vec<RecordedReply>>>,
    status: StatusCode,
}

/// Local stand-in for the Messaging API reply endpoint.
pub struct MockLineApi {
    pub base_url: String,
    calls: Arc<Mutex<Vec<RecordedReply>>>,
    handle: JoinHandle<()>,
}

impl MockLineApi {
    pub async fn start() -> Self {
        Self::start_with_status(StatusCode::OK).await
    }

    pub async fn start_with_status(status: StatusCode) -> Self {
        async fn reply(
            State(state): State<MockState>,
            headers: HeaderMap,
            Json(body): Json<serde_json::Value>,
        ) -> (StatusCode, Json<serde_json::Value>) {
            let authorization = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            state.calls.lock().unwrap().push(RecordedReply {
                authorization,
                body,
            });
            if state.status.is_success() {
                (state.status, Json(serde_json::json!({})))
            } else {
                (
                    state.status,
                    Json(serde_json::json!({"message": "Invalid reply token"})),
                )
            }
        }

        let calls = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route("/v2/bot/message/reply", post(reply))
            .with_state(MockState {
                calls: calls.clone(),
                status,
            });
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            calls,
            handle,
        }
    }

    pub fn calls(&self) -> Vec<RecordedReply> {
        self.calls.lock().unwrap().clone()
    }
}

impl Drop for MockLineApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A base URL nothing listens on.
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn test_config(api_base_url: &str) -> BotConfig {
    let mut cfg = BotConfig::default();
    cfg.bot.name = "Parrot Test".into();
    cfg.line.api_base_url = api_base_url.to_string();
    cfg.line.reply_timeout_ms = Some(2_000);
    cfg
}

pub fn test_state(api_base_url: &str) -> AppState {
    build_state(test_config(api_base_url), Credentials::new(SECRET, TOKEN)).unwrap()
}

pub async fn spawn_app(state: AppState) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

pub fn text_event(reply_token: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "message",
        "mode": "active",
        "timestamp": 1700000000000i64,
        "source": {"type": "user", "userId": "U0123456789abcdef"},
        "webhookEventId": format!("evt-{}", reply_token),
        "deliveryContext": {"isRedelivery": false},
        "replyToken": reply_token,
        "message": {"id": "1", "type": "text", "text": text}
    })
}

pub fn delivery(events: Vec<serde_json::Value>) -> String {
    serde_json::json!({"destination": "Ubot", "events": events}).to_string()
}

pub async fn post_signed(url: &str, body: &str, secret: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .header("x-line-signature", parrot::signature::sign(secret, body.as_bytes()))
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}
