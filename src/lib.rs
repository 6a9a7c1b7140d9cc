//! Core library for Parrot, a LINE Messaging API echo bot.  This module
//! wires together configuration, the event dispatch table and the HTTP
//! handlers for the health probe, the webhook and the metrics exposition.

pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod messaging;
pub mod signature;
pub mod startup;

pub use config::{load_config, BotConfig, LoadedConfig};
pub use error::{ReplyError, StartupError, WebhookError};
pub use startup::{Credentials, EnvironmentReport};

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::events::WebhookPayload;
use crate::handlers::{DispatchSummary, EchoHandler, EventDispatcher};
use crate::messaging::MessagingClient;
use crate::startup::{ACCESS_TOKEN_ENV, CHANNEL_SECRET_ENV};

/// Process-wide counters exposed on `/metrics`.
#[derive(Debug)]
pub struct Metrics {
    pub webhook_requests_total: AtomicU64,
    pub signature_rejections_total: AtomicU64,
    pub events_handled_total: AtomicU64,
    pub events_ignored_total: AtomicU64,
    pub reply_failures_total: AtomicU64,
    process_start_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            webhook_requests_total: AtomicU64::new(0),
            signature_rejections_total: AtomicU64::new(0),
            events_handled_total: AtomicU64::new(0),
            events_ignored_total: AtomicU64::new(0),
            reply_failures_total: AtomicU64::new(0),
            process_start_instant: Instant::now(),
        }
    }
}

impl Metrics {
    fn record_dispatch(&self, summary: &DispatchSummary) {
        self.events_handled_total
            .fetch_add(summary.handled, Ordering::Relaxed);
        self.events_ignored_total
            .fetch_add(summary.ignored, Ordering::Relaxed);
        self.reply_failures_total
            .fetch_add(summary.failed, Ordering::Relaxed);
    }
}

/// Shared application state. Everything in it is immutable after startup
/// apart from the atomic counters.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BotConfig>,
    channel_secret: Arc<SecretString>,
    pub dispatcher: Arc<EventDispatcher>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Assemble state around an already-built dispatch table.
    pub fn new(config: BotConfig, channel_secret: SecretString, dispatcher: EventDispatcher) -> Self {
        Self {
            config: Arc::new(config),
            channel_secret: Arc::new(channel_secret),
            dispatcher: Arc::new(dispatcher),
            metrics: Arc::new(Metrics::default()),
        }
    }
}

/// Build state with the production dispatch table: text messages go to the
/// echo handler, every other event kind is ignored.
pub fn build_state(config: BotConfig, credentials: Credentials) -> Result<AppState, StartupError> {
    let Credentials {
        channel_secret,
        access_token,
    } = credentials;

    let client = MessagingClient::new(
        &config.line.api_base_url,
        access_token,
        config.line.reply_timeout_ms,
    )
    .map_err(StartupError::HttpClient)?;

    let dispatcher =
        EventDispatcher::new().register(EchoHandler::key(), Arc::new(EchoHandler::new(client)));

    Ok(AppState::new(config, channel_secret, dispatcher))
}

/// Build the Axum router and attach handlers.  The router holds a copy
/// of the `AppState` for each invocation.
pub fn app(state: AppState) -> Router {
    let webhook_path = state.config.line.webhook_path.clone();
    Router::new()
        .route("/", get(health_handler))
        .route(&webhook_path, post(webhook_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn env_configured(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Liveness probe. Credential flags reflect the environment at request time.
async fn health_handler(State(state): State<AppState>) -> axum::response::Response {
    let cfg = &state.config;
    let json = serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Local::now().to_rfc3339(),
        "bot": {
            "name": cfg.bot.name,
            "version": cfg.bot.version,
            "description": cfg.bot.description.as_deref().unwrap_or(""),
        },
        "server": {
            "host": cfg.server.host,
            "port": cfg.server.port,
        },
        "endpoints": {
            "health": "/",
            "webhook": cfg.line.webhook_path,
        },
        "environment": {
            "channel_secret_configured": env_configured(CHANNEL_SECRET_ENV),
            "access_token_configured": env_configured(ACCESS_TOKEN_ENV),
        }
    });
    (StatusCode::OK, Json(json)).into_response()
}

fn signature_header(headers: &HeaderMap) -> Result<&str, WebhookError> {
    headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(WebhookError::MissingSignature)
}

/// Handler for `POST <webhook_path>`.  Verifies the signature over the raw
/// body, then dispatches events.  Once the payload is accepted the platform
/// always gets 200, whatever the handlers did.
async fn webhook_handler(State(state): State<AppState>, request: Request) -> axum::response::Response {
    state
        .metrics
        .webhook_requests_total
        .fetch_add(1, Ordering::Relaxed);
    match process_webhook(&state, request).await {
        Ok(summary) => {
            tracing::debug!(
                handled = summary.handled,
                ignored = summary.ignored,
                failed = summary.failed,
                "webhook processed"
            );
            (StatusCode::OK, "OK").into_response()
        }
        Err(err) => {
            match &err {
                WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                    state
                        .metrics
                        .signature_rejections_total
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, "rejected webhook delivery; check the channel secret");
                }
                WebhookError::MalformedPayload(_) | WebhookError::BodyTooLarge => {
                    tracing::warn!(error = %err, "rejected webhook delivery");
                }
                WebhookError::Dispatch(_) => {
                    tracing::error!(error = %err, "webhook dispatch crashed");
                }
            }
            err.into_response()
        }
    }
}

async fn process_webhook(
    state: &AppState,
    request: Request,
) -> Result<DispatchSummary, WebhookError> {
    let (parts, body) = request.into_parts();
    let sig = signature_header(&parts.headers)?;

    // Any buffering failure is reported as an oversized body; the other
    // causes (client disconnects) never see the response anyway.
    let body = axum::body::to_bytes(body, state.config.server.max_body_bytes)
        .await
        .map_err(|_| WebhookError::BodyTooLarge)?;
    tracing::debug!(bytes = body.len(), "webhook body received");

    if !signature::verify(state.channel_secret.expose_secret(), &body, sig) {
        return Err(WebhookError::InvalidSignature);
    }

    let payload = WebhookPayload::from_slice(&body).map_err(WebhookError::MalformedPayload)?;
    if payload.events.is_empty() {
        return Ok(DispatchSummary::default());
    }

    // Dispatch runs on its own task so a panicking handler surfaces as a
    // 500 instead of tearing down the connection.
    let dispatcher = state.dispatcher.clone();
    let summary = tokio::spawn(async move { dispatcher.dispatch(&payload.events).await })
        .await
        .map_err(|err| WebhookError::Dispatch(err.to_string()))?;
    state.metrics.record_dispatch(&summary);
    Ok(summary)
}

/// Prometheus-style metrics exposition. Text format with simple counters.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    use std::fmt::Write as _;
    let m = &state.metrics;
    let counters: [(&str, &str, &AtomicU64); 5] = [
        (
            "parrot_webhook_requests_total",
            "Webhook deliveries received",
            &m.webhook_requests_total,
        ),
        (
            "parrot_signature_rejections_total",
            "Deliveries rejected for a missing or invalid signature",
            &m.signature_rejections_total,
        ),
        (
            "parrot_events_handled_total",
            "Events processed by a registered handler",
            &m.events_handled_total,
        ),
        (
            "parrot_events_ignored_total",
            "Events with no registered handler",
            &m.events_ignored_total,
        ),
        (
            "parrot_reply_failures_total",
            "Handler failures, including failed reply calls",
            &m.reply_failures_total,
        ),
    ];
    let mut buf = String::new();
    for (name, help, value) in counters {
        writeln!(&mut buf, "# HELP {} {}", name, help).ok();
        writeln!(&mut buf, "# TYPE {} counter", name).ok();
        writeln!(&mut buf, "{} {}", name, value.load(Ordering::Relaxed)).ok();
    }
    writeln!(
        &mut buf,
        "# HELP parrot_build_info Build information\n# TYPE parrot_build_info gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "parrot_build_info{{version=\"{}\",bot=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION"),
        state.config.bot.name
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP parrot_process_uptime_seconds Process uptime seconds\n# TYPE parrot_process_uptime_seconds gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "parrot_process_uptime_seconds {}",
        m.process_start_instant.elapsed().as_secs_f64()
    )
    .ok();
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buf,
    )
        .into_response()
}
