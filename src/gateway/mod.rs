//! Axum-based HTTP gateway for Teamwork webhooks, with body limits and timeouts.
//!
//! - Request body size limit (64KB max)
//! - Request timeout (30s floor, raised to cover a webhook's outbound calls)
//! - Optional shared secret on `/webhook/*` (`X-Webhook-Secret`)
//! - Read-only listing of stored events and Prometheus metrics

pub mod security;

use crate::config::Config;
use crate::events::EventKind;
use crate::mention::MentionFilter;
use crate::observability::{Metrics, PROMETHEUS_CONTENT_TYPE};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::relay::{ActionRelay, HttpActionRelay};
use crate::responder::{RelayProject, Responder};
use crate::store::{EventStore, SqliteEventStore};
use crate::teamwork::{SourceSystem, TeamworkClient};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path as AxumPath, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use security::{constant_time_eq, hash_webhook_secret, is_public_bind};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Headroom over the outbound budget for the store write and the response.
pub const TIMEOUT_MARGIN_SECS: u64 = 5;
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 500;
const PROJECTS_EVENT_HEADER: &str = "X-Projects-Event";
const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn EventStore>,
    pub metrics: Metrics,
    /// SHA-256 hash of `X-Webhook-Secret` (hex-encoded), never plaintext.
    pub webhook_secret_hash: Option<Arc<str>>,
}

impl AppState {
    /// Wire store, Teamwork client, relay and pipeline from config.
    pub fn from_config(config: Config) -> Result<Self> {
        let metrics = Metrics::new()?;

        let db_path = config.storage.resolved_db_path()?;
        let store: Arc<dyn EventStore> = Arc::new(SqliteEventStore::open(&db_path)?);
        tracing::info!(path = %db_path.display(), "event store ready");

        let teamwork: Arc<dyn SourceSystem> = Arc::new(
            TeamworkClient::new(
                &config.teamwork.base_url,
                config.teamwork.api_key.clone(),
                Duration::from_secs(config.teamwork.timeout_secs),
            )
            .context("teamwork.base_url must point at the Teamwork site")?,
        );

        let relay: Option<Arc<dyn ActionRelay>> = if config.relay.enabled {
            let relay = HttpActionRelay::new(
                &config.relay.base_url,
                &config.relay.action_path,
                config.relay.api_key.clone(),
                Duration::from_secs(config.relay.timeout_secs),
            )?;
            tracing::info!(endpoint = relay.endpoint(), "action relay enabled");
            Some(Arc::new(relay))
        } else {
            None
        };

        let responder = Responder::new(
            Arc::clone(&teamwork),
            relay,
            RelayProject {
                id: config.relay.project_id,
                name: config.relay.project_name.clone(),
            },
            config.teamwork.ack_message.clone(),
            metrics.clone(),
        );
        let mention = MentionFilter::new(
            &config.mention.triggers,
            &config.teamwork.ack_message,
            config.teamwork.bot_user_id,
        );
        let pipeline = Pipeline::new(
            Arc::clone(&store),
            teamwork,
            mention,
            responder,
            metrics.clone(),
        );

        let webhook_secret_hash = config
            .gateway
            .webhook_secret
            .as_deref()
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
            .map(|secret| Arc::from(hash_webhook_secret(secret)));

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            store,
            metrics,
            webhook_secret_hash,
        })
    }
}

/// Timeout for one request: the configured value, or longer when the outbound
/// calls of a single webhook could take more. A webhook must never time out
/// after its event is saved.
pub fn request_timeout(config: &Config) -> Duration {
    let configured = Duration::from_secs(config.gateway.request_timeout_secs);
    configured.max(config.outbound_budget() + Duration::from_secs(TIMEOUT_MARGIN_SECS))
}

/// All routes with body-limit and timeout layers applied.
pub fn router(state: AppState) -> Router {
    let timeout = request_timeout(&state.config);
    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/events", get(handle_events_list))
        .route("/events/{kind}/{source_event_id}", get(handle_event_get))
        .route("/webhook/teamwork", post(handle_teamwork))
        .route("/webhook/message/create", post(handle_message_create))
        .route("/webhook/message/reply", post(handle_message_reply))
        .route("/webhook/comment/create", post(handle_comment_create))
        .route("/webhook/task/create", post(handle_task_create))
        .route("/webhook/file/upload", post(handle_file_upload))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout))
}

/// Run the HTTP gateway until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "Refusing to bind to {host}: the webhook gateway would be reachable from the network.\n\
             Fix: use --host 127.0.0.1 (default) behind a reverse proxy, or set\n\
             [gateway] allow_public_bind = true in config.toml."
        );
    }
    if is_public_bind(host) && config.gateway.webhook_secret.is_none() {
        tracing::warn!("public bind without [gateway] webhook_secret: anyone can post events");
    }

    let state = AppState::from_config(config)?;
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let local = listener.local_addr()?;
    tracing::info!(%local, "mention relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server failed")?;
    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health: always public
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.store.health_check().await;
    Json(json!({
        "status": "ok",
        "store": {
            "backend": state.store.name(),
            "healthy": store_ok,
        },
    }))
}

/// GET /metrics: Prometheus text exposition format
async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        ),
        Err(err) => {
            tracing::error!("metrics encoding failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
                String::new(),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

fn error_body(reason: impl Into<String>) -> Json<Value> {
    Json(json!({"status": "error", "reason": reason.into()}))
}

/// GET /events?limit=N: newest first
async fn handle_events_list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let limit = clamp_limit(query.limit);
    match state.store.list_recent(limit).await {
        Ok(events) => (
            StatusCode::OK,
            Json(json!({"count": events.len(), "events": events})),
        ),
        Err(err) => {
            tracing::error!("listing events failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("failed to list events"),
            )
        }
    }
}

/// GET /events/{kind}/{source_event_id}
async fn handle_event_get(
    State(state): State<AppState>,
    AxumPath((kind, source_event_id)): AxumPath<(String, i64)>,
) -> impl IntoResponse {
    let kind: EventKind = match kind.parse() {
        Ok(kind) => kind,
        Err(err) => return (StatusCode::BAD_REQUEST, error_body(format!("{err}"))),
    };
    match state.store.get(kind, source_event_id).await {
        Ok(Some(event)) => (StatusCode::OK, Json(json!(event))),
        Ok(None) => (StatusCode::NOT_FOUND, error_body("event not found")),
        Err(err) => {
            tracing::error!(%kind, source_event_id, "event lookup failed: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("failed to read event"),
            )
        }
    }
}

/// Check `X-Webhook-Secret` when a secret is configured.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(ref secret_hash) = state.webhook_secret_hash else {
        return Ok(());
    };
    let header_hash = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(hash_webhook_secret);
    match header_hash {
        Some(val) if constant_time_eq(&val, secret_hash.as_ref()) => Ok(()),
        _ => {
            tracing::warn!("webhook rejected: invalid or missing X-Webhook-Secret");
            Err((
                StatusCode::UNAUTHORIZED,
                error_body("invalid or missing X-Webhook-Secret header"),
            ))
        }
    }
}

/// Parse the body as JSON. Anything else is wrapped as `{"raw": <text>}` so it
/// flows through the pipeline and ends up ignored.
fn decode_payload(body: &Bytes) -> Value {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!("webhook body is not JSON ({err}), wrapping as raw text");
            json!({"raw": String::from_utf8_lossy(body)})
        }
    }
}

fn outcome_response(outcome: &PipelineOutcome) -> (StatusCode, Json<Value>) {
    let status = if outcome.is_rejected() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(outcome.body()))
}

async fn handle_kind(
    state: AppState,
    headers: HeaderMap,
    body: Bytes,
    kind: EventKind,
) -> (StatusCode, Json<Value>) {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    let payload = decode_payload(&body);
    let outcome = state.pipeline.process(kind, &payload).await;
    outcome_response(&outcome)
}

/// POST /webhook/teamwork: kind from `X-Projects-Event` or the payload's `event`
async fn handle_teamwork(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }
    let header_event = headers
        .get(PROJECTS_EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let payload = decode_payload(&body);
    let outcome = state.pipeline.process_named(header_event, &payload).await;
    outcome_response(&outcome)
}

/// POST /webhook/message/create
async fn handle_message_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_kind(state, headers, body, EventKind::MessageCreated).await
}

/// POST /webhook/message/reply
async fn handle_message_reply(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_kind(state, headers, body, EventKind::MessageReply).await
}

/// POST /webhook/comment/create
async fn handle_comment_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_kind(state, headers, body, EventKind::CommentCreated).await
}

/// POST /webhook/task/create
async fn handle_task_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_kind(state, headers, body, EventKind::TaskCreated).await
}

/// POST /webhook/file/upload
async fn handle_file_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_kind(state, headers, body, EventKind::FileUploaded).await
}
