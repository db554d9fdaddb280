/// HTTP gateway for the relay.
///
/// Serves the provider webhook (verification and receipt), the trusted
/// normalized inbound webhook, and the authenticated dashboard API. Webhook
/// receipts are always acknowledged once authenticated; the API surfaces
/// errors explicitly.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};
use wa_relay_core::{Caller, Message, RelayError, TokenVerifier};

use crate::auth::bearer_token;
use crate::config::{GatewayConfig, WebhookConfig};
use crate::pipeline::{IncomingMessage, MessageService, SendRequest};

type HmacSha256 = Hmac<Sha256>;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<MessageService>,
    verifier: Arc<dyn TokenVerifier>,
    webhook: Arc<WebhookConfig>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        service: Arc<MessageService>,
        verifier: Arc<dyn TokenVerifier>,
        webhook: WebhookConfig,
    ) -> Self {
        Self {
            service,
            verifier,
            webhook: Arc::new(webhook),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Request body for POST /api/messages/send. Any tenant field in the body
/// is ignored.
#[derive(Debug, Deserialize)]
struct SendBody {
    #[serde(default)]
    recipient: String,
    #[serde(default)]
    content: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/webhook/whatsapp",
            get(verify_handler).post(receive_handler),
        )
        .route("/webhook/inbound", post(inbound_handler))
        .route("/api/messages/send", post(send_handler))
        .route("/api/messages", get(history_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({"error": message}))).into_response()
}

fn received() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "received"})),
    )
        .into_response()
}

/// GET /api/health
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Validate HMAC-SHA256 signature against a payload.
pub(crate) fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let result = mac.finalize();
    let expected = hex::encode(result.into_bytes());

    // Meta sends "sha256=<hex>"; raw hex is accepted too
    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

fn secrets_match(configured: &str, presented: &str) -> bool {
    !configured.is_empty() && configured.as_bytes().ct_eq(presented.as_bytes()).into()
}

fn query_param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(&format!("hub.{name}"))
        .or_else(|| params.get(name))
        .map(String::as_str)
}

/// GET /webhook/whatsapp — subscription handshake.
async fn verify_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = query_param(&params, "mode");
    let token = query_param(&params, "verify_token").unwrap_or_default();
    let challenge = query_param(&params, "challenge").unwrap_or_default();

    if mode == Some("subscribe") && secrets_match(&state.webhook.verify_token, token) {
        info!("webhook verified");
        return (StatusCode::OK, challenge.to_string()).into_response();
    }
    warn!("webhook verification rejected (mode={:?})", mode);
    StatusCode::FORBIDDEN.into_response()
}

/// POST /webhook/whatsapp — provider notifications.
async fn receive_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.len() > state.webhook.max_body_bytes {
        warn!("webhook payload too large ({} bytes)", body.len());
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    if !state.webhook.app_secret.is_empty() {
        let Some(signature) = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
        else {
            warn!("webhook: missing signature header");
            return StatusCode::FORBIDDEN.into_response();
        };
        if !validate_webhook_signature(&state.webhook.app_secret, signature, &body) {
            warn!("webhook: invalid signature");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let outcomes = state.service.ingest_payload(&body).await;
    debug!(
        "webhook processed {} event(s), payload_len={}",
        outcomes.len(),
        body.len()
    );
    received()
}

/// POST /webhook/inbound — pre-normalized messages from trusted automation.
async fn inbound_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.len() > state.webhook.max_body_bytes {
        warn!("inbound payload too large ({} bytes)", body.len());
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let presented = headers
        .get("X-Relay-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(&state.webhook.inbound_secret, presented) {
        warn!("inbound webhook: rejected secret");
        return StatusCode::FORBIDDEN.into_response();
    }

    match serde_json::from_slice::<IncomingMessage>(&body) {
        Ok(incoming) => {
            let outcome = state.service.ingest_validated(incoming).await;
            debug!("inbound webhook outcome: {}", outcome.label());
        }
        Err(e) => debug!("ignoring malformed inbound payload: {}", e),
    }
    received()
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Caller, Response> {
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
    else {
        return Err(error_body(
            StatusCode::UNAUTHORIZED,
            "missing bearer token",
        ));
    };
    state.verifier.verify(token).map_err(|e| {
        debug!("rejected bearer token: {}", e);
        error_body(StatusCode::UNAUTHORIZED, "invalid token")
    })
}

fn send_error(e: &RelayError) -> Response {
    match e {
        RelayError::Validation(msg) | RelayError::InvalidDomainState(msg) => {
            error_body(StatusCode::BAD_REQUEST, msg)
        }
        RelayError::Auth(_) => error_body(StatusCode::UNAUTHORIZED, "invalid token"),
        RelayError::Provider { message, .. } => error_body(StatusCode::BAD_GATEWAY, message),
        RelayError::SentNotRecorded {
            provider_message_id,
            ..
        } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "message sent but not recorded",
                "providerMessageId": provider_message_id
            })),
        )
            .into_response(),
        other => {
            error!("send failed: {}", other);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// POST /api/messages/send
async fn send_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let caller = match authenticate(&state, &headers) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let request: SendBody = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_body(StatusCode::BAD_REQUEST, &format!("invalid body: {e}")),
    };

    let sent = state
        .service
        .send(SendRequest {
            recipient: request.recipient,
            content: request.content,
            tenant_id: caller.tenant_id,
        })
        .await;
    match sent {
        Ok(message) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "data": {
                    "id": message.id(),
                    "externalId": message.external_id(),
                    "recipient": message.recipient(),
                    "content": message.content(),
                    "timestamp": message.timestamp().to_rfc3339(),
                }
            })),
        )
            .into_response(),
        Err(e) => send_error(&e),
    }
}

fn history_entry(message: &Message) -> serde_json::Value {
    serde_json::json!({
        "id": message.id(),
        "content": message.content(),
        "sender": message.sender(),
        "type": message.kind().as_str(),
        "timestamp": message.timestamp().to_rfc3339(),
        "direction": message.direction(),
    })
}

/// GET /api/messages — the caller's tenant history, oldest first.
async fn history_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let caller = match authenticate(&state, &headers) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.service.history(&caller.tenant_id).await {
        Ok(messages) => {
            let entries: Vec<_> = messages.iter().map(history_entry).collect();
            Json(serde_json::json!({"messages": entries})).into_response()
        }
        Err(e) => {
            error!("history for tenant {} failed: {}", caller.tenant_id, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "messages": [],
                    "error": "history unavailable"
                })),
            )
                .into_response()
        }
    }
}

/// GET /metrics — Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Bind the listener and serve on a spawned task.
pub async fn start(config: &GatewayConfig, state: AppState) -> Result<tokio::task::JoinHandle<()>> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP gateway listening on {}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP gateway error: {}", e);
        }
    });
    Ok(handle)
}
