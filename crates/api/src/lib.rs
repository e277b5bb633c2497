mod config;
mod rate_limit;
pub mod whatsapp;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Form, Json, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use oficina_agents::MaintenanceAgent;
use oficina_core::composer::transient_failure_reply;
use oficina_core::{BotReply, InboundMessage};
use oficina_observability::AppMetrics;
use oficina_storage::Store;
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use crate::config::AppConfig;
use crate::rate_limit::SenderRateLimiter;

const RATE_LIMITED_TEXT: &str = "Muitas mensagens em pouco tempo. Aguarde um instante e tente novamente.";

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<MaintenanceAgent<Store>>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: SenderRateLimiter,
    pub store_backend: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    store: &'static str,
    metrics: oficina_observability::MetricsSnapshot,
}

pub async fn build_app(config: &AppConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();
    let extractor = config.build_extractor()?;

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url)
            .await
            .context("failed to open procedure database")?,
        None => Store::memory(),
    };
    let store_backend = store.backend_name();

    let agent = Arc::new(MaintenanceAgent::new(
        extractor,
        Arc::new(store),
        metrics.clone(),
        config.payment_link_base.clone(),
    ));

    let state = ApiState {
        agent,
        metrics,
        api_key: config.api_key.clone(),
        limiter: SenderRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        store_backend,
    };

    tracing::info!(
        store = store_backend,
        rate_limit_max = config.rate_limit_max,
        rate_limit_window_secs = config.rate_limit_window.as_secs(),
        "oficina api configured"
    );

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/messages", post(messages))
        .route("/webhook/whatsapp", post(whatsapp_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        store: state.store_backend,
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(payload))
}

async fn messages(
    State(state): State<ApiState>,
    Json(message): Json<InboundMessage>,
) -> Response {
    match state.agent.handle_message(message).await {
        Ok(handled) => (StatusCode::OK, Json(handled)).into_response(),
        Err(error) => {
            state.metrics.inc_failure();
            tracing::error!(error = ?error, "message handling failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "error": "temporarily_unavailable",
                    "segments": transient_failure_reply().segments,
                })),
            )
                .into_response()
        }
    }
}

async fn whatsapp_webhook(
    State(state): State<ApiState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let message = whatsapp::inbound_from_form(&form);

    if let Some(sender) = message.sender.as_deref() {
        if !state.limiter.allow(&format!("wa:{sender}")) {
            tracing::warn!(sender, "whatsapp sender rate limited");
            return twiml_response(&BotReply::text(RATE_LIMITED_TEXT));
        }
    }

    let reply = match state.agent.handle_message(message).await {
        Ok(handled) => handled.reply,
        Err(error) => {
            state.metrics.inc_failure();
            tracing::error!(error = ?error, "whatsapp message handling failed");
            transient_failure_reply()
        }
    };

    twiml_response(&reply)
}

// Always 200; the provider retries anything else.
fn twiml_response(reply: &BotReply) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        whatsapp::render_twiml(reply),
    )
        .into_response()
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthorized",
                "message": "missing or invalid x-api-key"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // The webhook is limited per sender once the form is parsed.
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&format!("ip:{ip}")) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health" | "/webhook/whatsapp")
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}
