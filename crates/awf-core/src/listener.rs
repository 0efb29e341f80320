//! Per-provider HTTP listeners, composed from the limiter and the
//! forwarder.
//!
//! Each listener builds its `Router` via `Router::new().route(...).with_state(...)`,
//! with one state type per listener carrying both the shared `Core` and
//! that listener's own `ProviderID`.

use std::sync::Arc;

use awf_common::ProviderID;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use http::HeaderMap;

use crate::core::Core;
use crate::error::ProxyError;
use crate::forwarder::{forward, IncomingRequest, MAX_BODY_BYTES};
use crate::provider::request_id_header;

struct ListenerState {
    core: Arc<Core>,
    provider: ProviderID,
}

/// The OpenAI listener: management endpoints always present, proxying only
/// when the OpenAI credential is configured.
pub fn openai_router(core: Arc<Core>) -> Router {
    let enabled = core.provider(ProviderID::OpenAI).enabled();
    let state = Arc::new(ListenerState {
        core,
        provider: ProviderID::OpenAI,
    });
    let router = Router::new()
        .route("/health", get(management_health))
        .route("/metrics", get(management_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES as usize));
    if enabled {
        router.fallback(proxy_handler).with_state(state)
    } else {
        router.fallback(stub_not_found).with_state(state)
    }
}

/// The Anthropic and Copilot listeners: a local `/health` plus everything
/// else delegated to the forwarder.
pub fn provider_router(core: Arc<Core>, provider: ProviderID) -> Router {
    let state = Arc::new(ListenerState { core, provider });
    Router::new()
        .route("/health", get(per_listener_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES as usize))
        .fallback(proxy_handler)
        .with_state(state)
}

async fn per_listener_health(State(state): State<Arc<ListenerState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.provider.as_str(),
    }))
}

async fn management_health(State(state): State<Arc<ListenerState>>) -> impl IntoResponse {
    let core = &state.core;
    let providers = serde_json::json!({
        "openai": core.provider(ProviderID::OpenAI).enabled(),
        "anthropic": core.provider(ProviderID::Anthropic).enabled(),
        "copilot": core.provider(ProviderID::Copilot).enabled(),
    });

    let mut rate_limits = serde_json::Map::new();
    for provider in ProviderID::ALL {
        let snapshot = core.limiter.snapshot(provider);
        rate_limits.insert(provider.as_str().to_string(), serde_json::to_value(snapshot).unwrap_or_default());
    }

    Json(serde_json::json!({
        "status": "healthy",
        "service": "awf",
        "squid_proxy": core.upstream_proxy_configured,
        "providers": providers,
        "metrics_summary": core.metrics.get_summary(),
        "rate_limits": rate_limits,
    }))
}

async fn management_metrics(State(state): State<Arc<ListenerState>>) -> impl IntoResponse {
    Json(state.core.metrics.get_metrics())
}

async fn stub_not_found(headers: HeaderMap) -> Response {
    let request_id = awf_common::resolve_request_id(headers.get("x-request-id").and_then(|v| v.to_str().ok()));
    let mut response = ProxyError::not_found("openai credential not configured").into_response();
    if let Some((name, value)) = request_id_header(&request_id) {
        response.headers_mut().insert(name, value);
    }
    response
}

async fn proxy_handler(
    State(state): State<Arc<ListenerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = awf_common::resolve_request_id(headers.get("x-request-id").and_then(|v| v.to_str().ok()));

    let content_length = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let decision = state.core.limiter.check(state.provider, content_length);
    if !decision.allowed {
        return rate_limit_response(&state.core, state.provider, &request_id, decision);
    }

    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    forward(
        &state.core,
        state.provider,
        request_id,
        IncomingRequest {
            method,
            path,
            headers,
            body,
        },
    )
    .await
}

fn rate_limit_response(
    core: &Arc<Core>,
    provider: ProviderID,
    request_id: &str,
    decision: awf_ratelimit::Decision,
) -> Response {
    let label = provider.as_str();
    let limit_type = decision.limit_type.unwrap_or(awf_ratelimit::LimitType::Rpm);
    core.metrics
        .increment("rate_limit_rejected_total", &[label, limit_type.as_str()], 1);
    tracing::warn!(
        event = "rate_limited",
        request_id = %request_id,
        provider = label,
        limit_type = limit_type.as_str(),
    );

    let retry_after = decision.retry_after_secs.unwrap_or(1);
    let limit = decision.limit.unwrap_or(0);
    let remaining = decision.remaining.unwrap_or(0);

    let body = serde_json::json!({
        "error": {
            "type": "rate_limit_error",
            "message": format!("rate limit exceeded for {label}"),
            "provider": label,
            "limit": limit,
            "window": limit_type.window_name(),
            "retry_after": retry_after,
        }
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let response_headers = response.headers_mut();
    let set = |headers: &mut HeaderMap, name: HeaderName, value: String| {
        if let Ok(v) = HeaderValue::from_str(&value) {
            headers.insert(name, v);
        }
    };
    set(response_headers, HeaderName::from_static("retry-after"), retry_after.to_string());
    set(response_headers, HeaderName::from_static("x-ratelimit-limit"), limit.to_string());
    set(
        response_headers,
        HeaderName::from_static("x-ratelimit-remaining"),
        remaining.to_string(),
    );
    set(response_headers, HeaderName::from_static("x-ratelimit-reset"), retry_after.to_string());
    if let Some((name, value)) = request_id_header(request_id) {
        response_headers.insert(name, value);
    }
    response
}
