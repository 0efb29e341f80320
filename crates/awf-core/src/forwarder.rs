//! The per-request forwarding pipeline: validate, scrub, inject,
//! forward, stream back, account.
//!
//! Extracts the request parts, resolves the trace id, emits structured
//! `tracing::info!`/`warn!` calls with `event = "..."` fields, and builds
//! the response by matching on what the upstream call produced.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use awf_common::ProviderID;
use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, Method};

use awf_tokens::{TokenExtractor, UsageShape};

use crate::core::Core;
use crate::error::ProxyError;
use crate::headers::filter_inbound;
use crate::provider::{inject_credentials, request_id_header};

pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

pub struct IncomingRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

fn usage_shape(provider: ProviderID) -> UsageShape {
    match provider {
        ProviderID::Anthropic => UsageShape::Anthropic,
        ProviderID::OpenAI | ProviderID::Copilot => UsageShape::OpenAI,
    }
}

fn attach_request_id(response: &mut Response, request_id: &str) {
    if let Some((name, value)) = request_id_header(request_id) {
        response.headers_mut().insert(name, value);
    }
}

/// Finishes a request that never reached the upstream (bad path, oversized
/// body): decrements the gauge, records a `requests_total` 4xx observation,
/// and logs `request_complete` — not `request_error`.
fn complete_without_upstream(
    core: &Arc<Core>,
    provider: ProviderID,
    request_id: &str,
    method: &Method,
    err: ProxyError,
) -> Response {
    let label = provider.as_str();
    core.metrics.gauge_dec("active_requests", &[label], 1);
    let status_class = awf_metrics::status_class(err.status.as_u16());
    core.metrics
        .increment("requests_total", &[label, method.as_str(), &status_class], 1);
    tracing::info!(
        event = "request_complete",
        request_id = %request_id,
        provider = label,
        status = err.status.as_u16(),
    );
    let mut response = err.into_response();
    attach_request_id(&mut response, request_id);
    response
}

pub async fn forward(core: &Arc<Core>, provider: ProviderID, request_id: String, incoming: IncomingRequest) -> Response {
    let label = provider.as_str();
    core.metrics.gauge_inc("active_requests", &[label], 1);
    tracing::info!(
        event = "request_start",
        request_id = %request_id,
        provider = label,
        method = %incoming.method,
        path = %awf_common::sanitize_default(&incoming.path),
    );

    if !incoming.path.starts_with('/') {
        return complete_without_upstream(
            core,
            provider,
            &request_id,
            &incoming.method,
            ProxyError::bad_request("path must begin with /"),
        );
    }

    if incoming.body.len() as u64 > MAX_BODY_BYTES {
        return complete_without_upstream(
            core,
            provider,
            &request_id,
            &incoming.method,
            ProxyError::payload_too_large("request body exceeds 10 MiB"),
        );
    }

    let request_bytes = incoming.body.len() as u64;
    core.metrics.increment("request_bytes_total", &[label], request_bytes);

    let config = core.provider(provider);
    let mut headers = filter_inbound(&incoming.headers);
    if let Some((name, value)) = request_id_header(&request_id) {
        headers.insert(name, value);
    }
    inject_credentials(provider, config, &mut headers);

    let start = Instant::now();
    let upstream_result = core
        .upstream
        .send(&config.upstream_host, incoming.method.clone(), &incoming.path, headers, incoming.body)
        .await;

    let upstream_response = match upstream_result {
        Ok(response) => response,
        Err(e) => {
            core.metrics.gauge_dec("active_requests", &[label], 1);
            core.metrics.increment("requests_errors_total", &[label], 1);
            core.metrics
                .increment("requests_total", &[label, incoming.method.as_str(), "5xx"], 1);
            let sanitized = awf_common::sanitize_default(&e.message);
            tracing::warn!(
                event = "request_error",
                request_id = %request_id,
                provider = label,
                error = %sanitized,
            );
            let mut response = ProxyError::bad_gateway(&sanitized).into_response();
            attach_request_id(&mut response, &request_id);
            return response;
        }
    };

    let mut headers = upstream_response.headers;
    let content_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let content_encoding = headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let extractor = TokenExtractor::new(usage_shape(provider), &content_type, content_encoding.as_deref());

    let tee = ResponseTee {
        inner: upstream_response.stream,
        extractor: Some(extractor),
        core: Arc::clone(core),
        provider,
        request_id: request_id.clone(),
        method: incoming.method.to_string(),
        request_bytes,
        response_bytes: 0,
        start,
        status: upstream_response.status,
        finalized: false,
    };

    if let Some((name, value)) = request_id_header(&request_id) {
        headers.insert(name, value);
    }

    let mut builder = Response::builder().status(upstream_response.status);
    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }
    builder
        .body(Body::from_stream(tee))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Streams upstream bytes to the client unmodified while teeing a copy into
/// the token extractor; finalizes bookkeeping exactly once, whether the
/// upstream stream ends cleanly, errors, or the client disconnects and drops
/// this future first (the `Drop` impl covers that last case,
/// cancellation).
struct ResponseTee {
    inner: crate::upstream::ByteStream,
    extractor: Option<TokenExtractor>,
    core: Arc<Core>,
    provider: ProviderID,
    request_id: String,
    method: String,
    request_bytes: u64,
    response_bytes: u64,
    start: Instant,
    status: StatusCode,
    finalized: bool,
}

impl Stream for ResponseTee {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.response_bytes += chunk.len() as u64;
                if let Some(extractor) = this.extractor.as_mut() {
                    extractor.push(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finalize(Some(e.to_string()));
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                this.finalize(None);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl ResponseTee {
    fn finalize(&mut self, stream_error: Option<String>) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let label = self.provider.as_str();
        let duration_ms = self.start.elapsed().as_millis() as f64;
        self.core.metrics.gauge_dec("active_requests", &[label], 1);
        self.core.metrics.observe("request_duration_ms", duration_ms, &[label]);
        self.core
            .metrics
            .increment("response_bytes_total", &[label], self.response_bytes);

        if let Some(message) = stream_error {
            self.core.metrics.increment("requests_errors_total", &[label], 1);
            let sanitized = awf_common::sanitize_default(&message);
            tracing::warn!(
                event = "request_error",
                request_id = %self.request_id,
                provider = label,
                error = %sanitized,
            );
            return;
        }

        let status_class = awf_metrics::status_class(self.status.as_u16());
        self.core
            .metrics
            .increment("requests_total", &[label, &self.method, &status_class], 1);

        if let Some(extractor) = self.extractor.take() {
            let counts = extractor.finish();
            if counts.total > 0 {
                self.core.limiter.record_tokens(self.provider, counts.total);
            }
        }

        tracing::info!(
            event = "request_complete",
            request_id = %self.request_id,
            provider = label,
            status = self.status.as_u16(),
            duration_ms = duration_ms,
            request_bytes = self.request_bytes,
            response_bytes = self.response_bytes,
            upstream_host = %self.core.provider(self.provider).upstream_host,
        );
    }
}

impl Drop for ResponseTee {
    fn drop(&mut self) {
        if !self.finalized {
            self.finalize(Some("client disconnected before response completed".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use awf_ratelimit::RateLimitConfig;
    use http::HeaderValue;

    use super::*;
    use crate::test_support::{build_core, MockUpstream};

    fn incoming(method: Method, path: &str, body: &[u8]) -> IncomingRequest {
        IncomingRequest {
            method,
            path: path.to_string(),
            headers: HeaderMap::new(),
            body: Bytes::copy_from_slice(body),
        }
    }

    #[tokio::test]
    async fn anthropic_request_carries_injected_credentials_and_request_id() {
        let mock = Arc::new(MockUpstream::new());
        mock.set_response(StatusCode::UNAUTHORIZED, HeaderMap::new(), b"{\"error\":\"bad key\"}".to_vec());
        let core = build_core(Arc::clone(&mock), RateLimitConfig::default(), Some("sk-ant-fake"));

        let response = forward(
            &core,
            ProviderID::Anthropic,
            "req-1".to_string(),
            incoming(Method::POST, "/v1/messages", b"{}"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get("x-request-id").unwrap(), "req-1");

        let captured = mock.captured_headers();
        assert_eq!(captured.get("x-api-key").unwrap(), "sk-ant-fake");
        assert_eq!(captured.get("anthropic-version").unwrap(), "2023-06-01");
    }

    #[tokio::test]
    async fn sse_body_reaches_the_client_byte_for_byte() {
        let sse_body = b"event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":100}}}\n\nevent: message_delta\ndata: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":50}}\n\n";
        let mock = Arc::new(MockUpstream::new());
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        mock.set_response(StatusCode::OK, headers, sse_body.to_vec());
        let core = build_core(Arc::clone(&mock), RateLimitConfig::default(), Some("sk-ant-fake"));

        let response = forward(
            &core,
            ProviderID::Anthropic,
            "req-2".to_string(),
            incoming(Method::POST, "/v1/messages", b"{}"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &sse_body[..]);
    }

    #[tokio::test]
    async fn upstream_connection_failure_yields_bad_gateway() {
        let mock = Arc::new(MockUpstream::new());
        mock.set_error("connection refused");
        let core = build_core(Arc::clone(&mock), RateLimitConfig::default(), Some("sk-ant-fake"));

        let response = forward(
            &core,
            ProviderID::Anthropic,
            "req-3".to_string(),
            incoming(Method::POST, "/v1/messages", b"{}"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_reaching_upstream() {
        let mock = Arc::new(MockUpstream::new());
        let core = build_core(Arc::clone(&mock), RateLimitConfig::default(), Some("sk-ant-fake"));
        let oversized = vec![0u8; (MAX_BODY_BYTES + 1) as usize];

        let response = forward(
            &core,
            ProviderID::Anthropic,
            "req-4".to_string(),
            incoming(Method::POST, "/v1/messages", &oversized),
        )
        .await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(mock.last_request.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn path_not_starting_with_slash_is_rejected() {
        let mock = Arc::new(MockUpstream::new());
        let core = build_core(Arc::clone(&mock), RateLimitConfig::default(), Some("sk-ant-fake"));

        let response = forward(
            &core,
            ProviderID::Anthropic,
            "req-5".to_string(),
            incoming(Method::POST, "http://evil.example/x", b"{}"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
