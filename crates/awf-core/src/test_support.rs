//! Shared test doubles for `forwarder`/`listener` integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use awf_common::ProviderID;
use awf_metrics::Registry;
use awf_ratelimit::{Limiter, RateLimitConfig};
use bytes::Bytes;
use futures_util::stream;
use http::{HeaderMap, Method, StatusCode};

use crate::core::Core;
use crate::provider::ProviderConfig;
use crate::upstream::{ByteStream, UpstreamClient, UpstreamError, UpstreamErrorKind, UpstreamResponse};

/// Records the last request it received and replays a canned response (or
/// error) instead of touching the network.
pub struct MockUpstream {
    pub last_request: Mutex<Option<(String, Method, String, HeaderMap)>>,
    pub response: Mutex<Option<Result<(StatusCode, HeaderMap, Vec<u8>), String>>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            last_request: Mutex::new(None),
            response: Mutex::new(None),
        }
    }

    pub fn set_response(&self, status: StatusCode, headers: HeaderMap, body: Vec<u8>) {
        *self.response.lock().unwrap() = Some(Ok((status, headers, body)));
    }

    pub fn set_error(&self, message: &str) {
        *self.response.lock().unwrap() = Some(Err(message.to_string()));
    }

    pub fn captured_headers(&self) -> HeaderMap {
        self.last_request.lock().unwrap().as_ref().unwrap().3.clone()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn send(
        &self,
        host: &str,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        _body: Bytes,
    ) -> Result<UpstreamResponse, UpstreamError> {
        *self.last_request.lock().unwrap() = Some((host.to_string(), method, path_and_query.to_string(), headers));

        match self.response.lock().unwrap().clone() {
            Some(Ok((status, headers, body))) => {
                let chunk: Result<Bytes, UpstreamError> = Ok(Bytes::from(body));
                let stream: ByteStream = Box::pin(stream::iter(vec![chunk]));
                Ok(UpstreamResponse { status, headers, stream })
            }
            Some(Err(message)) => Err(UpstreamError {
                kind: UpstreamErrorKind::Other,
                message,
            }),
            None => Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                stream: Box::pin(stream::iter(Vec::<Result<Bytes, UpstreamError>>::new())),
            }),
        }
    }
}

pub fn build_core(upstream: Arc<MockUpstream>, rate_limit: RateLimitConfig, anthropic_credential: Option<&str>) -> Arc<Core> {
    let mut providers = HashMap::new();
    providers.insert(
        ProviderID::OpenAI,
        ProviderConfig {
            id: ProviderID::OpenAI,
            credential: None,
            upstream_host: "api.openai.com".to_string(),
            port: crate::bootstrap::OPENAI_PORT,
        },
    );
    providers.insert(
        ProviderID::Anthropic,
        ProviderConfig {
            id: ProviderID::Anthropic,
            credential: anthropic_credential.map(|s| s.to_string()),
            upstream_host: "api.anthropic.com".to_string(),
            port: crate::bootstrap::ANTHROPIC_PORT,
        },
    );
    providers.insert(
        ProviderID::Copilot,
        ProviderConfig {
            id: ProviderID::Copilot,
            credential: None,
            upstream_host: "api.githubcopilot.com".to_string(),
            port: crate::bootstrap::COPILOT_PORT,
        },
    );

    Arc::new(Core {
        metrics: Registry::new(),
        limiter: Limiter::new(rate_limit),
        upstream: upstream as Arc<dyn UpstreamClient>,
        providers,
        upstream_proxy_configured: false,
    })
}
