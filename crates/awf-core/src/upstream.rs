//! Outbound HTTPS client, routed through the configured upstream proxy.
//!
//! A trait so the forwarder doesn't depend on `wreq` directly, a single
//! client cached behind a `Mutex` keyed by proxy configuration (there's only
//! ever one configuration per process, but the cache-by-key shape leaves
//! room for more), and `classify` turning transport errors into a small
//! enum instead of leaking `wreq::Error` up through the forwarder.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, Method, StatusCode};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub stream: ByteStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Timeout,
    Connect,
    Tls,
    Dns,
    Other,
}

#[derive(Debug, Clone)]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(
        &self,
        host: &str,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

pub struct WreqUpstreamClient {
    proxy_url: Option<String>,
    clients: Mutex<HashMap<Option<String>, wreq::Client>>,
}

impl WreqUpstreamClient {
    pub fn new(proxy_url: Option<String>) -> Self {
        Self {
            proxy_url,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client(&self) -> Result<wreq::Client, UpstreamError> {
        let mut guard = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = guard.get(&self.proxy_url) {
            return Ok(client.clone());
        }

        let mut builder = wreq::Client::builder();
        if let Some(url) = &self.proxy_url {
            let proxy = wreq::Proxy::all(url).map_err(classify)?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(classify)?;
        guard.insert(self.proxy_url.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl UpstreamClient for WreqUpstreamClient {
    async fn send(
        &self,
        host: &str,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let client = self.client()?;
        let url = format!("https://{host}{path_and_query}");

        let response = client
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let headers = response.headers().clone();
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(classify)).boxed();

        Ok(UpstreamResponse { status, headers, stream })
    }
}

fn classify(error: wreq::Error) -> UpstreamError {
    let kind = if error.is_timeout() {
        UpstreamErrorKind::Timeout
    } else if error.is_connect() {
        UpstreamErrorKind::Connect
    } else {
        UpstreamErrorKind::Other
    };
    UpstreamError {
        kind,
        message: error.to_string(),
    }
}
