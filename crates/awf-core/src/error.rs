//! User-visible error taxonomy.
//!
//! A `status` + JSON `body` pair, with one builder method per taxonomy
//! entry the core's error paths need.
//! `X-Request-ID` is not attached here: the caller always knows the request
//! id and the error taxonomy doesn't, so it's inserted once at the response
//! boundary instead of threaded through every constructor.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProxyError {
    fn new(status: StatusCode, error: &str, message: &str) -> Self {
        let body = json!({ "error": error, "message": message });
        Self {
            status,
            body: Bytes::from(body.to_string()),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn payload_too_large(message: &str) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_gateway(message: &str) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "bad_gateway", message)
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(self.body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_carries_expected_status_and_shape() {
        let err = ProxyError::bad_request("path must begin with /");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_slice(&err.body).unwrap();
        assert_eq!(value["error"], "bad_request");
        assert_eq!(value["message"], "path must begin with /");
    }
}
