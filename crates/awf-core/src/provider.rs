//! Per-provider configuration and credential injection.
//!
//! The source models each provider as a closure over its credential and
//! host, modeled as a tagged variant (`ProviderID`
//! plus one `ProviderConfig` per id) with a per-provider match in
//! [`inject_credentials`] rather than an `Injector` trait object, since the
//! set of providers is closed and will not grow at runtime.

use awf_common::ProviderID;
use http::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: ProviderID,
    pub credential: Option<String>,
    pub upstream_host: String,
    pub port: u16,
}

impl ProviderConfig {
    pub fn enabled(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }
}

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Re-adds `x-request-id` and the provider's credential header(s), after
/// [`crate::headers::filter_inbound`] has already stripped any client-
/// supplied ones. Always overwrites; a client value never survives this far.
pub fn inject_credentials(provider: ProviderID, config: &ProviderConfig, headers: &mut HeaderMap) {
    let Some(credential) = config.credential.as_deref() else {
        return;
    };

    match provider {
        ProviderID::OpenAI | ProviderID::Copilot => {
            crate::headers::set(
                headers,
                HeaderName::from_static("authorization"),
                &format!("Bearer {credential}"),
            );
        }
        ProviderID::Anthropic => {
            crate::headers::set(headers, HeaderName::from_static("x-api-key"), credential);
            if !headers.contains_key("anthropic-version") {
                crate::headers::set(
                    headers,
                    HeaderName::from_static("anthropic-version"),
                    ANTHROPIC_VERSION,
                );
            }
        }
    }
}

pub fn request_id_header(value: &str) -> Option<(HeaderName, HeaderValue)> {
    HeaderValue::from_str(value)
        .ok()
        .map(|v| (HeaderName::from_static("x-request-id"), v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: ProviderID, credential: &str) -> ProviderConfig {
        ProviderConfig {
            id,
            credential: Some(credential.to_string()),
            upstream_host: "example.test".to_string(),
            port: 10000,
        }
    }

    #[test]
    fn openai_injects_bearer_token() {
        let mut headers = HeaderMap::new();
        inject_credentials(ProviderID::OpenAI, &config(ProviderID::OpenAI, "sk-fake"), &mut headers);
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-fake");
    }

    #[test]
    fn anthropic_injects_api_key_and_default_version() {
        let mut headers = HeaderMap::new();
        inject_credentials(
            ProviderID::Anthropic,
            &config(ProviderID::Anthropic, "sk-ant-fake"),
            &mut headers,
        );
        assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant-fake");
        assert_eq!(headers.get("anthropic-version").unwrap(), ANTHROPIC_VERSION);
    }

    #[test]
    fn anthropic_preserves_client_supplied_version() {
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static("2024-01-01"));
        inject_credentials(
            ProviderID::Anthropic,
            &config(ProviderID::Anthropic, "sk-ant-fake"),
            &mut headers,
        );
        assert_eq!(headers.get("anthropic-version").unwrap(), "2024-01-01");
    }

    #[test]
    fn copilot_injects_bearer_token() {
        let mut headers = HeaderMap::new();
        inject_credentials(
            ProviderID::Copilot,
            &config(ProviderID::Copilot, "ghu_fake"),
            &mut headers,
        );
        assert_eq!(headers.get("authorization").unwrap(), "Bearer ghu_fake");
    }

    #[test]
    fn disabled_provider_injects_nothing() {
        let mut cfg = config(ProviderID::OpenAI, "sk-fake");
        cfg.credential = None;
        let mut headers = HeaderMap::new();
        inject_credentials(ProviderID::OpenAI, &cfg, &mut headers);
        assert!(headers.is_empty());
    }
}
