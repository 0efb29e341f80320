//! Environment-driven configuration, assembled into a [`Core`].
//!
//! `CliArgs` carries clap fields with `env = "..."` so CLI flags take
//! precedence over the environment variable of the same name. The
//! `sanitize_optional_env_value`/`parse_u16_env_value`/`parse_bool_env_value`
//! helpers do permissive parsing: an invalid value falls back to the
//! documented default rather than failing startup.

use std::sync::Arc;

use awf_common::ProviderID;
use awf_ratelimit::{Limiter, RateLimitConfig};
use awf_metrics::Registry;
use clap::Parser;

use crate::copilot::derive_copilot_host;
use crate::core::Core;
use crate::provider::ProviderConfig;
use crate::upstream::{UpstreamClient, WreqUpstreamClient};

pub const OPENAI_PORT: u16 = 10000;
pub const ANTHROPIC_PORT: u16 = 10001;
pub const COPILOT_PORT: u16 = 10002;

#[derive(Debug, Parser)]
#[command(name = "awf", about = "Credential-isolating reverse proxy sidecar for LLM provider APIs.")]
pub struct CliArgs {
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    #[arg(long, env = "COPILOT_GITHUB_TOKEN")]
    pub copilot_github_token: Option<String>,

    #[arg(long, env = "COPILOT_API_TARGET")]
    pub copilot_api_target: Option<String>,

    #[arg(long, env = "GITHUB_SERVER_URL")]
    pub github_server_url: Option<String>,

    #[arg(long, env = "HTTP_PROXY")]
    pub http_proxy: Option<String>,

    #[arg(long, env = "HTTPS_PROXY")]
    pub https_proxy: Option<String>,

    #[arg(long, env = "AWF_RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<String>,

    #[arg(long, env = "AWF_RATE_LIMIT_RPM")]
    pub rate_limit_rpm: Option<String>,

    #[arg(long, env = "AWF_RATE_LIMIT_RPH")]
    pub rate_limit_rph: Option<String>,

    #[arg(long, env = "AWF_RATE_LIMIT_BYTES_PM")]
    pub rate_limit_bytes_pm: Option<String>,
}

/// Trims a raw CLI/env value; `None`, an empty string, and an unexpanded
/// `${...}` placeholder (left behind by a container entrypoint that doesn't
/// set the variable) are all treated as absent.
fn sanitize_optional_env_value(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || (value.starts_with("${") && value.ends_with('}')) {
        return None;
    }
    Some(value.to_string())
}

fn parse_u64_env_value(value: Option<&str>, default: u64) -> u64 {
    match sanitize_optional_env_value(value) {
        Some(raw) => raw.parse::<u64>().ok().filter(|n| *n > 0).unwrap_or(default),
        None => default,
    }
}

/// Only the literal `"true"` enables; any other value, including common
/// truthy spellings like `"1"` or `"yes"`, falls back to `default`.
fn parse_bool_env_value(value: Option<&str>, default: bool) -> bool {
    match sanitize_optional_env_value(value) {
        Some(raw) => {
            if raw == "true" {
                true
            } else {
                default
            }
        }
        None => default,
    }
}

/// Builds the process-wide [`Core`] from parsed CLI/env arguments.
pub fn bootstrap(args: &CliArgs) -> Arc<Core> {
    let openai_credential = sanitize_optional_env_value(args.openai_api_key.as_deref());
    let anthropic_credential = sanitize_optional_env_value(args.anthropic_api_key.as_deref());
    let copilot_credential = sanitize_optional_env_value(args.copilot_github_token.as_deref());

    let copilot_host = derive_copilot_host(
        sanitize_optional_env_value(args.copilot_api_target.as_deref()).as_deref(),
        sanitize_optional_env_value(args.github_server_url.as_deref()).as_deref(),
    );

    let mut providers = std::collections::HashMap::new();
    providers.insert(
        ProviderID::OpenAI,
        ProviderConfig {
            id: ProviderID::OpenAI,
            credential: openai_credential,
            upstream_host: "api.openai.com".to_string(),
            port: OPENAI_PORT,
        },
    );
    providers.insert(
        ProviderID::Anthropic,
        ProviderConfig {
            id: ProviderID::Anthropic,
            credential: anthropic_credential,
            upstream_host: "api.anthropic.com".to_string(),
            port: ANTHROPIC_PORT,
        },
    );
    providers.insert(
        ProviderID::Copilot,
        ProviderConfig {
            id: ProviderID::Copilot,
            credential: copilot_credential,
            upstream_host: copilot_host,
            port: COPILOT_PORT,
        },
    );

    let proxy_url = sanitize_optional_env_value(args.https_proxy.as_deref())
        .or_else(|| sanitize_optional_env_value(args.http_proxy.as_deref()));
    let upstream_proxy_configured = proxy_url.is_some();
    if !upstream_proxy_configured {
        tracing::warn!(event = "startup", message = "no upstream proxy configured, connecting directly");
    }

    let rate_limit_config = RateLimitConfig {
        enabled: parse_bool_env_value(args.rate_limit_enabled.as_deref(), false),
        rpm: parse_u64_env_value(args.rate_limit_rpm.as_deref(), 600),
        rph: parse_u64_env_value(args.rate_limit_rph.as_deref(), 1000),
        bytes_pm: parse_u64_env_value(args.rate_limit_bytes_pm.as_deref(), 52_428_800),
        tokens_pm: None,
    };

    let upstream: Arc<dyn UpstreamClient> = Arc::new(WreqUpstreamClient::new(proxy_url));

    Arc::new(Core {
        metrics: Registry::new(),
        limiter: Limiter::new(rate_limit_config),
        upstream,
        providers,
        upstream_proxy_configured,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_numeric_env_falls_back_to_default() {
        assert_eq!(parse_u64_env_value(Some("not-a-number"), 600), 600);
        assert_eq!(parse_u64_env_value(Some("-5"), 600), 600);
        assert_eq!(parse_u64_env_value(Some("0"), 600), 600);
        assert_eq!(parse_u64_env_value(Some("1200"), 600), 1200);
    }

    #[test]
    fn bool_parsing_only_accepts_the_literal_true() {
        assert!(parse_bool_env_value(Some("true"), false));
        assert!(!parse_bool_env_value(Some("1"), false));
        assert!(!parse_bool_env_value(Some("YES"), false));
        assert!(!parse_bool_env_value(Some("TRUE"), false));
        assert!(!parse_bool_env_value(Some("off"), true));
        assert!(!parse_bool_env_value(Some("garbage"), false));
    }

    #[test]
    fn unexpanded_placeholder_is_treated_as_absent() {
        assert_eq!(sanitize_optional_env_value(Some("${OPENAI_API_KEY}")), None);
        assert_eq!(sanitize_optional_env_value(Some("  ")), None);
        assert_eq!(sanitize_optional_env_value(Some(" sk-fake ")), Some("sk-fake".to_string()));
    }
}
