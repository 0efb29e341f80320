//! Copilot upstream host derivation: a pure function so
//! the precedence rule is unit-testable without starting a process.
//!
//! Uses `wreq::Url` (re-exported from its underlying `url` crate, same as
//! `reqwest::Url`) for parsing rather than adding a direct `url` dependency,
//! since `awf-core` already depends on `wreq` for the upstream client.

const DEFAULT_HOST: &str = "api.githubcopilot.com";
const ENTERPRISE_FALLBACK: &str = "api.enterprise.githubcopilot.com";
const GHE_SUFFIX: &str = ".ghe.com";

/// `target` is `COPILOT_API_TARGET`, `github_server_url` is `GITHUB_SERVER_URL`.
/// First match wins; falls back to `api.githubcopilot.com`.
pub fn derive_copilot_host(target: Option<&str>, github_server_url: Option<&str>) -> String {
    if let Some(target) = target {
        let target = target.trim();
        if !target.is_empty() {
            return target.to_string();
        }
    }

    if let Some(url) = github_server_url {
        if let Ok(parsed) = wreq::Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                if host.eq_ignore_ascii_case("github.com") {
                    return DEFAULT_HOST.to_string();
                }
                if let Some(subdomain) = host.strip_suffix(GHE_SUFFIX) {
                    return format!("api.{subdomain}.ghe.com");
                }
                return ENTERPRISE_FALLBACK.to_string();
            }
        }
    }

    DEFAULT_HOST.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_nothing_set() {
        assert_eq!(derive_copilot_host(None, None), "api.githubcopilot.com");
    }

    #[test]
    fn target_override_wins_verbatim() {
        assert_eq!(derive_copilot_host(Some("x"), Some("https://github.com")), "x");
    }

    #[test]
    fn github_dot_com_maps_to_default_host() {
        assert_eq!(
            derive_copilot_host(None, Some("https://github.com")),
            "api.githubcopilot.com"
        );
    }

    #[test]
    fn ghe_subdomain_is_preserved() {
        assert_eq!(
            derive_copilot_host(None, Some("https://mycompany.ghe.com")),
            "api.mycompany.ghe.com"
        );
    }

    #[test]
    fn ghe_subdomain_survives_port_and_path() {
        assert_eq!(
            derive_copilot_host(None, Some("https://mycompany.ghe.com:443/path")),
            "api.mycompany.ghe.com"
        );
    }

    #[test]
    fn other_hosts_fall_back_to_enterprise() {
        assert_eq!(
            derive_copilot_host(None, Some("https://git.corp.com")),
            "api.enterprise.githubcopilot.com"
        );
    }

    #[test]
    fn unparseable_url_falls_back_to_default() {
        assert_eq!(derive_copilot_host(None, Some("not-a-url")), "api.githubcopilot.com");
    }

    #[test]
    fn blank_target_is_treated_as_unset() {
        assert_eq!(
            derive_copilot_host(Some("   "), Some("https://git.corp.com")),
            "api.enterprise.githubcopilot.com"
        );
    }
}
