//! The process-wide context threaded into every request handler.
//!
//! Metrics, the limiter, and the
//! upstream client are singletons for the process's lifetime, but they are
//! owned by one `Core` value rather than living behind statics, so tests can
//! construct as many independent instances as they like.

use std::collections::HashMap;
use std::sync::Arc;

use awf_common::ProviderID;
use awf_metrics::Registry;
use awf_ratelimit::Limiter;

use crate::provider::ProviderConfig;
use crate::upstream::UpstreamClient;

pub struct Core {
    pub metrics: Registry,
    pub limiter: Limiter,
    pub upstream: Arc<dyn UpstreamClient>,
    pub providers: HashMap<ProviderID, ProviderConfig>,
    pub upstream_proxy_configured: bool,
}

impl Core {
    pub fn provider(&self, id: ProviderID) -> &ProviderConfig {
        self.providers
            .get(&id)
            .unwrap_or_else(|| panic!("provider {id} missing from Core (all three are always registered, enabled or not)"))
    }
}
