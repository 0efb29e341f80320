//! Per-provider sliding-window rate limiting.
//!
//! State lives behind a single `Mutex<HashMap<ProviderID, ProviderState>>`,
//! one lock with short critical sections, no await held across it.
//! The limiter is fail-open by construction: `Limiter::check` never panics
//! out to the caller.

mod window;

pub use window::SlidingWindow;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use awf_common::ProviderID;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitType {
    Rpm,
    Rph,
    BytesPm,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Rpm => "rpm",
            LimitType::Rph => "rph",
            LimitType::BytesPm => "bytes_pm",
        }
    }

    pub fn window_name(&self) -> &'static str {
        match self {
            LimitType::Rpm => "per_minute",
            LimitType::Rph => "per_hour",
            LimitType::BytesPm => "per_minute_bytes",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    pub limit_type: Option<LimitType>,
    pub retry_after_secs: Option<u64>,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            limit_type: None,
            retry_after_secs: None,
            limit: None,
            remaining: None,
        }
    }

    fn reject(limit_type: LimitType, retry_after_secs: u64, limit: u64) -> Self {
        Self {
            allowed: false,
            limit_type: Some(limit_type),
            retry_after_secs: Some(retry_after_secs.max(1)),
            limit: Some(limit),
            remaining: Some(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub rpm: u64,
    pub rph: u64,
    pub bytes_pm: u64,
    pub tokens_pm: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpm: 600,
            rph: 1000,
            bytes_pm: 52_428_800,
            tokens_pm: None,
        }
    }
}

/// The three (optionally four) sliding windows tracked per provider.
struct ProviderState {
    rpm: SlidingWindow,
    rph: SlidingWindow,
    bytes_pm: SlidingWindow,
    tokens_pm: SlidingWindow,
}

impl ProviderState {
    fn new() -> Self {
        Self {
            rpm: SlidingWindow::new(60),
            rph: SlidingWindow::new(60),
            bytes_pm: SlidingWindow::new(60),
            tokens_pm: SlidingWindow::new(60),
        }
    }
}

/// A point in time expressed in the unit each window counts in: whole
/// seconds since an arbitrary epoch for RPM/bytes/tokens, whole minutes for
/// RPH. Callers derive both from the same wall-clock instant.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub now_secs: u64,
}

impl Clock {
    pub fn now() -> Self {
        let now_secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self { now_secs }
    }

    fn now_minutes(&self) -> u64 {
        self.now_secs / 60
    }
}

pub struct Limiter {
    config: RateLimitConfig,
    states: Mutex<HashMap<ProviderID, ProviderState>>,
}

impl Limiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// `check` never panics to the caller: any internal failure (a poisoned
    /// lock, an overflow) is caught and mapped to an allow decision.
    pub fn check(&self, provider: ProviderID, request_bytes: u64) -> Decision {
        let clock = Clock::now();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.check_inner(provider, request_bytes, clock)
        }));
        match result {
            Ok(decision) => decision,
            Err(_) => {
                tracing::warn!(event = "rate_limit_fail_open", provider = %provider);
                Decision::allow()
            }
        }
    }

    fn check_inner(&self, provider: ProviderID, request_bytes: u64, clock: Clock) -> Decision {
        #[cfg(test)]
        test_support::panic_if_injected();

        if !self.config.enabled {
            return Decision::allow();
        }

        let mut guard = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = guard.entry(provider).or_insert_with(ProviderState::new);

        let rpm_count = state.rpm.count(clock.now_secs);
        if rpm_count >= self.config.rpm {
            let retry = state.rpm.estimate_retry_after(self.config.rpm);
            return Decision::reject(LimitType::Rpm, retry, self.config.rpm);
        }

        let rph_count = state.rph.count(clock.now_minutes());
        if rph_count >= self.config.rph {
            let retry_minutes = state.rph.estimate_retry_after(self.config.rph);
            return Decision::reject(LimitType::Rph, retry_minutes * 60, self.config.rph);
        }

        let bytes_count = state.bytes_pm.count(clock.now_secs);
        if bytes_count + request_bytes > self.config.bytes_pm {
            let retry = state.bytes_pm.estimate_retry_after(self.config.bytes_pm);
            return Decision::reject(LimitType::BytesPm, retry, self.config.bytes_pm);
        }

        state.rpm.record(clock.now_secs, 1);
        state.rph.record(clock.now_minutes(), 1);
        if request_bytes > 0 {
            state.bytes_pm.record(clock.now_secs, request_bytes);
        }

        Decision {
            allowed: true,
            limit_type: None,
            retry_after_secs: None,
            limit: Some(self.config.rpm),
            remaining: Some(self.config.rpm.saturating_sub(rpm_count + 1)),
        }
    }

    /// Records extracted token usage, if the optional tokens/min window is enabled.
    pub fn record_tokens(&self, provider: ProviderID, tokens: u64) {
        if self.config.tokens_pm.is_none() {
            return;
        }
        let clock = Clock::now();
        let mut guard = match self.states.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        let state = guard.entry(provider).or_insert_with(ProviderState::new);
        state.tokens_pm.record(clock.now_secs, tokens);
    }

    pub fn snapshot(&self, provider: ProviderID) -> ProviderLimitSnapshot {
        let clock = Clock::now();
        let mut guard = match self.states.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        let state = guard.entry(provider).or_insert_with(ProviderState::new);
        let rpm_count = state.rpm.count(clock.now_secs);
        let rph_count = state.rph.count(clock.now_minutes());
        ProviderLimitSnapshot {
            enabled: self.config.enabled,
            rpm: WindowSnapshot {
                limit: self.config.rpm,
                remaining: self.config.rpm.saturating_sub(rpm_count),
                reset: state.rpm.estimate_retry_after(self.config.rpm),
            },
            rph: WindowSnapshot {
                limit: self.config.rph,
                remaining: self.config.rph.saturating_sub(rph_count),
                reset: state.rph.estimate_retry_after(self.config.rph) * 60,
            },
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WindowSnapshot {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderLimitSnapshot {
    pub enabled: bool,
    pub rpm: WindowSnapshot,
    pub rph: WindowSnapshot,
}

/// A thread-local injection point so tests can force a panic from inside
/// `check_inner`, reachable only through `Limiter::check` itself, to prove
/// its `catch_unwind` wrapper actually covers its own call site.
#[cfg(test)]
mod test_support {
    use std::cell::Cell;

    thread_local! {
        static FORCE_PANIC: Cell<bool> = const { Cell::new(false) };
    }

    pub fn set_force_panic(value: bool) {
        FORCE_PANIC.with(|f| f.set(value));
    }

    pub fn panic_if_injected() {
        if FORCE_PANIC.with(|f| f.get()) {
            panic!("injected failure for fail-open test");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config(rpm: u64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            rpm,
            rph: 1_000_000,
            bytes_pm: u64::MAX,
            tokens_pm: None,
        }
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let limiter = Limiter::new(RateLimitConfig::default());
        let decision = limiter.check(ProviderID::OpenAI, 0);
        assert!(decision.allowed);
    }

    #[test]
    fn rejects_after_rpm_limit_reached() {
        let limiter = Limiter::new(enabled_config(2));
        assert!(limiter.check(ProviderID::Anthropic, 0).allowed);
        assert!(limiter.check(ProviderID::Anthropic, 0).allowed);
        let third = limiter.check(ProviderID::Anthropic, 0);
        assert!(!third.allowed);
        assert_eq!(third.limit_type, Some(LimitType::Rpm));
        assert!(third.retry_after_secs.unwrap() >= 1);
    }

    #[test]
    fn bytes_limit_rejects_when_over_budget() {
        let mut cfg = enabled_config(1_000_000);
        cfg.bytes_pm = 100;
        let limiter = Limiter::new(cfg);
        assert!(limiter.check(ProviderID::OpenAI, 60).allowed);
        let decision = limiter.check(ProviderID::OpenAI, 60);
        assert!(!decision.allowed);
        assert_eq!(decision.limit_type, Some(LimitType::BytesPm));
    }

    #[test]
    fn fail_open_on_internal_panic() {
        let limiter = Limiter::new(enabled_config(1));
        test_support::set_force_panic(true);
        let decision = limiter.check(ProviderID::OpenAI, 0);
        test_support::set_force_panic(false);
        assert!(decision.allowed);
    }
}
