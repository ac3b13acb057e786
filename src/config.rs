//! config.rs — tunables for every subsystem, with the defaults from the
//! external-interfaces table (§6). Nothing here is required; `Config::default()`
//! reproduces the documented defaults exactly.

use std::time::Duration;

/// Which tracing-backend variant the composition root should prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TracingBackendKind {
    /// Use [`supports_event_subscription_api`] + [`hostile_environment`] to
    /// decide, falling back to `Classic` on any install failure.
    Auto,
    Classic,
    EventSubscription,
}

impl Default for TracingBackendKind {
    fn default() -> Self {
        Self::Auto
    }
}

/// Top-level configuration for the whole engine.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Master on/off switch for the core.
    pub enabled: bool,
    /// If the preferred backend fails to install, retry with `Classic`.
    pub fallback_to_classic_tracing: bool,
    /// Code-info cache max entries.
    pub cache_size: usize,
    /// Code-info cache TTL.
    pub cache_ttl: Duration,
    /// Breakpoint cache max entries.
    pub breakpoint_cache_size: usize,
    /// Whether to compile and evaluate condition expressions at all.
    pub conditional_breakpoints_enabled: bool,
    /// Soft wall-clock budget for a single condition evaluation.
    pub condition_budget: Duration,
    /// Preferred tracing backend.
    pub tracing_backend: TracingBackendKind,
    /// Maintain per-event counters (`Dispatcher::statistics`).
    pub performance_monitoring: bool,
    /// Max number of recent telemetry events retained in the ring buffer.
    pub telemetry_ring_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_to_classic_tracing: true,
            cache_size: 1000,
            cache_ttl: Duration::from_secs(300),
            breakpoint_cache_size: 500,
            conditional_breakpoints_enabled: true,
            condition_budget: Duration::from_millis(100),
            tracing_backend: TracingBackendKind::Auto,
            performance_monitoring: true,
            telemetry_ring_capacity: 50,
        }
    }
}

impl Config {
    /// Validates the configuration, returning a [`crate::error::CoreError`]
    /// for combinations that can never be satisfied (rather than failing
    /// silently at first use).
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.cache_size == 0 {
            return Err(crate::error::CoreError::InvalidConfig(
                "cache_size must be >= 1".into(),
            ));
        }
        if self.breakpoint_cache_size == 0 {
            return Err(crate::error::CoreError::InvalidConfig(
                "breakpoint_cache_size must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let c = Config::default();
        assert!(c.enabled);
        assert!(c.fallback_to_classic_tracing);
        assert_eq!(c.cache_size, 1000);
        assert_eq!(c.cache_ttl, Duration::from_secs(300));
        assert_eq!(c.breakpoint_cache_size, 500);
        assert!(c.conditional_breakpoints_enabled);
        assert_eq!(c.condition_budget, Duration::from_millis(100));
        assert_eq!(c.tracing_backend, TracingBackendKind::Auto);
        assert!(c.performance_monitoring);
    }

    #[test]
    fn rejects_zero_sized_caches() {
        let mut c = Config::default();
        c.cache_size = 0;
        assert!(c.validate().is_err());
    }
}
