//! backend/ — the seam between the dispatcher and whatever tracing API the
//! host runtime actually exposes.
//!
//! Grounded on spec.md §4.4's state machine (`created -> installed ->
//! shut down`, `shutdown()` always leaves `active = false`, matching the
//! REDESIGN FLAG that rules out bytecode injection and monkey-patching) and
//! on the teacher's backend-selection style in
//! `crates/vitte-debugger/src/lib.rs` / `hook.rs` (capability probe, install,
//! fall back on failure, record telemetry either way).

pub mod classic;
pub mod event_subscription;

use std::sync::Arc;

use crate::breakpoint::BreakpointSet;
use crate::cache::thread_local::StepMode;
use crate::config::TracingBackendKind;
use crate::dispatcher::TraceCallback;
use crate::error::{CoreError, Result};
use crate::telemetry::{ReasonCode, Telemetry};

pub use classic::ClassicBackend;
pub use event_subscription::EventSubscriptionBackend;

/// Point-in-time counters a backend exposes about its own operation. Backend
/// implementations are free to leave fields at zero if they don't track them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatistics {
    pub events_delivered: u64,
    pub install_failures: u64,
}

/// A concrete way of hooking the runtime's per-frame trace events. The
/// dispatcher is backend-agnostic: it only ever talks to this trait.
pub trait TracingBackend: Send + Sync {
    /// Stable, human-readable name used in telemetry context (`"classic"`,
    /// `"event_subscription"`).
    fn name(&self) -> &'static str;

    /// Hooks the runtime and starts delivering events to `callback`. Must be
    /// idempotent: calling `install` while already installed is a no-op that
    /// returns `Ok(())`.
    fn install(&self, callback: TraceCallback) -> Result<()>;

    /// Unhooks the runtime. Per the REDESIGN FLAG, this unconditionally
    /// leaves the backend in the "not active" state even if the underlying
    /// unhook call fails — callers must never be left thinking tracing is
    /// still live when it isn't.
    fn shutdown(&self);

    fn update_breakpoints(&self, file: &str, lines: BreakpointSet);

    fn set_stepping(&self, mode: StepMode);

    fn set_exception_breakpoints(&self, break_on_raise: bool, break_on_uncaught: bool);

    fn is_active(&self) -> bool;

    fn statistics(&self) -> BackendStatistics;
}

/// Does the runtime, as far as this crate can tell, support the
/// event-subscription API? Probed once at selection time; `event_subscription`
/// is the only backend this can ever be false for.
pub trait BackendCapabilityProbe {
    fn supports_event_subscription(&self) -> bool;
}

/// Always reports no event-subscription support, forcing `Auto` down to
/// `Classic`. Useful as a default when the embedder hasn't wired a real probe.
pub struct NoEventSubscriptionProbe;

impl BackendCapabilityProbe for NoEventSubscriptionProbe {
    fn supports_event_subscription(&self) -> bool {
        false
    }
}

/// Chooses and installs a backend per `kind`, handling `Auto`'s
/// capability-based selection and the classic fallback on install failure.
/// Telemetry records `AutoIntegrationFailed` when an `Auto` probe picks event
/// subscription but installation still fails and we fall back, and
/// `IntegrationFailed` when a non-`Auto`, non-fallback install fails outright.
pub fn select_and_install(
    kind: TracingBackendKind,
    probe: &dyn BackendCapabilityProbe,
    fallback_to_classic: bool,
    callback: TraceCallback,
    telemetry: &Arc<Telemetry>,
) -> Result<Arc<dyn TracingBackend>> {
    select_and_install_with(kind, probe, fallback_to_classic, callback, telemetry, Arc::new(EventSubscriptionBackend::new()))
}

/// Same as [`select_and_install`] but takes the event-subscription backend
/// instance rather than constructing one, so tests can pre-arm a forced
/// install failure.
pub fn select_and_install_with(
    kind: TracingBackendKind,
    probe: &dyn BackendCapabilityProbe,
    fallback_to_classic: bool,
    callback: TraceCallback,
    telemetry: &Arc<Telemetry>,
    event_subscription: Arc<EventSubscriptionBackend>,
) -> Result<Arc<dyn TracingBackend>> {
    let wants_event_subscription = match kind {
        TracingBackendKind::EventSubscription => true,
        TracingBackendKind::Classic => false,
        TracingBackendKind::Auto => probe.supports_event_subscription(),
    };

    if wants_event_subscription {
        let backend: Arc<dyn TracingBackend> = event_subscription;
        match backend.install(callback.clone()) {
            Ok(()) => return Ok(backend),
            Err(err) => {
                if kind == TracingBackendKind::EventSubscription && !fallback_to_classic {
                    telemetry.record(ReasonCode::IntegrationFailed);
                    return Err(err);
                }
                telemetry.record(ReasonCode::AutoIntegrationFailed);
            }
        }
    }

    let classic: Arc<dyn TracingBackend> = Arc::new(ClassicBackend::new());
    match classic.install(callback) {
        Ok(()) => Ok(classic),
        Err(err) => {
            telemetry.record(ReasonCode::IntegrationFailed);
            Err(CoreError::BackendInstall(format!(
                "classic backend install failed after fallback: {err}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysSupports;
    impl BackendCapabilityProbe for AlwaysSupports {
        fn supports_event_subscription(&self) -> bool {
            true
        }
    }

    fn noop_callback() -> TraceCallback {
        Arc::new(|_: &crate::dispatcher::Frame, _: crate::dispatcher::EventKind, _: Option<&str>| {})
    }

    #[test]
    fn auto_with_no_capability_selects_classic() {
        let telemetry = Arc::new(Telemetry::default());
        let backend = select_and_install(
            TracingBackendKind::Auto,
            &NoEventSubscriptionProbe,
            true,
            noop_callback(),
            &telemetry,
        )
        .unwrap();
        assert_eq!(backend.name(), "classic");
    }

    #[test]
    fn auto_with_capability_selects_event_subscription() {
        let telemetry = Arc::new(Telemetry::default());
        let backend = select_and_install(
            TracingBackendKind::Auto,
            &AlwaysSupports,
            true,
            noop_callback(),
            &telemetry,
        )
        .unwrap();
        assert_eq!(backend.name(), "event_subscription");
    }

    #[test]
    fn explicit_classic_ignores_capability() {
        let telemetry = Arc::new(Telemetry::default());
        let backend = select_and_install(
            TracingBackendKind::Classic,
            &AlwaysSupports,
            true,
            noop_callback(),
            &telemetry,
        )
        .unwrap();
        assert_eq!(backend.name(), "classic");
    }

    #[test]
    fn auto_falls_back_to_classic_when_event_subscription_install_fails() {
        let telemetry = Arc::new(Telemetry::default());
        let failing = Arc::new(EventSubscriptionBackend::new());
        failing.force_install_failure(true);
        let backend = select_and_install_with(
            TracingBackendKind::Auto,
            &AlwaysSupports,
            true,
            noop_callback(),
            &telemetry,
            failing,
        )
        .unwrap();
        assert_eq!(backend.name(), "classic");
        assert!(backend.is_active());
        let snap = telemetry.snapshot();
        assert_eq!(snap.reason_counts.auto_integration_failed, 1);
    }

    #[test]
    fn explicit_event_subscription_without_fallback_propagates_error() {
        let telemetry = Arc::new(Telemetry::default());
        let failing = Arc::new(EventSubscriptionBackend::new());
        failing.force_install_failure(true);
        let result = select_and_install_with(
            TracingBackendKind::EventSubscription,
            &AlwaysSupports,
            false,
            noop_callback(),
            &telemetry,
            failing,
        );
        assert!(result.is_err());
        assert_eq!(telemetry.snapshot().reason_counts.integration_failed, 1);
    }

    #[test]
    fn shutdown_leaves_backend_inactive() {
        let backend = ClassicBackend::new();
        backend.install(noop_callback()).unwrap();
        assert!(backend.is_active());
        backend.shutdown();
        assert!(!backend.is_active());
    }
}
