//! backend/event_subscription.rs — the opt-in backend for runtimes exposing a
//! scoped, per-event subscription API (install only the events currently
//! needed, rather than one global trace function for everything).
//!
//! Grounded on spec.md §4.4's `EventSubscription` variant and the capability
//! gate in `CompatibilityPolicy::supports_event_subscription_api`
//! ([`crate::compat`]); install can fail if the host runtime advertises
//! support but the subscription call itself rejects it (simulated here via
//! `force_install_failure`, exercised by the backend-fallback test scenario).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::breakpoint::BreakpointSet;
use crate::cache::thread_local::StepMode;
use crate::dispatcher::TraceCallback;
use crate::error::{CoreError, Result};

use super::{BackendStatistics, TracingBackend};

#[derive(Debug, Default, Clone, Copy)]
struct ExceptionFlags {
    break_on_raise: bool,
    break_on_uncaught: bool,
}

/// The event-subscription backend. Tracks its own subscribed-event state
/// (stepping mode, exception flags) since, unlike the classic backend, a
/// real implementation would need to tell the runtime exactly which event
/// kinds to re-enable after a breakpoint set changes.
pub struct EventSubscriptionBackend {
    active: AtomicBool,
    callback: Mutex<Option<TraceCallback>>,
    stepping: Mutex<StepMode>,
    exceptions: Mutex<ExceptionFlags>,
    events_delivered: AtomicU64,
    install_failures: AtomicU64,
    force_install_failure: AtomicBool,
}

impl EventSubscriptionBackend {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            callback: Mutex::new(None),
            stepping: Mutex::new(StepMode::None),
            exceptions: Mutex::new(ExceptionFlags::default()),
            events_delivered: AtomicU64::new(0),
            install_failures: AtomicU64::new(0),
            force_install_failure: AtomicBool::new(false),
        }
    }

    /// Test/diagnostic hook: makes the next `install` call fail, simulating a
    /// runtime that advertises event-subscription support but rejects the
    /// actual subscribe call (e.g. already subscribed by another tool).
    pub fn force_install_failure(&self, fail: bool) {
        self.force_install_failure.store(fail, Ordering::Release);
    }

    pub fn deliver(&self, frame: &crate::dispatcher::Frame, event: crate::dispatcher::EventKind, arg: Option<&str>) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }
        if let Some(cb) = self.callback.lock().clone() {
            cb.on_trace(frame, event, arg);
            self.events_delivered.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for EventSubscriptionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingBackend for EventSubscriptionBackend {
    fn name(&self) -> &'static str {
        "event_subscription"
    }

    fn install(&self, callback: TraceCallback) -> Result<()> {
        if self.force_install_failure.load(Ordering::Acquire) {
            self.install_failures.fetch_add(1, Ordering::Relaxed);
            return Err(CoreError::BackendInstall(
                "runtime rejected event-subscription install".into(),
            ));
        }
        *self.callback.lock() = Some(callback);
        self.active.store(true, Ordering::Release);
        #[cfg(feature = "trace")]
        log::info!("event-subscription backend installed");
        Ok(())
    }

    fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        *self.callback.lock() = None;
    }

    fn update_breakpoints(&self, _file: &str, _lines: BreakpointSet) {
        // Dispatcher caches remain the source of truth; nothing to re-subscribe
        // here since line/call events stay enabled for the whole session.
    }

    fn set_stepping(&self, mode: StepMode) {
        *self.stepping.lock() = mode;
    }

    fn set_exception_breakpoints(&self, break_on_raise: bool, break_on_uncaught: bool) {
        *self.exceptions.lock() = ExceptionFlags { break_on_raise, break_on_uncaught };
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn statistics(&self) -> BackendStatistics {
        BackendStatistics {
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            install_failures: self.install_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{EventKind, Frame};
    use std::sync::Arc;

    fn frame() -> Frame {
        Frame { file: "/a.py".into(), function: "f".into(), line: 1, is_module: false, code: None, first_line: 1, last_line_hint: None }
    }

    #[test]
    fn stepping_and_exception_flags_are_recorded() {
        let backend = EventSubscriptionBackend::new();
        backend.install(Arc::new(|_: &Frame, _: EventKind, _: Option<&str>| {})).unwrap();
        backend.set_stepping(StepMode::StepIn);
        backend.set_exception_breakpoints(true, false);
        assert_eq!(*backend.stepping.lock(), StepMode::StepIn);
        assert!(backend.exceptions.lock().break_on_raise);
        assert!(!backend.exceptions.lock().break_on_uncaught);
    }

    #[test]
    fn forced_failure_surfaces_as_error() {
        let backend = EventSubscriptionBackend::new();
        backend.force_install_failure(true);
        let result = backend.install(Arc::new(|_: &Frame, _: EventKind, _: Option<&str>| {}));
        assert!(result.is_err());
        assert!(!backend.is_active());
        assert_eq!(backend.statistics().install_failures, 1);
    }

    #[test]
    fn deliver_counts_events() {
        let backend = EventSubscriptionBackend::new();
        backend.install(Arc::new(|_: &Frame, _: EventKind, _: Option<&str>| {})).unwrap();
        backend.deliver(&frame(), EventKind::Call, None);
        backend.deliver(&frame(), EventKind::Return, None);
        assert_eq!(backend.statistics().events_delivered, 2);
    }
}
