//! backend/classic.rs — the widely-supported fallback backend: a single
//! global trace function receiving every call/line/return/exception event,
//! filtered entirely by the dispatcher's gate.
//!
//! Grounded on the teacher's `HookRegistry`/`DefaultVmHook` install pattern in
//! `hook.rs` (register once, hold an `Arc`, unregister idempotently), adapted
//! from a multicast hook registry to a single-slot backend since spec.md's
//! dispatcher is the only thing a backend ever drives.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::breakpoint::BreakpointSet;
use crate::cache::thread_local::StepMode;
use crate::dispatcher::TraceCallback;
use crate::error::Result;

use super::{BackendStatistics, TracingBackend};

/// The classic global-trace-function backend. Always installable; this is
/// the backend `Auto` falls back to when event subscription isn't available
/// or fails to install.
pub struct ClassicBackend {
    active: AtomicBool,
    callback: Mutex<Option<TraceCallback>>,
    events_delivered: AtomicU64,
    install_failures: AtomicU64,
}

impl ClassicBackend {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            callback: Mutex::new(None),
            events_delivered: AtomicU64::new(0),
            install_failures: AtomicU64::new(0),
        }
    }

    /// Simulates the runtime delivering one trace event through this
    /// backend, for tests and for embedders wiring their own event source.
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

impl Default for ClassicBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TracingBackend for ClassicBackend {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn install(&self, callback: TraceCallback) -> Result<()> {
        *self.callback.lock() = Some(callback);
        self.active.store(true, Ordering::Release);
        #[cfg(feature = "trace")]
        log::info!("classic backend installed");
        Ok(())
    }

    fn shutdown(&self) {
        self.active.store(false, Ordering::Release);
        *self.callback.lock() = None;
    }

    fn update_breakpoints(&self, _file: &str, _lines: BreakpointSet) {
        // The classic backend has no breakpoint state of its own: the
        // dispatcher's caches are the single source of truth, reached
        // directly by the runtime composition root.
    }

    fn set_stepping(&self, _mode: StepMode) {}

    fn set_exception_breakpoints(&self, _break_on_raise: bool, _break_on_uncaught: bool) {}

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
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn frame() -> Frame {
        Frame { file: "/a.py".into(), function: "f".into(), line: 1, is_module: false, code: None, first_line: 1, last_line_hint: None }
    }

    #[test]
    fn install_then_deliver_invokes_callback() {
        let backend = ClassicBackend::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        backend.install(Arc::new(move |_: &Frame, _: EventKind, _: Option<&str>| {
            calls2.fetch_add(1, Ordering::SeqCst);
        })).unwrap();
        backend.deliver(&frame(), EventKind::Line, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.statistics().events_delivered, 1);
    }

    #[test]
    fn shutdown_stops_delivery() {
        let backend = ClassicBackend::new();
        backend.install(Arc::new(|_: &Frame, _: EventKind, _: Option<&str>| {})).unwrap();
        backend.shutdown();
        backend.deliver(&frame(), EventKind::Line, None);
        assert_eq!(backend.statistics().events_delivered, 0);
        assert!(!backend.is_active());
    }

    #[test]
    fn two_cycles_of_install_then_shutdown_each_leave_the_backend_inactive() {
        let backend = ClassicBackend::new();

        backend.install(Arc::new(|_: &Frame, _: EventKind, _: Option<&str>| {})).unwrap();
        assert!(backend.is_active());
        backend.shutdown();
        assert!(!backend.is_active());

        backend.install(Arc::new(|_: &Frame, _: EventKind, _: Option<&str>| {})).unwrap();
        assert!(backend.is_active());
        backend.shutdown();
        assert!(!backend.is_active());
    }
}
