//! runtime.rs — the composition root: wires `CompatibilityPolicy` → caches →
//! `ConditionEvaluator` → `SelectiveTraceDispatcher` → `TracingBackend` into
//! one object, and exposes the DAP-facing operation table from spec.md §6.
//!
//! Grounded on the teacher's top-level `Debugger`/session-composition style
//! in `crates/vitte-debugger/src/lib.rs` and `state.rs` (one struct owning
//! every subsystem, DAP-shaped methods delegating to them), adapted to this
//! crate's trace-callback-core scope: no wire protocol, only the operations a
//! DAP adapter would call into.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{self, BackendCapabilityProbe, NoEventSubscriptionProbe, TracingBackend};
use crate::breakpoint::{BreakAction, BreakpointRegistry, BreakpointRequest, VerifiedBreakpoint};
use crate::cache::breakpoints::BreakpointCache;
use crate::cache::code_info::FuncCodeInfoCache;
use crate::cache::thread_local::{self, StepMode};
use crate::cache::CleanupResults;
use crate::compat::CompatibilityPolicy;
use crate::condition::ConditionEvaluator;
use crate::config::Config;
use crate::dispatcher::{DispatchStatistics, EventKind, Frame, OnTrace, SelectiveTraceDispatcher};
use crate::error::Result;
use crate::inspector::{ExceptionInfo, Inspector, NullInspector, StackFrameSummary, VariableSummary};
use crate::telemetry::{Telemetry, TelemetrySnapshot};

/// Callback surface the embedder receives events through — the runtime-facing
/// half of the DAP event stream (`stopped`, `thread`, `output`, `exited`).
pub trait RuntimeCallbacks: Send + Sync {
    fn on_stopped(&self, thread_id: i64, reason: &str, breakpoint_id: Option<u64>);
    fn on_thread(&self, thread_id: i64, started: bool);
    fn on_output(&self, category: &str, text: &str);
    fn on_exited(&self, exit_code: i32);
}

/// No-op callback sink, used when the embedder hasn't wired DAP events yet.
pub struct NullCallbacks;

impl RuntimeCallbacks for NullCallbacks {
    fn on_stopped(&self, _thread_id: i64, _reason: &str, _breakpoint_id: Option<u64>) {}
    fn on_thread(&self, _thread_id: i64, _started: bool) {}
    fn on_output(&self, _category: &str, _text: &str) {}
    fn on_exited(&self, _exit_code: i32) {}
}

/// The fine-grained trace sink installed into the dispatcher. The dispatcher
/// has already decided "this frame is worth looking at closely"; this is
/// where the actual breakpoint condition/hit-condition/logpoint decision
/// happens, and where the embedder's callbacks finally get invoked.
struct RuntimeTraceSink {
    breakpoints: Mutex<BreakpointRegistry>,
    condition_evaluator: Arc<ConditionEvaluator>,
    inspector: Arc<dyn Inspector>,
    callbacks: Mutex<Arc<dyn RuntimeCallbacks>>,
    current_thread: AtomicI64,
}

impl OnTrace for RuntimeTraceSink {
    fn on_trace(&self, frame: &Frame, event: EventKind, _arg: Option<&str>) {
        if event != EventKind::Line && event != EventKind::Call {
            return;
        }
        let thread_id = self.current_thread.load(Ordering::Relaxed);
        let env = self.inspector.frame_env(frame);
        let condition_evaluator = &self.condition_evaluator;
        let action = self.breakpoints.lock().should_break(&frame.file, frame.line, |cond_text| {
            condition_evaluator.evaluate(cond_text, env.as_ref()).passed
        });
        match action {
            BreakAction::Stop(id) => {
                self.callbacks.lock().on_stopped(thread_id, "breakpoint", Some(id));
            }
            BreakAction::Log(_, message) => {
                self.callbacks.lock().on_output("console", &message);
            }
            BreakAction::None => {}
        }
    }
}

/// Owns every subsystem and exposes the DAP-facing operation table.
pub struct Runtime {
    config: Config,
    telemetry: Arc<Telemetry>,
    compat: CompatibilityPolicy,
    code_info_cache: Arc<FuncCodeInfoCache>,
    breakpoint_cache: Arc<BreakpointCache>,
    condition_evaluator: Arc<ConditionEvaluator>,
    dispatcher: Arc<SelectiveTraceDispatcher>,
    trace_sink: Arc<RuntimeTraceSink>,
    backend: Mutex<Option<Arc<dyn TracingBackend>>>,
}

impl Runtime {
    /// Builds every subsystem from `config` without installing a backend.
    /// Call [`Runtime::install`] to hook the runtime's trace events.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_inspector_and_callbacks(config, Arc::new(NullInspector), Arc::new(NullCallbacks))
    }

    pub fn with_inspector_and_callbacks(
        config: Config,
        inspector: Arc<dyn Inspector>,
        callbacks: Arc<dyn RuntimeCallbacks>,
    ) -> Result<Self> {
        config.validate()?;
        let telemetry = Arc::new(Telemetry::new(config.telemetry_ring_capacity));
        let code_info_cache = Arc::new(FuncCodeInfoCache::new(config.cache_size, config.cache_ttl));
        let breakpoint_cache = Arc::new(BreakpointCache::new(config.breakpoint_cache_size));
        let condition_evaluator = Arc::new(ConditionEvaluator::new(
            config.conditional_breakpoints_enabled,
            config.condition_budget,
            telemetry.clone(),
        ));
        let dispatcher = Arc::new(SelectiveTraceDispatcher::new(
            breakpoint_cache.clone(),
            code_info_cache.clone(),
            telemetry.clone(),
        ));
        let trace_sink = Arc::new(RuntimeTraceSink {
            breakpoints: Mutex::new(BreakpointRegistry::new()),
            condition_evaluator: condition_evaluator.clone(),
            inspector,
            callbacks: Mutex::new(callbacks),
            current_thread: AtomicI64::new(0),
        });

        Ok(Self {
            compat: CompatibilityPolicy::default(),
            config,
            telemetry,
            code_info_cache,
            breakpoint_cache,
            condition_evaluator,
            dispatcher,
            trace_sink,
            backend: Mutex::new(None),
        })
    }

    pub fn compat_mut(&mut self) -> &mut CompatibilityPolicy {
        &mut self.compat
    }

    pub fn compat(&self) -> &CompatibilityPolicy {
        &self.compat
    }

    /// Selects and installs a tracing backend, wiring it through the
    /// dispatcher's gate to [`RuntimeTraceSink`]. Returns the installed
    /// backend's stable name (`"classic"` or `"event_subscription"`).
    pub fn install(&self, probe: &dyn BackendCapabilityProbe) -> Result<&'static str> {
        if !self.config.enabled {
            return Err(crate::error::CoreError::InvalidConfig("core is disabled".into()));
        }
        self.dispatcher.enable(self.trace_sink.clone());

        let dispatcher = self.dispatcher.clone();
        let bridge: Arc<dyn OnTrace> = Arc::new(move |frame: &Frame, event: EventKind, arg: Option<&str>| {
            dispatcher.dispatch(Some(frame), event, arg);
        });

        let installed = backend::select_and_install(
            self.config.tracing_backend,
            probe,
            self.config.fallback_to_classic_tracing,
            bridge,
            &self.telemetry,
        )?;
        let name = installed.name();
        *self.backend.lock() = Some(installed);
        Ok(name)
    }

    /// Installs with the default "no event-subscription support" probe, for
    /// embedders that only ever want the classic backend.
    pub fn install_classic_only(&self) -> Result<&'static str> {
        self.install(&NoEventSubscriptionProbe)
    }

    pub fn shutdown(&self) {
        self.dispatcher.disable();
        if let Some(backend) = self.backend.lock().take() {
            backend.shutdown();
        }
    }

    /* ------------------------------- DAP operations ------------------------------- */

    pub fn set_breakpoints(&self, file: impl Into<String>, requests: &[BreakpointRequest]) -> Vec<VerifiedBreakpoint> {
        let file = file.into();
        let verified = self.trace_sink.breakpoints.lock().set_breakpoints(file.clone(), requests);
        let line_set = self.trace_sink.breakpoints.lock().line_set(&file);
        // Invalidates the dispatcher's own code-info cache for `file` too.
        self.dispatcher.update_breakpoints(file, line_set);
        verified
    }

    /// Resolves each function name against code objects the dispatcher has
    /// already seen a frame for (via [`FuncCodeInfoCache::resolve_function`])
    /// and, for every live match, adds a line breakpoint at that function's
    /// first line. A name with no match yet is reported unverified — the
    /// adapter is expected to re-issue `setFunctionBreakpoints` once the
    /// module defining it has actually loaded.
    pub fn set_function_breakpoints(&self, names: &[String]) -> Vec<VerifiedBreakpoint> {
        names
            .iter()
            .map(|name| {
                let Some((file, first_line)) = self.code_info_cache.resolve_function(name).into_iter().next() else {
                    return VerifiedBreakpoint { verified: false, line: 0 };
                };
                let verified = self
                    .trace_sink
                    .breakpoints
                    .lock()
                    .add_breakpoint(file.clone(), &BreakpointRequest { line: first_line, ..Default::default() });
                let line_set = self.trace_sink.breakpoints.lock().line_set(&file);
                self.dispatcher.update_breakpoints(file, line_set);
                verified
            })
            .collect()
    }

    pub fn set_exception_breakpoints(&self, break_on_raise: bool, break_on_uncaught: bool) {
        if let Some(backend) = self.backend.lock().as_ref() {
            backend.set_exception_breakpoints(break_on_raise, break_on_uncaught);
        }
    }

    pub fn continue_(&self, thread_id: i64) {
        self.trace_sink.current_thread.store(thread_id, Ordering::Relaxed);
        thread_local::set_step_mode(StepMode::None);
        thread_local::set_skip_all_frames(false);
    }

    pub fn next(&self, thread_id: i64) {
        self.trace_sink.current_thread.store(thread_id, Ordering::Relaxed);
        thread_local::set_step_mode(StepMode::StepOver);
        if let Some(backend) = self.backend.lock().as_ref() {
            backend.set_stepping(StepMode::StepOver);
        }
    }

    pub fn step_in(&self, thread_id: i64) {
        self.trace_sink.current_thread.store(thread_id, Ordering::Relaxed);
        thread_local::set_step_mode(StepMode::StepIn);
        if let Some(backend) = self.backend.lock().as_ref() {
            backend.set_stepping(StepMode::StepIn);
        }
    }

    pub fn step_out(&self, thread_id: i64) {
        self.trace_sink.current_thread.store(thread_id, Ordering::Relaxed);
        thread_local::set_step_mode(StepMode::StepOut);
        if let Some(backend) = self.backend.lock().as_ref() {
            backend.set_stepping(StepMode::StepOut);
        }
    }

    pub fn remove_breakpoint(&self, file: &str, id: u64) -> bool {
        let removed = self.trace_sink.breakpoints.lock().remove(id);
        let line_set = self.trace_sink.breakpoints.lock().line_set(file);
        self.dispatcher.update_breakpoints(file.to_string(), line_set);
        removed
    }

    pub fn stack_trace(&self, thread_id: i64) -> Result<Vec<StackFrameSummary>> {
        self.trace_sink.inspector.stack_trace(thread_id)
    }

    pub fn variables(&self, frame_id: u64) -> Result<Vec<VariableSummary>> {
        self.trace_sink.inspector.variables(frame_id)
    }

    pub fn exception_info(&self, thread_id: i64) -> Result<Option<ExceptionInfo>> {
        self.trace_sink.inspector.exception_info(thread_id)
    }

    /// Feeds one raw frame event through the dispatcher's gate. The
    /// installed backend calls this internally for every event it receives
    /// from the runtime; embedders driving their own hook loop (or tests)
    /// can call it directly instead of going through a `TracingBackend`.
    pub fn dispatch_event(&self, frame: Option<&Frame>, event: EventKind, arg: Option<&str>) {
        self.dispatcher.dispatch(frame, event, arg);
    }

    pub fn dispatch_statistics(&self) -> DispatchStatistics {
        self.dispatcher.statistics()
    }

    /// Host-driven maintenance sweep over both caches. Never called from the
    /// dispatch hot path — an embedder runs this on its own schedule (e.g. a
    /// periodic GC tick) the way the original `CacheManager.cleanup_expired()`
    /// swept both its caches in one combined call.
    pub fn cleanup_caches(&self) -> CleanupResults {
        CleanupResults {
            func_code_expired: self.code_info_cache.cleanup_expired(),
            breakpoint_files: self.breakpoint_cache.cleanup_stale(),
        }
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::BreakpointRequest;
    use crate::dispatcher::Frame;
    use std::sync::atomic::AtomicUsize;

    struct CountingCallbacks {
        stops: AtomicUsize,
    }
    impl RuntimeCallbacks for CountingCallbacks {
        fn on_stopped(&self, _thread_id: i64, _reason: &str, _breakpoint_id: Option<u64>) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        fn on_thread(&self, _thread_id: i64, _started: bool) {}
        fn on_output(&self, _category: &str, _text: &str) {}
        fn on_exited(&self, _exit_code: i32) {}
    }

    fn frame(file: &str, line: u32) -> Frame {
        Frame { file: file.into(), function: "f".into(), line, is_module: false, code: None, first_line: 1, last_line_hint: None }
    }

    #[test]
    fn stopping_on_a_real_breakpoint_invokes_callbacks() {
        let callbacks = Arc::new(CountingCallbacks { stops: AtomicUsize::new(0) });
        let rt = Runtime::with_inspector_and_callbacks(Config::default(), Arc::new(NullInspector), callbacks.clone()).unwrap();
        rt.install_classic_only().unwrap();
        rt.set_breakpoints("/a.py", &[BreakpointRequest { line: 10, ..Default::default() }]);

        let f = frame("/a.py", 10);
        rt.dispatch_event(Some(&f), EventKind::Line, None);
        assert_eq!(callbacks.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_breakpoint_never_stops() {
        let callbacks = Arc::new(CountingCallbacks { stops: AtomicUsize::new(0) });
        let rt = Runtime::with_inspector_and_callbacks(Config::default(), Arc::new(NullInspector), callbacks.clone()).unwrap();
        rt.install_classic_only().unwrap();
        let f = frame("/a.py", 10);
        rt.dispatch_event(Some(&f), EventKind::Line, None);
        assert_eq!(callbacks.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_disables_dispatch() {
        let rt = Runtime::new(Config::default()).unwrap();
        rt.install_classic_only().unwrap();
        rt.set_breakpoints("/a.py", &[BreakpointRequest { line: 1, ..Default::default() }]);
        rt.shutdown();
        let f = frame("/a.py", 1);
        rt.dispatch_event(Some(&f), EventKind::Line, None);
        assert_eq!(rt.dispatch_statistics().dispatched, 0);
    }

    #[test]
    fn invalid_config_is_rejected_before_any_subsystem_is_built() {
        let mut config = Config::default();
        config.cache_size = 0;
        assert!(Runtime::new(config).is_err());
    }

    #[test]
    fn function_breakpoint_resolves_once_the_code_object_has_been_seen() {
        use crate::cache::code_info::CodeObjectInner;

        let callbacks = Arc::new(CountingCallbacks { stops: AtomicUsize::new(0) });
        let rt = Runtime::with_inspector_and_callbacks(Config::default(), Arc::new(NullInspector), callbacks.clone()).unwrap();
        rt.install_classic_only().unwrap();

        // Unresolved before any frame from this function has been seen.
        let unresolved = rt.set_function_breakpoints(&["handle_request".to_string()]);
        assert_eq!(unresolved, vec![VerifiedBreakpoint { verified: false, line: 0 }]);

        let code = Arc::new(CodeObjectInner { file: "/app.py".into(), function: "handle_request".into(), first_line: 40 });
        let seen = Frame {
            file: "/app.py".into(),
            function: "handle_request".into(),
            line: 40,
            is_module: false,
            code: Some(code),
            first_line: 40,
            last_line_hint: Some(60),
        };
        rt.dispatch_event(Some(&seen), EventKind::Call, None);

        let resolved = rt.set_function_breakpoints(&["handle_request".to_string()]);
        assert_eq!(resolved, vec![VerifiedBreakpoint { verified: true, line: 40 }]);

        rt.dispatch_event(Some(&seen), EventKind::Line, None);
        assert_eq!(callbacks.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_caches_reports_combined_sweep_counts() {
        let rt = Runtime::new(Config::default()).unwrap();
        let empty = rt.cleanup_caches();
        assert_eq!(empty.func_code_expired, 0);
        assert_eq!(empty.breakpoint_files, 0);
    }
}
