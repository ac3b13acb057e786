//! dispatcher.rs — the hot-path gate: `dispatch(frame, event, arg)`.
//!
//! Grounded on `dapper/_frame_eval/selective_tracer.py`'s
//! `FrameTraceAnalyzer.should_trace_frame` (the six-branch gate algorithm) and
//! `SelectiveTraceDispatcher`/`FrameTraceManager` (enable/disable, breakpoint
//! mutators, statistics). The file-trackability deny-list mirrors
//! `_should_track_file`; the function line-range fallback mirrors
//! `_estimate_function_end`'s `co_firstlineno + 100`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::breakpoint::BreakpointSet;
use crate::cache::breakpoints::BreakpointCache;
use crate::cache::code_info::{CodeObjectHandle, FuncCodeInfo, FuncCodeInfoCache};
use crate::cache::thread_local::{self, StepMode};
use crate::telemetry::{ReasonCode, Telemetry};

/// Kind of trace event delivered by the runtime hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Call,
    Line,
    Return,
    Exception,
}

/// A single stack frame as seen at the moment of a trace event. Constructed
/// by the embedder (or the tracing backend on its behalf); the dispatcher
/// never allocates one itself.
#[derive(Debug, Clone)]
pub struct Frame {
    pub file: String,
    pub function: String,
    pub line: u32,
    pub is_module: bool,
    /// Identity handle for the code-info cache; `None` for synthetic frames.
    pub code: Option<CodeObjectHandle>,
    pub first_line: u32,
    /// Disassembly-derived last line of the function, when available.
    pub last_line_hint: Option<u32>,
}

/// The gate's stable, telemetry-observable reason for its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    ThreadSkipFrame,
    NoBreakpointsInFile,
    FileNotTracked,
    BreakpointOnLine,
    FunctionHasBreakpoints,
    NoBreakpointsInFunction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub file: String,
    pub function: String,
    pub line: u32,
    pub is_module: bool,
}

#[derive(Debug, Clone)]
pub struct TraceDecision {
    pub should_trace: bool,
    pub reason: DecisionReason,
    pub breakpoint_lines: BreakpointSet,
    pub frame_info: FrameInfo,
}

/// The single method a downstream debugger implements to receive traced
/// events. The core never knows the concrete debugger type (spec.md §9).
pub trait OnTrace: Send + Sync {
    fn on_trace(&self, frame: &Frame, event: EventKind, arg: Option<&str>);
}

impl<F> OnTrace for F
where
    F: Fn(&Frame, EventKind, Option<&str>) + Send + Sync,
{
    fn on_trace(&self, frame: &Frame, event: EventKind, arg: Option<&str>) {
        self(frame, event, arg)
    }
}

pub type TraceCallback = Arc<dyn OnTrace>;

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchStatistics {
    pub total_calls: u64,
    pub dispatched: u64,
    pub skipped: u64,
}

impl DispatchStatistics {
    pub fn skip_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.skipped as f64 / self.total_calls as f64
        }
    }
}

/// Path substrings that mark a file as untrackable: system libraries,
/// generated/synthetic sources, and this crate's own source tree.
const UNTRACKABLE_SUBSTRINGS: &[&str] =
    &["<", "site-packages/", "importlib", "/lib/python", "Lib/", "frame_tracer/src/"];

/// Is `path` a file we could ever meaningfully set a breakpoint in? Pure
/// function of the string, safe to call on the hot path and safe to cache.
pub fn is_trackable_file(path: &str) -> bool {
    !UNTRACKABLE_SUBSTRINGS.iter().any(|needle| path.contains(needle))
}

/// The hot-path gate. For each frame event, decides `trace` vs `skip`.
pub struct SelectiveTraceDispatcher {
    enabled: AtomicBool,
    downstream: Mutex<Option<TraceCallback>>,
    breakpoint_cache: Arc<BreakpointCache>,
    code_info_cache: Arc<FuncCodeInfoCache>,
    telemetry: Arc<Telemetry>,
    total_calls: AtomicU64,
    dispatched: AtomicU64,
    skipped: AtomicU64,
}

impl SelectiveTraceDispatcher {
    pub fn new(
        breakpoint_cache: Arc<BreakpointCache>,
        code_info_cache: Arc<FuncCodeInfoCache>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            downstream: Mutex::new(None),
            breakpoint_cache,
            code_info_cache,
            telemetry,
            total_calls: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Installs the downstream callback and re-enables the gate.
    pub fn enable(&self, downstream: TraceCallback) {
        *self.downstream.lock() = Some(downstream);
        self.enabled.store(true, Ordering::Release);
    }

    /// Disables the gate; `dispatch` returns `None` immediately until the
    /// next `enable`.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Never blocks on I/O, never allocates on the common skip path.
    pub fn dispatch(&self, frame: Option<&Frame>, event: EventKind, arg: Option<&str>) -> Option<TraceCallback> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let Some(frame) = frame else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if !self.enabled.load(Ordering::Acquire) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        // Clone the Arc and drop the lock immediately: the hot path must
        // never hold a lock while invoking the downstream callback.
        let downstream = { self.downstream.lock().clone() };
        let Some(downstream) = downstream else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let decision = self.decide(frame);
        if !decision.should_trace {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| downstream.on_trace(frame, event, arg)));
        match outcome {
            Ok(()) => Some(downstream),
            Err(_) => {
                self.telemetry.record(ReasonCode::SelectiveTracingAnalysisFailed);
                None
            }
        }
    }

    fn decide(&self, frame: &Frame) -> TraceDecision {
        let frame_info = FrameInfo {
            file: frame.file.clone(),
            function: frame.function.clone(),
            line: frame.line,
            is_module: frame.is_module,
        };

        if thread_local::skip_all_frames() {
            return TraceDecision {
                should_trace: false,
                reason: DecisionReason::ThreadSkipFrame,
                breakpoint_lines: BreakpointSet::new(),
                frame_info,
            };
        }

        // A code object we've already analyzed skips straight to the
        // line/step check instead of re-deriving the function's breakpoint
        // membership from the breakpoint cache and recomputing its line range.
        if let Some(code) = &frame.code {
            if let Some(info) = self.code_info_cache.get(code) {
                return self.decide_from_cached_info(frame, frame_info, info);
            }
        }

        let breakpoints = self.breakpoint_cache.get(&frame.file).unwrap_or_default();

        if breakpoints.is_empty() {
            let reason = if is_trackable_file(&frame.file) {
                DecisionReason::NoBreakpointsInFile
            } else {
                DecisionReason::FileNotTracked
            };
            self.remember(frame, &frame.file, false, breakpoints.clone());
            return TraceDecision { should_trace: false, reason, breakpoint_lines: breakpoints, frame_info };
        }

        let (start, end) = function_line_range(frame);
        let breakpoint_found = breakpoints.intersects_range(start, end);
        self.remember(frame, &frame.file, breakpoint_found, breakpoints.clone());

        if breakpoints.contains(frame.line) {
            return TraceDecision {
                should_trace: true,
                reason: DecisionReason::BreakpointOnLine,
                breakpoint_lines: breakpoints,
                frame_info,
            };
        }

        if thread_local::step_mode() != StepMode::None && breakpoint_found {
            return TraceDecision {
                should_trace: true,
                reason: DecisionReason::FunctionHasBreakpoints,
                breakpoint_lines: breakpoints,
                frame_info,
            };
        }

        TraceDecision {
            should_trace: false,
            reason: DecisionReason::NoBreakpointsInFunction,
            breakpoint_lines: breakpoints,
            frame_info,
        }
    }

    /// Reuses a cached [`FuncCodeInfo`] record instead of re-querying the
    /// breakpoint cache: `always_skip` answers the whole-function question in
    /// one branch, and the exact line membership still comes from the
    /// record's own `breakpoint_lines` snapshot.
    fn decide_from_cached_info(&self, frame: &Frame, frame_info: FrameInfo, info: FuncCodeInfo) -> TraceDecision {
        if info.breakpoint_lines.contains(frame.line) {
            return TraceDecision {
                should_trace: true,
                reason: DecisionReason::BreakpointOnLine,
                breakpoint_lines: info.breakpoint_lines,
                frame_info,
            };
        }
        if !info.always_skip && thread_local::step_mode() != StepMode::None && info.breakpoint_found {
            return TraceDecision {
                should_trace: true,
                reason: DecisionReason::FunctionHasBreakpoints,
                breakpoint_lines: info.breakpoint_lines,
                frame_info,
            };
        }
        let reason = if info.breakpoint_lines.is_empty() && !is_trackable_file(&frame.file) {
            DecisionReason::FileNotTracked
        } else if info.breakpoint_lines.is_empty() {
            DecisionReason::NoBreakpointsInFile
        } else {
            DecisionReason::NoBreakpointsInFunction
        };
        TraceDecision { should_trace: false, reason, breakpoint_lines: info.breakpoint_lines, frame_info }
    }

    /// Populates (or refreshes) the per-code-object analysis record for this
    /// frame's code object, so the next dispatch for the same function takes
    /// the cached-info fast path above instead of hitting the breakpoint
    /// cache again.
    fn remember(&self, frame: &Frame, file: &str, breakpoint_found: bool, breakpoint_lines: BreakpointSet) {
        let Some(code) = &frame.code else { return };
        self.code_info_cache.set(
            code,
            FuncCodeInfo {
                file: file.to_string(),
                always_skip: !breakpoint_found,
                breakpoint_found,
                breakpoint_lines,
                last_check: Instant::now(),
            },
        );
    }

    /// Installs a new breakpoint set for `file`, invalidating any cached
    /// `FuncCodeInfo` whose file matches — otherwise a code object analyzed
    /// before this update would keep answering from its stale record.
    pub fn update_breakpoints(&self, file: impl Into<String>, set: BreakpointSet) {
        let file = file.into();
        self.code_info_cache.invalidate_file(&file);
        self.breakpoint_cache.set(file, set);
    }

    pub fn add_breakpoint(&self, file: &str, line: u32) {
        let mut set = self.breakpoint_cache.get(file).unwrap_or_default();
        set.insert(line);
        self.update_breakpoints(file.to_string(), set);
    }

    pub fn remove_breakpoint(&self, file: &str, line: u32) {
        let mut set = self.breakpoint_cache.get(file).unwrap_or_default();
        set.remove(line);
        self.update_breakpoints(file.to_string(), set);
    }

    pub fn clear_breakpoints(&self, file: Option<&str>) {
        match file {
            Some(f) => self.update_breakpoints(f.to_string(), BreakpointSet::new()),
            None => {
                // No per-file enumeration API on the cache by design (files
                // are evicted lazily by LRU/mtime); a full clear is a host
                // operation, not a hot-path one, so callers clear known files.
            }
        }
    }

    pub fn statistics(&self) -> DispatchStatistics {
        DispatchStatistics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Obtain the function's line range for the "does step-mode care about this
/// function" check: prefer the disassembly-derived last line, falling back to
/// `first_line + 100` (never under-traces; may over-trace).
fn function_line_range(frame: &Frame) -> (u32, u32) {
    let end = frame.last_line_hint.unwrap_or_else(|| frame.first_line.saturating_add(100));
    (frame.first_line, end)
}
