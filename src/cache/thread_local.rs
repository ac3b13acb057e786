//! cache/thread_local.rs — per-thread dispatcher state.
//!
//! Grounded on spec.md §3/§4.2's `ThreadInfo` (narrower than the teacher's
//! DAP-state-mirror `ThreadInfo` in `crates/vitte-debugger/src/state.rs`,
//! which tracks frames/variables/scopes — out of scope here). Never shared,
//! never locked: each OS thread owns exactly one instance, created lazily on
//! first access and dropped at thread exit.

use std::cell::RefCell;
use std::time::Instant;

/// Per-thread step-mode request, mirrored by `TracingBackend::set_stepping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    None,
    StepIn,
    StepOver,
    StepOut,
}

impl Default for StepMode {
    fn default() -> Self {
        StepMode::None
    }
}

#[derive(Debug, Clone)]
pub struct ThreadInfo {
    /// Re-entrancy depth of the trace hook on this thread.
    pub inside_trace_depth: u32,
    /// Whether this thread's per-thread setup (e.g. registering with the
    /// backend) has completed.
    pub fully_initialized: bool,
    /// True for the debugger's own worker threads — always skipped.
    pub is_debugger_thread: bool,
    /// Hard override: skip every frame on this thread regardless of breakpoints.
    pub skip_all_frames: bool,
    pub step_mode: StepMode,
    /// Call-stack depth as tracked by the dispatcher, used for step-over/out.
    pub recursion_depth: u32,
    pub last_activity: Instant,
}

impl Default for ThreadInfo {
    fn default() -> Self {
        Self {
            inside_trace_depth: 0,
            fully_initialized: false,
            is_debugger_thread: false,
            skip_all_frames: false,
            step_mode: StepMode::None,
            recursion_depth: 0,
            last_activity: Instant::now(),
        }
    }
}

thread_local! {
    static THREAD_INFO: RefCell<ThreadInfo> = RefCell::new(ThreadInfo::default());
}

/// Runs `f` with exclusive access to the calling thread's [`ThreadInfo`],
/// creating it lazily on first access. No lock is ever taken.
pub fn with_thread_info<R>(f: impl FnOnce(&mut ThreadInfo) -> R) -> R {
    THREAD_INFO.with(|cell| {
        let mut info = cell.borrow_mut();
        info.last_activity = Instant::now();
        f(&mut info)
    })
}

pub fn skip_all_frames() -> bool {
    with_thread_info(|info| info.skip_all_frames)
}

pub fn set_skip_all_frames(skip: bool) {
    with_thread_info(|info| info.skip_all_frames = skip);
}

pub fn step_mode() -> StepMode {
    with_thread_info(|info| info.step_mode)
}

pub fn set_step_mode(mode: StepMode) {
    with_thread_info(|info| info.step_mode = mode);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_untraced_and_unstepped() {
        assert!(!skip_all_frames());
        assert_eq!(step_mode(), StepMode::None);
    }

    #[test]
    fn mutations_are_visible_within_the_same_thread() {
        set_skip_all_frames(true);
        assert!(skip_all_frames());
        set_skip_all_frames(false);

        set_step_mode(StepMode::StepOver);
        assert_eq!(step_mode(), StepMode::StepOver);
        set_step_mode(StepMode::None);
    }

    #[test]
    fn each_thread_gets_its_own_instance() {
        set_skip_all_frames(true);
        let handle = std::thread::spawn(|| skip_all_frames());
        let other_thread_saw = handle.join().unwrap();
        assert!(!other_thread_saw);
        set_skip_all_frames(false);
    }
}
