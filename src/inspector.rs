//! inspector.rs — the data-inspection seam (stack traces, variables,
//! expression evaluation for the DAP `evaluate` request, exception details).
//!
//! Per SPEC_FULL §6 this is explicitly a seam, not an implementation: stack
//! and variable introspection require embedder-specific access to the
//! runtime's live call stack, something this crate cannot provide without
//! knowing the concrete runtime it's embedded in. Grounded on the shape of
//! the teacher's `EvalProvider`/`EvalEnv` split in `hook.rs`/`eval.rs` — a
//! narrow trait the embedder implements, with a conservative no-op default
//! the composition root can fall back on.

use crate::condition::{FrameEnv, MapFrameEnv, Value};
use crate::dispatcher::Frame;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrameSummary {
    pub id: u64,
    pub name: String,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSummary {
    pub name: String,
    pub value: Value,
    /// Non-empty if the value itself has children (used to drive the DAP
    /// `variablesReference` lazy-expansion protocol).
    pub has_children: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub message: String,
    pub stack_trace: Option<String>,
}

/// Implemented by the embedder to expose live runtime state for the
/// DAP-facing inspection operations. The dispatcher and condition evaluator
/// never depend on this trait directly; only [`crate::runtime::Runtime`]'s
/// inspection-facing methods do.
pub trait Inspector: Send + Sync {
    fn stack_trace(&self, thread_id: i64) -> Result<Vec<StackFrameSummary>>;

    fn variables(&self, frame_id: u64) -> Result<Vec<VariableSummary>>;

    fn set_variable(&self, frame_id: u64, name: &str, value: Value) -> Result<()>;

    /// Evaluates a free-form expression in the context of `frame_id` for the
    /// DAP `evaluate` request (distinct from [`crate::condition::ConditionEvaluator`],
    /// which only ever evaluates breakpoint conditions).
    fn evaluate(&self, frame_id: u64, expression: &str) -> Result<Value>;

    fn exception_info(&self, thread_id: i64) -> Result<Option<ExceptionInfo>>;

    /// Builds the locals/globals view used to evaluate a breakpoint condition
    /// at `frame`. Default falls back to an empty environment (every name
    /// looks undefined, so conditions fail closed to `passed=true` per
    /// [`crate::condition::ConditionEvaluator`]'s fallback policy); a real
    /// embedder overrides this to reach into the live frame.
    fn frame_env(&self, _frame: &Frame) -> Box<dyn FrameEnv> {
        Box::new(MapFrameEnv { locals: Default::default(), globals: Default::default() })
    }
}

/// Conservative default: reports nothing available rather than guessing.
/// Used when an embedder installs the core without wiring a real inspector
/// (e.g. a headless trace-only deployment that never opens a DAP session).
pub struct NullInspector;

impl Inspector for NullInspector {
    fn stack_trace(&self, _thread_id: i64) -> Result<Vec<StackFrameSummary>> {
        Ok(Vec::new())
    }

    fn variables(&self, _frame_id: u64) -> Result<Vec<VariableSummary>> {
        Ok(Vec::new())
    }

    fn set_variable(&self, _frame_id: u64, _name: &str, _value: Value) -> Result<()> {
        Err(crate::error::CoreError::IncompatibleEnvironment(
            "no inspector installed".into(),
        ))
    }

    fn evaluate(&self, _frame_id: u64, _expression: &str) -> Result<Value> {
        Err(crate::error::CoreError::IncompatibleEnvironment(
            "no inspector installed".into(),
        ))
    }

    fn exception_info(&self, _thread_id: i64) -> Result<Option<ExceptionInfo>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_inspector_reports_nothing_available() {
        let inspector = NullInspector;
        assert!(inspector.stack_trace(1).unwrap().is_empty());
        assert!(inspector.variables(1).unwrap().is_empty());
        assert!(inspector.exception_info(1).unwrap().is_none());
        assert!(inspector.evaluate(1, "x").is_err());
    }
}
