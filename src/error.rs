//! error.rs — the crate's single error type for setup/config-time failures.
//!
//! Dispatch-time and cache-integrity failures are *not* represented here: per
//! the error handling design, those are caught at the boundary and converted
//! into telemetry + a conservative decision. They never reach an `Err`.

use thiserror::Error;

/// Errors surfaced by explicitly user-triggered operations (setup, breakpoint
/// registration, backend installation). Never constructed on the hot path.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported tracing backend selection: {0:?}")]
    UnsupportedBackend(crate::config::TracingBackendKind),

    #[error("runtime environment is incompatible: {0}")]
    IncompatibleEnvironment(String),

    #[error("source file not found: {0}")]
    SourceNotFound(String),

    #[error("breakpoint line out of range: {file}:{line}")]
    LineOutOfRange { file: String, line: u32 },

    #[error("failed to compile condition expression: {0}")]
    ConditionCompile(String),

    #[error("backend installation failed: {0}")]
    BackendInstall(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
