//! A selective trace-callback gating engine for embedding a debugger into a
//! managed-language runtime.
//!
//! The core problem this crate solves: a runtime's per-frame trace hook is
//! the hottest path in the system once a debugger attaches, and the large
//! majority of frames it sees have nothing to do with where the user set a
//! breakpoint. [`dispatcher::SelectiveTraceDispatcher`] is the gate that
//! decides, in the common case without allocating, whether a frame event is
//! worth handing to the debugger at all. Everything else in this crate exists
//! to keep that gate fast and correct: bounded caches
//! ([`cache::code_info`], [`cache::breakpoints`]) so the gate never
//! re-derives the same answer twice, a budgeted condition evaluator
//! ([`condition`]) for conditional breakpoints, a backend seam
//! ([`backend`]) over whatever tracing API the host runtime exposes, and a
//! composition root ([`runtime::Runtime`]) that wires it all together behind
//! the DAP-shaped operation table a debug adapter expects.
//!
//! Dependency order: [`compat`] -> [`cache`] -> [`condition`] ->
//! [`dispatcher`] -> [`backend`] -> [`runtime`].

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend;
pub mod breakpoint;
pub mod cache;
pub mod compat;
pub mod condition;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod inspector;
pub mod runtime;
pub mod telemetry;

pub use config::{Config, TracingBackendKind};
pub use dispatcher::{EventKind, Frame, SelectiveTraceDispatcher};
pub use error::{CoreError, Result};
pub use runtime::Runtime;
pub use telemetry::{ReasonCode, TelemetrySnapshot};
