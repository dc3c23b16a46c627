#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Execution
//!
//! Event-sourced execution state for the Cascade workflow engine.
//!
//! This crate models execution-time concepts — it does NOT contain the engine
//! orchestrator. It defines:
//!
//! - [`ExecutionPhase`] — execution-level state machine
//! - [`ExecutionEvent`] — the sequenced, append-only log entry
//! - [`ExecutionState`] — the aggregate whose [`apply_event`] is the single
//!   reducer used by both live mutation and replay
//! - [`ExecutionPlan`] — pre-computed parallel execution schedule
//! - [`ExecutionContext`] — runtime context with shared state and cancellation
//! - [`VariableSet`] — ordered variables with read-only marking
//! - Transition tables validated by the [`transition`] module
//!
//! [`apply_event`]: ExecutionState::apply_event

pub mod context;
pub mod error;
pub mod event;
pub mod phase;
pub mod plan;
pub mod state;
pub mod transition;
pub mod variables;

pub use context::ExecutionContext;
pub use error::ExecutionError;
pub use event::{EventKind, EventType, ExecutionEvent};
pub use phase::ExecutionPhase;
pub use plan::ExecutionPlan;
pub use state::{ExecutionState, NodeExecutionState};
pub use variables::VariableSet;
