#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Engine
//!
//! The workflow execution engine: given a validated [`WorkflowDefinition`],
//! a trigger, and initial variables, it plans a parallel schedule, drives
//! every node through its state machine — binding, templating, retries,
//! circuit breaking, join synchronization — and emits the durable, ordered
//! event stream that fully reconstructs execution state.
//!
//! Entry point: [`WorkflowEngine::execute_workflow`]. The engine consumes
//! an [`EventStore`](cascade_storage::EventStore) for durability, a
//! [`NodeExecutor`] registry for node behavior, and best-effort
//! [`ExecutionObserver`] hooks for visibility.
//!
//! [`WorkflowDefinition`]: cascade_workflow::WorkflowDefinition

pub mod binder;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod join;
pub mod observer;
pub mod scheduler;
pub mod strategy;
pub mod trigger;

pub use binder::VariableBinder;
pub use config::EngineConfig;
pub use engine::{ExecutionReport, WorkflowEngine};
pub use error::EngineError;
pub use executor::{ExecutorRegistry, NodeExecutionInputs, NodeExecutor};
pub use join::JoinEvaluator;
pub use observer::ExecutionObserver;
pub use strategy::{ErrorStrategy, StrategyDecision, StrategyState};
pub use trigger::{ActivationDenied, TriggerManager};
