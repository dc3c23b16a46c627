#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Core
//!
//! Core identifier types shared by every Cascade crate.
//!
//! Each entity in the system (workflow, execution, node, edge, trigger,
//! event) gets its own strongly-typed 128-bit UUID wrapper, so an
//! [`ExecutionId`] can never be passed where a [`NodeId`] is expected.

pub mod id;

pub use id::{
    EdgeId, EventId, ExecutionId, NodeId, TriggerId, UuidParseError, WorkflowId,
};
