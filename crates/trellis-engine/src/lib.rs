//! Status transition orchestration for the trellis task engine.
//!
//! The [`Orchestrator`] is the only component that mutates task status. It
//! composes the workflow state machine, the entity repositories, and the
//! progress calculator inside single store transactions, so a status change,
//! its history row, and the resulting progress propagation are observed
//! atomically.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, StatusChange};
