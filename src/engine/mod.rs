// src/engine/mod.rs

//! Stage execution.
//!
//! A stage moves through `started -> running -> completed | failed` within a
//! run. The engine sequences the pieces around that state machine:
//! - dependency gating against recorded threads
//! - the client task id from the task tracker
//! - the project artifact (uploaded once per content hash)
//! - one job per resource the stage targets
//! - optionally, waiting on the jobs and displaying their logs
//!
//! Pure planning lives in [`core`]; the async IO shell is [`runtime`].

pub mod core;
pub mod runtime;

pub use core::{PendingDependency, Submission};
pub use runtime::{Engine, ACCEPTED_MESSAGE};

/// What [`Engine::execute`] did with a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Already recorded `completed` in this run; nothing was done.
    Skipped,
    /// Jobs were accepted; the remote threads are still running.
    Submitted { thread_ids: Vec<String> },
    /// The stage finished, either after waiting on its threads or because it
    /// had nothing to submit.
    Completed,
}
