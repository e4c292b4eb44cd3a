//! Orgform Runtime
//!
//! Executes a [`TaskGraph`](orgform_workflow::TaskGraph) with a bounded
//! worker pool.
//!
//! ```text
//!              ┌─────────── coordinator ───────────┐
//!  TaskGraph ─▶│ ready queue ─▶ permit? ─▶ spawn   │──▶ RunResult
//!              │      ▲                     │      │
//!              │      └─ release dependents ◀┘     │
//!              │         skip on failure           │
//!              │         halt past tolerance       │
//!              └───────────────────────────────────┘
//! ```
//!
//! A task is admitted as soon as its dependencies succeeded and a slot is
//! free; there are no waves. Failures beyond the configured tolerance stop
//! admission while running tasks finish.

mod events;
mod hooks;
mod result;
mod runner;

pub use events::{ChannelNotifier, ExecutionNotifier, NoopNotifier, RunEvent};
pub use hooks::{TaskHooks, TaskOutcome};
pub use result::{FailedTask, RunResult, SkipReason, SkippedTask, TaskStatus};
pub use runner::{RunOptions, TaskRunner};
