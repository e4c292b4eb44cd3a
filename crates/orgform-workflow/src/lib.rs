//! Orgform Workflow
//!
//! The planned unit of work is a [`Task`]: create/update or delete one unit at
//! one target. Tasks reference each other through [`TaskId`]s and are stored
//! in a [`TaskGraph`] arena, with dependencies kept as index adjacency lists.
//!
//! ```text
//!   producer@111/eu-west-1 ──▶ consumer@111/eu-west-1
//!   producer@222/eu-west-1 ──▶ consumer@222/eu-west-1
//! ```
//!
//! How a task is applied is behind the [`Deployable`] capability, so the
//! planner and runner never know whether a unit is a template stack or a
//! plugin task.

mod deployable;
mod error;
mod graph;
mod task;

pub use deployable::{Deployable, Outputs};
pub use error::{TaskError, WorkflowError};
pub use graph::{TaskGraph, find_cycle};
pub use task::{Task, TaskAction, TaskId, TaskKind};
