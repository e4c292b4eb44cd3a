//! Orgform Planner
//!
//! Turns rendered targets into a [`TaskGraph`](orgform_workflow::TaskGraph).
//!
//! Planning happens in two steps:
//!
//! 1. [`Planner::plan_unit`] compares each rendered target of one unit with
//!    its deployment record. Changed or new targets become create/update
//!    tasks, recorded targets that are no longer selected become deletes.
//!    Renders waiting on outputs of other units are kept as deferred tasks.
//! 2. [`Planner::assemble`] links tasks across units. Create/update tasks
//!    depend on the tasks producing the outputs they import; deletes run in
//!    reverse import order. Units whose deferred imports cannot be produced in
//!    this run, or whose tasks form a cycle, are dropped and reported.

mod error;
mod planner;

pub use error::PlanError;
pub use planner::{Plan, Planner, TargetRender, UnitInput, UnitPlan};
