use std::fmt;

use orgform_workflow::{TaskError, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
  Pending,
  Ready,
  Running,
  Succeeded,
  Failed,
  Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  /// A task this one depends on failed or was skipped.
  DependencyFailed { dependency: TaskId },
  /// Admission stopped before the task could run.
  Halted,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::DependencyFailed { dependency } => {
        write!(f, "dependency {} did not succeed", dependency)
      }
      SkipReason::Halted => f.write_str("run halted before the task was started"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
  pub id: TaskId,
  pub error: TaskError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
  pub id: TaskId,
  pub reason: SkipReason,
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
  pub run_id: String,
  pub succeeded: Vec<TaskId>,
  pub failed: Vec<FailedTask>,
  pub skipped: Vec<SkippedTask>,
  /// Admission stopped early (tolerance exceeded or cancelled).
  pub halted: bool,
}

impl RunResult {
  pub fn new(run_id: impl Into<String>) -> Self {
    Self {
      run_id: run_id.into(),
      ..Default::default()
    }
  }

  /// Every task succeeded.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty() && !self.halted
  }

  pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
    if self.succeeded.contains(id) {
      Some(TaskStatus::Succeeded)
    } else if self.failed.iter().any(|f| &f.id == id) {
      Some(TaskStatus::Failed)
    } else if self.skipped.iter().any(|s| &s.id == id) {
      Some(TaskStatus::Skipped)
    } else {
      None
    }
  }
}
