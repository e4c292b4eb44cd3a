use thiserror::Error;

use crate::task::TaskId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
  #[error("duplicate task: {0}")]
  DuplicateTask(TaskId),

  #[error("task {task} depends on unknown task {dependency}")]
  UnknownDependency { task: TaskId, dependency: TaskId },

  /// The dependencies form a cycle; `tasks` lists the tasks on it.
  #[error("dependency cycle between {}", describe(.tasks))]
  DependencyCycle { tasks: Vec<TaskId> },
}

fn describe(tasks: &[TaskId]) -> String {
  tasks
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join(" -> ")
}

/// Errors raised while executing a single task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
  /// The backend or plugin rejected the operation.
  #[error("{operation} failed: {message}")]
  Backend { operation: String, message: String },

  /// The content hash of the artifact could not be computed.
  #[error("content hash failed: {message}")]
  Hash { message: String },

  /// Re-rendering right before execution failed.
  #[error("late resolution failed: {message}")]
  LateResolution { message: String },

  /// The task panicked or its worker was lost.
  #[error("task aborted: {message}")]
  Aborted { message: String },
}

impl TaskError {
  pub fn backend(operation: &str, message: impl ToString) -> Self {
    TaskError::Backend {
      operation: operation.to_string(),
      message: message.to_string(),
    }
  }
}
