use async_trait::async_trait;
use orgform_render::RenderedArtifact;
use orgform_workflow::{Outputs, Task, TaskError};

/// What a successful task produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
  pub outputs: Outputs,
  /// Hash of the applied artifact; `None` for deletes.
  pub content_hash: Option<String>,
}

/// Callbacks from the runner into the layer that owns rendering and state.
#[async_trait]
pub trait TaskHooks: Send + Sync {
  /// Render `task` again with the outputs recorded so far. Called right
  /// before execution for tasks that need late resolution.
  async fn resolve(&self, task: &Task) -> Result<RenderedArtifact, TaskError>;

  /// Called for every successful task before its dependents are released.
  async fn completed(&self, task: &Task, outcome: &TaskOutcome);
}
