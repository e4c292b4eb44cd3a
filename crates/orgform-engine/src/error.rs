//! Engine error types.

use orgform_config::ConfigError;
use orgform_organization::OrganizationError;
use orgform_planner::PlanError;
use orgform_render::RenderError;
use orgform_resolver::ResolveError;
use orgform_state::StateError;
use orgform_workflow::WorkflowError;

/// Errors that abort an engine operation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The template document is malformed.
  #[error("invalid template: {0}")]
  Template(#[from] ConfigError),

  /// The organization could not be loaded.
  #[error(transparent)]
  Organization(#[from] OrganizationError),

  /// Loading or saving deployment state failed.
  #[error(transparent)]
  State(#[from] StateError),

  /// Planning found input errors; nothing was executed or saved.
  #[error("planning aborted: {}", describe(.errors))]
  InvalidInput { errors: Vec<PlanError> },

  #[error("unknown unit '{name}'")]
  UnknownUnit { name: String },

  #[error("unit '{unit}': {source}")]
  Resolve {
    unit: String,
    #[source]
    source: ResolveError,
  },

  #[error("unit '{unit}' at {target}: {source}")]
  Render {
    unit: String,
    target: String,
    #[source]
    source: RenderError,
  },

  /// The unit is deployed but no definition to delete it with is recorded.
  #[error("unit '{unit}' has no known definition")]
  UnknownDefinition { unit: String },

  #[error("unit '{unit}' uses unknown plugin '{plugin}'")]
  UnknownPlugin { unit: String, plugin: String },

  /// Tasks built outside the planner did not form a valid graph.
  #[error(transparent)]
  Graph(#[from] WorkflowError),
}

fn describe(errors: &[PlanError]) -> String {
  errors
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}
