use orgform_render::{ImportRef, RenderError};
use orgform_resolver::ResolveError;
use orgform_workflow::{TaskError, TaskId, WorkflowError};
use thiserror::Error;

/// Errors that abort planning of one unit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
  /// The unit's binding could not be resolved.
  #[error("unit '{unit}': {source}")]
  Resolve {
    unit: String,
    #[source]
    source: ResolveError,
  },

  /// The unit could not be rendered.
  #[error("{source}")]
  Render {
    unit: String,
    #[source]
    source: RenderError,
  },

  /// A deferred import reads a unit/target that has no task in this run.
  #[error("unit '{unit}' task {task} imports {import}, which is neither recorded nor planned")]
  UnresolvedExport {
    unit: String,
    task: TaskId,
    import: ImportRef,
  },

  /// The content hash of a rendered target could not be computed.
  #[error("unit '{unit}' at {target}: {source}")]
  Hash {
    unit: String,
    target: String,
    #[source]
    source: TaskError,
  },

  /// The unit names a plugin that is not registered.
  #[error("unit '{unit}' uses unknown plugin '{plugin}'")]
  UnknownPlugin { unit: String, plugin: String },

  /// A unit with deployment records has no known definition to delete it with.
  #[error("unit '{unit}' was removed but its deployed definition is unknown; records kept")]
  UnknownDefinition { unit: String },

  /// Tasks of the listed units depend on each other in a cycle.
  #[error("units {} form a cycle: {source}", .units.join(", "))]
  DependencyCycle {
    units: Vec<String>,
    #[source]
    source: WorkflowError,
  },

  /// The assembled graph is inconsistent.
  #[error("invalid task graph: {0}")]
  Graph(String),
}

impl PlanError {
  /// Input errors abort the whole run before anything is executed.
  pub fn is_input_error(&self) -> bool {
    matches!(
      self,
      PlanError::Render {
        source: RenderError::InvalidExpression { .. },
        ..
      } | PlanError::Hash { .. }
    )
  }

  /// Units this error aborted.
  pub fn units(&self) -> Vec<&str> {
    match self {
      PlanError::Resolve { unit, .. }
      | PlanError::Render { unit, .. }
      | PlanError::UnresolvedExport { unit, .. }
      | PlanError::Hash { unit, .. }
      | PlanError::UnknownPlugin { unit, .. }
      | PlanError::UnknownDefinition { unit } => vec![unit.as_str()],
      PlanError::DependencyCycle { units, .. } => units.iter().map(String::as_str).collect(),
      PlanError::Graph(_) => Vec::new(),
    }
  }
}
