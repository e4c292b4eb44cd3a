use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use orgform_organization::Target;
use orgform_render::{ImportRef, RenderedArtifact};
use serde::{Deserialize, Serialize};

use crate::deployable::Deployable;

/// Identity of a task: one unit at one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
  pub unit: String,
  pub account_id: String,
  pub region: String,
}

impl TaskId {
  pub fn new(unit: impl Into<String>, target: &Target) -> Self {
    Self {
      unit: unit.into(),
      account_id: target.account_id.clone(),
      region: target.region.clone(),
    }
  }

  /// The task that produces the output an import reads.
  pub fn source_of(import: &ImportRef) -> Self {
    Self {
      unit: import.unit.clone(),
      account_id: import.account_id.clone(),
      region: import.region.clone(),
    }
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}/{}", self.unit, self.account_id, self.region)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
  CreateOrUpdate,
  Delete,
}

impl fmt::Display for TaskAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TaskAction::CreateOrUpdate => f.write_str("create_or_update"),
      TaskAction::Delete => f.write_str("delete"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
  CreateOrUpdate {
    /// Absent when rendering waits for outputs of tasks in the same plan.
    artifact: Option<RenderedArtifact>,
    content_hash: Option<String>,
  },
  Delete,
}

/// A planned operation on one unit at one target.
#[derive(Clone)]
pub struct Task {
  pub id: TaskId,
  pub target: Target,
  pub kind: TaskKind,
  /// Imports of the rendered unit (create) or of the deployed unit (delete).
  pub imports: BTreeSet<ImportRef>,
  pub depends_on: BTreeSet<TaskId>,
  pub deployable: Arc<dyn Deployable>,
}

impl Task {
  pub fn create_or_update(
    unit: &str,
    target: Target,
    artifact: Option<RenderedArtifact>,
    content_hash: Option<String>,
    imports: BTreeSet<ImportRef>,
    deployable: Arc<dyn Deployable>,
  ) -> Self {
    Self {
      id: TaskId::new(unit, &target),
      target,
      kind: TaskKind::CreateOrUpdate {
        artifact,
        content_hash,
      },
      imports,
      depends_on: BTreeSet::new(),
      deployable,
    }
  }

  pub fn delete(
    unit: &str,
    target: Target,
    imports: BTreeSet<ImportRef>,
    deployable: Arc<dyn Deployable>,
  ) -> Self {
    Self {
      id: TaskId::new(unit, &target),
      target,
      kind: TaskKind::Delete,
      imports,
      depends_on: BTreeSet::new(),
      deployable,
    }
  }

  pub fn unit(&self) -> &str {
    &self.id.unit
  }

  pub fn action(&self) -> TaskAction {
    match self.kind {
      TaskKind::CreateOrUpdate { .. } => TaskAction::CreateOrUpdate,
      TaskKind::Delete => TaskAction::Delete,
    }
  }

  pub fn artifact(&self) -> Option<&RenderedArtifact> {
    match &self.kind {
      TaskKind::CreateOrUpdate { artifact, .. } => artifact.as_ref(),
      TaskKind::Delete => None,
    }
  }

  /// A create/update task planned without an artifact.
  pub fn is_deferred(&self) -> bool {
    matches!(self.kind, TaskKind::CreateOrUpdate { artifact: None, .. })
  }

  /// Whether the task must be rendered again right before it runs: it was
  /// deferred, or it consumes outputs of tasks in the same run.
  pub fn needs_late_resolution(&self) -> bool {
    self.action() == TaskAction::CreateOrUpdate && (self.is_deferred() || !self.depends_on.is_empty())
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("id", &self.id)
      .field("kind", &self.kind)
      .field("depends_on", &self.depends_on)
      .field("deployable", &self.deployable.kind())
      .finish()
  }
}
