use std::collections::BTreeMap;

use async_trait::async_trait;
use orgform_organization::Target;
use orgform_render::RenderedArtifact;

use crate::error::TaskError;

/// Outputs exposed by a deployment, keyed by output name.
pub type Outputs = BTreeMap<String, String>;

/// Capability shared by every kind of unit.
///
/// Template stacks and plugin tasks both implement this; the planner only
/// calls [`content_hash`](Deployable::content_hash) and the runner only calls
/// [`apply`](Deployable::apply) and [`delete`](Deployable::delete).
#[async_trait]
pub trait Deployable: Send + Sync {
  /// Short name of the unit kind, for logs ("stack", a plugin name).
  fn kind(&self) -> &str;

  /// Hash identifying the content that `apply` would deploy.
  ///
  /// Synchronous and may block on local I/O. Run workers call it on the blocking pool.
  fn content_hash(&self, artifact: &RenderedArtifact) -> Result<String, TaskError>;

  /// Create or update the unit at `target`.
  async fn apply(&self, target: &Target, artifact: &RenderedArtifact) -> Result<Outputs, TaskError>;

  /// Remove the unit from `target`.
  async fn delete(&self, target: &Target) -> Result<(), TaskError>;
}
