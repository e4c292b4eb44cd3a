//! Adapters from stacks and plugins to the [`Deployable`] capability.

use std::sync::Arc;

use async_trait::async_trait;
use orgform_organization::Target;
use orgform_render::RenderedArtifact;
use orgform_workflow::{Deployable, Outputs, TaskError};

use crate::backend::DeploymentBackend;
use crate::plugin::Plugin;

/// A template stack deployed through a [`DeploymentBackend`].
pub struct StackUnit {
  stack_name: String,
  backend: Arc<dyn DeploymentBackend>,
}

impl StackUnit {
  pub fn new(stack_name: impl Into<String>, backend: Arc<dyn DeploymentBackend>) -> Self {
    Self {
      stack_name: stack_name.into(),
      backend,
    }
  }
}

#[async_trait]
impl Deployable for StackUnit {
  fn kind(&self) -> &str {
    "stack"
  }

  fn content_hash(&self, artifact: &RenderedArtifact) -> Result<String, TaskError> {
    Ok(artifact.digest())
  }

  async fn apply(&self, target: &Target, artifact: &RenderedArtifact) -> Result<Outputs, TaskError> {
    self
      .backend
      .apply(&self.stack_name, target, &artifact.text(), &artifact.parameters)
      .await
      .map_err(|e| TaskError::backend("apply", e))
  }

  async fn delete(&self, target: &Target) -> Result<(), TaskError> {
    self
      .backend
      .delete(&self.stack_name, target)
      .await
      .map_err(|e| TaskError::backend("delete", e))
  }
}

/// A unit executed by a registered [`Plugin`].
pub struct PluginUnit {
  plugin: Arc<dyn Plugin>,
  /// Config as declared, used for deletes.
  config: serde_json::Value,
}

impl PluginUnit {
  pub fn new(plugin: Arc<dyn Plugin>, config: serde_json::Value) -> Self {
    Self { plugin, config }
  }
}

#[async_trait]
impl Deployable for PluginUnit {
  fn kind(&self) -> &str {
    self.plugin.name()
  }

  fn content_hash(&self, artifact: &RenderedArtifact) -> Result<String, TaskError> {
    self
      .plugin
      .content_hash(&artifact.body)
      .map_err(|e| TaskError::Hash {
        message: e.to_string(),
      })
  }

  async fn apply(&self, target: &Target, artifact: &RenderedArtifact) -> Result<Outputs, TaskError> {
    self
      .plugin
      .apply(target, &artifact.body)
      .await
      .map_err(|e| TaskError::backend("apply", e))
  }

  async fn delete(&self, target: &Target) -> Result<(), TaskError> {
    self
      .plugin
      .delete(target, &self.config)
      .await
      .map_err(|e| TaskError::backend("delete", e))
  }
}
