//! Plugin units.
//!
//! A plugin unit is executed by a [`Plugin`] registered by name. The plugin
//! receives the unit's config rendered for the target and decides itself what
//! applying and deleting mean.

mod copy_file;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use orgform_organization::Target;
use orgform_workflow::Outputs;

pub use copy_file::{CopyFileConfig, CopyFilePlugin};

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
  #[error("invalid config for plugin '{plugin}': {message}")]
  InvalidConfig { plugin: String, message: String },

  #[error("plugin i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Contract of a plugin task.
#[async_trait]
pub trait Plugin: Send + Sync {
  /// Name units use to select the plugin.
  fn name(&self) -> &str;

  /// Hash of everything `apply` would deploy for `config`.
  ///
  /// May block on local I/O. The runner calls it on the blocking pool.
  fn content_hash(&self, config: &serde_json::Value) -> Result<String, PluginError>;

  async fn apply(&self, target: &Target, config: &serde_json::Value) -> Result<Outputs, PluginError>;

  /// Undo `apply`. `config` is the unit's config as last declared.
  async fn delete(&self, target: &Target, config: &serde_json::Value) -> Result<(), PluginError>;
}

/// Plugins available to a run, by name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
  plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `plugin`, replacing any plugin of the same name.
  pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
    self.plugins.insert(plugin.name().to_string(), plugin);
  }

  pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Self {
    self.register(plugin);
    self
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
    self.plugins.get(name).cloned()
  }

  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

impl std::fmt::Debug for PluginRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PluginRegistry")
      .field("plugins", &self.names())
      .finish()
  }
}
