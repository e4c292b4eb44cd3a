use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use orgform_organization::Target;
use orgform_workflow::Outputs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::info;

use super::{Plugin, PluginError};

const NAME: &str = "copy-file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFileConfig {
  /// File to copy, relative to the plugin's source directory.
  pub local_path: String,
  /// Destination, relative to the target's directory.
  pub remote_path: String,
}

/// Copies one local file into every target.
///
/// Targets live under `<destination>/<account_id>/<region>/`.
#[derive(Debug, Clone)]
pub struct CopyFilePlugin {
  source: PathBuf,
  destination: PathBuf,
}

impl CopyFilePlugin {
  pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
    Self {
      source: source.into(),
      destination: destination.into(),
    }
  }

  fn config(&self, value: &serde_json::Value) -> Result<CopyFileConfig, PluginError> {
    let config: CopyFileConfig =
      serde_json::from_value(value.clone()).map_err(|e| invalid_config(e.to_string()))?;
    if !is_relative(&config.remote_path) {
      return Err(invalid_config(format!(
        "remote_path '{}' must be a relative path inside the target",
        config.remote_path
      )));
    }
    Ok(config)
  }

  fn remote(&self, target: &Target, config: &CopyFileConfig) -> PathBuf {
    self
      .destination
      .join(&target.account_id)
      .join(&target.region)
      .join(&config.remote_path)
  }
}

#[async_trait]
impl Plugin for CopyFilePlugin {
  fn name(&self) -> &str {
    NAME
  }

  fn content_hash(&self, value: &serde_json::Value) -> Result<String, PluginError> {
    let config = self.config(value)?;
    let local = self.source.join(&config.local_path);
    let content = std::fs::read(&local).map_err(|source| PluginError::Io {
      path: local.clone(),
      source,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&content);
    hasher.update(config.remote_path.as_bytes());
    Ok(format!("sha256:{:x}", hasher.finalize()))
  }

  async fn apply(&self, target: &Target, value: &serde_json::Value) -> Result<Outputs, PluginError> {
    let config = self.config(value)?;
    let local = self.source.join(&config.local_path);
    let remote = self.remote(target, &config);

    if let Some(parent) = remote.parent() {
      fs::create_dir_all(parent)
        .await
        .map_err(|source| PluginError::Io {
          path: parent.to_path_buf(),
          source,
        })?;
    }
    fs::copy(&local, &remote)
      .await
      .map_err(|source| PluginError::Io {
        path: local.clone(),
        source,
      })?;

    info!(target = %target.key(), remote = %remote.display(), "file_copied");

    let mut outputs = Outputs::new();
    outputs.insert("RemotePath".to_string(), remote.display().to_string());
    Ok(outputs)
  }

  async fn delete(&self, target: &Target, value: &serde_json::Value) -> Result<(), PluginError> {
    let config = self.config(value)?;
    let remote = self.remote(target, &config);
    match fs::remove_file(&remote).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(PluginError::Io {
        path: remote,
        source,
      }),
    }
  }
}

fn invalid_config(message: String) -> PluginError {
  PluginError::InvalidConfig {
    plugin: NAME.to_string(),
    message,
  }
}

fn is_relative(path: &str) -> bool {
  !path.is_empty()
    && Path::new(path)
      .components()
      .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
