//! Remote deployment backend.
//!
//! The engine hands every rendered stack to a [`DeploymentBackend`]. The
//! shipped [`FsBackend`] "deploys" into a local directory tree:
//!
//! ```text
//! <root>/<account_id>/<region>/<stack>.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use orgform_organization::Target;
use orgform_workflow::Outputs;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::fs;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
  #[error("backend i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("template body is not valid JSON: {0}")]
  InvalidTemplate(#[from] serde_json::Error),
}

/// Applies and deletes stacks at targets.
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
  /// Create or update `stack_name` at `target`, returning its outputs.
  async fn apply(
    &self,
    stack_name: &str,
    target: &Target,
    template_body: &str,
    parameters: &BTreeMap<String, String>,
  ) -> Result<Outputs, BackendError>;

  /// Remove `stack_name` from `target`. Removing a missing stack succeeds.
  async fn delete(&self, stack_name: &str, target: &Target) -> Result<(), BackendError>;
}

/// Configuration of the filesystem backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
  /// Directory the stacks are written to.
  pub root: PathBuf,
}

/// Backend writing each stack as a JSON document under a root directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
  config: BackendConfig,
}

impl FsBackend {
  pub fn new(config: BackendConfig) -> Self {
    Self { config }
  }

  pub fn root(&self) -> &Path {
    &self.config.root
  }

  /// Location of `stack_name` at `target`.
  pub fn stack_path(&self, stack_name: &str, target: &Target) -> PathBuf {
    self
      .config
      .root
      .join(&target.account_id)
      .join(&target.region)
      .join(format!("{}.json", stack_name))
  }
}

#[async_trait]
impl DeploymentBackend for FsBackend {
  async fn apply(
    &self,
    stack_name: &str,
    target: &Target,
    template_body: &str,
    parameters: &BTreeMap<String, String>,
  ) -> Result<Outputs, BackendError> {
    let template: Value = serde_json::from_str(template_body)?;
    let outputs = stack_outputs(&template);

    let path = self.stack_path(stack_name, target);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)
        .await
        .map_err(|source| BackendError::Io {
          path: parent.to_path_buf(),
          source,
        })?;
    }

    let document = json!({
      "stack_name": stack_name,
      "account_id": target.account_id,
      "region": target.region,
      "template": template,
      "parameters": parameters,
      "outputs": outputs,
    });
    let text = serde_json::to_string_pretty(&document)?;
    fs::write(&path, text)
      .await
      .map_err(|source| BackendError::Io {
        path: path.clone(),
        source,
      })?;

    info!(stack = %stack_name, target = %target.key(), outputs = outputs.len(), "stack_applied");
    Ok(outputs)
  }

  async fn delete(&self, stack_name: &str, target: &Target) -> Result<(), BackendError> {
    let path = self.stack_path(stack_name, target);
    match fs::remove_file(&path).await {
      Ok(()) => {
        info!(stack = %stack_name, target = %target.key(), "stack_deleted");
        Ok(())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(stack = %stack_name, target = %target.key(), "stack_already_absent");
        Ok(())
      }
      Err(source) => Err(BackendError::Io { path, source }),
    }
  }
}

/// Outputs whose `Value` rendered to a plain string.
pub fn stack_outputs(template: &Value) -> Outputs {
  let Some(outputs) = template.get("Outputs").and_then(Value::as_object) else {
    return Outputs::new();
  };
  outputs
    .iter()
    .filter_map(|(name, output)| {
      output
        .get("Value")
        .and_then(Value::as_str)
        .map(|value| (name.clone(), value.to_string()))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn target() -> Target {
    Target::new("111111111111", "eu-west-1", "Dev")
  }

  #[test]
  fn test_stack_outputs_keep_plain_strings() {
    let template = json!({
      "Outputs": {
        "BucketArn": { "Value": "arn:aws:s3:::bucket" },
        "BucketName": { "Value": { "Ref": "Bucket" } },
        "Broken": {}
      }
    });
    let outputs = stack_outputs(&template);
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs["BucketArn"], "arn:aws:s3:::bucket");
  }

  #[tokio::test]
  async fn test_apply_writes_stack_and_returns_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FsBackend::new(BackendConfig {
      root: dir.path().to_path_buf(),
    });
    let body = r#"{"Outputs":{"Name":{"Value":"bucket-1"}}}"#;
    let mut parameters = BTreeMap::new();
    parameters.insert("size".to_string(), "3".to_string());

    let outputs = backend.apply("storage", &target(), body, &parameters).await.unwrap();
    assert_eq!(outputs["Name"], "bucket-1");

    let path = dir.path().join("111111111111/eu-west-1/storage.json");
    let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["parameters"]["size"], "3");
    assert_eq!(written["outputs"]["Name"], "bucket-1");
  }

  #[tokio::test]
  async fn test_delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FsBackend::new(BackendConfig {
      root: dir.path().to_path_buf(),
    });
    backend.apply("storage", &target(), "{}", &BTreeMap::new()).await.unwrap();

    backend.delete("storage", &target()).await.unwrap();
    assert!(!backend.stack_path("storage", &target()).exists());
    backend.delete("storage", &target()).await.unwrap();
  }

  #[tokio::test]
  async fn test_invalid_body_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FsBackend::new(BackendConfig {
      root: dir.path().to_path_buf(),
    });
    let result = backend.apply("storage", &target(), "not json", &BTreeMap::new()).await;
    assert!(matches!(result, Err(BackendError::InvalidTemplate(_))));
  }
}
