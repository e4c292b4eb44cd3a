use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::types::PersistedState;
use crate::{StateError, StateStore};

/// State store backed by a JSON file.
///
/// Saves write a sibling temp file and rename it over the state file, so a
/// crash mid-save leaves the previously committed state in place.
pub struct FsStateStore {
  path: PathBuf,
}

impl FsStateStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn io_error(&self, source: std::io::Error) -> StateError {
    StateError::Io {
      path: self.path.clone(),
      source,
    }
  }
}

#[async_trait]
impl StateStore for FsStateStore {
  async fn load(&self) -> Result<PersistedState, StateError> {
    let text = match fs::read_to_string(&self.path).await {
      Ok(text) => text,
      Err(e) if e.kind() == ErrorKind::NotFound => {
        return Err(StateError::NotFound {
          location: self.path.display().to_string(),
        });
      }
      Err(e) => return Err(self.io_error(e)),
    };
    Ok(serde_json::from_str(&text)?)
  }

  async fn save(&self, state: &PersistedState) -> Result<(), StateError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)
        .await
        .map_err(|e| self.io_error(e))?;
    }

    let text = serde_json::to_string_pretty(state)?;
    let tmp = self.path.with_extension("json.tmp");
    fs::write(&tmp, text).await.map_err(|e| self.io_error(e))?;
    fs::rename(&tmp, &self.path)
      .await
      .map_err(|e| self.io_error(e))?;

    info!(path = %self.path.display(), "state_saved");
    Ok(())
  }
}
