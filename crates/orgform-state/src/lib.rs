//! Orgform State
//!
//! This crate provides the persisted deployment state and the [`StateStore`]
//! trait used to load and commit it.
//!
//! The state records:
//! - Identifier bindings (logical id to physical id)
//! - One deployment record per (unit, target) with the last committed content
//!   hash and the outputs the deployment exposed
//! - The previous successfully applied template
//!
//! A run loads the state once, mutates it in memory as tasks succeed, and
//! saves it once after all tasks reached a terminal state.

mod fs;
mod memory;
mod types;

pub use fs::FsStateStore;
pub use memory::MemoryStateStore;
pub use types::{DeploymentRecord, IdentifierBinding, PersistedState};

use std::path::PathBuf;

use async_trait::async_trait;

/// Error type for state operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
  /// No state exists yet at the store location.
  #[error("no deployment state found at {location}")]
  NotFound { location: String },

  /// Reading or writing the state failed.
  #[error("state i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The stored state could not be (de)serialized.
  #[error("invalid state document: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// Durable storage for [`PersistedState`].
#[async_trait]
pub trait StateStore: Send + Sync {
  /// Load the state. Returns [`StateError::NotFound`] when nothing was saved yet.
  async fn load(&self) -> Result<PersistedState, StateError>;

  /// Replace the stored state.
  async fn save(&self, state: &PersistedState) -> Result<(), StateError>;
}
