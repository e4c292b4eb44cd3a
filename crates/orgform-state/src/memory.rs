use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::types::PersistedState;
use crate::{StateError, StateStore};

/// In-memory state store, counting saves.
#[derive(Default)]
pub struct MemoryStateStore {
  state: Mutex<Option<PersistedState>>,
  saves: AtomicUsize,
}

impl MemoryStateStore {
  /// An empty store; `load` reports [`StateError::NotFound`].
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_state(state: PersistedState) -> Self {
    Self {
      state: Mutex::new(Some(state)),
      saves: AtomicUsize::new(0),
    }
  }

  /// Number of completed saves.
  pub fn saves(&self) -> usize {
    self.saves.load(Ordering::SeqCst)
  }

  /// The last saved (or initial) state.
  pub async fn snapshot(&self) -> Option<PersistedState> {
    self.state.lock().await.clone()
  }
}

#[async_trait]
impl StateStore for MemoryStateStore {
  async fn load(&self) -> Result<PersistedState, StateError> {
    self
      .state
      .lock()
      .await
      .clone()
      .ok_or_else(|| StateError::NotFound {
        location: "memory".to_string(),
      })
  }

  async fn save(&self, state: &PersistedState) -> Result<(), StateError> {
    *self.state.lock().await = Some(state.clone());
    self.saves.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}
