use orgform_runtime::RunOptions;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Options of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
  /// Maximum number of tasks running at once.
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,

  /// Number of failed tasks tolerated before the run stops admitting tasks.
  #[serde(default)]
  pub failure_tolerance: usize,

  /// Regions replacing the regions of every unit binding. Empty means no
  /// override.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub regions: Vec<String>,
}

fn default_max_concurrent() -> usize {
  1
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_concurrent: default_max_concurrent(),
      failure_tolerance: 0,
      regions: Vec::new(),
    }
  }
}

impl EngineConfig {
  pub fn region_override(&self) -> Option<&[String]> {
    if self.regions.is_empty() {
      None
    } else {
      Some(&self.regions)
    }
  }

  pub fn run_options(&self) -> RunOptions {
    RunOptions {
      max_concurrent: self.max_concurrent.clamp(1, Semaphore::MAX_PERMITS),
      failure_tolerance: self.failure_tolerance,
    }
  }
}
