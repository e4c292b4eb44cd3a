use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use orgform_config::UnitDef;
use orgform_organization::Organization;
use orgform_render::{RenderedArtifact, TemplateRenderer};
use orgform_runtime::{TaskHooks, TaskOutcome};
use orgform_state::{DeploymentRecord, PersistedState};
use orgform_workflow::{Task, TaskAction, TaskError};
use tokio::sync::Mutex;
use tracing::debug;

/// Connects the task runner to rendering and the in-memory state of a run.
///
/// Successful tasks are recorded immediately so later renders see their
/// outputs; nothing is saved until the run is over.
pub struct EngineHooks {
  organization: Arc<Organization>,
  units: HashMap<String, UnitDef>,
  state: Arc<Mutex<PersistedState>>,
}

impl EngineHooks {
  pub fn new(
    organization: Arc<Organization>,
    units: impl IntoIterator<Item = UnitDef>,
    state: Arc<Mutex<PersistedState>>,
  ) -> Self {
    Self {
      organization,
      units: units.into_iter().map(|u| (u.name.clone(), u)).collect(),
      state,
    }
  }
}

#[async_trait]
impl TaskHooks for EngineHooks {
  async fn resolve(&self, task: &Task) -> Result<RenderedArtifact, TaskError> {
    let unit = self
      .units
      .get(task.unit())
      .ok_or_else(|| TaskError::LateResolution {
        message: format!("unit '{}' is not part of the template", task.unit()),
      })?;

    let state = self.state.lock().await;
    TemplateRenderer::new(&self.organization, &state)
      .render(unit, &task.target)
      .map_err(|e| TaskError::LateResolution {
        message: e.to_string(),
      })
  }

  async fn completed(&self, task: &Task, outcome: &TaskOutcome) {
    let mut state = self.state.lock().await;
    match task.action() {
      TaskAction::CreateOrUpdate => {
        if let Some(unit) = self.units.get(task.unit()) {
          state.set_definition(unit.clone());
        }
        state.set_record(
          task.unit(),
          DeploymentRecord {
            last_committed_hash: outcome.content_hash.clone().unwrap_or_default(),
            account_id: task.target.account_id.clone(),
            region: task.target.region.clone(),
            account_logical_id: task.target.account_logical_id.clone(),
            outputs: outcome.outputs.clone(),
            deployed_at: Utc::now(),
          },
        );
      }
      TaskAction::Delete => {
        state.remove_record(task.unit(), &task.target.account_id, &task.target.region);
      }
    }
    debug!(task = %task.id, "state_recorded");
  }
}
