use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use orgform_organization::Target;
use orgform_render::{ImportRef, RenderError, RenderedArtifact};
use orgform_state::PersistedState;
use orgform_workflow::{Deployable, Task, TaskAction, TaskGraph, TaskId, WorkflowError};
use tracing::{debug, info, warn};

use crate::error::PlanError;

/// Rendering outcome for one target of a unit.
#[derive(Debug, Clone)]
pub struct TargetRender {
  pub target: Target,
  /// Every import the render performs, available or not.
  pub imports: BTreeSet<ImportRef>,
  pub result: Result<RenderedArtifact, RenderError>,
}

/// Everything needed to plan one unit.
pub struct UnitInput {
  pub name: String,
  pub deployable: Arc<dyn Deployable>,
  /// One entry per currently selected target.
  pub renders: Vec<TargetRender>,
  /// Imports of deployed targets, keyed by target key, as of the definition
  /// that deployed them. Used to order deletes.
  pub deployed_imports: BTreeMap<String, BTreeSet<ImportRef>>,
}

impl UnitInput {
  /// Input for a unit that is no longer part of the template.
  pub fn removed(
    name: impl Into<String>,
    deployable: Arc<dyn Deployable>,
    deployed_imports: BTreeMap<String, BTreeSet<ImportRef>>,
  ) -> Self {
    Self {
      name: name.into(),
      deployable,
      renders: Vec::new(),
      deployed_imports,
    }
  }
}

/// Tasks planned for one unit.
#[derive(Debug, Clone)]
pub struct UnitPlan {
  pub unit: String,
  pub tasks: Vec<Task>,
  /// Render errors of deferred tasks.
  pub deferred: BTreeMap<TaskId, RenderError>,
}

/// The assembled plan of a run.
#[derive(Debug, Default)]
pub struct Plan {
  pub graph: TaskGraph,
  pub errors: Vec<PlanError>,
}

impl Plan {
  pub fn has_input_errors(&self) -> bool {
    self.errors.iter().any(PlanError::is_input_error)
  }
}

/// Plans tasks against the deployment state loaded for the run.
pub struct Planner<'a> {
  state: &'a PersistedState,
}

impl<'a> Planner<'a> {
  pub fn new(state: &'a PersistedState) -> Self {
    Self { state }
  }

  /// Diff the rendered targets of one unit against its deployment records.
  pub fn plan_unit(&self, input: UnitInput) -> Result<UnitPlan, PlanError> {
    let UnitInput {
      name,
      deployable,
      renders,
      deployed_imports,
    } = input;

    let selected: HashSet<String> = renders.iter().map(|r| r.target.key()).collect();
    let mut tasks = Vec::new();
    let mut deferred = BTreeMap::new();

    for render in renders {
      let record = self
        .state
        .record(&name, &render.target.account_id, &render.target.region);

      match render.result {
        Ok(artifact) => {
          let hash = deployable
            .content_hash(&artifact)
            .map_err(|source| PlanError::Hash {
              unit: name.clone(),
              target: render.target.key(),
              source,
            })?;

          if record.is_some_and(|r| r.last_committed_hash == hash) {
            debug!(unit = %name, target = %render.target.key(), "target_unchanged");
            continue;
          }

          let imports = artifact.imports.clone();
          tasks.push(Task::create_or_update(
            &name,
            render.target,
            Some(artifact),
            Some(hash),
            imports,
            deployable.clone(),
          ));
        }
        Err(error @ RenderError::UnresolvedExport { .. }) => {
          let task = Task::create_or_update(
            &name,
            render.target,
            None,
            None,
            render.imports,
            deployable.clone(),
          );
          debug!(task = %task.id, error = %error, "task_deferred");
          deferred.insert(task.id.clone(), error);
          tasks.push(task);
        }
        Err(source) => {
          return Err(PlanError::Render { unit: name, source });
        }
      }
    }

    for record in self.state.records(&name) {
      let key = record.key();
      if selected.contains(&key) {
        continue;
      }
      let imports = deployed_imports.get(&key).cloned().unwrap_or_default();
      tasks.push(Task::delete(&name, record.target(), imports, deployable.clone()));
    }

    Ok(UnitPlan {
      unit: name,
      tasks,
      deferred,
    })
  }

  /// Link unit plans into one task graph.
  ///
  /// Units that cannot be planned (deferred imports with no producer in the
  /// run, dependency cycles) are removed together with all their tasks and
  /// reported; removing a unit can invalidate others, so this repeats until
  /// the remaining plan is consistent.
  pub fn assemble(&self, mut plans: Vec<UnitPlan>) -> Plan {
    let mut errors = Vec::new();

    loop {
      let creates = task_ids(&plans, TaskAction::CreateOrUpdate);

      let unresolvable = unresolvable_deferrals(&plans, &creates);
      if !unresolvable.is_empty() {
        let mut dropped = HashSet::new();
        for (unit, error) in unresolvable {
          warn!(error = %error, "unit_dropped");
          dropped.insert(unit);
          errors.push(error);
        }
        plans.retain(|p| !dropped.contains(&p.unit));
        continue;
      }

      let tasks = link(&plans, &creates);
      match TaskGraph::new(tasks) {
        Ok(graph) => {
          info!(
            tasks = graph.len(),
            units = plans.len(),
            errors = errors.len(),
            "plan_assembled"
          );
          return Plan { graph, errors };
        }
        Err(WorkflowError::DependencyCycle { tasks }) => {
          let units: BTreeSet<String> = tasks.iter().map(|t| t.unit.clone()).collect();
          let error = PlanError::DependencyCycle {
            units: units.iter().cloned().collect(),
            source: WorkflowError::DependencyCycle { tasks },
          };
          warn!(error = %error, "units_dropped");
          errors.push(error);
          plans.retain(|p| !units.contains(&p.unit));
        }
        Err(other) => {
          errors.push(PlanError::Graph(other.to_string()));
          return Plan {
            graph: TaskGraph::default(),
            errors,
          };
        }
      }
    }
  }
}

fn task_ids(plans: &[UnitPlan], action: TaskAction) -> HashSet<TaskId> {
  plans
    .iter()
    .flat_map(|p| p.tasks.iter())
    .filter(|t| t.action() == action)
    .map(|t| t.id.clone())
    .collect()
}

/// One error per unit with a deferred import whose producer has no task.
fn unresolvable_deferrals(
  plans: &[UnitPlan],
  creates: &HashSet<TaskId>,
) -> Vec<(String, PlanError)> {
  let mut errors = Vec::new();
  for plan in plans {
    let absent = plan.deferred.iter().find_map(|(task, error)| {
      error
        .missing_imports()
        .iter()
        .find(|import| {
          let source = TaskId::source_of(import);
          source == *task || !creates.contains(&source)
        })
        .map(|import| (task, import))
    });
    if let Some((task, import)) = absent {
      errors.push((
        plan.unit.clone(),
        PlanError::UnresolvedExport {
          unit: plan.unit.clone(),
          task: task.clone(),
          import: import.clone(),
        },
      ));
    }
  }
  errors
}

/// Clone the tasks of all plans and fill in their dependencies.
fn link(plans: &[UnitPlan], creates: &HashSet<TaskId>) -> Vec<Task> {
  let deletes = task_ids(plans, TaskAction::Delete);
  let mut tasks: Vec<Task> = plans.iter().flat_map(|p| p.tasks.iter().cloned()).collect();

  // Deletes of producers wait for deletes of their former consumers.
  let mut reverse: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();

  for task in &mut tasks {
    match task.action() {
      TaskAction::CreateOrUpdate => {
        for import in &task.imports {
          let source = TaskId::source_of(import);
          if source != task.id && creates.contains(&source) {
            task.depends_on.insert(source);
          }
        }
      }
      TaskAction::Delete => {
        for import in &task.imports {
          let source = TaskId::source_of(import);
          if source != task.id && deletes.contains(&source) {
            reverse.entry(source).or_default().insert(task.id.clone());
          }
        }
      }
    }
  }

  for task in &mut tasks {
    if task.action() == TaskAction::Delete
      && let Some(consumers) = reverse.remove(&task.id)
    {
      task.depends_on.extend(consumers);
    }
  }

  tasks
}
