use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use orgform_config::{TemplateDef, UnitDef, UnitKind};
use orgform_organization::{Organization, OrganizationDirectory, Target};
use orgform_planner::{Plan, PlanError, Planner, TargetRender, UnitInput};
use orgform_render::{ImportRef, RenderedArtifact, TemplateRenderer};
use orgform_resolver::BindingResolver;
use orgform_runtime::{ExecutionNotifier, NoopNotifier, RunResult, TaskRunner};
use orgform_state::{DeploymentRecord, PersistedState, StateError, StateStore};
use orgform_workflow::{Deployable, Task, TaskGraph};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backend::DeploymentBackend;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::hooks::EngineHooks;
use crate::plugin::PluginRegistry;
use crate::units::{PluginUnit, StackUnit};

/// Outcome of a run that reached execution.
#[derive(Debug)]
pub struct DeployReport {
  /// Units that could not be planned; they got no tasks.
  pub planning_errors: Vec<PlanError>,
  pub run: RunResult,
}

impl DeployReport {
  pub fn is_success(&self) -> bool {
    self.planning_errors.is_empty() && self.run.is_success()
  }
}

/// Deploys templates across the accounts of an organization.
pub struct DeploymentEngine<N: ExecutionNotifier + Clone = NoopNotifier> {
  config: EngineConfig,
  directory: Arc<dyn OrganizationDirectory>,
  store: Arc<dyn StateStore>,
  backend: Arc<dyn DeploymentBackend>,
  plugins: PluginRegistry,
  notifier: N,
}

impl DeploymentEngine<NoopNotifier> {
  pub fn new(
    config: EngineConfig,
    directory: Arc<dyn OrganizationDirectory>,
    store: Arc<dyn StateStore>,
    backend: Arc<dyn DeploymentBackend>,
  ) -> Self {
    Self {
      config,
      directory,
      store,
      backend,
      plugins: PluginRegistry::new(),
      notifier: NoopNotifier,
    }
  }
}

impl<N: ExecutionNotifier + Clone> DeploymentEngine<N> {
  pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
    self.plugins = plugins;
    self
  }

  pub fn with_notifier<M: ExecutionNotifier + Clone>(self, notifier: M) -> DeploymentEngine<M> {
    DeploymentEngine {
      config: self.config,
      directory: self.directory,
      store: self.store,
      backend: self.backend,
      plugins: self.plugins,
      notifier,
    }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Create empty state if none exists. Returns whether state was created.
  pub async fn init(&self) -> Result<bool, EngineError> {
    match self.store.load().await {
      Ok(_) => Ok(false),
      Err(StateError::NotFound { .. }) => {
        let mut state = PersistedState::new();
        self.commit(&mut state).await?;
        info!("state_initialized");
        Ok(true)
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Plan and execute `template_text`, then commit the state once.
  ///
  /// Input errors abort before anything runs and nothing is saved. Units with
  /// resolution errors are reported in the result and left untouched.
  #[instrument(name = "engine_deploy", skip(self, template_text, cancel))]
  pub async fn deploy(
    &self,
    template_text: &str,
    cancel: CancellationToken,
  ) -> Result<DeployReport, EngineError> {
    let template = TemplateDef::parse(template_text)?;
    let mut state = self.store.load().await?;
    let organization = self.load_organization(&mut state).await?;

    let plan = self.plan_template(&template, &organization, &state);
    if plan.has_input_errors() {
      let errors = plan
        .errors
        .into_iter()
        .filter(PlanError::is_input_error)
        .collect();
      return Err(EngineError::InvalidInput { errors });
    }
    let Plan {
      graph,
      errors: planning_errors,
    } = plan;

    let state = Arc::new(Mutex::new(state));
    let hooks = Arc::new(EngineHooks::new(
      Arc::new(organization),
      template.units.iter().cloned(),
      state.clone(),
    ));
    let run = self.runner().run(graph, hooks, cancel).await;

    let mut state = std::mem::take(&mut *state.lock().await);
    if planning_errors.is_empty() && run.is_success() {
      state.set_previous_template(template_text);
    }
    self.commit(&mut state).await?;

    Ok(DeployReport {
      planning_errors,
      run,
    })
  }

  /// Plan `template_text` without executing or saving anything.
  pub async fn plan(&self, template_text: &str) -> Result<Plan, EngineError> {
    let template = TemplateDef::parse(template_text)?;
    let mut state = self.load_state_or_default().await?;
    let organization = self.load_organization(&mut state).await?;
    Ok(self.plan_template(&template, &organization, &state))
  }

  /// Render one unit for each of its targets with the recorded outputs.
  pub async fn render_unit(
    &self,
    template_text: &str,
    unit_name: &str,
  ) -> Result<Vec<(Target, RenderedArtifact)>, EngineError> {
    let template = TemplateDef::parse(template_text)?;
    let unit = template
      .unit(unit_name)
      .ok_or_else(|| EngineError::UnknownUnit {
        name: unit_name.to_string(),
      })?;
    let mut state = self.load_state_or_default().await?;
    let organization = self.load_organization(&mut state).await?;

    let targets = BindingResolver::new(&organization)
      .with_region_override(self.config.region_override())
      .resolve(&unit.organization_binding)
      .map_err(|source| EngineError::Resolve {
        unit: unit.name.clone(),
        source,
      })?;

    let renderer = TemplateRenderer::new(&organization, &state);
    targets
      .into_iter()
      .map(|target| {
        let artifact = renderer
          .render(unit, &target)
          .map_err(|source| EngineError::Render {
            unit: unit.name.clone(),
            target: target.key(),
            source,
          })?;
        Ok((target, artifact))
      })
      .collect()
  }

  /// Deployment records by unit, optionally of a single unit.
  pub async fn describe(
    &self,
    unit_name: Option<&str>,
  ) -> Result<BTreeMap<String, Vec<DeploymentRecord>>, EngineError> {
    let state = self.store.load().await?;
    let described: BTreeMap<String, Vec<DeploymentRecord>> = state
      .unit_names()
      .filter(|name| unit_name.is_none_or(|wanted| wanted == *name))
      .map(|name| (name.to_string(), state.records(name).cloned().collect()))
      .collect();

    if let Some(name) = unit_name
      && described.is_empty()
    {
      return Err(EngineError::UnknownUnit {
        name: name.to_string(),
      });
    }
    Ok(described)
  }

  /// Delete every deployed target of one unit and commit the state.
  #[instrument(name = "engine_delete_unit", skip(self, cancel))]
  pub async fn delete_unit(
    &self,
    unit_name: &str,
    cancel: CancellationToken,
  ) -> Result<DeployReport, EngineError> {
    let mut state = self.store.load().await?;
    let targets: Vec<Target> = state.records(unit_name).map(DeploymentRecord::target).collect();
    if targets.is_empty() {
      return Err(EngineError::UnknownUnit {
        name: unit_name.to_string(),
      });
    }
    let organization = self.load_organization(&mut state).await?;

    let definition = state
      .definition(unit_name)
      .cloned()
      .or_else(|| previous_template(&state).and_then(|t| t.unit(unit_name).cloned()))
      .ok_or_else(|| EngineError::UnknownDefinition {
        unit: unit_name.to_string(),
      })?;
    let deployable = self
      .deployable(&definition)
      .map_err(|_| EngineError::UnknownPlugin {
        unit: unit_name.to_string(),
        plugin: definition.plugin().unwrap_or_default().to_string(),
      })?;

    let tasks = targets
      .into_iter()
      .map(|target| Task::delete(unit_name, target, BTreeSet::new(), deployable.clone()))
      .collect();
    let graph = TaskGraph::new(tasks)?;

    let state = Arc::new(Mutex::new(state));
    let hooks = Arc::new(EngineHooks::new(
      Arc::new(organization),
      Some(definition),
      state.clone(),
    ));
    let run = self.runner().run(graph, hooks, cancel).await;

    let mut state = std::mem::take(&mut *state.lock().await);
    self.commit(&mut state).await?;

    Ok(DeployReport {
      planning_errors: Vec::new(),
      run,
    })
  }

  fn plan_template(
    &self,
    template: &TemplateDef,
    organization: &Organization,
    state: &PersistedState,
  ) -> Plan {
    let planner = Planner::new(state);
    let renderer = TemplateRenderer::new(organization, state);
    let resolver =
      BindingResolver::new(organization).with_region_override(self.config.region_override());
    let previous = previous_template(state);

    let mut errors = Vec::new();
    let mut plans = Vec::new();

    for unit in &template.units {
      let deployable = match self.deployable(unit) {
        Ok(deployable) => deployable,
        Err(error) => {
          warn!(error = %error, "unit_skipped");
          errors.push(error);
          continue;
        }
      };

      let targets = match resolver.resolve(&unit.organization_binding) {
        Ok(targets) => targets,
        Err(source) => {
          let error = PlanError::Resolve {
            unit: unit.name.clone(),
            source,
          };
          warn!(error = %error, "unit_skipped");
          errors.push(error);
          continue;
        }
      };

      let renders = targets
        .into_iter()
        .map(|target| {
          let result = renderer.render(unit, &target);
          let imports = match &result {
            Ok(artifact) => artifact.imports.clone(),
            Err(_) => renderer.collect_imports(unit, &target).unwrap_or_default(),
          };
          TargetRender {
            target,
            imports,
            result,
          }
        })
        .collect();

      // Deletes are ordered by what the deployed definition imported.
      let deployed_definition = state
        .definition(&unit.name)
        .or_else(|| previous.as_ref().and_then(|p| p.unit(&unit.name)))
        .unwrap_or(unit);

      let input = UnitInput {
        name: unit.name.clone(),
        deployable,
        renders,
        deployed_imports: deployed_imports(&renderer, state, deployed_definition),
      };
      match planner.plan_unit(input) {
        Ok(plan) => plans.push(plan),
        Err(error) => {
          warn!(error = %error, "unit_skipped");
          errors.push(error);
        }
      }
    }

    let current: HashSet<&str> = template.unit_names().collect();
    let removed: Vec<&str> = state
      .unit_names()
      .filter(|name| !current.contains(name))
      .collect();

    for name in removed {
      let definition = state
        .definition(name)
        .or_else(|| previous.as_ref().and_then(|p| p.unit(name)));
      let found = definition
        .ok_or_else(|| PlanError::UnknownDefinition {
          unit: name.to_string(),
        })
        .and_then(|unit| Ok((unit, self.deployable(unit)?)));
      let (definition, deployable) = match found {
        Ok(found) => found,
        Err(error) => {
          warn!(error = %error, "unit_skipped");
          errors.push(error);
          continue;
        }
      };

      info!(unit = %name, "unit_removed");
      let imports = deployed_imports(&renderer, state, definition);
      match planner.plan_unit(UnitInput::removed(name, deployable, imports)) {
        Ok(plan) => plans.push(plan),
        Err(error) => errors.push(error),
      }
    }

    let mut plan = planner.assemble(plans);
    errors.append(&mut plan.errors);
    plan.errors = errors;
    plan
  }

  fn deployable(&self, unit: &UnitDef) -> Result<Arc<dyn Deployable>, PlanError> {
    match &unit.kind {
      UnitKind::Stack { .. } => Ok(self.stack(&unit.name)),
      UnitKind::Plugin { plugin, config } => match self.plugins.get(plugin) {
        Some(plugin) => Ok(Arc::new(PluginUnit::new(plugin, config.clone()))),
        None => Err(PlanError::UnknownPlugin {
          unit: unit.name.clone(),
          plugin: plugin.clone(),
        }),
      },
    }
  }

  fn stack(&self, name: &str) -> Arc<dyn Deployable> {
    Arc::new(StackUnit::new(name, self.backend.clone()))
  }

  fn runner(&self) -> TaskRunner<N> {
    TaskRunner::with_notifier(self.config.run_options(), self.notifier.clone())
  }

  async fn load_organization(
    &self,
    state: &mut PersistedState,
  ) -> Result<Organization, EngineError> {
    let mut organization = self.directory.load().await?;
    state.bind_organization(&mut organization);
    Ok(organization)
  }

  async fn load_state_or_default(&self) -> Result<PersistedState, EngineError> {
    match self.store.load().await {
      Ok(state) => Ok(state),
      Err(StateError::NotFound { .. }) => Ok(PersistedState::new()),
      Err(e) => Err(e.into()),
    }
  }

  async fn commit(&self, state: &mut PersistedState) -> Result<(), EngineError> {
    state.committed_at = Some(Utc::now());
    self.store.save(state).await?;
    info!("state_committed");
    Ok(())
  }
}

fn previous_template(state: &PersistedState) -> Option<TemplateDef> {
  let text = state.previous_template()?;
  match TemplateDef::parse(text) {
    Ok(template) => Some(template),
    Err(error) => {
      warn!(error = %error, "previous_template_invalid");
      None
    }
  }
}

/// Imports `unit` performs at each of its recorded targets.
fn deployed_imports(
  renderer: &TemplateRenderer<'_>,
  state: &PersistedState,
  unit: &UnitDef,
) -> BTreeMap<String, BTreeSet<ImportRef>> {
  state
    .records(&unit.name)
    .map(|record| {
      let imports = renderer
        .collect_imports(unit, &record.target())
        .unwrap_or_default();
      (record.key(), imports)
    })
    .collect()
}
