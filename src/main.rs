use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orgform_engine::{
  BackendConfig, CopyFilePlugin, DeployReport, DeploymentEngine, EngineConfig, FsBackend,
  PluginRegistry,
};
use orgform_organization::FileOrganizationDirectory;
use orgform_state::FsStateStore;
use orgform_workflow::TaskAction;

/// orgform - deploy one infrastructure template across an organization
#[derive(Parser)]
#[command(name = "orgform")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.orgform)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// State file (default: <data-dir>/state.json)
  #[arg(long, global = true)]
  state: Option<PathBuf>,

  /// Organization file (default: <data-dir>/organization.json)
  #[arg(long, global = true)]
  organization: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Create an empty state file
  Init,

  /// Deploy a template
  Deploy {
    /// Path to the template file (JSON)
    template: PathBuf,

    /// Maximum number of tasks running at once
    #[arg(long, default_value_t = 1)]
    max_concurrent: usize,

    /// Number of failed tasks tolerated before the run stops
    #[arg(long, default_value_t = 0)]
    failure_tolerance: usize,

    /// Deploy to these regions instead of the regions of each binding
    #[arg(long = "region")]
    regions: Vec<String>,
  },

  /// Print the tasks a deploy would run
  Plan {
    /// Path to the template file (JSON)
    template: PathBuf,

    #[arg(long = "region")]
    regions: Vec<String>,
  },

  /// Print the rendered stacks of a unit for each of its targets
  PrintStacks {
    /// Path to the template file (JSON)
    template: PathBuf,

    #[arg(long)]
    unit: String,

    /// Write one file per target into this directory instead of printing
    #[arg(long)]
    output_path: Option<PathBuf>,

    #[arg(long = "region")]
    regions: Vec<String>,
  },

  /// Print deployment records
  DescribeStacks {
    #[arg(long)]
    unit: Option<String>,
  },

  /// Delete every deployed target of a unit
  DeleteStacks {
    unit: String,

    #[arg(long, default_value_t = 1)]
    max_concurrent: usize,
  },
}

struct Paths {
  data_dir: PathBuf,
  state: PathBuf,
  organization: PathBuf,
}

impl Paths {
  fn deployments(&self) -> PathBuf {
    self.data_dir.join("deployments")
  }
}

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orgform=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".orgform"),
  };
  let paths = Paths {
    state: cli.state.unwrap_or_else(|| data_dir.join("state.json")),
    organization: cli
      .organization
      .unwrap_or_else(|| data_dir.join("organization.json")),
    data_dir,
  };

  let Some(command) = cli.command else {
    println!("orgform - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run(command, paths).await })
}

async fn run(command: Commands, paths: Paths) -> Result<()> {
  match command {
    Commands::Init => {
      let engine = engine(&paths, EngineConfig::default(), Path::new("."));
      if engine.init().await.context("failed to initialize state")? {
        eprintln!("Initialized state at {}", paths.state.display());
      } else {
        eprintln!("State already exists at {}", paths.state.display());
      }
    }

    Commands::Deploy {
      template,
      max_concurrent,
      failure_tolerance,
      regions,
    } => {
      let text = read_template(&template).await?;
      let config = EngineConfig {
        max_concurrent,
        failure_tolerance,
        regions,
      };
      let engine = engine(&paths, config, template_dir(&template));

      let cancel = CancellationToken::new();
      let on_interrupt = cancel.clone();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          warn!("interrupt_received");
          on_interrupt.cancel();
        }
      });

      let report = engine
        .deploy(&text, cancel)
        .await
        .context("deployment aborted")?;
      print_report(&report);
      if !report.is_success() {
        bail!("deployment finished with errors");
      }
    }

    Commands::Plan { template, regions } => {
      let text = read_template(&template).await?;
      let config = EngineConfig {
        regions,
        ..Default::default()
      };
      let engine = engine(&paths, config, template_dir(&template));
      let plan = engine.plan(&text).await.context("planning failed")?;

      for task in plan.graph.tasks() {
        let action = match task.action() {
          TaskAction::CreateOrUpdate if task.is_deferred() => "create_or_update (deferred)",
          TaskAction::CreateOrUpdate => "create_or_update",
          TaskAction::Delete => "delete",
        };
        println!("{} {}", action, task.id);
        for dependency in &task.depends_on {
          println!("    after {}", dependency);
        }
      }
      for error in &plan.errors {
        eprintln!("error: {}", error);
      }
      eprintln!("{} tasks, {} errors", plan.graph.len(), plan.errors.len());
      if !plan.errors.is_empty() {
        bail!("planning finished with errors");
      }
    }

    Commands::PrintStacks {
      template,
      unit,
      output_path,
      regions,
    } => {
      let text = read_template(&template).await?;
      let config = EngineConfig {
        regions,
        ..Default::default()
      };
      let engine = engine(&paths, config, template_dir(&template));
      let rendered = engine
        .render_unit(&text, &unit)
        .await
        .with_context(|| format!("failed to render unit '{}'", unit))?;

      for (target, artifact) in rendered {
        match &output_path {
          Some(dir) => {
            let path = dir.join(format!(
              "{}-{}-{}.json",
              unit, target.account_id, target.region
            ));
            tokio::fs::create_dir_all(dir)
              .await
              .with_context(|| format!("failed to create {}", dir.display()))?;
            tokio::fs::write(&path, artifact.text())
              .await
              .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
          }
          None => {
            println!("# {}", target);
            println!("{}", artifact.text());
            if !artifact.parameters.is_empty() {
              println!("# parameters");
              println!("{}", serde_json::to_string_pretty(&artifact.parameters)?);
            }
          }
        }
      }
    }

    Commands::DescribeStacks { unit } => {
      let engine = engine(&paths, EngineConfig::default(), Path::new("."));
      let records = engine
        .describe(unit.as_deref())
        .await
        .context("failed to describe stacks")?;
      println!("{}", serde_json::to_string_pretty(&records)?);
    }

    Commands::DeleteStacks {
      unit,
      max_concurrent,
    } => {
      let config = EngineConfig {
        max_concurrent,
        ..Default::default()
      };
      let engine = engine(&paths, config, Path::new("."));
      let report = engine
        .delete_unit(&unit, CancellationToken::new())
        .await
        .with_context(|| format!("failed to delete unit '{}'", unit))?;
      print_report(&report);
      if !report.is_success() {
        bail!("delete finished with errors");
      }
    }
  }

  Ok(())
}

fn engine(paths: &Paths, config: EngineConfig, plugin_source: &Path) -> DeploymentEngine {
  let backend = FsBackend::new(BackendConfig {
    root: paths.deployments(),
  });
  let plugins = PluginRegistry::new().with(Arc::new(CopyFilePlugin::new(
    plugin_source,
    paths.deployments(),
  )));

  DeploymentEngine::new(
    config,
    Arc::new(FileOrganizationDirectory::new(&paths.organization)),
    Arc::new(FsStateStore::new(&paths.state)),
    Arc::new(backend),
  )
  .with_plugins(plugins)
}

async fn read_template(path: &Path) -> Result<String> {
  tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read template file: {}", path.display()))
}

/// Plugin paths in a template are relative to the template's directory.
fn template_dir(template: &Path) -> &Path {
  match template.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  }
}

fn print_report(report: &DeployReport) {
  for error in &report.planning_errors {
    eprintln!("not planned: {}", error);
  }
  for failed in &report.run.failed {
    eprintln!("failed: {}: {}", failed.id, failed.error);
  }
  for skipped in &report.run.skipped {
    eprintln!("skipped: {}: {}", skipped.id, skipped.reason);
  }
  eprintln!(
    "Run {}: {} succeeded, {} failed, {} skipped{}",
    report.run.run_id,
    report.run.succeeded.len(),
    report.run.failed.len(),
    report.run.skipped.len(),
    if report.run.halted { " (halted)" } else { "" },
  );
}
