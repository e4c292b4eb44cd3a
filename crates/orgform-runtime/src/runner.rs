use std::any::Any;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use orgform_render::RenderedArtifact;
use orgform_workflow::{Task, TaskError, TaskGraph, TaskKind};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::events::{ExecutionNotifier, NoopNotifier, RunEvent};
use crate::hooks::{TaskHooks, TaskOutcome};
use crate::result::{FailedTask, RunResult, SkipReason, SkippedTask, TaskStatus};

/// Limits of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
  /// Maximum number of tasks running at once (at least one).
  pub max_concurrent: usize,
  /// Number of failures tolerated before admission stops.
  pub failure_tolerance: usize,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self {
      max_concurrent: 1,
      failure_tolerance: 0,
    }
  }
}

impl RunOptions {
  /// Concurrency actually granted: at least one, at most what a semaphore can hold.
  pub fn permits(&self) -> usize {
    self.max_concurrent.clamp(1, Semaphore::MAX_PERMITS)
  }
}

/// Executes task graphs.
pub struct TaskRunner<N: ExecutionNotifier = NoopNotifier> {
  options: RunOptions,
  notifier: N,
}

impl TaskRunner<NoopNotifier> {
  pub fn new(options: RunOptions) -> Self {
    Self::with_notifier(options, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> TaskRunner<N> {
  pub fn with_notifier(options: RunOptions, notifier: N) -> Self {
    Self { options, notifier }
  }

  pub fn options(&self) -> RunOptions {
    self.options
  }

  /// Run every task of `graph` to a terminal state.
  ///
  /// The coordinator owns all scheduling state; workers only execute one
  /// task each and report back through the join set.
  #[instrument(
    name = "task_runner_run",
    skip(self, graph, hooks, cancel),
    fields(
      tasks = graph.len(),
      max_concurrent = self.options.max_concurrent,
      failure_tolerance = self.options.failure_tolerance,
    )
  )]
  pub async fn run(
    &self,
    graph: TaskGraph,
    hooks: Arc<dyn TaskHooks>,
    cancel: CancellationToken,
  ) -> RunResult {
    let run_id = uuid::Uuid::new_v4().to_string();
    let mut run = Run {
      run_id: run_id.clone(),
      notifier: &self.notifier,
      status: vec![TaskStatus::Pending; graph.len()],
      result: RunResult::new(&run_id),
    };

    info!(run_id = %run_id, tasks = graph.len(), "run_started");
    self.notifier.notify(RunEvent::RunStarted {
      run_id: run_id.clone(),
      tasks: graph.len(),
    });

    let mut waiting: Vec<usize> = (0..graph.len()).map(|i| graph.upstream(i).len()).collect();
    let mut ready: VecDeque<usize> = VecDeque::new();
    for i in graph.entry_points() {
      run.status[i] = TaskStatus::Ready;
      ready.push_back(i);
    }

    let semaphore = Arc::new(Semaphore::new(self.options.permits()));
    let mut workers: JoinSet<(usize, Result<TaskOutcome, TaskError>)> = JoinSet::new();
    let mut failures = 0usize;
    let mut halted = false;

    loop {
      if !halted && cancel.is_cancelled() {
        halted = true;
        warn!(run_id = %run_id, "run_cancelled");
        run.halt(failures);
      }

      if halted {
        while let Some(i) = ready.pop_front() {
          run.skip(&graph, i, SkipReason::Halted);
        }
      } else {
        while let Some(&i) = ready.front() {
          let Ok(permit) = semaphore.clone().try_acquire_owned() else {
            break;
          };
          ready.pop_front();
          run.status[i] = TaskStatus::Running;

          let task = graph.task(i).clone();
          info!(
            run_id = %run_id,
            task = %task.id,
            action = %task.action(),
            kind = task.deployable.kind(),
            "task_started"
          );
          self.notifier.notify(RunEvent::TaskStarted {
            run_id: run_id.clone(),
            task: task.id.clone(),
            action: task.action(),
          });

          let hooks = hooks.clone();
          workers.spawn(async move {
            let _permit = permit;
            let outcome = AssertUnwindSafe(execute(&task, hooks.as_ref()))
              .catch_unwind()
              .await
              .unwrap_or_else(|panic| {
                Err(TaskError::Aborted {
                  message: panic_message(panic),
                })
              });
            (i, outcome)
          });
        }
      }

      let Some(joined) = workers.join_next().await else {
        break;
      };

      match joined {
        Ok((i, Ok(outcome))) => {
          let task = graph.task(i);
          hooks.completed(task, &outcome).await;
          run.status[i] = TaskStatus::Succeeded;
          run.result.succeeded.push(task.id.clone());

          info!(run_id = %run_id, task = %task.id, "task_completed");
          self.notifier.notify(RunEvent::TaskSucceeded {
            run_id: run_id.clone(),
            task: task.id.clone(),
          });

          for &d in graph.downstream(i) {
            waiting[d] -= 1;
            if waiting[d] == 0 && run.status[d] == TaskStatus::Pending {
              run.status[d] = TaskStatus::Ready;
              ready.push_back(d);
            }
          }
        }
        Ok((i, Err(task_error))) => {
          let task = graph.task(i);
          failures += 1;
          run.status[i] = TaskStatus::Failed;

          error!(run_id = %run_id, task = %task.id, error = %task_error, "task_failed");
          self.notifier.notify(RunEvent::TaskFailed {
            run_id: run_id.clone(),
            task: task.id.clone(),
            error: task_error.to_string(),
          });
          run.result.failed.push(FailedTask {
            id: task.id.clone(),
            error: task_error,
          });

          run.skip_dependents(&graph, i);

          if !halted && failures > self.options.failure_tolerance {
            halted = true;
            warn!(
              run_id = %run_id,
              failures,
              failure_tolerance = self.options.failure_tolerance,
              "failure_tolerance_exceeded"
            );
            run.halt(failures);
          }
        }
        Err(join_error) => {
          // Panics are caught inside the worker, so this only happens when
          // the runtime shuts down underneath us.
          error!(run_id = %run_id, error = %join_error, "worker_lost");
        }
      }
    }

    for i in 0..graph.len() {
      match run.status[i] {
        TaskStatus::Pending | TaskStatus::Ready => run.skip(&graph, i, SkipReason::Halted),
        TaskStatus::Running => {
          run.status[i] = TaskStatus::Failed;
          run.result.failed.push(FailedTask {
            id: graph.task(i).id.clone(),
            error: TaskError::Aborted {
              message: "worker terminated before reporting".to_string(),
            },
          });
        }
        _ => {}
      }
    }

    let mut result = run.result;
    result.halted = halted;

    info!(
      run_id = %run_id,
      succeeded = result.succeeded.len(),
      failed = result.failed.len(),
      skipped = result.skipped.len(),
      halted,
      "run_completed"
    );
    self.notifier.notify(RunEvent::RunCompleted {
      run_id,
      succeeded: result.succeeded.len(),
      failed: result.failed.len(),
      skipped: result.skipped.len(),
    });

    result
  }
}

/// Scheduling state of one run, owned by the coordinator.
struct Run<'n, N: ExecutionNotifier> {
  run_id: String,
  notifier: &'n N,
  status: Vec<TaskStatus>,
  result: RunResult,
}

impl<N: ExecutionNotifier> Run<'_, N> {
  fn skip(&mut self, graph: &TaskGraph, index: usize, reason: SkipReason) {
    let task = graph.task(index);
    self.status[index] = TaskStatus::Skipped;

    warn!(run_id = %self.run_id, task = %task.id, reason = %reason, "task_skipped");
    self.notifier.notify(RunEvent::TaskSkipped {
      run_id: self.run_id.clone(),
      task: task.id.clone(),
      reason: reason.to_string(),
    });
    self.result.skipped.push(SkippedTask {
      id: task.id.clone(),
      reason,
    });
  }

  /// Skip every pending task that transitively depends on `failed`.
  fn skip_dependents(&mut self, graph: &TaskGraph, failed: usize) {
    let dependency = graph.task(failed).id.clone();
    let mut stack: Vec<usize> = graph.downstream(failed).to_vec();

    while let Some(i) = stack.pop() {
      if self.status[i] != TaskStatus::Pending {
        continue;
      }
      self.skip(
        graph,
        i,
        SkipReason::DependencyFailed {
          dependency: dependency.clone(),
        },
      );
      stack.extend_from_slice(graph.downstream(i));
    }
  }

  fn halt(&self, failures: usize) {
    self.notifier.notify(RunEvent::RunHalted {
      run_id: self.run_id.clone(),
      failures,
    });
  }
}

/// Execute one task: late resolution if needed, then apply or delete.
async fn execute(task: &Task, hooks: &dyn TaskHooks) -> Result<TaskOutcome, TaskError> {
  match &task.kind {
    TaskKind::CreateOrUpdate {
      artifact,
      content_hash,
    } => {
      let (artifact, hash) = if task.needs_late_resolution() {
        let artifact = hooks.resolve(task).await?;
        let (artifact, hash) = hash_blocking(task, artifact).await?;
        (Cow::Owned(artifact), hash)
      } else {
        let artifact = artifact.as_ref().ok_or_else(|| TaskError::LateResolution {
          message: "task has no rendered artifact".to_string(),
        })?;
        match content_hash {
          Some(hash) => (Cow::Borrowed(artifact), hash.clone()),
          None => {
            let (artifact, hash) = hash_blocking(task, artifact.clone()).await?;
            (Cow::Owned(artifact), hash)
          }
        }
      };

      let outputs = task.deployable.apply(&task.target, &artifact).await?;
      Ok(TaskOutcome {
        outputs,
        content_hash: Some(hash),
      })
    }
    TaskKind::Delete => {
      task.deployable.delete(&task.target).await?;
      Ok(TaskOutcome::default())
    }
  }
}

/// Hash `artifact` on the blocking pool, since hashing may read local files.
async fn hash_blocking(
  task: &Task,
  artifact: RenderedArtifact,
) -> Result<(RenderedArtifact, String), TaskError> {
  let deployable = task.deployable.clone();
  let (artifact, hash) = tokio::task::spawn_blocking(move || {
    let hash = deployable.content_hash(&artifact);
    (artifact, hash)
  })
  .await
  .map_err(|e| TaskError::Aborted {
    message: e.to_string(),
  })?;
  Ok((artifact, hash?))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
  panic
    .downcast_ref::<&str>()
    .map(|s| s.to_string())
    .or_else(|| panic.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "task panicked".to_string())
}
