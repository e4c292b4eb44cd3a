use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use orgform_organization::Target;
use orgform_render::{ImportRef, RenderedArtifact};
use orgform_runtime::{
  ChannelNotifier, RunEvent, RunOptions, SkipReason, TaskHooks, TaskOutcome, TaskRunner, TaskStatus,
};
use orgform_workflow::{Deployable, Outputs, Task, TaskError, TaskGraph, TaskId, TaskKind};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MockDeployable {
  delay: Option<Duration>,
  slow: HashMap<String, Duration>,
  failing: HashSet<String>,
  panicking: HashSet<String>,
  running: AtomicUsize,
  max_running: AtomicUsize,
  applied: Mutex<Vec<String>>,
  deleted: Mutex<Vec<String>>,
}

impl MockDeployable {
  fn failing(mut self, account: &str) -> Self {
    self.failing.insert(account.to_string());
    self
  }

  fn panicking(mut self, account: &str) -> Self {
    self.panicking.insert(account.to_string());
    self
  }

  fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  fn slow(mut self, account: &str, delay: Duration) -> Self {
    self.slow.insert(account.to_string(), delay);
    self
  }
}

#[async_trait]
impl Deployable for MockDeployable {
  fn kind(&self) -> &str {
    "mock"
  }

  fn content_hash(&self, artifact: &RenderedArtifact) -> Result<String, TaskError> {
    Ok(artifact.digest())
  }

  async fn apply(&self, target: &Target, _artifact: &RenderedArtifact) -> Result<Outputs, TaskError> {
    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_running.fetch_max(now, Ordering::SeqCst);
    if let Some(delay) = self.slow.get(&target.account_id).copied().or(self.delay) {
      tokio::time::sleep(delay).await;
    }
    self.running.fetch_sub(1, Ordering::SeqCst);

    if self.panicking.contains(&target.account_id) {
      panic!("backend exploded");
    }
    if self.failing.contains(&target.account_id) {
      return Err(TaskError::backend("apply", "stack rollback"));
    }

    self.applied.lock().unwrap().push(target.account_id.clone());
    let mut outputs = BTreeMap::new();
    outputs.insert("BucketName".to_string(), format!("bucket-{}", target.account_id));
    Ok(outputs)
  }

  async fn delete(&self, target: &Target) -> Result<(), TaskError> {
    self.deleted.lock().unwrap().push(target.account_id.clone());
    Ok(())
  }
}

#[derive(Default)]
struct MockHooks {
  resolved: Mutex<Vec<TaskId>>,
  completed: Mutex<Vec<(TaskId, TaskOutcome)>>,
}

#[async_trait]
impl TaskHooks for MockHooks {
  async fn resolve(&self, task: &Task) -> Result<RenderedArtifact, TaskError> {
    self.resolved.lock().unwrap().push(task.id.clone());
    Ok(RenderedArtifact::new(json!({ "Resolved": task.id.to_string() })))
  }

  async fn completed(&self, task: &Task, outcome: &TaskOutcome) {
    self.completed.lock().unwrap().push((task.id.clone(), outcome.clone()));
  }
}

/// Hooks whose late resolution always fails.
#[derive(Default)]
struct FailingHooks {
  completed: Mutex<Vec<TaskId>>,
}

#[async_trait]
impl TaskHooks for FailingHooks {
  async fn resolve(&self, task: &Task) -> Result<RenderedArtifact, TaskError> {
    Err(TaskError::LateResolution {
      message: format!("output of {} is missing", task.id),
    })
  }

  async fn completed(&self, task: &Task, _outcome: &TaskOutcome) {
    self.completed.lock().unwrap().push(task.id.clone());
  }
}

fn deferred(task: Task) -> Task {
  Task {
    kind: TaskKind::CreateOrUpdate {
      artifact: None,
      content_hash: None,
    },
    ..task
  }
}

fn position(events: &[RunEvent], predicate: impl Fn(&RunEvent) -> bool) -> usize {
  events.iter().position(predicate).unwrap()
}

fn target(account: &str) -> Target {
  Target::new(account, "eu-west-1", format!("Account{}", account))
}

fn create(unit: &str, account: &str, deployable: &Arc<MockDeployable>) -> Task {
  let artifact = RenderedArtifact::new(json!({ "Unit": unit }));
  let hash = artifact.digest();
  Task::create_or_update(
    unit,
    target(account),
    Some(artifact),
    Some(hash),
    BTreeSet::new(),
    deployable.clone() as Arc<dyn Deployable>,
  )
}

fn depends(mut task: Task, on: &Task) -> Task {
  task.imports.insert(ImportRef {
    unit: on.id.unit.clone(),
    account_id: on.id.account_id.clone(),
    region: on.id.region.clone(),
    output: "BucketName".to_string(),
  });
  task.depends_on.insert(on.id.clone());
  task
}

fn drain(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

#[tokio::test]
async fn test_empty_graph_succeeds() {
  let runner = TaskRunner::new(RunOptions::default());
  let result = runner
    .run(TaskGraph::default(), Arc::new(MockHooks::default()), CancellationToken::new())
    .await;

  assert!(result.is_success());
  assert!(result.succeeded.is_empty());
  assert!(!result.run_id.is_empty());
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
  let deployable = Arc::new(MockDeployable::default().with_delay(Duration::from_millis(20)));
  let tasks = (0..6)
    .map(|i| create("bucket", &format!("10{}", i), &deployable))
    .collect();
  let graph = TaskGraph::new(tasks).unwrap();

  let options = RunOptions {
    max_concurrent: 2,
    failure_tolerance: 0,
  };
  let result = TaskRunner::new(options)
    .run(graph, Arc::new(MockHooks::default()), CancellationToken::new())
    .await;

  assert!(result.is_success());
  assert_eq!(result.succeeded.len(), 6);
  assert_eq!(deployable.max_running.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_zero_concurrency_still_runs() {
  let deployable = Arc::new(MockDeployable::default());
  let graph = TaskGraph::new(vec![create("bucket", "101", &deployable)]).unwrap();

  let options = RunOptions {
    max_concurrent: 0,
    failure_tolerance: 0,
  };
  let result = TaskRunner::new(options)
    .run(graph, Arc::new(MockHooks::default()), CancellationToken::new())
    .await;

  assert!(result.is_success());
}

#[tokio::test]
async fn test_dependent_starts_after_dependency_succeeds() {
  let deployable = Arc::new(MockDeployable::default().with_delay(Duration::from_millis(10)));
  let producer = create("bucket", "101", &deployable);
  let consumer = depends(create("policy", "101", &deployable), &producer);
  let producer_id = producer.id.clone();
  let consumer_id = consumer.id.clone();
  let graph = TaskGraph::new(vec![consumer, producer]).unwrap();

  let (tx, mut rx) = mpsc::unbounded_channel();
  let options = RunOptions {
    max_concurrent: 4,
    failure_tolerance: 0,
  };
  let hooks = Arc::new(MockHooks::default());
  let result = TaskRunner::with_notifier(options, ChannelNotifier::new(tx))
    .run(graph, hooks.clone(), CancellationToken::new())
    .await;

  assert!(result.is_success());

  let events = drain(&mut rx);
  let producer_done = events
    .iter()
    .position(|e| matches!(e, RunEvent::TaskSucceeded { task, .. } if *task == producer_id))
    .unwrap();
  let consumer_started = events
    .iter()
    .position(|e| matches!(e, RunEvent::TaskStarted { task, .. } if *task == consumer_id))
    .unwrap();
  assert!(producer_done < consumer_started);
  assert!(matches!(events.first(), Some(RunEvent::RunStarted { tasks: 2, .. })));
  assert!(matches!(
    events.last(),
    Some(RunEvent::RunCompleted {
      succeeded: 2,
      failed: 0,
      skipped: 0,
      ..
    })
  ));

  // Only the consumer reads outputs produced in this run.
  assert_eq!(*hooks.resolved.lock().unwrap(), vec![consumer_id.clone()]);
}

#[tokio::test]
async fn test_late_resolution_hash_is_recorded() {
  let deployable = Arc::new(MockDeployable::default());
  let producer = create("bucket", "101", &deployable);
  let mut consumer = depends(create("policy", "101", &deployable), &producer);
  consumer.kind = TaskKind::CreateOrUpdate {
    artifact: None,
    content_hash: None,
  };
  let consumer_id = consumer.id.clone();
  let graph = TaskGraph::new(vec![producer, consumer]).unwrap();

  let hooks = Arc::new(MockHooks::default());
  let result = TaskRunner::new(RunOptions::default())
    .run(graph, hooks.clone(), CancellationToken::new())
    .await;
  assert!(result.is_success());

  let expected = RenderedArtifact::new(json!({ "Resolved": consumer_id.to_string() })).digest();
  let completed = hooks.completed.lock().unwrap();
  let (_, outcome) = completed.iter().find(|(id, _)| *id == consumer_id).unwrap();
  assert_eq!(outcome.content_hash.as_deref(), Some(expected.as_str()));
  assert_eq!(outcome.outputs["BucketName"], "bucket-101");
}

#[tokio::test]
async fn test_failure_skips_dependents_transitively() {
  let deployable = Arc::new(MockDeployable::default().failing("101"));
  let a = create("a", "101", &deployable);
  let b = depends(create("b", "102", &deployable), &a);
  let c = depends(create("c", "103", &deployable), &b);
  let other = create("other", "104", &deployable);
  let a_id = a.id.clone();
  let c_id = c.id.clone();
  let graph = TaskGraph::new(vec![a, b, c, other]).unwrap();

  let options = RunOptions {
    max_concurrent: 1,
    failure_tolerance: 5,
  };
  let hooks = Arc::new(MockHooks::default());
  let result = TaskRunner::new(options)
    .run(graph, hooks.clone(), CancellationToken::new())
    .await;

  assert!(!result.halted);
  assert_eq!(result.failed.len(), 1);
  assert_eq!(result.failed[0].id, a_id);
  assert_eq!(result.skipped.len(), 2);
  for skipped in &result.skipped {
    assert_eq!(
      skipped.reason,
      SkipReason::DependencyFailed {
        dependency: a_id.clone()
      }
    );
  }
  assert_eq!(result.status(&c_id), Some(TaskStatus::Skipped));
  assert_eq!(result.succeeded.len(), 1);
  assert_eq!(*deployable.applied.lock().unwrap(), vec!["104".to_string()]);
  assert_eq!(hooks.completed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_tolerance_exceeded_halts_admission() {
  let deployable = Arc::new(MockDeployable::default().failing("101"));
  let graph = TaskGraph::new(vec![
    create("bucket", "101", &deployable),
    create("bucket", "102", &deployable),
    create("bucket", "103", &deployable),
  ])
  .unwrap();

  let (tx, mut rx) = mpsc::unbounded_channel();
  let options = RunOptions {
    max_concurrent: 1,
    failure_tolerance: 0,
  };
  let result = TaskRunner::with_notifier(options, ChannelNotifier::new(tx))
    .run(graph, Arc::new(MockHooks::default()), CancellationToken::new())
    .await;

  assert!(result.halted);
  assert!(!result.is_success());
  assert_eq!(result.failed.len(), 1);
  assert_eq!(result.skipped.len(), 2);
  assert!(result.skipped.iter().all(|s| s.reason == SkipReason::Halted));
  assert!(deployable.applied.lock().unwrap().is_empty());

  let events = drain(&mut rx);
  assert!(events.iter().any(|e| matches!(e, RunEvent::RunHalted { failures: 1, .. })));
}

#[tokio::test]
async fn test_failures_within_tolerance_continue() {
  let deployable = Arc::new(MockDeployable::default().failing("101"));
  let graph = TaskGraph::new(vec![
    create("bucket", "101", &deployable),
    create("bucket", "102", &deployable),
  ])
  .unwrap();

  let options = RunOptions {
    max_concurrent: 1,
    failure_tolerance: 1,
  };
  let result = TaskRunner::new(options)
    .run(graph, Arc::new(MockHooks::default()), CancellationToken::new())
    .await;

  assert!(!result.halted);
  assert_eq!(result.failed.len(), 1);
  assert_eq!(result.succeeded.len(), 1);
}

#[tokio::test]
async fn test_panic_counts_as_failure() {
  let deployable = Arc::new(MockDeployable::default().panicking("101"));
  let graph = TaskGraph::new(vec![
    create("bucket", "101", &deployable),
    create("bucket", "102", &deployable),
  ])
  .unwrap();

  let options = RunOptions {
    max_concurrent: 2,
    failure_tolerance: 1,
  };
  let result = TaskRunner::new(options)
    .run(graph, Arc::new(MockHooks::default()), CancellationToken::new())
    .await;

  assert_eq!(result.failed.len(), 1);
  match &result.failed[0].error {
    TaskError::Aborted { message } => assert_eq!(message, "backend exploded"),
    other => panic!("expected aborted, got {:?}", other),
  }
  assert_eq!(result.succeeded.len(), 1);
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
  let deployable = Arc::new(MockDeployable::default());
  let graph = TaskGraph::new(vec![
    create("bucket", "101", &deployable),
    create("bucket", "102", &deployable),
  ])
  .unwrap();

  let cancel = CancellationToken::new();
  cancel.cancel();
  let result = TaskRunner::new(RunOptions::default())
    .run(graph, Arc::new(MockHooks::default()), cancel)
    .await;

  assert!(result.halted);
  assert_eq!(result.skipped.len(), 2);
  assert!(deployable.applied.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_task_calls_delete() {
  let deployable = Arc::new(MockDeployable::default());
  let task = Task::delete(
    "bucket",
    target("101"),
    BTreeSet::new(),
    deployable.clone() as Arc<dyn Deployable>,
  );
  let graph = TaskGraph::new(vec![task]).unwrap();

  let hooks = Arc::new(MockHooks::default());
  let result = TaskRunner::new(RunOptions::default())
    .run(graph, hooks.clone(), CancellationToken::new())
    .await;

  assert!(result.is_success());
  assert_eq!(*deployable.deleted.lock().unwrap(), vec!["101".to_string()]);
  let completed = hooks.completed.lock().unwrap();
  assert_eq!(completed[0].1, TaskOutcome::default());
}

#[tokio::test]
async fn test_unbounded_concurrency_is_clamped() {
  let deployable = Arc::new(MockDeployable::default());
  let graph = TaskGraph::new(vec![
    create("bucket", "101", &deployable),
    create("bucket", "102", &deployable),
  ])
  .unwrap();

  let options = RunOptions {
    max_concurrent: usize::MAX,
    failure_tolerance: 0,
  };
  let result = TaskRunner::new(options)
    .run(graph, Arc::new(MockHooks::default()), CancellationToken::new())
    .await;

  assert!(result.is_success());
  assert_eq!(result.succeeded.len(), 2);
}

#[tokio::test]
async fn test_halt_lets_running_tasks_finish() {
  let deployable = Arc::new(
    MockDeployable::default()
      .failing("101")
      .slow("102", Duration::from_millis(100)),
  );
  let slow = create("bucket", "102", &deployable);
  let slow_id = slow.id.clone();
  let graph = TaskGraph::new(vec![
    create("bucket", "101", &deployable),
    slow,
    create("bucket", "103", &deployable),
    create("bucket", "104", &deployable),
  ])
  .unwrap();

  let options = RunOptions {
    max_concurrent: 2,
    failure_tolerance: 0,
  };
  let hooks = Arc::new(MockHooks::default());
  let result = TaskRunner::new(options)
    .run(graph, hooks.clone(), CancellationToken::new())
    .await;

  assert!(result.halted);
  assert_eq!(result.failed.len(), 1);
  assert_eq!(result.succeeded, vec![slow_id.clone()]);
  assert_eq!(result.status(&slow_id), Some(TaskStatus::Succeeded));
  assert_eq!(result.skipped.len(), 2);
  assert!(result.skipped.iter().all(|s| s.reason == SkipReason::Halted));
  assert_eq!(*deployable.applied.lock().unwrap(), vec!["102".to_string()]);
  assert_eq!(hooks.completed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ready_task_does_not_wait_for_unrelated_work() {
  let deployable = Arc::new(MockDeployable::default().slow("101", Duration::from_millis(200)));
  let a = create("a", "101", &deployable);
  let b = create("b", "102", &deployable);
  let c = depends(create("c", "103", &deployable), &b);
  let a_id = a.id.clone();
  let c_id = c.id.clone();
  let graph = TaskGraph::new(vec![a, b, c]).unwrap();

  let (tx, mut rx) = mpsc::unbounded_channel();
  let options = RunOptions {
    max_concurrent: 4,
    failure_tolerance: 0,
  };
  let result = TaskRunner::with_notifier(options, ChannelNotifier::new(tx))
    .run(graph, Arc::new(MockHooks::default()), CancellationToken::new())
    .await;
  assert!(result.is_success());

  let events = drain(&mut rx);
  let c_started = position(&events, |e| {
    matches!(e, RunEvent::TaskStarted { task, .. } if *task == c_id)
  });
  let c_done = position(&events, |e| {
    matches!(e, RunEvent::TaskSucceeded { task, .. } if *task == c_id)
  });
  let a_done = position(&events, |e| {
    matches!(e, RunEvent::TaskSucceeded { task, .. } if *task == a_id)
  });
  assert!(c_started < a_done);
  assert!(c_done < a_done);
}

#[tokio::test]
async fn test_failed_late_resolution_skips_dependents() {
  let deployable = Arc::new(MockDeployable::default());
  let producer = create("bucket", "101", &deployable);
  let consumer = deferred(depends(create("policy", "102", &deployable), &producer));
  let downstream = depends(create("alarm", "103", &deployable), &consumer);
  let consumer_id = consumer.id.clone();
  let downstream_id = downstream.id.clone();
  let graph = TaskGraph::new(vec![producer, consumer, downstream]).unwrap();

  let options = RunOptions {
    max_concurrent: 2,
    failure_tolerance: 5,
  };
  let hooks = Arc::new(FailingHooks::default());
  let result = TaskRunner::new(options)
    .run(graph, hooks.clone(), CancellationToken::new())
    .await;

  assert!(!result.halted);
  assert_eq!(result.failed.len(), 1);
  assert_eq!(result.failed[0].id, consumer_id);
  assert!(matches!(
    result.failed[0].error,
    TaskError::LateResolution { .. }
  ));
  assert_eq!(result.status(&downstream_id), Some(TaskStatus::Skipped));
  assert_eq!(
    result.skipped[0].reason,
    SkipReason::DependencyFailed {
      dependency: consumer_id
    }
  );
  assert_eq!(*deployable.applied.lock().unwrap(), vec!["101".to_string()]);
  assert_eq!(hooks.completed.lock().unwrap().len(), 1);
}
