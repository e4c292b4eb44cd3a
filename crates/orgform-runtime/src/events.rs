//! Execution events and notifiers for observability.
//!
//! Events are emitted while a plan executes so callers can report progress,
//! stream it elsewhere, or assert on ordering in tests.

use orgform_workflow::{TaskAction, TaskId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
  RunStarted { run_id: String, tasks: usize },

  TaskStarted {
    run_id: String,
    task: TaskId,
    action: TaskAction,
  },

  TaskSucceeded { run_id: String, task: TaskId },

  TaskFailed {
    run_id: String,
    task: TaskId,
    error: String,
  },

  TaskSkipped {
    run_id: String,
    task: TaskId,
    reason: String,
  },

  /// Admission stopped: tolerance exceeded or cancelled.
  RunHalted { run_id: String, failures: usize },

  RunCompleted {
    run_id: String,
    succeeded: usize,
    failed: usize,
    skipped: usize,
  },
}

/// Receives run events.
///
/// The runner calls `notify` from its coordinator; implementations must not
/// block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: RunEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: RunEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: RunEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
