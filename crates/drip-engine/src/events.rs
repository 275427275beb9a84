//! Dispatch events and notifiers for observability.
//!
//! The dispatcher emits an event whenever a job changes hands, so that
//! consumers can stream progress, collect metrics or wait on it in tests.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchEvent {
  /// A due job was claimed for sending.
  JobClaimed {
    job_id: String,
    flow_id: String,
    attempt: u32,
  },

  /// The email was handed to the transport successfully.
  JobSent { job_id: String, flow_id: String },

  /// Sending failed; the job will not be retried.
  JobFailed {
    job_id: String,
    flow_id: String,
    reason: String,
  },

  /// Stale claims were released for another attempt.
  JobsReclaimed { job_ids: Vec<String> },

  /// Stale claims that were out of attempts were failed.
  JobsAbandoned { job_ids: Vec<String> },
}

/// Trait for receiving dispatch events.
pub trait DispatchNotifier: Send + Sync {
  /// Called when a dispatch event occurs.
  fn notify(&self, event: DispatchEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl DispatchNotifier for NoopNotifier {
  fn notify(&self, _event: DispatchEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Unbounded so that a slow consumer never stalls dispatching. Volume is a
/// handful of events per job.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<DispatchEvent>,
}

impl ChannelNotifier {
  /// Create a new channel notifier.
  pub fn new(sender: mpsc::UnboundedSender<DispatchEvent>) -> Self {
    Self { sender }
  }
}

impl DispatchNotifier for ChannelNotifier {
  fn notify(&self, event: DispatchEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
