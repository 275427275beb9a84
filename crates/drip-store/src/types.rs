use std::fmt;

use chrono::{DateTime, Utc};
use drip_config::FlowDef;
use drip_workflow::EmailPayload;
use serde::{Deserialize, Serialize};

/// Execution state of a job.
///
/// `pending -> claimed -> {sent, failed}`. The terminal states are permanent;
/// `claimed` only goes back to `pending` through [`reclaim_stale`].
///
/// [`reclaim_stale`]: crate::Store::reclaim_stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobState {
  Pending,
  Claimed,
  Sent,
  Failed,
}

impl JobState {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobState::Pending => "pending",
      JobState::Claimed => "claimed",
      JobState::Sent => "sent",
      JobState::Failed => "failed",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, JobState::Sent | JobState::Failed)
  }
}

impl fmt::Display for JobState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
  Sent,
  Failed(String),
}

impl Outcome {
  /// The terminal state this outcome moves a job to.
  pub fn state(&self) -> JobState {
    match self {
      Outcome::Sent => JobState::Sent,
      Outcome::Failed(_) => JobState::Failed,
    }
  }

  pub fn reason(&self) -> Option<&str> {
    match self {
      Outcome::Sent => None,
      Outcome::Failed(reason) => Some(reason),
    }
  }
}

/// What [`complete`](crate::Store::complete) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
  /// The outcome was recorded.
  Recorded,
  /// The job already carried this outcome; nothing changed.
  Unchanged,
}

/// Jobs touched by [`reclaim_stale`](crate::Store::reclaim_stale).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reclaimed {
  /// Returned to `pending` for another attempt.
  pub requeued: Vec<String>,
  /// Out of attempts, now `failed`.
  pub abandoned: Vec<String>,
}

impl Reclaimed {
  pub fn is_empty(&self) -> bool {
    self.requeued.is_empty() && self.abandoned.is_empty()
  }
}

/// A saved flow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
  pub flow_id: String,
  pub document: FlowDef,
  pub created_at: DateTime<Utc>,
}

/// A scheduled email and its execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub job_id: String,
  pub flow_id: String,
  pub node_id: String,
  pub trigger_at: DateTime<Utc>,
  pub payload: EmailPayload,
  pub state: JobState,
  /// Number of times the job has been claimed.
  pub attempts: u32,
  pub claimed_at: Option<DateTime<Utc>>,
  pub attempted_at: Option<DateTime<Utc>>,
  pub error: Option<String>,
}
