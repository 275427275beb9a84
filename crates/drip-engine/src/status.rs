//! Flow status derived from job states.

use chrono::{DateTime, Utc};
use drip_store::{FlowRecord, Job, JobState};
use serde::{Deserialize, Serialize};

/// Overall progress of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
  /// Nothing has been attempted yet.
  Scheduled,
  /// Some jobs are in flight or finished while others are still pending.
  Running,
  /// Every email was sent.
  Completed,
  /// Every job finished and at least one failed.
  CompletedWithErrors,
}

impl FlowStatus {
  pub fn from_states(states: impl IntoIterator<Item = JobState>) -> Self {
    let (mut pending, mut claimed, mut failed, mut total) = (0, 0, 0, 0);
    for state in states {
      total += 1;
      match state {
        JobState::Pending => pending += 1,
        JobState::Claimed => claimed += 1,
        JobState::Failed => failed += 1,
        JobState::Sent => {}
      }
    }

    if pending == 0 && claimed == 0 {
      if failed > 0 {
        FlowStatus::CompletedWithErrors
      } else {
        FlowStatus::Completed
      }
    } else if claimed > 0 || pending < total {
      FlowStatus::Running
    } else {
      FlowStatus::Scheduled
    }
  }
}

/// A flow with its jobs, as shown to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatusReport {
  pub flow_id: String,
  pub created_at: DateTime<Utc>,
  pub status: FlowStatus,
  pub jobs: Vec<Job>,
}

impl FlowStatusReport {
  pub fn new(flow: FlowRecord, jobs: Vec<Job>) -> Self {
    Self {
      status: FlowStatus::from_states(jobs.iter().map(|j| j.state)),
      flow_id: flow.flow_id,
      created_at: flow.created_at,
      jobs,
    }
  }
}
