//! Drip Store
//!
//! This crate provides the storage trait and SQLite implementation for saved
//! flows and their email jobs.
//!
//! The [`Store`] trait is the only way job state changes:
//! - [`enqueue`](Store::enqueue) creates a pending job, idempotently per
//!   `(flow_id, node_id)`
//! - [`claim_due`](Store::claim_due) atomically moves due jobs from
//!   `pending` to `claimed`, so a job is handed to at most one caller
//! - [`complete`](Store::complete) records `sent` or `failed` exactly once,
//!   and only for the claim that is currently held
//! - [`reclaim_stale`](Store::reclaim_stale) returns jobs whose claimant
//!   died back to `pending`
//!
//! Jobs are never deleted.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{Completion, FlowRecord, Job, JobState, Outcome, Reclaimed};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_workflow::ScheduledAction;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The job already reached a different terminal state.
  #[error("job {job_id} is already finalized as {state}")]
  AlreadyFinalized { job_id: String, state: JobState },

  /// The job is not currently claimed, so it has no outcome to record.
  #[error("job {job_id} is not claimed")]
  NotClaimed { job_id: String },

  /// The claim was released and the job has been claimed again since.
  #[error("job {job_id}: claim for attempt {attempt} is no longer held")]
  StaleClaim { job_id: String, attempt: u32 },

  /// A stored value could not be decoded.
  #[error("corrupt record: {0}")]
  Corrupt(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying the schema failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for flows and jobs.
#[async_trait]
pub trait Store: Send + Sync {
  /// Persist a flow document together with its compiled jobs in one
  /// transaction. Returns the job ids in action order.
  async fn create_flow(
    &self,
    flow: &FlowRecord,
    actions: &[ScheduledAction],
  ) -> Result<Vec<String>, Error>;

  /// Get a flow by ID.
  async fn get_flow(&self, flow_id: &str) -> Result<FlowRecord, Error>;

  /// Create a pending job for an action, or return the id of the job that
  /// already exists for `(flow_id, action.node_id)`.
  async fn enqueue(&self, flow_id: &str, action: &ScheduledAction) -> Result<String, Error>;

  /// Claim up to `limit` pending jobs due at or before `now`.
  async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, Error>;

  /// Record the outcome of a claimed job.
  ///
  /// `attempt` is the job's attempt count as returned by
  /// [`claim_due`](Store::claim_due) and identifies the claim. An outcome
  /// for a claim that was reclaimed in the meantime is refused.
  async fn complete(
    &self,
    job_id: &str,
    attempt: u32,
    outcome: &Outcome,
    at: DateTime<Utc>,
  ) -> Result<Completion, Error>;

  /// Release jobs claimed at or before `cutoff`. Jobs that already used
  /// `max_attempts` attempts are failed instead of released.
  async fn reclaim_stale(
    &self,
    cutoff: DateTime<Utc>,
    max_attempts: u32,
    now: DateTime<Utc>,
  ) -> Result<Reclaimed, Error>;

  /// Trigger time of the earliest pending job.
  async fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, Error>;

  /// Get a job by ID.
  async fn get_job(&self, job_id: &str) -> Result<Job, Error>;

  /// List the jobs of a flow, earliest trigger first.
  async fn list_jobs(&self, flow_id: &str) -> Result<Vec<Job>, Error>;
}
