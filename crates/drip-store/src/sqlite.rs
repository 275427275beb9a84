use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_config::FlowDef;
use drip_workflow::{EmailPayload, ScheduledAction};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::{Completion, Error, FlowRecord, Job, JobState, Outcome, Reclaimed, Store};

const JOB_COLUMNS: &str = "job_id, flow_id, node_id, trigger_at, payload, state, attempts, claimed_at, attempted_at, error";

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url` and apply migrations.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?
      .create_if_missing(true)
      .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A private in-memory database, mainly for tests.
  ///
  /// Pinned to a single connection that is never recycled, since every
  /// in-memory connection is its own database.
  pub async fn in_memory() -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect_with(options)
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }

  /// Close the pool, waiting for checked-out connections to be returned.
  pub async fn close(&self) {
    self.pool.close().await;
  }
}

#[derive(FromRow)]
struct FlowRow {
  flow_id: String,
  document: Json<FlowDef>,
  created_at: i64,
}

impl TryFrom<FlowRow> for FlowRecord {
  type Error = Error;

  fn try_from(row: FlowRow) -> Result<Self, Error> {
    Ok(FlowRecord {
      flow_id: row.flow_id,
      document: row.document.0,
      created_at: from_millis(row.created_at)?,
    })
  }
}

#[derive(FromRow)]
struct JobRow {
  job_id: String,
  flow_id: String,
  node_id: String,
  trigger_at: i64,
  payload: Json<EmailPayload>,
  state: JobState,
  attempts: i64,
  claimed_at: Option<i64>,
  attempted_at: Option<i64>,
  error: Option<String>,
}

impl TryFrom<JobRow> for Job {
  type Error = Error;

  fn try_from(row: JobRow) -> Result<Self, Error> {
    Ok(Job {
      trigger_at: from_millis(row.trigger_at)?,
      claimed_at: row.claimed_at.map(from_millis).transpose()?,
      attempted_at: row.attempted_at.map(from_millis).transpose()?,
      attempts: u32::try_from(row.attempts)
        .map_err(|_| Error::Corrupt(format!("job {}: negative attempt count", row.job_id)))?,
      job_id: row.job_id,
      flow_id: row.flow_id,
      node_id: row.node_id,
      payload: row.payload.0,
      state: row.state,
      error: row.error,
    })
  }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, Error> {
  DateTime::from_timestamp_millis(ms)
    .ok_or_else(|| Error::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn into_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>, Error> {
  rows.into_iter().map(Job::try_from).collect()
}

/// Insert a pending job unless one exists for the node, and return the id
/// of whichever job is stored.
async fn enqueue_on(
  conn: &mut SqliteConnection,
  flow_id: &str,
  action: &ScheduledAction,
) -> Result<String, Error> {
  sqlx::query(
    r#"
    INSERT INTO jobs (job_id, flow_id, node_id, trigger_at, payload, state, attempts)
    VALUES (?, ?, ?, ?, ?, 'pending', 0)
    ON CONFLICT (flow_id, node_id) DO NOTHING
    "#,
  )
  .bind(uuid::Uuid::new_v4().to_string())
  .bind(flow_id)
  .bind(&action.node_id)
  .bind(action.trigger_at.timestamp_millis())
  .bind(Json(&action.payload))
  .execute(&mut *conn)
  .await?;

  let job_id = sqlx::query_scalar("SELECT job_id FROM jobs WHERE flow_id = ? AND node_id = ?")
    .bind(flow_id)
    .bind(&action.node_id)
    .fetch_one(&mut *conn)
    .await?;

  Ok(job_id)
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_flow(
    &self,
    flow: &FlowRecord,
    actions: &[ScheduledAction],
  ) -> Result<Vec<String>, Error> {
    let mut tx = self.pool.begin().await?;

    sqlx::query("INSERT INTO flows (flow_id, document, created_at) VALUES (?, ?, ?)")
      .bind(&flow.flow_id)
      .bind(Json(&flow.document))
      .bind(flow.created_at.timestamp_millis())
      .execute(&mut *tx)
      .await?;

    let mut job_ids = Vec::with_capacity(actions.len());
    for action in actions {
      job_ids.push(enqueue_on(&mut tx, &flow.flow_id, action).await?);
    }

    tx.commit().await?;
    Ok(job_ids)
  }

  async fn get_flow(&self, flow_id: &str) -> Result<FlowRecord, Error> {
    let row: Option<FlowRow> =
      sqlx::query_as("SELECT flow_id, document, created_at FROM flows WHERE flow_id = ?")
        .bind(flow_id)
        .fetch_optional(&self.pool)
        .await?;

    row
      .ok_or_else(|| Error::NotFound(format!("flow {}", flow_id)))?
      .try_into()
  }

  async fn enqueue(&self, flow_id: &str, action: &ScheduledAction) -> Result<String, Error> {
    let mut conn = self.pool.acquire().await?;
    enqueue_on(&mut conn, flow_id, action).await
  }

  async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, Error> {
    let now_ms = now.timestamp_millis();

    // One statement, so the select and the state change happen under the
    // same write lock.
    let rows: Vec<JobRow> = sqlx::query_as(&format!(
      r#"
      UPDATE jobs
      SET state = 'claimed', claimed_at = ?, attempts = attempts + 1
      WHERE state = 'pending' AND job_id IN (
        SELECT job_id FROM jobs
        WHERE state = 'pending' AND trigger_at <= ?
        ORDER BY trigger_at, job_id
        LIMIT ?
      )
      RETURNING {JOB_COLUMNS}
      "#
    ))
    .bind(now_ms)
    .bind(now_ms)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(&self.pool)
    .await?;

    let mut jobs = into_jobs(rows)?;
    jobs.sort_by(|a, b| (a.trigger_at, &a.job_id).cmp(&(b.trigger_at, &b.job_id)));
    Ok(jobs)
  }

  async fn complete(
    &self,
    job_id: &str,
    attempt: u32,
    outcome: &Outcome,
    at: DateTime<Utc>,
  ) -> Result<Completion, Error> {
    let result = sqlx::query(
      r#"
      UPDATE jobs
      SET state = ?, attempted_at = ?, error = ?
      WHERE job_id = ? AND state = 'claimed' AND attempts = ?
      "#,
    )
    .bind(outcome.state())
    .bind(at.timestamp_millis())
    .bind(outcome.reason())
    .bind(job_id)
    .bind(i64::from(attempt))
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 1 {
      return Ok(Completion::Recorded);
    }

    let job = self.get_job(job_id).await?;
    if job.state == JobState::Pending {
      Err(Error::NotClaimed { job_id: job.job_id })
    } else if job.attempts != attempt {
      Err(Error::StaleClaim {
        job_id: job.job_id,
        attempt,
      })
    } else if job.state == outcome.state() {
      Ok(Completion::Unchanged)
    } else {
      Err(Error::AlreadyFinalized {
        job_id: job.job_id,
        state: job.state,
      })
    }
  }

  async fn reclaim_stale(
    &self,
    cutoff: DateTime<Utc>,
    max_attempts: u32,
    now: DateTime<Utc>,
  ) -> Result<Reclaimed, Error> {
    let cutoff_ms = cutoff.timestamp_millis();
    let mut tx = self.pool.begin().await?;

    let abandoned: Vec<String> = sqlx::query_scalar(
      r#"
      UPDATE jobs
      SET state = 'failed', attempted_at = ?,
          error = 'abandoned after ' || attempts || ' attempts'
      WHERE state = 'claimed' AND claimed_at <= ? AND attempts >= ?
      RETURNING job_id
      "#,
    )
    .bind(now.timestamp_millis())
    .bind(cutoff_ms)
    .bind(i64::from(max_attempts))
    .fetch_all(&mut *tx)
    .await?;

    let requeued: Vec<String> = sqlx::query_scalar(
      r#"
      UPDATE jobs
      SET state = 'pending', claimed_at = NULL
      WHERE state = 'claimed' AND claimed_at <= ?
      RETURNING job_id
      "#,
    )
    .bind(cutoff_ms)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Reclaimed {
      requeued,
      abandoned,
    })
  }

  async fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, Error> {
    let next: Option<i64> =
      sqlx::query_scalar("SELECT MIN(trigger_at) FROM jobs WHERE state = 'pending'")
        .fetch_one(&self.pool)
        .await?;

    next.map(from_millis).transpose()
  }

  async fn get_job(&self, job_id: &str) -> Result<Job, Error> {
    let row: Option<JobRow> = sqlx::query_as(&format!(
      "SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = ?"
    ))
    .bind(job_id)
    .fetch_optional(&self.pool)
    .await?;

    row
      .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?
      .try_into()
  }

  async fn list_jobs(&self, flow_id: &str) -> Result<Vec<Job>, Error> {
    let rows: Vec<JobRow> = sqlx::query_as(&format!(
      "SELECT {JOB_COLUMNS} FROM jobs WHERE flow_id = ? ORDER BY trigger_at, node_id"
    ))
    .bind(flow_id)
    .fetch_all(&self.pool)
    .await?;

    into_jobs(rows)
  }
}
