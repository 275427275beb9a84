//! Time-driven job dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use drip_store::{Completion, Error as StoreError, Job, Outcome, Reclaimed, Store};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::{DispatchEvent, DispatchNotifier, NoopNotifier};
use crate::executor::ActionExecutor;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
  /// Longest sleep between two ticks.
  pub tick_interval: Duration,
  /// How long a claim may stay without an outcome before the job is
  /// considered orphaned. Must comfortably exceed the send timeout.
  pub grace_window: Duration,
  /// Jobs claimed and sent per tick.
  pub max_concurrency: usize,
  /// Claims per job, including retries after a crash.
  pub max_attempts: u32,
}

impl Default for DispatcherConfig {
  fn default() -> Self {
    Self {
      tick_interval: Duration::from_secs(5),
      grace_window: Duration::from_secs(300),
      max_concurrency: 8,
      max_attempts: 2,
    }
  }
}

/// Shortest allowed sleep between two ticks.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

fn sanitize(config: DispatcherConfig, send_timeout: Duration) -> DispatcherConfig {
  let min_grace = send_timeout.saturating_mul(2);
  if config.grace_window < min_grace {
    warn!(
      grace_window = ?config.grace_window,
      send_timeout = ?send_timeout,
      "grace_window_raised"
    );
  }
  if config.tick_interval < MIN_TICK_INTERVAL {
    warn!(tick_interval = ?config.tick_interval, "tick_interval_raised");
  }

  DispatcherConfig {
    tick_interval: config.tick_interval.max(MIN_TICK_INTERVAL),
    grace_window: config.grace_window.max(min_grace),
    max_concurrency: config.max_concurrency.max(1),
    max_attempts: config.max_attempts.max(1),
  }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
  pub reclaimed: Reclaimed,
  pub claimed: usize,
  pub sent: usize,
  pub failed: usize,
}

/// Claims due jobs from the store and executes them.
///
/// One dispatcher runs per process. The store's claim is the only
/// serialization point, so several processes may share a database.
pub struct Dispatcher<N: DispatchNotifier = NoopNotifier> {
  store: Arc<dyn Store>,
  executor: ActionExecutor,
  config: DispatcherConfig,
  notifier: Arc<N>,
  wake: Arc<Notify>,
}

impl Dispatcher<NoopNotifier> {
  /// Create a dispatcher that discards events.
  pub fn new(store: Arc<dyn Store>, executor: ActionExecutor, config: DispatcherConfig) -> Self {
    Self::with_notifier(store, executor, config, NoopNotifier)
  }
}

impl<N: DispatchNotifier + 'static> Dispatcher<N> {
  /// Create a dispatcher with a custom notifier.
  ///
  /// The config is adjusted where it would misbehave: the tick interval is
  /// at least [`MIN_TICK_INTERVAL`], the grace window is at least twice the
  /// executor's send timeout, and concurrency and attempts are at least one.
  pub fn with_notifier(
    store: Arc<dyn Store>,
    executor: ActionExecutor,
    config: DispatcherConfig,
    notifier: N,
  ) -> Self {
    let config = sanitize(config, executor.send_timeout());
    Self {
      store,
      executor,
      config,
      notifier: Arc::new(notifier),
      wake: Arc::new(Notify::new()),
    }
  }

  /// A handle that makes the loop re-check the store immediately. Given to
  /// whoever enqueues jobs.
  pub fn waker(&self) -> Arc<Notify> {
    self.wake.clone()
  }

  /// Run the dispatch loop until `cancel` fires.
  ///
  /// The loop sleeps until the earlier of the next tick and the next
  /// pending trigger time, or until woken. A tick that is already running
  /// when cancellation arrives finishes its sends before the loop returns.
  pub async fn start(self, cancel: CancellationToken) {
    info!(
      tick_interval = ?self.config.tick_interval,
      grace_window = ?self.config.grace_window,
      max_concurrency = self.config.max_concurrency,
      "dispatcher_started"
    );

    loop {
      if cancel.is_cancelled() {
        break;
      }

      match self.tick(Utc::now()).await {
        // A full batch probably means more jobs are due right now.
        Ok(report) if report.claimed == self.config.max_concurrency => continue,
        Ok(_) => {}
        Err(e) => error!(error = %e, "dispatcher_tick_failed"),
      }

      let wait = self.next_wait(Utc::now()).await;
      debug!(wait = ?wait, "dispatcher_sleeping");

      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = self.wake.notified() => {}
        _ = tokio::time::sleep(wait) => {}
      }
    }

    info!("dispatcher_stopped");
  }

  /// Run one dispatch cycle as of `now`: release stale claims, claim what
  /// is due, send it, and record the outcomes.
  pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, StoreError> {
    let grace = TimeDelta::from_std(self.config.grace_window).unwrap_or(TimeDelta::MAX);
    let cutoff = now.checked_sub_signed(grace).unwrap_or(DateTime::<Utc>::MIN_UTC);

    let reclaimed = self
      .store
      .reclaim_stale(cutoff, self.config.max_attempts, now)
      .await?;
    self.report_reclaimed(&reclaimed);

    let jobs = self.store.claim_due(now, self.config.max_concurrency).await?;
    let mut report = TickReport {
      reclaimed,
      claimed: jobs.len(),
      ..Default::default()
    };

    if jobs.is_empty() {
      return Ok(report);
    }

    info!(count = jobs.len(), "jobs_claimed");

    let handles: Vec<_> = jobs
      .into_iter()
      .map(|job| {
        self.notifier.notify(DispatchEvent::JobClaimed {
          job_id: job.job_id.clone(),
          flow_id: job.flow_id.clone(),
          attempt: job.attempts,
        });

        let store = self.store.clone();
        let executor = self.executor.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move { run_job(store, executor, notifier, job).await })
      })
      .collect();

    for result in futures::future::join_all(handles).await {
      match result {
        Ok(Outcome::Sent) => report.sent += 1,
        Ok(Outcome::Failed(_)) => report.failed += 1,
        // The claim stays in place and is released after the grace window.
        Err(e) => error!(error = %e, "job_task_panicked"),
      }
    }

    Ok(report)
  }

  fn report_reclaimed(&self, reclaimed: &Reclaimed) {
    if !reclaimed.requeued.is_empty() {
      warn!(job_ids = ?reclaimed.requeued, "stale_claims_released");
      self.notifier.notify(DispatchEvent::JobsReclaimed {
        job_ids: reclaimed.requeued.clone(),
      });
    }
    if !reclaimed.abandoned.is_empty() {
      warn!(job_ids = ?reclaimed.abandoned, "stale_claims_abandoned");
      self.notifier.notify(DispatchEvent::JobsAbandoned {
        job_ids: reclaimed.abandoned.clone(),
      });
    }
  }

  /// Time until the next tick is needed.
  async fn next_wait(&self, now: DateTime<Utc>) -> Duration {
    let tick = self.config.tick_interval;
    match self.store.next_due_at().await {
      Ok(Some(due)) => (due - now).to_std().unwrap_or(Duration::ZERO).min(tick),
      Ok(None) => tick,
      Err(e) => {
        error!(error = %e, "next_due_lookup_failed");
        tick
      }
    }
  }
}

/// Execute one claimed job and record its outcome.
async fn run_job<N: DispatchNotifier>(
  store: Arc<dyn Store>,
  executor: ActionExecutor,
  notifier: Arc<N>,
  job: Job,
) -> Outcome {
  let outcome = executor.execute(&job).await;

  match store
    .complete(&job.job_id, job.attempts, &outcome, Utc::now())
    .await
  {
    Ok(Completion::Recorded) => {}
    Ok(Completion::Unchanged) => {
      debug!(job_id = %job.job_id, "outcome_already_recorded");
    }
    Err(StoreError::StaleClaim { .. }) => {
      // Another attempt owns the job now.
      warn!(job_id = %job.job_id, attempt = job.attempts, "outcome_from_released_claim");
    }
    Err(e) => {
      // The job stays claimed and is picked up again after the grace
      // window, or it was finalized by someone else.
      error!(job_id = %job.job_id, error = %e, "outcome_not_recorded");
    }
  }

  let event = match &outcome {
    Outcome::Sent => DispatchEvent::JobSent {
      job_id: job.job_id,
      flow_id: job.flow_id,
    },
    Outcome::Failed(reason) => DispatchEvent::JobFailed {
      job_id: job.job_id,
      flow_id: job.flow_id,
      reason: reason.clone(),
    },
  };
  notifier.notify(event);

  outcome
}

#[cfg(test)]
mod tests {
  use super::*;
  use drip_mailer::LogTransport;
  use drip_store::SqliteStore;

  async fn dispatcher(config: DispatcherConfig, send_timeout: Duration) -> Dispatcher {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let executor = ActionExecutor::new(Arc::new(LogTransport)).with_timeout(send_timeout);
    Dispatcher::new(store, executor, config)
  }

  #[tokio::test]
  async fn test_grace_window_outlasts_send_timeout() {
    let config = DispatcherConfig {
      grace_window: Duration::from_secs(10),
      ..Default::default()
    };

    let d = dispatcher(config, Duration::from_secs(30)).await;
    assert_eq!(d.config.grace_window, Duration::from_secs(60));
  }

  #[tokio::test]
  async fn test_zero_tick_and_limits_are_raised() {
    let config = DispatcherConfig {
      tick_interval: Duration::ZERO,
      max_concurrency: 0,
      max_attempts: 0,
      ..Default::default()
    };

    let d = dispatcher(config, Duration::from_secs(30)).await;
    assert_eq!(d.config.tick_interval, MIN_TICK_INTERVAL);
    assert_eq!(d.config.max_concurrency, 1);
    assert_eq!(d.config.max_attempts, 1);
    assert_eq!(d.config.grace_window, Duration::from_secs(300));
  }
}
