//! Email execution.

use std::sync::Arc;
use std::time::Duration;

use drip_mailer::MailTransport;
use drip_store::{Job, Outcome};
use tracing::{info, instrument, warn};

/// Hands jobs to the mail transport and turns whatever happens into an
/// [`Outcome`]. Never fails itself.
#[derive(Clone)]
pub struct ActionExecutor {
  transport: Arc<dyn MailTransport>,
  send_timeout: Duration,
}

impl ActionExecutor {
  /// Create an executor with the default 30 second send timeout.
  pub fn new(transport: Arc<dyn MailTransport>) -> Self {
    Self {
      transport,
      send_timeout: Duration::from_secs(30),
    }
  }

  pub fn with_timeout(mut self, send_timeout: Duration) -> Self {
    self.send_timeout = send_timeout;
    self
  }

  pub fn send_timeout(&self) -> Duration {
    self.send_timeout
  }

  /// Send the email described by `job`.
  #[instrument(
    name = "job_execute",
    skip(self, job),
    fields(
      job_id = %job.job_id,
      flow_id = %job.flow_id,
      node_id = %job.node_id,
      attempt = job.attempts,
    )
  )]
  pub async fn execute(&self, job: &Job) -> Outcome {
    let payload = &job.payload;
    let send = self
      .transport
      .send(&payload.to, &payload.subject, &payload.message);

    match tokio::time::timeout(self.send_timeout, send).await {
      Ok(Ok(())) => {
        info!(to = %payload.to, "email_sent");
        Outcome::Sent
      }
      Ok(Err(e)) => {
        warn!(to = %payload.to, error = %e, "email_failed");
        Outcome::Failed(e.to_string())
      }
      Err(_) => {
        warn!(to = %payload.to, timeout = ?self.send_timeout, "email_timed_out");
        Outcome::Failed(format!("send timed out after {:?}", self.send_timeout))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use chrono::Utc;
  use drip_mailer::TransportError;
  use drip_store::JobState;
  use drip_workflow::EmailPayload;

  enum Behavior {
    Accept,
    Reject,
    Hang,
  }

  struct StubTransport(Behavior);

  #[async_trait]
  impl MailTransport for StubTransport {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), TransportError> {
      match self.0 {
        Behavior::Accept => Ok(()),
        Behavior::Reject => Err(TransportError::Rejected {
          status: 550,
          body: "mailbox unavailable".to_string(),
        }),
        Behavior::Hang => {
          tokio::time::sleep(Duration::from_secs(60)).await;
          Ok(())
        }
      }
    }
  }

  fn job() -> Job {
    Job {
      job_id: "job-1".to_string(),
      flow_id: "flow-1".to_string(),
      node_id: "node-1".to_string(),
      trigger_at: Utc::now(),
      payload: EmailPayload {
        to: "a@x.com".to_string(),
        subject: "Hi".to_string(),
        message: "Hello".to_string(),
      },
      state: JobState::Claimed,
      attempts: 1,
      claimed_at: Some(Utc::now()),
      attempted_at: None,
      error: None,
    }
  }

  #[tokio::test]
  async fn test_success_maps_to_sent() {
    let executor = ActionExecutor::new(Arc::new(StubTransport(Behavior::Accept)));
    assert_eq!(executor.execute(&job()).await, Outcome::Sent);
  }

  #[tokio::test]
  async fn test_transport_error_maps_to_failed() {
    let executor = ActionExecutor::new(Arc::new(StubTransport(Behavior::Reject)));

    match executor.execute(&job()).await {
      Outcome::Failed(reason) => assert!(reason.contains("550")),
      other => panic!("expected failure, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_slow_transport_times_out() {
    let executor = ActionExecutor::new(Arc::new(StubTransport(Behavior::Hang)))
      .with_timeout(Duration::from_millis(20));

    match executor.execute(&job()).await {
      Outcome::Failed(reason) => assert!(reason.contains("timed out")),
      other => panic!("expected timeout, got {:?}", other),
    }
  }
}
