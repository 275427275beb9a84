//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use drip_config::{Edge, FlowDef, NodeDef};
use drip_engine::{ActionExecutor, Dispatcher, DispatcherConfig, FlowService};
use drip_mailer::{MailTransport, TransportError};
use drip_store::{SqliteStore, Store};

/// An email handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
  pub to: String,
  pub subject: String,
  pub body: String,
}

/// Records every send. Recipients listed in `reject` fail with a 550.
#[derive(Default)]
pub struct RecordingTransport {
  sent: Mutex<Vec<SentMail>>,
  reject: Vec<String>,
}

impl RecordingTransport {
  pub fn rejecting(recipients: &[&str]) -> Self {
    Self {
      sent: Mutex::new(Vec::new()),
      reject: recipients.iter().map(|r| r.to_string()).collect(),
    }
  }

  pub fn sent(&self) -> Vec<SentMail> {
    self.sent.lock().unwrap().clone()
  }

  pub fn recipients(&self) -> Vec<String> {
    let mut to: Vec<_> = self.sent().into_iter().map(|m| m.to).collect();
    to.sort();
    to
  }
}

#[async_trait]
impl MailTransport for RecordingTransport {
  async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
    self.sent.lock().unwrap().push(SentMail {
      to: to.to_string(),
      subject: subject.to_string(),
      body: body.to_string(),
    });

    if self.reject.iter().any(|r| r == to) {
      return Err(TransportError::Rejected {
        status: 550,
        body: "mailbox unavailable".to_string(),
      });
    }
    Ok(())
  }
}

pub struct Harness {
  pub store: Arc<SqliteStore>,
  pub transport: Arc<RecordingTransport>,
  pub service: FlowService,
  pub dispatcher: Dispatcher,
}

impl Harness {
  pub async fn new() -> Self {
    Self::with_transport(RecordingTransport::default(), DispatcherConfig::default()).await
  }

  pub async fn with_transport(transport: RecordingTransport, config: DispatcherConfig) -> Self {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let transport = Arc::new(transport);
    let dyn_store: Arc<dyn Store> = store.clone();

    let dispatcher = Dispatcher::new(
      dyn_store.clone(),
      ActionExecutor::new(transport.clone()),
      config,
    );
    let service = FlowService::new(dyn_store).with_waker(dispatcher.waker());

    Self {
      store,
      transport,
      service,
      dispatcher,
    }
  }
}

pub fn t0() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Welcome email, wait `minutes`, follow-up email.
pub fn welcome_flow(minutes: f64) -> FlowDef {
  FlowDef {
    nodes: vec![
      NodeDef::email("welcome", "new@user.com", "Welcome", "Glad you are here"),
      NodeDef::delay("wait", minutes),
      NodeDef::email("follow-up", "new@user.com", "Checking in", "How is it going?"),
    ],
    edges: vec![Edge::new("welcome", "wait"), Edge::new("wait", "follow-up")],
  }
}
