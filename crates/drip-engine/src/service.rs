//! The save path: validate, compile, persist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use drip_config::FlowDef;
use drip_store::{FlowRecord, Store};
use drip_workflow::{compile, validate};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{error, info, instrument, warn};

use crate::error::SaveError;
use crate::status::FlowStatusReport;

/// Result of saving a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFlow {
  pub flow_id: String,
  pub job_ids: Vec<String>,
}

/// Accepts flow documents and turns them into scheduled jobs.
///
/// Saving is bounded by the size of the graph: it validates, compiles and
/// writes the jobs, then wakes the dispatcher. It never sends mail.
#[derive(Clone)]
pub struct FlowService {
  store: Arc<dyn Store>,
  wake: Option<Arc<Notify>>,
}

impl FlowService {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store, wake: None }
  }

  /// Wake this dispatcher whenever new jobs are saved.
  pub fn with_waker(mut self, wake: Arc<Notify>) -> Self {
    self.wake = Some(wake);
    self
  }

  /// Save a flow that starts now.
  pub async fn save_flow(&self, def: FlowDef) -> Result<SavedFlow, SaveError> {
    self.save_flow_at(def, Utc::now()).await
  }

  /// Save a flow whose schedule is measured from `start`.
  #[instrument(
    name = "save_flow",
    skip(self, def),
    fields(nodes = def.nodes.len(), edges = def.edges.len())
  )]
  pub async fn save_flow_at(
    &self,
    def: FlowDef,
    start: DateTime<Utc>,
  ) -> Result<SavedFlow, SaveError> {
    let graph = validate(&def).inspect_err(|e| {
      warn!(kind = e.kind(), node_id = ?e.node_id(), error = %e, "flow_rejected");
    })?;
    let actions = compile(&graph, start);

    let record = FlowRecord {
      flow_id: uuid::Uuid::new_v4().to_string(),
      document: def,
      created_at: start,
    };
    let job_ids = self
      .store
      .create_flow(&record, &actions)
      .await
      .inspect_err(|e| error!(flow_id = %record.flow_id, error = %e, "flow_save_failed"))?;

    info!(
      flow_id = %record.flow_id,
      jobs = job_ids.len(),
      first_trigger = ?actions.iter().map(|a| a.trigger_at).min(),
      "flow_saved"
    );

    if !job_ids.is_empty()
      && let Some(wake) = &self.wake
    {
      wake.notify_one();
    }

    Ok(SavedFlow {
      flow_id: record.flow_id,
      job_ids,
    })
  }

  /// Current status of a saved flow and its jobs.
  pub async fn flow_status(&self, flow_id: &str) -> Result<FlowStatusReport, drip_store::Error> {
    let flow = self.store.get_flow(flow_id).await?;
    let jobs = self.store.list_jobs(flow_id).await?;
    Ok(FlowStatusReport::new(flow, jobs))
  }
}
