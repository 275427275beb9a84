//! Drip Engine
//!
//! This crate wires the flow graph, the job store and the mail transport
//! together.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        FlowService                          │
//! │  - save_flow(def) → validate → compile → persist jobs       │
//! │  - wakes the dispatcher, never sends mail itself            │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ Store
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                           │
//! │  - start(cancel) runs the tick loop                         │
//! │  - tick(now): reclaim stale claims, claim due jobs,         │
//! │    send them concurrently, record outcomes                  │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ActionExecutor                         │
//! │  - execute(job) → Outcome via the mail transport            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Delivery guarantee
//!
//! A job is claimed by exactly one dispatcher tick. If the process dies after
//! claiming a job but before recording its outcome, the job is released again
//! once the grace window has passed and is retried, up to
//! [`DispatcherConfig::max_attempts`] claims in total. A crash in the middle
//! of a send can therefore deliver the same email twice; this is at most once
//! per attempt, not exactly once.
//!
//! # Usage
//!
//! ```ignore
//! let store: Arc<dyn Store> = Arc::new(SqliteStore::connect("sqlite://drip.db").await?);
//! let executor = ActionExecutor::new(Arc::new(LogTransport));
//! let dispatcher = Dispatcher::new(store.clone(), executor, DispatcherConfig::default());
//!
//! let service = FlowService::new(store).with_waker(dispatcher.waker());
//! let saved = service.save_flow(flow_def).await?;
//!
//! let cancel = CancellationToken::new();
//! dispatcher.start(cancel).await;
//! ```

mod dispatcher;
mod error;
mod events;
mod executor;
mod service;
mod status;

pub use dispatcher::{Dispatcher, DispatcherConfig, MIN_TICK_INTERVAL, TickReport};
pub use error::SaveError;
pub use events::{ChannelNotifier, DispatchEvent, DispatchNotifier, NoopNotifier};
pub use executor::ActionExecutor;
pub use service::{FlowService, SavedFlow};
pub use status::{FlowStatus, FlowStatusReport};
