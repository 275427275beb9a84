//! Drip Mailer
//!
//! The mail transport is the one side-effecting collaborator of the
//! dispatcher. It takes a recipient, subject and body and reports success or
//! failure; it never retries.
//!
//! - [`HttpTransport`] posts the message to an HTTP mail relay
//! - [`LogTransport`] only logs the message (dry run)

mod error;
mod http;
mod log;

pub use error::TransportError;
pub use http::HttpTransport;
pub use log::LogTransport;

use async_trait::async_trait;

/// Sends a single email.
#[async_trait]
pub trait MailTransport: Send + Sync {
  async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError>;
}
