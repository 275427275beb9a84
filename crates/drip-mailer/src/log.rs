use async_trait::async_trait;
use tracing::info;

use crate::MailTransport;
use crate::error::TransportError;

/// A transport that logs messages instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
  async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
    info!(to, subject, body_len = body.len(), "email_dry_run");
    Ok(())
  }
}
