use thiserror::Error;

/// Errors reported by a mail transport.
#[derive(Debug, Error)]
pub enum TransportError {
  /// The relay could not be reached.
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  /// The relay answered with a non-success status.
  #[error("relay rejected message with status {status}: {body}")]
  Rejected { status: u16, body: String },

  /// The transport is misconfigured.
  #[error("invalid transport configuration: {0}")]
  Config(String),
}
