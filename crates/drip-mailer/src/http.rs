use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::MailTransport;
use crate::error::TransportError;

/// Request body sent to the relay.
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
  from: &'a str,
  to: &'a str,
  subject: &'a str,
  text: &'a str,
}

/// Delivers mail by posting JSON to an HTTP relay endpoint.
///
/// The relay receives `{ "from", "to", "subject", "text" }` and must answer
/// with a 2xx status on acceptance.
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: Client,
  endpoint: Url,
  token: Option<String>,
  from: String,
}

impl HttpTransport {
  /// Create a transport posting to `endpoint`, sending as `from`.
  pub fn new(endpoint: &str, from: impl Into<String>) -> Result<Self, TransportError> {
    let endpoint =
      Url::parse(endpoint).map_err(|e| TransportError::Config(format!("{}: {}", endpoint, e)))?;

    match endpoint.scheme() {
      "http" | "https" => {}
      scheme => {
        return Err(TransportError::Config(format!(
          "unsupported scheme '{}'",
          scheme
        )));
      }
    }

    Ok(Self {
      client: Client::new(),
      endpoint,
      token: None,
      from: from.into(),
    })
  }

  /// Authenticate against the relay with a bearer token.
  pub fn with_token(mut self, token: impl Into<String>) -> Self {
    self.token = Some(token.into());
    self
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

#[async_trait]
impl MailTransport for HttpTransport {
  async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), TransportError> {
    let message = RelayMessage {
      from: &self.from,
      to,
      subject,
      text: body,
    };

    let mut request = self.client.post(self.endpoint.clone()).json(&message);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    debug!(to, status = status.as_u16(), "relay responded");

    if status.is_success() {
      return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Rejected {
      status: status.as_u16(),
      body,
    })
  }
}
