//! The outbound email seam.

use std::{convert::Infallible, future::Future, time::Duration};

use canvass_core::job::NotificationJob;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::{Error, Result};

/// Delivers one rendered invitation.
pub trait Mailer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn send(
    &self,
    job: &NotificationJob,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

// ─── HTTP provider ───────────────────────────────────────────────────────────

/// Connection settings for the mail provider.
#[derive(Clone)]
pub struct MailConfig {
  /// Full URL that accepts `POST` with a JSON message.
  pub endpoint: String,
  pub api_key:  String,
  /// Sender address, e.g. `Feedback <feedback@example.edu>`.
  pub from:     String,
}

impl std::fmt::Debug for MailConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MailConfig")
      .field("endpoint", &self.endpoint)
      .field("from", &self.from)
      .finish_non_exhaustive()
  }
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
  from:    &'a str,
  to:      &'a str,
  subject: &'a str,
  html:    &'a str,
}

/// Sends mail through an HTTP email API with bearer authentication.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone, Debug)]
pub struct HttpMailer {
  client: Client,
  config: MailConfig,
}

impl HttpMailer {
  pub fn new(config: MailConfig) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, config })
  }
}

impl Mailer for HttpMailer {
  type Error = Error;

  async fn send(&self, job: &NotificationJob) -> Result<()> {
    let message = OutgoingMessage {
      from:    &self.config.from,
      to:      &job.to,
      subject: &job.subject,
      html:    &job.html,
    };

    let resp = self
      .client
      .post(&self.config.endpoint)
      .bearer_auth(&self.config.api_key)
      .json(&message)
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(Error::Provider { status: status.as_u16(), body });
    }
    Ok(())
  }
}

// ─── Log only ────────────────────────────────────────────────────────────────

/// Logs each message instead of sending it. Used when no provider is
/// configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
  type Error = Infallible;

  async fn send(&self, job: &NotificationJob) -> Result<(), Infallible> {
    info!(job = %job.name, to = %job.to, subject = %job.subject, "mail delivery skipped (no provider)");
    Ok(())
  }
}
