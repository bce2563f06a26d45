//! Notification jobs and dispatch reports.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, recipient::RosterKind};

/// One email to one recipient. This is the queue's wire payload; `name` is
/// carried only for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
  pub name:    String,
  pub to:      String,
  pub subject: String,
  pub html:    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
  /// Waiting for its next attempt.
  Pending,
  /// Claimed by a worker.
  Active,
  /// Exhausted its attempts; retained for inspection.
  Failed,
}

impl JobState {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Active => "active",
      Self::Failed => "failed",
    }
  }
}

impl fmt::Display for JobState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for JobState {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(Self::Pending),
      "active" => Ok(Self::Active),
      "failed" => Ok(Self::Failed),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

/// A job as held by a [`crate::store::JobQueue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
  pub job_id:          i64,
  pub job:             NotificationJob,
  pub state:           JobState,
  /// Attempts started so far, including the one in flight.
  pub attempts:        u32,
  pub max_attempts:    u32,
  pub last_error:      Option<String>,
  pub enqueued_at:     DateTime<Utc>,
  pub next_attempt_at: DateTime<Utc>,
  pub finished_at:     Option<DateTime<Utc>>,
}

impl QueuedJob {
  pub fn attempts_left(&self) -> u32 { self.max_attempts.saturating_sub(self.attempts) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
  pub pending: u64,
  pub active:  u64,
  pub failed:  u64,
}

/// Outcome of one dispatch pass over a form's recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
  pub form_id:       Uuid,
  pub roster_kind:   RosterKind,
  /// Size of the resolved roster.
  pub recipients:    usize,
  /// Jobs written to the queue.
  pub enqueued:      usize,
  /// Emails sent synchronously because the queue was unavailable.
  pub sent_directly: usize,
  /// Recipients whose credential was already submitted.
  pub skipped:       usize,
  /// Recipients left with neither a queued job nor a direct send, whether
  /// the credential write, the enqueue or the fallback send failed.
  pub failed:        usize,
  pub dispatched_at: DateTime<Utc>,
}

impl DispatchReport {
  pub fn new(form_id: Uuid, roster_kind: RosterKind, recipients: usize) -> Self {
    Self {
      form_id,
      roster_kind,
      recipients,
      enqueued: 0,
      sent_directly: 0,
      skipped: 0,
      failed: 0,
      dispatched_at: Utc::now(),
    }
  }
}
