//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so that SQL string comparison orders them
//! chronologically. UUIDs are stored as hyphenated lowercase strings. Enums
//! are stored as their canonical string forms.

use chrono::{DateTime, SecondsFormat, Utc};
use canvass_core::{
  credential::AccessCredential,
  form::{Division, Form, FormStatus, Question, QuestionKind},
  job::{JobState, NotificationJob, QueuedJob},
  recipient::{OverrideRoster, Recipient, RecipientKind, RosterKind},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<FormStatus> { Ok(s.parse()?) }

pub fn encode_question_kind(k: QuestionKind) -> &'static str {
  match k {
    QuestionKind::Rating => "rating",
    QuestionKind::Text => "text",
  }
}

pub fn decode_question_kind(s: &str) -> Result<QuestionKind> {
  match s {
    "rating" => Ok(QuestionKind::Rating),
    "text" => Ok(QuestionKind::Text),
    other => Err(Error::UnknownValue { column: "questions.kind", value: other.to_owned() }),
  }
}

pub fn decode_recipient_kind(s: &str) -> Result<RecipientKind> {
  match s {
    "student" => Ok(RecipientKind::Student),
    "override" => Ok(RecipientKind::Override),
    other => Err(Error::UnknownValue {
      column: "credentials.recipient_kind",
      value:  other.to_owned(),
    }),
  }
}

pub fn encode_roster_kind(k: RosterKind) -> &'static str { k.as_str() }

pub fn decode_job_state(s: &str) -> Result<JobState> { Ok(s.parse()?) }

// ─── Job payload ─────────────────────────────────────────────────────────────

/// The queue's wire payload. The job name lives in its own column.
#[derive(Serialize, Deserialize)]
struct JobPayload {
  to:      String,
  subject: String,
  html:    String,
}

pub fn encode_payload(job: &NotificationJob) -> Result<String> {
  Ok(serde_json::to_string(&JobPayload {
    to:      job.to.clone(),
    subject: job.subject.clone(),
    html:    job.html.clone(),
  })?)
}

pub fn decode_payload(name: String, s: &str) -> Result<NotificationJob> {
  let JobPayload { to, subject, html } = serde_json::from_str(s)?;
  Ok(NotificationJob { name, to, subject, html })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const FORM_COLUMNS: &str = "form_id, title, division_id, subject_allocation_id, status, \
                                is_expired, start_date, end_date, created_at, is_deleted";

/// Raw values read directly from a `forms` row, in [`FORM_COLUMNS`] order.
pub struct RawForm {
  pub form_id:               String,
  pub title:                 String,
  pub division_id:           String,
  pub subject_allocation_id: String,
  pub status:                String,
  pub is_expired:            bool,
  pub start_date:            Option<String>,
  pub end_date:              Option<String>,
  pub created_at:            String,
  pub is_deleted:            bool,
}

impl RawForm {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      form_id:               row.get(0)?,
      title:                 row.get(1)?,
      division_id:           row.get(2)?,
      subject_allocation_id: row.get(3)?,
      status:                row.get(4)?,
      is_expired:            row.get(5)?,
      start_date:            row.get(6)?,
      end_date:              row.get(7)?,
      created_at:            row.get(8)?,
      is_deleted:            row.get(9)?,
    })
  }

  pub fn into_form(self) -> Result<Form> {
    Ok(Form {
      form_id:               decode_uuid(&self.form_id)?,
      title:                 self.title,
      division_id:           decode_uuid(&self.division_id)?,
      subject_allocation_id: decode_uuid(&self.subject_allocation_id)?,
      status:                decode_status(&self.status)?,
      is_expired:            self.is_expired,
      start_date:            decode_opt_dt(self.start_date.as_deref())?,
      end_date:              decode_opt_dt(self.end_date.as_deref())?,
      created_at:            decode_dt(&self.created_at)?,
      is_deleted:            self.is_deleted,
    })
  }
}

pub struct RawQuestion {
  pub question_id: String,
  pub form_id:     String,
  pub position:    u32,
  pub text:        String,
  pub kind:        String,
}

impl RawQuestion {
  pub fn into_question(self) -> Result<Question> {
    Ok(Question {
      question_id: decode_uuid(&self.question_id)?,
      form_id:     decode_uuid(&self.form_id)?,
      position:    self.position,
      text:        self.text,
      kind:        decode_question_kind(&self.kind)?,
    })
  }
}

pub struct RawDivision {
  pub division_id: String,
  pub name:        String,
  pub semester:    u8,
}

impl RawDivision {
  pub fn into_division(self) -> Result<Division> {
    Ok(Division {
      division_id: decode_uuid(&self.division_id)?,
      name:        self.name,
      semester:    self.semester,
    })
  }
}

/// A student or override member row; the table it came from decides `kind`.
pub struct RawRecipient {
  pub recipient_id:  String,
  pub name:          String,
  pub email:         String,
  pub enrollment_no: String,
}

impl RawRecipient {
  pub fn into_recipient(self, kind: RecipientKind) -> Result<Recipient> {
    Ok(Recipient {
      recipient_id:  decode_uuid(&self.recipient_id)?,
      kind,
      name:          self.name,
      email:         self.email,
      enrollment_no: self.enrollment_no,
    })
  }
}

pub struct RawRoster {
  pub roster_id:  String,
  pub form_id:    String,
  pub label:      String,
  pub is_deleted: bool,
}

impl RawRoster {
  pub fn into_roster(self) -> Result<OverrideRoster> {
    Ok(OverrideRoster {
      roster_id:  decode_uuid(&self.roster_id)?,
      form_id:    decode_uuid(&self.form_id)?,
      label:      self.label,
      is_deleted: self.is_deleted,
    })
  }
}

pub const CREDENTIAL_COLUMNS: &str = "credential_id, form_id, recipient_kind, recipient_id, \
                                      token, is_submitted, is_deleted, created_at";

/// Raw values from a `credentials` row, in [`CREDENTIAL_COLUMNS`] order.
pub struct RawCredential {
  pub credential_id:  String,
  pub form_id:        String,
  pub recipient_kind: String,
  pub recipient_id:   String,
  pub token:          String,
  pub is_submitted:   bool,
  pub is_deleted:     bool,
  pub created_at:     String,
}

impl RawCredential {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      credential_id:  row.get(0)?,
      form_id:        row.get(1)?,
      recipient_kind: row.get(2)?,
      recipient_id:   row.get(3)?,
      token:          row.get(4)?,
      is_submitted:   row.get(5)?,
      is_deleted:     row.get(6)?,
      created_at:     row.get(7)?,
    })
  }

  pub fn into_credential(self) -> Result<AccessCredential> {
    Ok(AccessCredential {
      credential_id:  decode_uuid(&self.credential_id)?,
      form_id:        decode_uuid(&self.form_id)?,
      recipient_kind: decode_recipient_kind(&self.recipient_kind)?,
      recipient_id:   decode_uuid(&self.recipient_id)?,
      token:          self.token,
      is_submitted:   self.is_submitted,
      is_deleted:     self.is_deleted,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

pub const JOB_COLUMNS: &str = "job_id, name, payload, state, attempts, max_attempts, last_error, \
                               enqueued_at, next_attempt_at, finished_at";

/// Raw values from a `notification_jobs` row, in [`JOB_COLUMNS`] order.
pub struct RawJob {
  pub job_id:          i64,
  pub name:            String,
  pub payload:         String,
  pub state:           String,
  pub attempts:        u32,
  pub max_attempts:    u32,
  pub last_error:      Option<String>,
  pub enqueued_at:     String,
  pub next_attempt_at: String,
  pub finished_at:     Option<String>,
}

impl RawJob {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      job_id:          row.get(0)?,
      name:            row.get(1)?,
      payload:         row.get(2)?,
      state:           row.get(3)?,
      attempts:        row.get(4)?,
      max_attempts:    row.get(5)?,
      last_error:      row.get(6)?,
      enqueued_at:     row.get(7)?,
      next_attempt_at: row.get(8)?,
      finished_at:     row.get(9)?,
    })
  }

  pub fn into_job(self) -> Result<QueuedJob> {
    Ok(QueuedJob {
      job_id:          self.job_id,
      job:             decode_payload(self.name, &self.payload)?,
      state:           decode_job_state(&self.state)?,
      attempts:        self.attempts,
      max_attempts:    self.max_attempts,
      last_error:      self.last_error,
      enqueued_at:     decode_dt(&self.enqueued_at)?,
      next_attempt_at: decode_dt(&self.next_attempt_at)?,
      finished_at:     decode_opt_dt(self.finished_at.as_deref())?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  #[test]
  fn encoded_timestamps_sort_chronologically() {
    let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let later = base + Duration::microseconds(1500);
    let much_later = base + Duration::seconds(1);
    assert!(encode_dt(base) < encode_dt(later));
    assert!(encode_dt(later) < encode_dt(much_later));
    assert_eq!(decode_dt(&encode_dt(later)).unwrap(), later);
  }

  #[test]
  fn payload_matches_wire_contract() {
    let job = NotificationJob {
      name:    "form-x".into(),
      to:      "a@example.edu".into(),
      subject: "Hi".into(),
      html:    "<p>x</p>".into(),
    };
    let raw = encode_payload(&job).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["html", "subject", "to"]);
    assert_eq!(decode_payload("form-x".into(), &raw).unwrap(), job);
  }

  #[test]
  fn payload_missing_a_field_is_rejected() {
    let res = decode_payload("form-x".into(), r#"{"to":"a@example.edu","subject":"Hi"}"#);
    assert!(matches!(res, Err(Error::Json(_))));
  }
}
