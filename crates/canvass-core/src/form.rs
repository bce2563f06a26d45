//! Forms, their questions, and the division they are bound to.
//!
//! A form is created in [`FormStatus::Draft`] by the form generator and then
//! moved through its lifecycle by administrators (see [`crate::lifecycle`]).
//! Forms are never hard-deleted; `is_deleted` is a soft marker that cascades
//! to questions, credentials and dispatch audit records.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Administrative status of a form. Expiry is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormStatus {
  Draft,
  Active,
  Closed,
}

impl FormStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Draft => "DRAFT",
      Self::Active => "ACTIVE",
      Self::Closed => "CLOSED",
    }
  }
}

impl fmt::Display for FormStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FormStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "DRAFT" => Ok(Self::Draft),
      "ACTIVE" => Ok(Self::Active),
      "CLOSED" => Ok(Self::Closed),
      other => Err(Error::UnknownStatus(other.to_owned())),
    }
  }
}

// ─── Questions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
  /// Answered on a numeric scale.
  Rating,
  /// Free-text answer.
  Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
  pub question_id: Uuid,
  pub form_id:     Uuid,
  /// Zero-based display position within the form.
  pub position:    u32,
  pub text:        String,
  pub kind:        QuestionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
  pub text: String,
  pub kind: QuestionKind,
}

// ─── Form ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Form {
  pub form_id:               Uuid,
  pub title:                 String,
  pub division_id:           Uuid,
  /// The subject/faculty pairing this form asks about. Opaque to this crate.
  pub subject_allocation_id: Uuid,
  pub status:                FormStatus,
  pub is_expired:            bool,
  pub start_date:            Option<DateTime<Utc>>,
  pub end_date:              Option<DateTime<Utc>>,
  pub created_at:            DateTime<Utc>,
  pub is_deleted:            bool,
}

impl Form {
  /// A form is live when it is neither soft-deleted nor expired.
  pub fn is_live(&self) -> bool { !self.is_deleted && !self.is_expired }
}

/// Input to [`crate::store::FeedbackStore::create_form`]. The form is always
/// created in [`FormStatus::Draft`]; `created_at` is set by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewForm {
  pub title:                 String,
  pub division_id:           Uuid,
  pub subject_allocation_id: Uuid,
  #[serde(default)]
  pub questions:             Vec<NewQuestion>,
}

/// A form together with its active questions, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDetail {
  pub form:      Form,
  pub questions: Vec<Question>,
}

// ─── Division ────────────────────────────────────────────────────────────────

/// An enrolment cohort. Owned by the academic-entity subsystem; only the
/// fields the notification template needs are modelled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Division {
  pub division_id: Uuid,
  pub name:        String,
  pub semester:    u8,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_parses_its_own_display() {
    for s in [FormStatus::Draft, FormStatus::Active, FormStatus::Closed] {
      assert_eq!(s.to_string().parse::<FormStatus>().unwrap(), s);
    }
  }

  #[test]
  fn unknown_status_is_rejected() {
    assert!(matches!(
      "OPEN".parse::<FormStatus>(),
      Err(Error::UnknownStatus(s)) if s == "OPEN"
    ));
  }

  #[test]
  fn status_serializes_upper_case() {
    let json = serde_json::to_string(&FormStatus::Active).unwrap();
    assert_eq!(json, "\"ACTIVE\"");
  }
}
