//! Recipients and roster resolution.
//!
//! A form is sent either to its division's students or to a form-specific
//! override roster. When the override roster is live and has at least one
//! live member it replaces the division roster entirely; the two are never
//! merged.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  form::Form,
  store::FeedbackStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientKind {
  Student,
  Override,
}

impl RecipientKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Student => "student",
      Self::Override => "override",
    }
  }
}

impl fmt::Display for RecipientKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Someone eligible to receive a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
  pub recipient_id:  Uuid,
  pub kind:          RecipientKind,
  pub name:          String,
  pub email:         String,
  /// Stable secondary identifier, mixed into token derivation.
  pub enrollment_no: String,
}

/// Input for roster ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecipient {
  pub name:          String,
  pub email:         String,
  pub enrollment_no: String,
}

/// A form-specific replacement for the division roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRoster {
  pub roster_id:  Uuid,
  pub form_id:    Uuid,
  pub label:      String,
  pub is_deleted: bool,
}

/// Where a set of recipients is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterSource {
  Division(Uuid),
  Override(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterKind {
  Division,
  Override,
}

impl RosterKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Division => "division",
      Self::Override => "override",
    }
  }
}

/// The authoritative audience of a form at dispatch time.
#[derive(Debug, Clone)]
pub struct ResolvedRoster {
  pub kind:       RosterKind,
  /// Human-readable audience label used in the notification: the division
  /// name, or the override roster's label.
  pub label:      String,
  /// Semester of the form's division, whichever roster wins.
  pub semester:   u8,
  pub recipients: Vec<Recipient>,
}

/// Determine the recipients of `form`.
///
/// An empty roster is a valid outcome, not an error.
pub async fn resolve_recipients<S>(store: &S, form: &Form) -> Result<ResolvedRoster>
where
  S: FeedbackStore,
{
  let division = store
    .get_division(form.division_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::DivisionNotFound(form.division_id))?;

  let roster = store
    .find_override_roster(form.form_id)
    .await
    .map_err(Error::store)?;

  if let Some(roster) = roster.filter(|r| !r.is_deleted) {
    let members = store
      .list_active_recipients(RosterSource::Override(roster.roster_id))
      .await
      .map_err(Error::store)?;
    if !members.is_empty() {
      return Ok(ResolvedRoster {
        kind:       RosterKind::Override,
        label:      roster.label,
        semester:   division.semester,
        recipients: members,
      });
    }
  }

  let students = store
    .list_active_recipients(RosterSource::Division(division.division_id))
    .await
    .map_err(Error::store)?;

  Ok(ResolvedRoster {
    kind:       RosterKind::Division,
    label:      division.name,
    semester:   division.semester,
    recipients: students,
  })
}
