//! The access gateway: turns a presented token into form content or a
//! definitive rejection.
//!
//! Checks run in a fixed order so the most specific reason is reported:
//!
//! 1. unknown token → [`Rejection::InvalidToken`]
//! 2. form missing or soft-deleted → [`Rejection::NotFound`]
//! 3. credential older than [`validity_window`] → form is marked expired,
//!    [`Rejection::Expired`]
//! 4. form already expired → [`Rejection::Expired`]
//! 5. form not `ACTIVE` → [`Rejection::NotActive`]
//! 6. past the form's end date → [`Rejection::SubmissionClosed`]
//! 7. credential already submitted → [`Rejection::AlreadySubmitted`]

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  credential::AccessCredential,
  form::{Form, FormStatus, Question},
  store::FeedbackStore,
};

/// How many days a credential (and a form, see [`crate::expiry`]) stays
/// usable.
pub const VALIDITY_DAYS: i64 = 7;

pub fn validity_window() -> Duration { Duration::days(VALIDITY_DAYS) }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
  InvalidToken,
  NotFound,
  Expired,
  NotActive,
  SubmissionClosed,
  AlreadySubmitted,
}

impl Rejection {
  /// Stable machine-readable code.
  pub fn code(self) -> &'static str {
    match self {
      Self::InvalidToken => "invalid_token",
      Self::NotFound => "form_not_found",
      Self::Expired => "form_expired",
      Self::NotActive => "form_inactive",
      Self::SubmissionClosed => "submission_closed",
      Self::AlreadySubmitted => "already_submitted",
    }
  }

  /// `true` for rejections that mean the resource does not exist, as opposed
  /// to existing in a state that forbids access.
  pub fn is_not_found(self) -> bool { matches!(self, Self::InvalidToken | Self::NotFound) }
}

impl fmt::Display for Rejection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let msg = match self {
      Self::InvalidToken => "invalid or unknown access token",
      Self::NotFound => "form not found",
      Self::Expired => "this form has expired",
      Self::NotActive => "this form is not currently active",
      Self::SubmissionClosed => "the submission period for this form has ended",
      Self::AlreadySubmitted => "a response has already been submitted with this link",
    };
    f.write_str(msg)
  }
}

/// What a recipient sees after a successful token check. Never carries the
/// recipient's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormContent {
  pub form_id:   Uuid,
  pub title:     String,
  pub end_date:  Option<DateTime<Utc>>,
  pub questions: Vec<Question>,
}

/// Result of the pure part of the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  Allow,
  /// The credential outlived [`validity_window`]; the caller must persist
  /// the form's expiry before rejecting.
  Lapsed,
  Reject(Rejection),
}

/// Evaluate checks 2–7 for an already-found credential.
pub fn evaluate(
  form: Option<&Form>,
  credential: &AccessCredential,
  now: DateTime<Utc>,
) -> Verdict {
  let Some(form) = form.filter(|f| !f.is_deleted) else {
    return Verdict::Reject(Rejection::NotFound);
  };
  if now - credential.created_at > validity_window() {
    return Verdict::Lapsed;
  }
  if form.is_expired {
    return Verdict::Reject(Rejection::Expired);
  }
  if form.status != FormStatus::Active {
    return Verdict::Reject(Rejection::NotActive);
  }
  if form.end_date.is_some_and(|end| now > end) {
    return Verdict::Reject(Rejection::SubmissionClosed);
  }
  if credential.is_submitted {
    return Verdict::Reject(Rejection::AlreadySubmitted);
  }
  Verdict::Allow
}

/// Resolve `token` at time `now`.
///
/// Rejections come back as [`Error::Rejected`]; any other error is an
/// infrastructure failure.
pub async fn resolve_token<S>(store: &S, token: &str, now: DateTime<Utc>) -> Result<FormContent>
where
  S: FeedbackStore,
{
  let credential = store
    .find_credential(token)
    .await
    .map_err(Error::store)?
    .ok_or(Rejection::InvalidToken)?;

  let form = store
    .get_form(credential.form_id)
    .await
    .map_err(Error::store)?;

  // A deleted credential on a live form cannot come from the cascade.
  if credential.is_deleted && form.as_ref().is_some_and(|f| !f.is_deleted) {
    return Err(Rejection::InvalidToken.into());
  }

  match evaluate(form.as_ref(), &credential, now) {
    Verdict::Allow => {}
    Verdict::Lapsed => {
      store
        .mark_expired(credential.form_id)
        .await
        .map_err(Error::store)?;
      return Err(Rejection::Expired.into());
    }
    Verdict::Reject(r) => return Err(r.into()),
  }

  // `evaluate` only allows a present form.
  let form = form.ok_or(Rejection::NotFound)?;
  let questions = store
    .list_questions(form.form_id)
    .await
    .map_err(Error::store)?;

  Ok(FormContent {
    form_id: form.form_id,
    title: form.title,
    end_date: form.end_date,
    questions,
  })
}
