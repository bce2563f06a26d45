//! The form lifecycle state machine.
//!
//! ```text
//!   DRAFT ──► ACTIVE ◄──► CLOSED
//!     └──────────────────►  ▲
//! ```
//!
//! Every transition whose target is `ACTIVE` (including `ACTIVE → ACTIVE`
//! and reopening a closed form) triggers a dispatch pass. Nothing returns to
//! `DRAFT` once it has left it. Expiry is orthogonal and is handled by
//! [`crate::expiry`] and [`crate::access`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  form::{Form, FormStatus},
  store::FeedbackStore,
};

/// A requested status write, optionally rescheduling the form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
  pub status:     FormStatus,
  #[serde(default)]
  pub start_date: Option<DateTime<Utc>>,
  #[serde(default)]
  pub end_date:   Option<DateTime<Utc>>,
}

impl StatusChange {
  pub fn to(status: FormStatus) -> Self {
    Self { status, start_date: None, end_date: None }
  }
}

/// The result of an accepted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
  pub from:              FormStatus,
  pub to:                FormStatus,
  pub triggers_dispatch: bool,
}

/// Validate `from → to` without touching any state.
pub fn check_transition(from: FormStatus, to: FormStatus) -> Result<Transition> {
  use FormStatus::*;

  let allowed = match (from, to) {
    (Draft, _) => true,
    (Active | Closed, Active | Closed) => true,
    (Active | Closed, Draft) => false,
  };

  if !allowed {
    return Err(Error::InvalidTransition { from, to });
  }

  Ok(Transition { from, to, triggers_dispatch: to == Active })
}

/// Reject schedules whose end precedes their start, taking stored dates into
/// account for the side that is not being changed.
pub fn check_schedule(form: &Form, change: &StatusChange) -> Result<()> {
  let start = change.start_date.or(form.start_date);
  let end = change.end_date.or(form.end_date);
  if let (Some(start), Some(end)) = (start, end)
    && end < start
  {
    return Err(Error::InvalidSchedule(format!(
      "end date {end} precedes start date {start}"
    )));
  }
  Ok(())
}

/// Apply `change` to a single form.
///
/// The write is a compare-and-set against the status observed here, so a
/// concurrent change to the same form surfaces as [`Error::StatusConflict`]
/// instead of being silently overwritten. Dispatch is the caller's concern.
pub async fn change_status<S>(
  store: &S,
  form_id: Uuid,
  change: StatusChange,
) -> Result<(Form, Transition)>
where
  S: FeedbackStore,
{
  let form = store
    .get_form(form_id)
    .await
    .map_err(Error::store)?
    .filter(|f| !f.is_deleted)
    .ok_or(Error::FormNotFound(form_id))?;

  let transition = check_transition(form.status, change.status)?;
  check_schedule(&form, &change)?;

  let updated = store
    .set_form_status(form_id, form.status, change)
    .await
    .map_err(Error::store)?
    .ok_or(Error::StatusConflict(form_id))?;

  Ok((updated, transition))
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn form() -> Form {
    Form {
      form_id:               Uuid::new_v4(),
      title:                 "Mid-semester feedback".into(),
      division_id:           Uuid::new_v4(),
      subject_allocation_id: Uuid::new_v4(),
      status:                FormStatus::Draft,
      is_expired:            false,
      start_date:            None,
      end_date:              None,
      created_at:            Utc::now(),
      is_deleted:            false,
    }
  }

  #[test]
  fn activation_triggers_dispatch() {
    let t = check_transition(FormStatus::Draft, FormStatus::Active).unwrap();
    assert!(t.triggers_dispatch);
  }

  #[test]
  fn reactivation_triggers_dispatch_again() {
    assert!(check_transition(FormStatus::Active, FormStatus::Active).unwrap().triggers_dispatch);
    assert!(check_transition(FormStatus::Closed, FormStatus::Active).unwrap().triggers_dispatch);
  }

  #[test]
  fn closing_does_not_dispatch() {
    let t = check_transition(FormStatus::Active, FormStatus::Closed).unwrap();
    assert!(!t.triggers_dispatch);
    let t = check_transition(FormStatus::Draft, FormStatus::Closed).unwrap();
    assert!(!t.triggers_dispatch);
  }

  #[test]
  fn nothing_returns_to_draft() {
    for from in [FormStatus::Active, FormStatus::Closed] {
      assert!(matches!(
        check_transition(from, FormStatus::Draft),
        Err(Error::InvalidTransition { to: FormStatus::Draft, .. })
      ));
    }
    assert!(check_transition(FormStatus::Draft, FormStatus::Draft).is_ok());
  }

  #[test]
  fn end_before_start_is_rejected() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let change = StatusChange {
      status:     FormStatus::Active,
      start_date: Some(start),
      end_date:   Some(start - Duration::days(1)),
    };
    assert!(matches!(check_schedule(&form(), &change), Err(Error::InvalidSchedule(_))));
  }

  #[test]
  fn schedule_is_checked_against_stored_dates() {
    let mut f = form();
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    f.start_date = Some(start);
    let change = StatusChange {
      status:     FormStatus::Active,
      start_date: None,
      end_date:   Some(start - Duration::hours(1)),
    };
    assert!(check_schedule(&f, &change).is_err());

    let ok = StatusChange {
      end_date: Some(start + Duration::days(7)),
      ..change
    };
    assert!(check_schedule(&f, &ok).is_ok());
  }
}
