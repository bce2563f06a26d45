//! Proactive expiry: the counterpart to the lapsed-credential check in
//! [`crate::access`].

use chrono::{DateTime, Utc};

use crate::{Error, Result, access::validity_window, store::FeedbackStore};

/// Mark every form created more than [`validity_window`] before `now` as
/// expired. Returns the number of forms newly marked; forms that were
/// already expired or deleted are untouched.
pub async fn sweep<S>(store: &S, now: DateTime<Utc>) -> Result<usize>
where
  S: FeedbackStore,
{
  store
    .expire_forms_created_before(now - validity_window())
    .await
    .map_err(Error::store)
}
