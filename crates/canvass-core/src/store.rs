//! The `FeedbackStore` and `JobQueue` traits.
//!
//! Both are implemented by storage backends (e.g. `canvass-store-sqlite`).
//! The operations in this crate and the dispatcher depend on these narrow
//! contracts, never on a concrete backend or a query builder.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  credential::{AccessCredential, NewCredential},
  form::{Division, Form, FormDetail, FormStatus, NewForm, Question},
  job::{DispatchReport, JobCounts, JobState, NotificationJob, QueuedJob},
  lifecycle::StatusChange,
  recipient::{OverrideRoster, Recipient, RosterSource},
};

// ─── Feedback store ──────────────────────────────────────────────────────────

/// Persistence for forms, rosters, credentials and dispatch audit records.
///
/// Nothing is ever hard-deleted. All methods return `Send` futures so the
/// trait can be used from spawned tokio tasks and `axum` handlers.
pub trait FeedbackStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Forms ─────────────────────────────────────────────────────────────

  /// Persist a new form in `DRAFT` together with its questions.
  fn create_form(
    &self,
    input: NewForm,
  ) -> impl Future<Output = Result<FormDetail, Self::Error>> + Send + '_;

  /// Retrieve a form by id, including soft-deleted forms. Returns `None`
  /// only if the id was never stored.
  fn get_form(
    &self,
    form_id: Uuid,
  ) -> impl Future<Output = Result<Option<Form>, Self::Error>> + Send + '_;

  /// Active (non-deleted) questions of a form ordered by position.
  fn list_questions(
    &self,
    form_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Question>, Self::Error>> + Send + '_;

  /// Compare-and-set the status of a non-deleted form.
  ///
  /// The write only happens if the form's current status is `expected`;
  /// otherwise `None` is returned and nothing changes. Dates left as `None`
  /// in `change` keep their stored value.
  fn set_form_status(
    &self,
    form_id: Uuid,
    expected: FormStatus,
    change: StatusChange,
  ) -> impl Future<Output = Result<Option<Form>, Self::Error>> + Send + '_;

  /// Soft-delete a form and, in the same transaction, its questions,
  /// credentials and dispatch audit records.
  ///
  /// Returns `false` if the form does not exist or is already deleted.
  fn soft_delete_form(
    &self,
    form_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Set `is_expired` on a form. Returns `true` if it was not already set.
  fn mark_expired(
    &self,
    form_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Mark every non-deleted, non-expired form created before `cutoff` as
  /// expired and return how many were changed.
  fn expire_forms_created_before(
    &self,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Rosters ───────────────────────────────────────────────────────────

  fn get_division(
    &self,
    division_id: Uuid,
  ) -> impl Future<Output = Result<Option<Division>, Self::Error>> + Send + '_;

  /// The override roster attached to a form, deleted or not.
  fn find_override_roster(
    &self,
    form_id: Uuid,
  ) -> impl Future<Output = Result<Option<OverrideRoster>, Self::Error>> + Send + '_;

  /// Non-deleted members of a division or of an override roster.
  fn list_active_recipients(
    &self,
    source: RosterSource,
  ) -> impl Future<Output = Result<Vec<Recipient>, Self::Error>> + Send + '_;

  // ── Credentials ───────────────────────────────────────────────────────

  /// Look up a credential by token, including soft-deleted credentials.
  fn find_credential<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Option<AccessCredential>, Self::Error>> + Send + 'a;

  /// Atomically insert a credential for `(form_id, recipient_kind,
  /// recipient_id)`, or return the existing one.
  ///
  /// An existing credential keeps its token, `created_at` and
  /// `is_submitted`; only a soft-delete marker is cleared.
  fn upsert_credential(
    &self,
    input: NewCredential,
  ) -> impl Future<Output = Result<AccessCredential, Self::Error>> + Send + '_;

  /// Flag a credential as used by a submission. Returns `false` if it was
  /// already submitted or does not exist.
  fn mark_submitted(
    &self,
    credential_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Append the outcome of one dispatch pass to the audit log.
  fn record_dispatch(
    &self,
    report: DispatchReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Audit records of a non-deleted form, oldest first.
  fn list_dispatches(
    &self,
    form_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DispatchReport>, Self::Error>> + Send + '_;
}

// ─── Job queue ───────────────────────────────────────────────────────────────

/// A durable, ordered queue of notification jobs.
///
/// Enqueue returns as soon as the job is persisted; delivery is observed only
/// through [`JobQueue::get_job`], [`JobQueue::list_jobs`] and
/// [`JobQueue::counts`]. Completed jobs are removed, so a missing job id means
/// it was delivered. Jobs that exhaust their attempts stay in
/// [`JobState::Failed`] until requeued.
pub trait JobQueue: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append a job, ready immediately.
  fn enqueue(
    &self,
    job: NotificationJob,
    max_attempts: u32,
  ) -> impl Future<Output = Result<QueuedJob, Self::Error>> + Send + '_;

  /// Atomically take the oldest pending job whose next attempt is due,
  /// move it to [`JobState::Active`] and count the attempt.
  fn claim_next(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<QueuedJob>, Self::Error>> + Send + '_;

  /// Remove a successfully delivered job.
  fn complete(
    &self,
    job_id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Record a failed attempt. With `retry_at` the job returns to pending and
  /// becomes due at that time; without it the job is parked as failed.
  fn fail(
    &self,
    job_id: i64,
    error: String,
    retry_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_job(
    &self,
    job_id: i64,
  ) -> impl Future<Output = Result<Option<QueuedJob>, Self::Error>> + Send + '_;

  /// Jobs in `state`, oldest first.
  fn list_jobs(
    &self,
    state: JobState,
  ) -> impl Future<Output = Result<Vec<QueuedJob>, Self::Error>> + Send + '_;

  fn counts(&self) -> impl Future<Output = Result<JobCounts, Self::Error>> + Send + '_;

  /// Give a failed job a fresh attempt budget. Returns `false` if the job is
  /// missing or not failed.
  fn requeue(
    &self,
    job_id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Return jobs left active by a previous process to pending, without
  /// counting the interrupted attempt. Called once when a worker starts.
  fn recover_stalled(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
