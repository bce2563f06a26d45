//! Integration tests for `SqliteStore` and `SqliteQueue` against in-memory
//! databases, driving the core operations end to end.

use chrono::{Duration, Utc};
use canvass_core::{
  Error as CoreError,
  access::{Rejection, resolve_token},
  credential::{CredentialIssuer, issue_or_reuse},
  expiry::sweep,
  form::{FormStatus, NewForm, NewQuestion, QuestionKind},
  job::{DispatchReport, JobState, NotificationJob},
  lifecycle::{StatusChange, change_status},
  recipient::{NewRecipient, RecipientKind, RosterKind, resolve_recipients},
  store::{FeedbackStore, JobQueue},
};
use uuid::Uuid;

use crate::{SqliteQueue, SqliteStore, encode::encode_dt};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn queue() -> SqliteQueue {
  SqliteQueue::open_in_memory()
    .await
    .expect("in-memory queue")
}

fn issuer() -> CredentialIssuer { CredentialIssuer::new(b"test-secret").unwrap() }

fn person(n: usize) -> NewRecipient {
  NewRecipient {
    name:          format!("Student {n}"),
    email:         format!("student{n}@example.edu"),
    enrollment_no: format!("21CS{n:03}"),
  }
}

/// A division with `students` students and a draft form with two questions.
async fn seeded(s: &SqliteStore, students: usize) -> (Uuid, Uuid) {
  let division = s.add_division("CSE-A", 5).await.unwrap();
  for n in 0..students {
    s.add_student(division.division_id, person(n)).await.unwrap();
  }
  let detail = s
    .create_form(NewForm {
      title:                 "Operating Systems".into(),
      division_id:           division.division_id,
      subject_allocation_id: Uuid::new_v4(),
      questions:             vec![
        NewQuestion { text: "Pace of lectures".into(), kind: QuestionKind::Rating },
        NewQuestion { text: "Anything else?".into(), kind: QuestionKind::Text },
      ],
    })
    .await
    .unwrap();
  (division.division_id, detail.form.form_id)
}

async fn activate(s: &SqliteStore, form_id: Uuid) {
  change_status(s, form_id, StatusChange::to(FormStatus::Active))
    .await
    .unwrap();
}

async fn backdate_form(s: &SqliteStore, form_id: Uuid, age: Duration) {
  let at = encode_dt(Utc::now() - age);
  let id = form_id.to_string();
  s.conn
    .call(move |conn| {
      conn.execute(
        "UPDATE forms SET created_at = ?1 WHERE form_id = ?2",
        rusqlite::params![at, id],
      )?;
      Ok(())
    })
    .await
    .unwrap();
}

async fn backdate_credential(s: &SqliteStore, token: &str, age: Duration) {
  let at = encode_dt(Utc::now() - age);
  let token = token.to_owned();
  s.conn
    .call(move |conn| {
      conn.execute(
        "UPDATE credentials SET created_at = ?1 WHERE token = ?2",
        rusqlite::params![at, token],
      )?;
      Ok(())
    })
    .await
    .unwrap();
}

async fn credential_rows(s: &SqliteStore, form_id: Uuid) -> i64 {
  let id = form_id.to_string();
  s.conn
    .call(move |conn| {
      Ok(conn.query_row(
        "SELECT COUNT(*) FROM credentials WHERE form_id = ?1",
        rusqlite::params![id],
        |r| r.get(0),
      )?)
    })
    .await
    .unwrap()
}

fn rejection(err: CoreError) -> Rejection {
  match err {
    CoreError::Rejected(r) => r,
    other => panic!("expected a rejection, got {other:?}"),
  }
}

// ─── Forms ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_form_starts_in_draft_with_ordered_questions() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 0).await;

  let form = s.get_form(form_id).await.unwrap().unwrap();
  assert_eq!(form.status, FormStatus::Draft);
  assert!(!form.is_expired);
  assert!(!form.is_deleted);

  let questions = s.list_questions(form_id).await.unwrap();
  let texts: Vec<_> = questions.iter().map(|q| q.text.as_str()).collect();
  assert_eq!(texts, ["Pace of lectures", "Anything else?"]);
}

#[tokio::test]
async fn status_change_keeps_unspecified_dates() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 0).await;
  let end = Utc::now() + Duration::days(3);

  let (form, t) = change_status(
    &s,
    form_id,
    StatusChange { status: FormStatus::Active, start_date: None, end_date: Some(end) },
  )
  .await
  .unwrap();
  assert!(t.triggers_dispatch);
  assert_eq!(form.status, FormStatus::Active);

  let (form, t) = change_status(&s, form_id, StatusChange::to(FormStatus::Closed))
    .await
    .unwrap();
  assert!(!t.triggers_dispatch);
  assert_eq!(form.end_date.map(|d| d.timestamp()), Some(end.timestamp()));
}

#[tokio::test]
async fn status_cannot_return_to_draft() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 0).await;
  activate(&s, form_id).await;

  let err = change_status(&s, form_id, StatusChange::to(FormStatus::Draft))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::InvalidTransition { .. }));
  let form = s.get_form(form_id).await.unwrap().unwrap();
  assert_eq!(form.status, FormStatus::Active);
}

#[tokio::test]
async fn compare_and_set_refuses_stale_expected_status() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 0).await;
  activate(&s, form_id).await;

  let stale = s
    .set_form_status(form_id, FormStatus::Draft, StatusChange::to(FormStatus::Closed))
    .await
    .unwrap();
  assert!(stale.is_none());
}

#[tokio::test]
async fn status_change_on_deleted_form_is_not_found() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 0).await;
  assert!(s.soft_delete_form(form_id).await.unwrap());

  let err = change_status(&s, form_id, StatusChange::to(FormStatus::Active))
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::FormNotFound(id) if id == form_id));
}

// ─── Credentials ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn issuance_is_idempotent_per_pair() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  let roster = s
    .list_active_recipients(canvass_core::recipient::RosterSource::Division(division_id))
    .await
    .unwrap();
  let recipient = &roster[0];

  let first = issue_or_reuse(&s, &issuer(), form_id, recipient).await.unwrap();
  let second = issue_or_reuse(&s, &issuer(), form_id, recipient).await.unwrap();

  assert_eq!(first.token, second.token);
  assert_eq!(first.credential_id, second.credential_id);
  assert_eq!(credential_rows(&s, form_id).await, 1);
}

#[tokio::test]
async fn same_id_under_different_kinds_gets_distinct_credentials() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  let mut recipient = s
    .list_active_recipients(canvass_core::recipient::RosterSource::Division(division_id))
    .await
    .unwrap()
    .remove(0);

  let as_student = issue_or_reuse(&s, &issuer(), form_id, &recipient).await.unwrap();
  recipient.kind = RecipientKind::Override;
  let as_override = issue_or_reuse(&s, &issuer(), form_id, &recipient).await.unwrap();

  assert_ne!(as_student.token, as_override.token);
  assert_eq!(credential_rows(&s, form_id).await, 2);
}

#[tokio::test]
async fn mark_submitted_only_once() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  let recipient = s
    .list_active_recipients(canvass_core::recipient::RosterSource::Division(division_id))
    .await
    .unwrap()
    .remove(0);
  let cred = issue_or_reuse(&s, &issuer(), form_id, &recipient).await.unwrap();

  assert!(s.mark_submitted(cred.credential_id).await.unwrap());
  assert!(!s.mark_submitted(cred.credential_id).await.unwrap());

  let again = issue_or_reuse(&s, &issuer(), form_id, &recipient).await.unwrap();
  assert!(again.is_submitted);
}

// ─── Roster resolution ───────────────────────────────────────────────────────

#[tokio::test]
async fn division_roster_when_no_override() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 3).await;
  let form = s.get_form(form_id).await.unwrap().unwrap();

  let roster = resolve_recipients(&s, &form).await.unwrap();
  assert_eq!(roster.kind, RosterKind::Division);
  assert_eq!(roster.label, "CSE-A");
  assert_eq!(roster.semester, 5);
  assert_eq!(roster.recipients.len(), 3);
  assert!(roster.recipients.iter().all(|r| r.kind == RecipientKind::Student));
}

#[tokio::test]
async fn override_roster_supersedes_division() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 10).await;
  let roster = s.create_override_roster(form_id, "Electives batch").await.unwrap();
  s.add_override_member(roster.roster_id, person(100)).await.unwrap();
  s.add_override_member(roster.roster_id, person(101)).await.unwrap();
  let gone = s.add_override_member(roster.roster_id, person(102)).await.unwrap();
  s.remove_override_member(gone.recipient_id).await.unwrap();

  let form = s.get_form(form_id).await.unwrap().unwrap();
  let resolved = resolve_recipients(&s, &form).await.unwrap();

  assert_eq!(resolved.kind, RosterKind::Override);
  assert_eq!(resolved.label, "Electives batch");
  assert_eq!(resolved.semester, 5);
  assert_eq!(resolved.recipients.len(), 2);
  assert!(resolved.recipients.iter().all(|r| r.kind == RecipientKind::Override));
}

#[tokio::test]
async fn override_without_live_members_falls_back_to_division() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 2).await;
  let roster = s.create_override_roster(form_id, "Empty").await.unwrap();
  let m = s.add_override_member(roster.roster_id, person(50)).await.unwrap();
  s.remove_override_member(m.recipient_id).await.unwrap();

  let form = s.get_form(form_id).await.unwrap().unwrap();
  let resolved = resolve_recipients(&s, &form).await.unwrap();
  assert_eq!(resolved.kind, RosterKind::Division);
  assert_eq!(resolved.recipients.len(), 2);
}

#[tokio::test]
async fn deleted_override_roster_is_ignored() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 2).await;
  let roster = s.create_override_roster(form_id, "Old").await.unwrap();
  s.add_override_member(roster.roster_id, person(50)).await.unwrap();
  s.remove_override_roster(roster.roster_id).await.unwrap();

  let form = s.get_form(form_id).await.unwrap().unwrap();
  let resolved = resolve_recipients(&s, &form).await.unwrap();
  assert_eq!(resolved.kind, RosterKind::Division);
}

#[tokio::test]
async fn empty_roster_is_not_an_error() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  let only = s
    .list_active_recipients(canvass_core::recipient::RosterSource::Division(division_id))
    .await
    .unwrap()
    .remove(0);
  s.remove_student(only.recipient_id).await.unwrap();

  let form = s.get_form(form_id).await.unwrap().unwrap();
  let resolved = resolve_recipients(&s, &form).await.unwrap();
  assert!(resolved.recipients.is_empty());
}

// ─── Access gateway ──────────────────────────────────────────────────────────

async fn issued_token(s: &SqliteStore, division_id: Uuid, form_id: Uuid) -> String {
  let recipient = s
    .list_active_recipients(canvass_core::recipient::RosterSource::Division(division_id))
    .await
    .unwrap()
    .remove(0);
  issue_or_reuse(s, &issuer(), form_id, &recipient)
    .await
    .unwrap()
    .token
}

#[tokio::test]
async fn valid_token_returns_content_without_identity() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  activate(&s, form_id).await;
  let token = issued_token(&s, division_id, form_id).await;

  let content = resolve_token(&s, &token, Utc::now()).await.unwrap();
  assert_eq!(content.form_id, form_id);
  assert_eq!(content.questions.len(), 2);
  let json = serde_json::to_string(&content).unwrap();
  assert!(!json.contains("example.edu"));
}

#[tokio::test]
async fn unknown_token_is_invalid() {
  let s = store().await;
  let err = resolve_token(&s, "no-such-token", Utc::now()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::InvalidToken);
}

#[tokio::test]
async fn deleted_form_is_not_found() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  activate(&s, form_id).await;
  let token = issued_token(&s, division_id, form_id).await;
  s.soft_delete_form(form_id).await.unwrap();

  let err = resolve_token(&s, &token, Utc::now()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::NotFound);
}

#[tokio::test]
async fn lapsed_credential_expires_the_form() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  activate(&s, form_id).await;
  let token = issued_token(&s, division_id, form_id).await;
  backdate_credential(&s, &token, Duration::days(8)).await;

  let err = resolve_token(&s, &token, Utc::now()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::Expired);
  let form = s.get_form(form_id).await.unwrap().unwrap();
  assert!(form.is_expired);
  assert_eq!(form.status, FormStatus::Active);
}

#[tokio::test]
async fn expired_and_inactive_reports_expired() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  let token = issued_token(&s, division_id, form_id).await;
  s.mark_expired(form_id).await.unwrap();

  let form = s.get_form(form_id).await.unwrap().unwrap();
  assert_eq!(form.status, FormStatus::Draft);
  let err = resolve_token(&s, &token, Utc::now()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::Expired);
}

#[tokio::test]
async fn inactive_form_is_rejected() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  let token = issued_token(&s, division_id, form_id).await;

  let err = resolve_token(&s, &token, Utc::now()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::NotActive);
}

#[tokio::test]
async fn past_end_date_is_closed() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  let end = Utc::now() + Duration::hours(1);
  change_status(
    &s,
    form_id,
    StatusChange { status: FormStatus::Active, start_date: None, end_date: Some(end) },
  )
  .await
  .unwrap();
  let token = issued_token(&s, division_id, form_id).await;

  assert!(resolve_token(&s, &token, Utc::now()).await.is_ok());
  let err = resolve_token(&s, &token, end + Duration::minutes(1))
    .await
    .unwrap_err();
  assert_eq!(rejection(err), Rejection::SubmissionClosed);
}

#[tokio::test]
async fn submitted_credential_is_rejected() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 1).await;
  activate(&s, form_id).await;
  let token = issued_token(&s, division_id, form_id).await;
  let cred = s.find_credential(&token).await.unwrap().unwrap();
  s.mark_submitted(cred.credential_id).await.unwrap();

  let err = resolve_token(&s, &token, Utc::now()).await.unwrap_err();
  assert_eq!(rejection(err), Rejection::AlreadySubmitted);
}

// ─── Expiry ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_expires_each_old_form_once() {
  let s = store().await;
  let (_, old_a) = seeded(&s, 0).await;
  let (_, old_b) = seeded(&s, 0).await;
  let (_, fresh) = seeded(&s, 0).await;
  backdate_form(&s, old_a, Duration::days(8)).await;
  backdate_form(&s, old_b, Duration::days(30)).await;

  assert_eq!(sweep(&s, Utc::now()).await.unwrap(), 2);
  assert_eq!(sweep(&s, Utc::now()).await.unwrap(), 0);

  assert!(s.get_form(old_a).await.unwrap().unwrap().is_expired);
  assert!(s.get_form(old_b).await.unwrap().unwrap().is_expired);
  assert!(!s.get_form(fresh).await.unwrap().unwrap().is_expired);
}

#[tokio::test]
async fn sweep_with_nothing_eligible_changes_nothing() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 0).await;
  let before = s.get_form(form_id).await.unwrap().unwrap();

  assert_eq!(sweep(&s, Utc::now()).await.unwrap(), 0);
  let after = s.get_form(form_id).await.unwrap().unwrap();
  assert_eq!(before.is_expired, after.is_expired);
}

#[tokio::test]
async fn sweep_skips_deleted_forms() {
  let s = store().await;
  let (_, form_id) = seeded(&s, 0).await;
  backdate_form(&s, form_id, Duration::days(9)).await;
  s.soft_delete_form(form_id).await.unwrap();

  assert_eq!(sweep(&s, Utc::now()).await.unwrap(), 0);
}

// ─── Soft delete ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn soft_delete_cascades_and_preserves_rows() {
  let s = store().await;
  let (division_id, form_id) = seeded(&s, 2).await;
  let token = issued_token(&s, division_id, form_id).await;
  s.record_dispatch(DispatchReport::new(form_id, RosterKind::Division, 2))
    .await
    .unwrap();
  assert_eq!(s.list_dispatches(form_id).await.unwrap().len(), 1);

  assert!(s.soft_delete_form(form_id).await.unwrap());
  assert!(!s.soft_delete_form(form_id).await.unwrap());

  let form = s.get_form(form_id).await.unwrap().unwrap();
  assert!(form.is_deleted);
  assert!(s.list_questions(form_id).await.unwrap().is_empty());
  assert!(s.list_dispatches(form_id).await.unwrap().is_empty());
  let cred = s.find_credential(&token).await.unwrap().unwrap();
  assert!(cred.is_deleted);
  assert_eq!(credential_rows(&s, form_id).await, 1);
}

// ─── Queue ───────────────────────────────────────────────────────────────────

fn job(n: usize) -> NotificationJob {
  NotificationJob {
    name:    format!("job-{n}"),
    to:      format!("student{n}@example.edu"),
    subject: "Feedback requested".into(),
    html:    "<p>hi</p>".into(),
  }
}

#[tokio::test]
async fn claims_in_enqueue_order_and_removes_on_complete() {
  let q = queue().await;
  let a = q.enqueue(job(1), 5).await.unwrap();
  let b = q.enqueue(job(2), 5).await.unwrap();

  let first = q.claim_next(Utc::now()).await.unwrap().unwrap();
  assert_eq!(first.job_id, a.job_id);
  assert_eq!(first.state, JobState::Active);
  assert_eq!(first.attempts, 1);

  let second = q.claim_next(Utc::now()).await.unwrap().unwrap();
  assert_eq!(second.job_id, b.job_id);
  assert!(q.claim_next(Utc::now()).await.unwrap().is_none());

  q.complete(first.job_id).await.unwrap();
  assert!(q.get_job(first.job_id).await.unwrap().is_none());
  assert_eq!(q.counts().await.unwrap().active, 1);
}

#[tokio::test]
async fn retry_is_not_claimable_before_it_is_due() {
  let q = queue().await;
  let queued = q.enqueue(job(1), 5).await.unwrap();
  let claimed = q.claim_next(Utc::now()).await.unwrap().unwrap();
  let due = Utc::now() + Duration::seconds(30);
  q.fail(claimed.job_id, "smtp 421".into(), Some(due)).await.unwrap();

  assert!(q.claim_next(Utc::now()).await.unwrap().is_none());
  let again = q.claim_next(due).await.unwrap().unwrap();
  assert_eq!(again.job_id, queued.job_id);
  assert_eq!(again.attempts, 2);
  assert_eq!(again.last_error.as_deref(), Some("smtp 421"));
}

#[tokio::test]
async fn failed_jobs_are_retained_and_requeueable() {
  let q = queue().await;
  let queued = q.enqueue(job(1), 1).await.unwrap();
  let claimed = q.claim_next(Utc::now()).await.unwrap().unwrap();
  q.fail(claimed.job_id, "provider down".into(), None).await.unwrap();

  let failed = q.list_jobs(JobState::Failed).await.unwrap();
  assert_eq!(failed.len(), 1);
  assert_eq!(failed[0].job, job(1));
  assert!(failed[0].finished_at.is_some());
  assert_eq!(q.counts().await.unwrap().failed, 1);
  assert!(q.claim_next(Utc::now()).await.unwrap().is_none());

  assert!(q.requeue(queued.job_id).await.unwrap());
  assert!(!q.requeue(queued.job_id).await.unwrap());
  let retried = q.claim_next(Utc::now()).await.unwrap().unwrap();
  assert_eq!(retried.attempts, 1);
}

#[tokio::test]
async fn stalled_jobs_are_recovered_without_spending_an_attempt() {
  let q = queue().await;
  q.enqueue(job(1), 5).await.unwrap();
  q.claim_next(Utc::now()).await.unwrap().unwrap();

  assert_eq!(q.recover_stalled().await.unwrap(), 1);
  let again = q.claim_next(Utc::now()).await.unwrap().unwrap();
  assert_eq!(again.attempts, 1);
}

#[tokio::test]
async fn closed_queue_reports_errors() {
  let q = queue().await;
  let handle = q.clone();
  q.close().await.unwrap();
  assert!(handle.enqueue(job(1), 5).await.is_err());
}
