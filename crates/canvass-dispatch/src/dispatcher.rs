//! Turning an activated form into queued invitations.
//!
//! Recipients are prepared concurrently: issue (or reuse) the credential,
//! skip recipients who already responded, render the invitation and enqueue
//! it. When the queue cannot take a job the invitation is sent directly, so
//! an activation never silently drops a recipient.

use std::sync::Arc;

use canvass_core::{
  Error as CoreError,
  credential::{CredentialIssuer, issue_or_reuse},
  form::Form,
  job::{DispatchReport, NotificationJob},
  lifecycle::{StatusChange, Transition, change_status},
  recipient::{Recipient, resolve_recipients},
  store::{FeedbackStore, JobQueue},
  template::{InvitationContext, render_invitation},
};
use chrono::Utc;
use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{Result, mailer::Mailer};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
  /// Public origin used to build access links.
  pub public_base_url:     String,
  /// Recipients prepared at once.
  pub prepare_concurrency: usize,
  /// Attempt budget given to each queued job.
  pub max_attempts:        u32,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self {
      public_base_url:     "http://localhost:3000".into(),
      prepare_concurrency: 16,
      max_attempts:        5,
    }
  }
}

/// Result of a status change, with the dispatch it triggered if any.
///
/// A failed dispatch is reported in `dispatch_error`; the status change
/// itself has already been committed.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
  pub form:           Form,
  pub transition:     Transition,
  pub dispatch:       Option<DispatchReport>,
  pub dispatch_error: Option<String>,
}

impl TransitionOutcome {
  /// Recipients left with neither a queued job nor a direct send.
  pub fn undelivered(&self) -> usize { self.dispatch.as_ref().map_or(0, |r| r.failed) }
}

/// What happened to one recipient during a dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prepared {
  Enqueued,
  SentDirectly,
  Skipped,
  Failed,
}

/// Shared facts about the form being dispatched.
#[derive(Debug)]
struct Invitation {
  form_id:  Uuid,
  title:    String,
  audience: String,
  semester: u8,
}

pub struct Dispatcher<S, Q, M> {
  store:  Arc<S>,
  queue:  Arc<Q>,
  mailer: Arc<M>,
  issuer: CredentialIssuer,
  config: DispatchConfig,
}

impl<S, Q, M> Clone for Dispatcher<S, Q, M> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      queue:  Arc::clone(&self.queue),
      mailer: Arc::clone(&self.mailer),
      issuer: self.issuer.clone(),
      config: self.config.clone(),
    }
  }
}

impl<S, Q, M> Dispatcher<S, Q, M>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  pub fn new(
    store: Arc<S>,
    queue: Arc<Q>,
    mailer: Arc<M>,
    issuer: CredentialIssuer,
    config: DispatchConfig,
  ) -> Self {
    Self { store, queue, mailer, issuer, config }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn queue(&self) -> &Arc<Q> { &self.queue }

  /// Send an invitation to every current recipient of `form_id`.
  ///
  /// Recipients whose credential is already submitted are skipped. Running
  /// this twice reuses the same credentials and tokens.
  pub async fn dispatch(&self, form_id: Uuid) -> Result<DispatchReport> {
    let form = self
      .store
      .get_form(form_id)
      .await
      .map_err(CoreError::store)?
      .filter(|f| !f.is_deleted)
      .ok_or(CoreError::FormNotFound(form_id))?;
    if form.is_expired {
      return Err(CoreError::FormExpired(form_id).into());
    }

    let roster = resolve_recipients(&*self.store, &form).await?;

    let mut report = DispatchReport::new(form_id, roster.kind, roster.recipients.len());
    let invitation = Arc::new(Invitation {
      form_id,
      title: form.title,
      audience: roster.label,
      semester: roster.semester,
    });

    let permits = Arc::new(Semaphore::new(self.config.prepare_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for recipient in roster.recipients {
      let this = self.clone();
      let invitation = Arc::clone(&invitation);
      let permits = Arc::clone(&permits);
      tasks.spawn(async move {
        let Ok(_permit) = permits.acquire_owned().await else {
          return Prepared::Failed;
        };
        this.prepare(&invitation, recipient).await
      });
    }

    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok(Prepared::Enqueued) => report.enqueued += 1,
        Ok(Prepared::SentDirectly) => report.sent_directly += 1,
        Ok(Prepared::Skipped) => report.skipped += 1,
        Ok(Prepared::Failed) => report.failed += 1,
        Err(e) => {
          error!(%form_id, error = %e, "recipient preparation task panicked");
          report.failed += 1;
        }
      }
    }
    report.dispatched_at = Utc::now();

    if let Err(e) = self.store.record_dispatch(report.clone()).await {
      warn!(%form_id, error = %e, "failed to record dispatch");
    }

    info!(
      %form_id,
      roster = report.roster_kind.as_str(),
      recipients = report.recipients,
      enqueued = report.enqueued,
      sent_directly = report.sent_directly,
      skipped = report.skipped,
      failed = report.failed,
      "dispatch complete"
    );
    Ok(report)
  }

  async fn prepare(&self, invitation: &Invitation, recipient: Recipient) -> Prepared {
    let form_id = invitation.form_id;
    let credential =
      match issue_or_reuse(&*self.store, &self.issuer, form_id, &recipient).await {
        Ok(c) => c,
        Err(e) => {
          warn!(%form_id, recipient_id = %recipient.recipient_id, error = %e, "credential issuance failed");
          return Prepared::Failed;
        }
      };
    if credential.is_submitted {
      debug!(%form_id, recipient_id = %recipient.recipient_id, "already submitted, skipping");
      return Prepared::Skipped;
    }

    let email = render_invitation(&InvitationContext {
      semester:   invitation.semester,
      audience:   invitation.audience.clone(),
      form_title: invitation.title.clone(),
      token:      credential.token,
      base_url:   self.config.public_base_url.clone(),
    });
    let job = NotificationJob {
      name:    job_name(form_id, &recipient),
      to:      recipient.email,
      subject: email.subject,
      html:    email.html,
    };

    match self.queue.enqueue(job.clone(), self.config.max_attempts).await {
      Ok(queued) => {
        debug!(%form_id, job_id = queued.job_id, job = %job.name, "enqueued");
        Prepared::Enqueued
      }
      Err(e) => {
        warn!(%form_id, job = %job.name, error = %e, "enqueue failed, sending directly");
        match self.mailer.send(&job).await {
          Ok(()) => Prepared::SentDirectly,
          Err(e) => {
            error!(%form_id, job = %job.name, error = %e, "direct send failed");
            Prepared::Failed
          }
        }
      }
    }
  }

  /// Apply a status change and dispatch if the form became active.
  pub async fn transition(
    &self,
    form_id: Uuid,
    change: StatusChange,
  ) -> Result<TransitionOutcome> {
    let (form, transition) = change_status(&*self.store, form_id, change).await?;
    info!(%form_id, from = %transition.from, to = %transition.to, "status changed");

    let mut outcome = TransitionOutcome {
      form,
      transition,
      dispatch: None,
      dispatch_error: None,
    };
    if transition.triggers_dispatch {
      match self.dispatch(form_id).await {
        Ok(report) => {
          if report.failed > 0 {
            outcome.dispatch_error = Some(format!(
              "{} of {} invitations could not be queued or sent",
              report.failed, report.recipients
            ));
          }
          outcome.dispatch = Some(report);
        }
        Err(e) => {
          warn!(%form_id, error = %e, "dispatch after activation failed");
          outcome.dispatch_error = Some(e.to_string());
        }
      }
    }
    Ok(outcome)
  }

  /// Apply the same change to each form in turn. One form's failure does not
  /// stop the rest.
  pub async fn transition_many(
    &self,
    form_ids: &[Uuid],
    change: StatusChange,
  ) -> Vec<(Uuid, Result<TransitionOutcome>)> {
    let mut results = Vec::with_capacity(form_ids.len());
    for &form_id in form_ids {
      let result = self.transition(form_id, change.clone()).await;
      results.push((form_id, result));
    }
    results
  }
}

fn job_name(form_id: Uuid, recipient: &Recipient) -> String {
  format!("form-{form_id}-{}-{}", recipient.kind.as_str(), recipient.recipient_id)
}
