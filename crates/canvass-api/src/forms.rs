//! Handlers for `/forms` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/forms` | Body: [`NewForm`]; returns 201 + the draft form |
//! | `GET`    | `/forms/{id}` | Form with its active questions |
//! | `PATCH`  | `/forms/{id}/status` | Body: [`StatusChange`]; returns [`TransitionOutcome`] |
//! | `PATCH`  | `/forms/status` | Body: [`BulkStatusBody`]; one result per form |
//! | `DELETE` | `/forms/{id}` | Soft-delete cascade; 204 |
//! | `GET`    | `/forms/{id}/dispatches` | Dispatch audit records |

use axum::{
  Json,
  extract::{
    Path, State,
    rejection::{JsonRejection, PathRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use canvass_core::{
  Error as CoreError,
  form::{FormDetail, NewForm},
  job::DispatchReport,
  lifecycle::StatusChange,
  store::{FeedbackStore, JobQueue},
};
use canvass_dispatch::{Mailer, TransitionOutcome};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
  ApiState,
  error::{ApiError, ErrorBody},
};

fn form_not_found(form_id: Uuid) -> ApiError { CoreError::FormNotFound(form_id).into() }

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /forms`: returns 201 + [`FormDetail`].
pub async fn create<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
  body: Result<Json<NewForm>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let Json(input) = body?;
  if input.title.trim().is_empty() {
    return Err(ApiError::BadRequest("title must not be empty".into()));
  }
  if input.questions.iter().any(|q| q.text.trim().is_empty()) {
    return Err(ApiError::BadRequest("question text must not be empty".into()));
  }

  let store = state.store();
  store
    .get_division(input.division_id)
    .await
    .map_err(ApiError::internal)?
    .ok_or(CoreError::DivisionNotFound(input.division_id))?;

  let detail = store.create_form(input).await.map_err(ApiError::internal)?;
  info!(form_id = %detail.form.form_id, questions = detail.questions.len(), "form created");
  Ok((StatusCode::CREATED, Json(detail)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /forms/{id}`
pub async fn get_one<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
  path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<FormDetail>, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let Path(form_id) = path?;
  let store = state.store();
  let form = store
    .get_form(form_id)
    .await
    .map_err(ApiError::internal)?
    .filter(|f| !f.is_deleted)
    .ok_or_else(|| form_not_found(form_id))?;
  let questions = store.list_questions(form_id).await.map_err(ApiError::internal)?;
  Ok(Json(FormDetail { form, questions }))
}

// ─── Status ───────────────────────────────────────────────────────────────────

/// `PATCH /forms/{id}/status`: body `{"status": "ACTIVE", "start_date"?, "end_date"?}`.
///
/// Responds 500 `dispatch_failed` when an activation leaves any recipient
/// with neither a queued job nor a direct send. The status change stays.
pub async fn set_status<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
  path: Result<Path<Uuid>, PathRejection>,
  body: Result<Json<StatusChange>, JsonRejection>,
) -> Result<Json<TransitionOutcome>, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let Path(form_id) = path?;
  let Json(change) = body?;
  let outcome = state.dispatcher.transition(form_id, change).await?;
  if outcome.undelivered() > 0 {
    return Err(ApiError::DispatchFailed(Box::new(outcome)));
  }
  Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusBody {
  pub form_ids: Vec<Uuid>,
  #[serde(flatten)]
  pub change:   StatusChange,
}

/// One form's result within a bulk status change.
#[derive(Debug, Serialize)]
pub struct BulkItem {
  pub form_id: Uuid,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub outcome: Option<TransitionOutcome>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:   Option<ErrorBody>,
}

/// `PATCH /forms/status`: body `{"form_ids": [...], "status": ..., ...}`.
///
/// Always 200 once the body is valid; per-form failures, including
/// `dispatch_failed`, are reported inline.
pub async fn set_status_bulk<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
  body: Result<Json<BulkStatusBody>, JsonRejection>,
) -> Result<Json<Vec<BulkItem>>, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let Json(body) = body?;
  if body.form_ids.is_empty() {
    return Err(ApiError::BadRequest("form_ids must not be empty".into()));
  }

  let results = state
    .dispatcher
    .transition_many(&body.form_ids, body.change)
    .await
    .into_iter()
    .map(|(form_id, result)| match result {
      Ok(outcome) if outcome.undelivered() > 0 => BulkItem {
        form_id,
        error: Some(ApiError::DispatchFailed(Box::new(outcome.clone())).body()),
        outcome: Some(outcome),
      },
      Ok(outcome) => BulkItem { form_id, outcome: Some(outcome), error: None },
      Err(e) => BulkItem {
        form_id,
        outcome: None,
        error: Some(ApiError::from(e).body()),
      },
    })
    .collect();
  Ok(Json(results))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /forms/{id}`: 204 on success, 404 if missing or already deleted.
pub async fn delete_one<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
  path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let Path(form_id) = path?;
  let deleted = state
    .store()
    .soft_delete_form(form_id)
    .await
    .map_err(ApiError::internal)?;
  if !deleted {
    return Err(form_not_found(form_id));
  }
  info!(%form_id, "form deleted");
  Ok(StatusCode::NO_CONTENT)
}

// ─── Audit ────────────────────────────────────────────────────────────────────

/// `GET /forms/{id}/dispatches`
pub async fn dispatches<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
  path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<DispatchReport>>, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let Path(form_id) = path?;
  let store = state.store();
  store
    .get_form(form_id)
    .await
    .map_err(ApiError::internal)?
    .filter(|f| !f.is_deleted)
    .ok_or_else(|| form_not_found(form_id))?;
  let reports = store.list_dispatches(form_id).await.map_err(ApiError::internal)?;
  Ok(Json(reports))
}
