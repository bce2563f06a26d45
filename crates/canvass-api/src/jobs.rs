//! Handlers for `/jobs` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/jobs` | `?state=pending\|active\|failed`, default `failed` |
//! | `GET`  | `/jobs/counts` | Jobs per state |
//! | `POST` | `/jobs/{id}/retry` | Give a failed job a fresh attempt budget |

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{PathRejection, QueryRejection},
  },
};
use canvass_core::{
  job::{JobCounts, JobState, QueuedJob},
  store::{FeedbackStore, JobQueue},
};
use canvass_dispatch::Mailer;
use serde::Deserialize;
use tracing::info;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub state: Option<JobState>,
}

/// `GET /jobs[?state=...]`
pub async fn list<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
  query: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<QueuedJob>>, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let Query(params) = query?;
  let jobs = state
    .queue()
    .list_jobs(params.state.unwrap_or(JobState::Failed))
    .await
    .map_err(ApiError::internal)?;
  Ok(Json(jobs))
}

/// `GET /jobs/counts`
pub async fn counts<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
) -> Result<Json<JobCounts>, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let counts = state.queue().counts().await.map_err(ApiError::internal)?;
  Ok(Json(counts))
}

/// `POST /jobs/{id}/retry`
pub async fn retry<S, Q, M>(
  State(state): State<ApiState<S, Q, M>>,
  path: Result<Path<i64>, PathRejection>,
) -> Result<Json<QueuedJob>, ApiError>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let Path(job_id) = path?;
  let queue = state.queue();
  let requeued = queue.requeue(job_id).await.map_err(ApiError::internal)?;
  let job = queue
    .get_job(job_id)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::NotFound {
      code:    "job_not_found",
      message: format!("job {job_id} not found"),
    })?;

  if !requeued {
    return Err(ApiError::Conflict {
      code:    "job_not_failed",
      message: format!("job {job_id} is {}, only failed jobs can be retried", job.state),
    });
  }
  info!(job_id, job = %job.job.name, "job requeued");
  Ok(Json(job))
}
