//! Handlers for recipient-facing endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/access/{token}` | Form content for a valid token |
//! | `GET`  | `/healthz` | Liveness |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use canvass_core::{
  access::{FormContent, resolve_token},
  store::FeedbackStore,
};
use chrono::Utc;

use crate::error::ApiError;

/// `GET /access/{token}`
pub async fn handler<S>(
  State(store): State<Arc<S>>,
  Path(token): Path<String>,
) -> Result<Json<FormContent>, ApiError>
where
  S: FeedbackStore,
{
  let content = resolve_token(&*store, &token, Utc::now()).await?;
  Ok(Json(content))
}

/// `GET /healthz`
pub async fn healthz() -> &'static str { "ok" }
