//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{"error": <message>, "code": <code>}`. Codes are
//! stable; messages are for humans.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use canvass_core::{Error as CoreError, access::Rejection};
use canvass_dispatch::TransitionOutcome;
use serde::Serialize;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),

  #[error("{message}")]
  NotFound { code: &'static str, message: String },

  /// The request is well-formed but the resource's state forbids it.
  #[error("{message}")]
  Conflict { code: &'static str, message: String },

  #[error("{0}")]
  Rejected(Rejection),

  /// The status change committed but some recipients got no invitation.
  #[error("{}", .0.dispatch_error.as_deref().unwrap_or("dispatch failed"))]
  DispatchFailed(Box<TransitionOutcome>),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Error body for [`ApiError::DispatchFailed`], carrying the committed outcome.
#[derive(Serialize)]
struct DispatchFailedBody {
  #[serde(flatten)]
  body:    ErrorBody,
  outcome: TransitionOutcome,
}

/// The JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
  pub error: String,
  pub code:  &'static str,
}

impl ApiError {
  pub fn internal<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Internal(Box::new(e))
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::NotFound { .. } => StatusCode::NOT_FOUND,
      Self::Conflict { .. } => StatusCode::FORBIDDEN,
      Self::Rejected(r) if r.is_not_found() => StatusCode::NOT_FOUND,
      Self::Rejected(_) => StatusCode::FORBIDDEN,
      Self::DispatchFailed(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      Self::BadRequest(_) => "validation_error",
      Self::NotFound { code, .. } | Self::Conflict { code, .. } => *code,
      Self::Rejected(r) => r.code(),
      Self::DispatchFailed(_) => "dispatch_failed",
      Self::Internal(_) => "internal_error",
    }
  }

  pub fn body(&self) -> ErrorBody {
    ErrorBody { error: self.to_string(), code: self.code() }
  }
}

impl From<CoreError> for ApiError {
  fn from(e: CoreError) -> Self {
    let message = e.to_string();
    match e {
      CoreError::FormNotFound(_) => Self::NotFound { code: "form_not_found", message },
      CoreError::DivisionNotFound(_) => Self::NotFound { code: "division_not_found", message },
      CoreError::FormExpired(_) => Self::Conflict { code: "form_expired", message },
      CoreError::InvalidTransition { .. } => Self::Conflict { code: "invalid_transition", message },
      CoreError::StatusConflict(_) => Self::Conflict { code: "status_conflict", message },
      CoreError::InvalidSchedule(_) | CoreError::UnknownStatus(_) => Self::BadRequest(message),
      CoreError::Rejected(r) => Self::Rejected(r),
      other => Self::Internal(Box::new(other)),
    }
  }
}

impl From<canvass_dispatch::Error> for ApiError {
  fn from(e: canvass_dispatch::Error) -> Self {
    match e {
      canvass_dispatch::Error::Core(e) => e.into(),
      other => Self::Internal(Box::new(other)),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(r: PathRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { Self::BadRequest(r.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = self.body();
    match self {
      Self::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (status, Json(body)).into_response()
      }
      Self::DispatchFailed(outcome) => {
        tracing::error!(
          form_id = %outcome.form.form_id,
          undelivered = outcome.undelivered(),
          "activation left recipients without an invitation"
        );
        (status, Json(DispatchFailedBody { body, outcome: *outcome })).into_response()
      }
      _ => (status, Json(body)).into_response(),
    }
  }
}
