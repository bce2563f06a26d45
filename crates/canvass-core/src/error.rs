//! Error types for `canvass-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{access::Rejection, form::FormStatus};

#[derive(Debug, Error)]
pub enum Error {
  #[error("form not found: {0}")]
  FormNotFound(Uuid),

  #[error("form {0} is expired")]
  FormExpired(Uuid),

  #[error("division not found: {0}")]
  DivisionNotFound(Uuid),

  #[error("cannot move form from {from} to {to}")]
  InvalidTransition { from: FormStatus, to: FormStatus },

  /// The form's status changed between read and write.
  #[error("form {0} was modified concurrently")]
  StatusConflict(Uuid),

  #[error("invalid schedule: {0}")]
  InvalidSchedule(String),

  #[error("access rejected: {0}")]
  Rejected(Rejection),

  #[error("invalid token secret: {0}")]
  InvalidSecret(String),

  #[error("unknown status: {0:?}")]
  UnknownStatus(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Box a backend error so it can cross the generic store boundary.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

impl From<Rejection> for Error {
  fn from(r: Rejection) -> Self { Self::Rejected(r) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
