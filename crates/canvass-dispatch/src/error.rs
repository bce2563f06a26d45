//! Error types for `canvass-dispatch`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] canvass_core::Error),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  /// The mail provider answered with a non-2xx status.
  #[error("mail provider returned {status}: {body}")]
  Provider { status: u16, body: String },

  #[error("queue error: {0}")]
  Queue(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("mailer error: {0}")]
  Mailer(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn queue<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Queue(Box::new(e))
  }

  pub fn mailer<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Mailer(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
