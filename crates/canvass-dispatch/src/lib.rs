//! Notification delivery for canvass.
//!
//! The [`Dispatcher`] turns a form activation into one queued invitation per
//! recipient. The [`Worker`] drains the queue through a [`Mailer`] under a
//! concurrency bound, a rate limit and a retry policy. [`spawn_sweeper`] runs
//! the expiry sweep on a timer.

#![allow(async_fn_in_trait)]

pub mod dispatcher;
mod error;
pub mod limiter;
pub mod mailer;
pub mod retry;
pub mod sweeper;
pub mod worker;

pub use self::{
  dispatcher::{DispatchConfig, Dispatcher, TransitionOutcome},
  error::{Error, Result},
  limiter::RateLimiter,
  mailer::{HttpMailer, LogMailer, MailConfig, Mailer},
  retry::RetryPolicy,
  sweeper::spawn_sweeper,
  worker::{JobOutcome, Worker, WorkerConfig},
};
