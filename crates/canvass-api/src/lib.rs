//! JSON REST API for canvass.
//!
//! Two routers: [`public_router`] serves recipients (token access, health)
//! and [`api_router`] serves administrators (forms, status changes, queue
//! inspection). Authentication, TLS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! Router::new()
//!   .merge(canvass_api::public_router(store.clone()))
//!   .nest("/api", canvass_api::api_router(state).layer(auth))
//! ```

pub mod access;
pub mod error;
pub mod forms;
pub mod jobs;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, patch, post},
};
use canvass_core::store::{FeedbackStore, JobQueue};
use canvass_dispatch::{Dispatcher, Mailer};

pub use error::ApiError;

/// Shared state for the administrative handlers.
pub struct ApiState<S, Q, M> {
  pub dispatcher: Dispatcher<S, Q, M>,
}

impl<S, Q, M> Clone for ApiState<S, Q, M> {
  fn clone(&self) -> Self { Self { dispatcher: self.dispatcher.clone() } }
}

impl<S, Q, M> ApiState<S, Q, M>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  pub fn new(dispatcher: Dispatcher<S, Q, M>) -> Self { Self { dispatcher } }

  pub fn store(&self) -> &S { self.dispatcher.store() }

  pub fn queue(&self) -> &Q { self.dispatcher.queue() }
}

/// Routes reachable without credentials.
pub fn public_router<S>(store: Arc<S>) -> Router<()>
where
  S: FeedbackStore + 'static,
{
  Router::new()
    .route("/access/{token}", get(access::handler::<S>))
    .route("/healthz", get(access::healthz))
    .with_state(store)
}

/// Administrative routes, meant to be nested under `/api` behind auth.
pub fn api_router<S, Q, M>(state: ApiState<S, Q, M>) -> Router<()>
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  Router::new()
    // Forms
    .route("/forms", post(forms::create::<S, Q, M>))
    .route("/forms/status", patch(forms::set_status_bulk::<S, Q, M>))
    .route(
      "/forms/{id}",
      get(forms::get_one::<S, Q, M>).delete(forms::delete_one::<S, Q, M>),
    )
    .route("/forms/{id}/status", patch(forms::set_status::<S, Q, M>))
    .route("/forms/{id}/dispatches", get(forms::dispatches::<S, Q, M>))
    // Queue
    .route("/jobs", get(jobs::list::<S, Q, M>))
    .route("/jobs/counts", get(jobs::counts::<S, Q, M>))
    .route("/jobs/{id}/retry", post(jobs::retry::<S, Q, M>))
    .with_state(state)
}
