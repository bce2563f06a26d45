//! The canvass server: configuration, admin authentication and router
//! composition around `canvass-api`.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use axum::{Router, middleware};
use canvass_api::{ApiState, api_router, public_router};
use canvass_core::{
  job::NotificationJob,
  store::{FeedbackStore, JobQueue},
};
use canvass_dispatch::{
  DispatchConfig, Dispatcher, HttpMailer, LogMailer, MailConfig, Mailer, RetryPolicy,
  WorkerConfig,
};
use rand_core::OsRng;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CANVASS_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  pub store_path:         PathBuf,
  pub queue_path:         PathBuf,
  /// Origin of the feedback frontend; access links point here.
  pub public_base_url:    String,
  pub token_secret:       String,
  pub auth_username:      String,
  pub auth_password_hash: String,
  pub mail_endpoint:      Option<String>,
  pub mail_api_key:       Option<String>,
  pub mail_from:          Option<String>,
  #[serde(default)]
  pub dispatch:           DispatchSettings,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

impl std::fmt::Debug for ServerConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ServerConfig")
      .field("host", &self.host)
      .field("port", &self.port)
      .field("store_path", &self.store_path)
      .field("queue_path", &self.queue_path)
      .field("public_base_url", &self.public_base_url)
      .field("mail_endpoint", &self.mail_endpoint)
      .field("dispatch", &self.dispatch)
      .finish_non_exhaustive()
  }
}

/// The `[dispatch]` table.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchSettings {
  pub prepare_concurrency:  usize,
  pub send_concurrency:     usize,
  pub rate_limit_max:       u32,
  pub rate_limit_window_ms: u64,
  pub max_attempts:         u32,
  pub backoff_base_ms:      u64,
  pub poll_interval_ms:     u64,
  pub sweep_interval_secs:  u64,
}

impl Default for DispatchSettings {
  fn default() -> Self {
    Self {
      prepare_concurrency:  16,
      send_concurrency:     1,
      rate_limit_max:       5,
      rate_limit_window_ms: 1000,
      max_attempts:         5,
      backoff_base_ms:      5000,
      poll_interval_ms:     500,
      sweep_interval_secs:  86_400,
    }
  }
}

impl ServerConfig {
  pub fn auth_config(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }

  /// Provider settings, or `None` when no endpoint is configured.
  pub fn mail_config(&self) -> Option<MailConfig> {
    let endpoint = self.mail_endpoint.clone()?;
    Some(MailConfig {
      endpoint,
      api_key: self.mail_api_key.clone().unwrap_or_default(),
      from: self
        .mail_from
        .clone()
        .unwrap_or_else(|| "canvass@localhost".into()),
    })
  }

  pub fn dispatch_config(&self) -> DispatchConfig {
    DispatchConfig {
      public_base_url:     self.public_base_url.clone(),
      prepare_concurrency: self.dispatch.prepare_concurrency,
      max_attempts:        self.dispatch.max_attempts,
    }
  }

  pub fn worker_config(&self) -> WorkerConfig {
    let d = &self.dispatch;
    WorkerConfig {
      send_concurrency:  d.send_concurrency,
      rate_limit_max:    d.rate_limit_max,
      rate_limit_window: Duration::from_millis(d.rate_limit_window_ms),
      retry:             RetryPolicy {
        base_delay: Duration::from_millis(d.backoff_base_ms),
        ..RetryPolicy::default()
      },
      poll_interval:     Duration::from_millis(d.poll_interval_ms),
    }
  }

  pub fn sweep_interval(&self) -> Duration {
    Duration::from_secs(self.dispatch.sweep_interval_secs)
  }
}

// ─── Mailer selection ────────────────────────────────────────────────────────

/// The mailer chosen at startup from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredMailer {
  Http(HttpMailer),
  Log(LogMailer),
}

impl ConfiguredMailer {
  pub fn from_config(config: &ServerConfig) -> canvass_dispatch::Result<Self> {
    match config.mail_config() {
      Some(mail) => Ok(Self::Http(HttpMailer::new(mail)?)),
      None => Ok(Self::Log(LogMailer)),
    }
  }
}

impl Mailer for ConfiguredMailer {
  type Error = canvass_dispatch::Error;

  async fn send(&self, job: &NotificationJob) -> canvass_dispatch::Result<()> {
    match self {
      Self::Http(m) => m.send(job).await,
      Self::Log(m) => match m.send(job).await {
        Ok(()) => Ok(()),
        Err(never) => match never {},
      },
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Public routes at the root, admin routes under `/api` behind Basic auth.
pub fn router<S, Q, M>(dispatcher: Dispatcher<S, Q, M>, auth: AuthConfig) -> Router
where
  S: FeedbackStore + 'static,
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  let store = Arc::clone(dispatcher.store());
  let admin = api_router(ApiState::new(dispatcher))
    .layer(middleware::from_fn_with_state(Arc::new(auth), require_auth));

  Router::new()
    .merge(public_router(store))
    .nest("/api", admin)
    .layer(TraceLayer::new_for_http())
}

/// Produce an argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)?
      .to_string(),
  )
}
