//! The queue consumer.
//!
//! A single worker claims jobs in order and sends each through the mailer.
//! At most `send_concurrency` sends are in flight, and the rate limiter
//! applies on top of that. A failed send is rescheduled by the retry policy
//! until the job's attempts run out, then parked as failed.

use std::{sync::Arc, time::Duration};

use canvass_core::{job::QueuedJob, store::JobQueue};
use chrono::{DateTime, Utc};
use tokio::{
  sync::{Semaphore, watch},
  time::sleep,
};
use tracing::{debug, error, info, warn};

use crate::{Error, Result, limiter::RateLimiter, mailer::Mailer, retry::RetryPolicy};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
  pub send_concurrency:  usize,
  pub rate_limit_max:    u32,
  pub rate_limit_window: Duration,
  pub retry:             RetryPolicy,
  /// How long to wait before polling an empty queue again.
  pub poll_interval:     Duration,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      send_concurrency:  1,
      rate_limit_max:    5,
      rate_limit_window: Duration::from_millis(1000),
      retry:             RetryPolicy::default(),
      poll_interval:     Duration::from_millis(500),
    }
  }
}

/// What became of one claimed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
  Delivered,
  Retrying { at: DateTime<Utc> },
  Failed,
}

pub struct Worker<Q, M> {
  queue:   Arc<Q>,
  mailer:  Arc<M>,
  limiter: Arc<RateLimiter>,
  permits: Arc<Semaphore>,
  config:  WorkerConfig,
}

impl<Q, M> Clone for Worker<Q, M> {
  fn clone(&self) -> Self {
    Self {
      queue:   Arc::clone(&self.queue),
      mailer:  Arc::clone(&self.mailer),
      limiter: Arc::clone(&self.limiter),
      permits: Arc::clone(&self.permits),
      config:  self.config.clone(),
    }
  }
}

impl<Q, M> Worker<Q, M>
where
  Q: JobQueue + 'static,
  M: Mailer + 'static,
{
  pub fn new(queue: Arc<Q>, mailer: Arc<M>, config: WorkerConfig) -> Self {
    let send_concurrency = config.send_concurrency.max(1);
    Self {
      queue,
      mailer,
      limiter: Arc::new(RateLimiter::new(config.rate_limit_max, config.rate_limit_window)),
      permits: Arc::new(Semaphore::new(send_concurrency)),
      config,
    }
  }

  /// Claim and deliver the next due job, if any.
  pub async fn process_next(&self) -> Result<Option<JobOutcome>> {
    let Some(job) = self.claim().await? else {
      return Ok(None);
    };
    self.deliver(job).await.map(Some)
  }

  async fn claim(&self) -> Result<Option<QueuedJob>> {
    self
      .queue
      .claim_next(Utc::now())
      .await
      .map_err(Error::queue)
  }

  async fn deliver(&self, job: QueuedJob) -> Result<JobOutcome> {
    self.limiter.acquire().await;

    let job_id = job.job_id;
    let attempt = job.attempts;
    match self.mailer.send(&job.job).await {
      Ok(()) => {
        self.queue.complete(job_id).await.map_err(Error::queue)?;
        debug!(job_id, job = %job.job.name, attempt, "delivered");
        Ok(JobOutcome::Delivered)
      }
      Err(e) => {
        let message = e.to_string();
        let retry_at = self
          .config
          .retry
          .next_attempt_at(job.attempts, job.max_attempts, Utc::now());
        self
          .queue
          .fail(job_id, message.clone(), retry_at)
          .await
          .map_err(Error::queue)?;

        match retry_at {
          Some(at) => {
            warn!(job_id, job = %job.job.name, attempt, error = %message, retry_at = %at, "send failed, will retry");
            Ok(JobOutcome::Retrying { at })
          }
          None => {
            error!(job_id, job = %job.job.name, attempt, error = %message, "send failed, attempts exhausted");
            Ok(JobOutcome::Failed)
          }
        }
      }
    }
  }

  /// Drain the queue until `shutdown` flips to `true` or its sender is
  /// dropped. In-flight sends are awaited before returning.
  pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
    match self.queue.recover_stalled().await {
      Ok(0) => {}
      Ok(n) => info!(recovered = n, "returned stalled jobs to the queue"),
      Err(e) => error!(error = %e, "failed to recover stalled jobs"),
    }
    info!(
      send_concurrency = self.permits.available_permits(),
      rate_limit_max = self.config.rate_limit_max,
      "worker started"
    );

    loop {
      if *shutdown.borrow() {
        break;
      }

      let permit = tokio::select! {
        permit = Arc::clone(&self.permits).acquire_owned() => match permit {
          Ok(p) => p,
          Err(_) => break,
        },
        _ = shutdown.changed() => break,
      };

      let idle = match self.claim().await {
        Ok(Some(job)) => {
          let this = self.clone();
          tokio::spawn(async move {
            let _permit = permit;
            let job_id = job.job_id;
            if let Err(e) = this.deliver(job).await {
              error!(job_id, error = %e, "failed to record delivery result");
            }
          });
          false
        }
        Ok(None) => true,
        Err(e) => {
          error!(error = %e, "failed to claim job");
          true
        }
      };

      if idle {
        tokio::select! {
          _ = sleep(self.config.poll_interval) => {}
          _ = shutdown.changed() => break,
        }
      }
    }

    let in_flight = self.config.send_concurrency.max(1) as u32;
    let _ = self.permits.acquire_many(in_flight).await;
    info!("worker stopped");
  }
}
