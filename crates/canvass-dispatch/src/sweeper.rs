//! Recurring expiry sweep.

use std::{sync::Arc, time::Duration};

use canvass_core::{expiry::sweep, store::FeedbackStore};
use chrono::Utc;
use tokio::{
  sync::watch,
  task::JoinHandle,
  time::{MissedTickBehavior, interval},
};
use tracing::{debug, error, info};

/// Run [`sweep`] now and then every `every` until `shutdown` fires.
pub fn spawn_sweeper<S>(
  store: Arc<S>,
  every: Duration,
  mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
  S: FeedbackStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = ticker.tick() => {}
        _ = shutdown.changed() => break,
      }

      match sweep(&*store, Utc::now()).await {
        Ok(0) => debug!("expiry sweep found nothing to expire"),
        Ok(n) => info!(expired = n, "expiry sweep marked forms expired"),
        Err(e) => error!(error = %e, "expiry sweep failed"),
      }
    }
    debug!("sweeper stopped");
  })
}
