//! canvass server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `CANVASS_*` environment variables, opens the feedback store and the
//! notification queue, starts the queue worker and the expiry sweeper, and
//! serves the HTTP API until interrupted.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `auth_password_hash`:
//!
//! ```sh
//! cargo run -p canvass-server --bin canvass -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use canvass_core::credential::CredentialIssuer;
use canvass_dispatch::{Dispatcher, Worker, spawn_sweeper};
use canvass_server::{ConfiguredMailer, ServerConfig, hash_password};
use canvass_store_sqlite::{SqliteQueue, SqliteStore};
use clap::Parser;
use tokio::{
  net::TcpListener,
  signal::ctrl_c,
  sync::watch,
};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Canvass feedback server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = hash_password(&password).map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("CANVASS")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  let cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  info!(config = ?cfg, "configuration loaded");

  let issuer = CredentialIssuer::new(cfg.token_secret.as_bytes())
    .context("invalid token_secret")?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let queue_path = expand_tilde(&cfg.queue_path);
  let queue = SqliteQueue::open(&queue_path)
    .await
    .with_context(|| format!("failed to open queue at {queue_path:?}"))?;

  let mailer = ConfiguredMailer::from_config(&cfg).context("failed to build mailer")?;
  if matches!(mailer, ConfiguredMailer::Log(_)) {
    info!("no mail_endpoint configured; invitations will only be logged");
  }

  let store = Arc::new(store);
  let queue = Arc::new(queue);
  let mailer = Arc::new(mailer);

  let (shutdown_tx, shutdown_rx) = watch::channel(false);

  let worker = Worker::new(Arc::clone(&queue), Arc::clone(&mailer), cfg.worker_config());
  let worker_task = tokio::spawn(worker.run(shutdown_rx.clone()));
  let sweeper_task = spawn_sweeper(Arc::clone(&store), cfg.sweep_interval(), shutdown_rx);

  let dispatcher = Dispatcher::new(store, queue, mailer, issuer, cfg.dispatch_config());
  let app = canvass_server::router(dispatcher, cfg.auth_config());

  let address = format!("{}:{}", cfg.host, cfg.port);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!("Listening on http://{address}");

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  let _ = shutdown_tx.send(true);
  for (name, task) in [("worker", worker_task), ("sweeper", sweeper_task)] {
    if let Err(e) = task.await {
      error!(task = name, error = %e, "background task ended abnormally");
    }
  }
  info!("shut down");

  Ok(())
}

async fn shutdown_signal() {
  let interrupt = async {
    if let Err(e) = ctrl_c().await {
      error!(error = %e, "failed to listen for Ctrl+C");
      std::future::pending::<()>().await;
    }
    info!("received Ctrl+C, shutting down");
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
      Ok(mut s) => {
        s.recv().await;
        info!("received terminate signal, shutting down");
      }
      Err(e) => {
        error!(error = %e, "failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = interrupt => {},
    _ = terminate => {},
  }
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Resolve `~/...` database paths against `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_owned(),
  }
}
