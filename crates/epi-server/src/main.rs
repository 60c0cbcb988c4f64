//! epi-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), overlays the
//! environment (`APP_MODE`, `DATABASE_PATH`, `REDIS_HOST`, ...), opens the
//! SQLite store and either serves the HTTP API for the configured app mode
//! or, in `INGESTION` mode, runs the ingestion worker next to the health
//! checks.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `AUDIT_PASSWORD_HASH`:
//!
//! ```
//! cargo run -p epi-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use epi_api::ApiState;
use epi_core::app_mode::AppMode;
use epi_ingest::{ingester::Ingester, queue::InboxQueue, storage::LocalObjectStore, worker::Worker};
use epi_server::{ServerConfig, open_cache, router, shutdown_signal};
use epi_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Public health metrics service")]
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
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::default())
    .build()
    .context("failed to read configuration")?;
  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  info!(mode = %server_cfg.app_mode, "starting");

  let store_path = expand_tilde(&server_cfg.database_path);
  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );
  let cache = open_cache(&server_cfg).await.context("failed to open response cache")?;
  let state = ApiState::new(store.clone(), cache, server_cfg.api_settings());
  let app = router(state, &server_cfg)?;

  let address = server_cfg.address();
  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  let serve = async {
    axum::serve(listener, app)
      .with_graceful_shutdown(shutdown_signal())
      .await
      .context("server error")
  };

  if server_cfg.app_mode != AppMode::Ingestion {
    return serve.await;
  }

  let bucket = expand_tilde(&server_cfg.ingestion_bucket_name);
  if let Some(url) = &server_cfg.sqs_queue_url {
    info!(url, "SQS_QUEUE_URL is informational; scanning the bucket inbox instead");
  }
  info!(bucket = %bucket.display(), "watching ingestion bucket");
  let objects = Arc::new(LocalObjectStore::new(bucket));
  let queue = Arc::new(InboxQueue::new(objects.clone()));
  let worker = Worker::new(
    Ingester::new(store, server_cfg.auth_enabled),
    objects,
    queue,
    server_cfg.worker_config(),
  );

  let (served, ()) = tokio::join!(serve, worker.run(shutdown_signal()));
  served
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

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
