//! hdl-watcher binary.
//!
//! Reads `config.toml` (or the path given with `--config`, overridden by
//! `HDL__SECTION__KEY` environment variables), opens the SQLite store, and
//! watches the inbound directory for trigger files.
//!
//! # Listing recent imports
//!
//! ```
//! cargo run -p hdl-watcher -- --list-imports 20
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use hdl_core::store::ImportStore as _;
use hdl_store_sqlite::SqliteStore;
use hdl_watcher::{Archiver, DropWatcher, GpgDecryptor, Pipeline, WatcherConfig};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "HDL file-drop importer")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Process the triggers present now, wait for them to finish, and exit.
  #[arg(long)]
  once: bool,

  /// Print the N most recent import audit rows as JSON lines and exit.
  #[arg(long, value_name = "N")]
  list_imports: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("HDL")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let cfg: WatcherConfig = settings
    .try_deserialize()
    .context("failed to deserialise WatcherConfig")?;
  let cfg = cfg.expand_paths();

  // Open SQLite store.
  if let Some(parent) = cfg.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  // Helper mode: dump the audit log and exit.
  if let Some(limit) = cli.list_imports {
    for record in store.list_imports(limit).await? {
      println!("{}", serde_json::to_string(&record)?);
    }
    return Ok(());
  }

  let quarantine_dir = cfg.watch.quarantine_dir();
  for dir in [&cfg.watch.inbound_dir, &cfg.watch.archive_dir, &quarantine_dir] {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;
  }

  let decryptor = GpgDecryptor::from_config(&cfg.decryption)
    .await
    .context("failed to import private key")?;

  let pipeline = Pipeline::new(
    store,
    decryptor,
    Archiver::new(&cfg.watch.archive_dir, quarantine_dir),
    cfg.workers.stage_timeout(),
  );
  let watcher = DropWatcher::new(cfg.watch, cfg.workers, pipeline);

  if cli.once {
    let processed = watcher.run_once().await?;
    tracing::info!(processed, "single pass complete");
    return Ok(());
  }

  let cancel = CancellationToken::new();
  tokio::spawn(cancel_on_signal(cancel.clone()));
  watcher.run(cancel).await?;

  Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::warn!(error = %e, "cannot listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
      Ok(mut sigterm) => {
        sigterm.recv().await;
      }
      Err(e) => {
        tracing::warn!(error = %e, "cannot listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {}
    _ = terminate => {}
  }
  tracing::info!("shutdown requested; finishing in-flight artifacts");
  token.cancel();
}
