//! Runtime configuration, deserialised from `config.toml` and `HDL__*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use hdl_core::artifact::DEFAULT_TRIGGER_SUFFIX;
use serde::Deserialize;

// ─── Top level ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
  pub store_path: PathBuf,
  pub watch:      WatchConfig,
  #[serde(default)]
  pub workers:    WorkerConfig,
  #[serde(default)]
  pub decryption: DecryptionConfig,
}

impl WatcherConfig {
  /// Expand a leading `~` in every configured path.
  pub fn expand_paths(mut self) -> Self {
    self.store_path = expand_tilde(&self.store_path);
    self.watch.inbound_dir = expand_tilde(&self.watch.inbound_dir);
    self.watch.archive_dir = expand_tilde(&self.watch.archive_dir);
    self.watch.quarantine_dir = self.watch.quarantine_dir.as_deref().map(expand_tilde);
    self.decryption.private_key_path =
      self.decryption.private_key_path.as_deref().map(expand_tilde);
    self.decryption.passphrase_file =
      self.decryption.passphrase_file.as_deref().map(expand_tilde);
    self.decryption.gnupg_home = expand_tilde(&self.decryption.gnupg_home);
    self
  }
}

// ─── Sections ────────────────────────────────────────────────────────────────

/// `[watch]`: where artifacts arrive and where they go afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
  pub inbound_dir:      PathBuf,
  pub archive_dir:      PathBuf,
  /// Defaults to `<archive_dir>/quarantine`.
  #[serde(default)]
  pub quarantine_dir:   Option<PathBuf>,
  #[serde(default = "default_trigger_suffix")]
  pub trigger_suffix:   String,
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
  /// How long a trigger's size and mtime must stay unchanged before it is
  /// dispatched.
  #[serde(default = "default_quiescence_ms")]
  pub quiescence_ms:    u64,
  /// Process triggers already present at startup.
  #[serde(default = "default_true")]
  pub process_existing: bool,
}

impl WatchConfig {
  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms.max(1)) }

  pub fn quiescence(&self) -> Duration { Duration::from_millis(self.quiescence_ms) }

  pub fn quarantine_dir(&self) -> PathBuf {
    self
      .quarantine_dir
      .clone()
      .unwrap_or_else(|| self.archive_dir.join("quarantine"))
  }
}

/// `[workers]`
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
  #[serde(default = "default_worker_count")]
  pub count:           usize,
  #[serde(default = "default_queue_capacity")]
  pub queue_capacity:  usize,
  #[serde(default = "default_stage_timeout_s")]
  pub stage_timeout_s: u64,
}

impl WorkerConfig {
  pub fn stage_timeout(&self) -> Duration { Duration::from_secs(self.stage_timeout_s) }
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      count:           default_worker_count(),
      queue_capacity:  default_queue_capacity(),
      stage_timeout_s: default_stage_timeout_s(),
    }
  }
}

/// `[decryption]`. With no readable private key the watcher runs without a
/// decryptor.
#[derive(Debug, Clone, Deserialize)]
pub struct DecryptionConfig {
  #[serde(default)]
  pub private_key_path: Option<PathBuf>,
  #[serde(default)]
  pub passphrase_file:  Option<PathBuf>,
  #[serde(default = "default_gpg_program")]
  pub gpg_program:      String,
  /// Private keyring directory the key is imported into.
  #[serde(default = "default_gnupg_home")]
  pub gnupg_home:       PathBuf,
}

impl Default for DecryptionConfig {
  fn default() -> Self {
    Self {
      private_key_path: None,
      passphrase_file:  None,
      gpg_program:      default_gpg_program(),
      gnupg_home:       default_gnupg_home(),
    }
  }
}

fn default_trigger_suffix() -> String { DEFAULT_TRIGGER_SUFFIX.to_owned() }
fn default_poll_interval_ms() -> u64 { 500 }
fn default_quiescence_ms() -> u64 { 2000 }
fn default_true() -> bool { true }
fn default_worker_count() -> usize { 4 }
fn default_queue_capacity() -> usize { 64 }
fn default_stage_timeout_s() -> u64 { 60 }
fn default_gpg_program() -> String { "gpg".to_owned() }
fn default_gnupg_home() -> PathBuf { PathBuf::from("~/.local/share/hdl/gnupg") }

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
