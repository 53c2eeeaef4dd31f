//! [`GpgDecryptor`]: a [`PayloadDecryptor`] that shells out to `gpg`.
//!
//! The private key is imported once into a dedicated keyring directory; every
//! payload is then piped through `gpg --batch --decrypt`.

use std::{
  io,
  path::{Path, PathBuf},
  process::{ExitStatus, Stdio},
};

use hdl_core::decrypt::PayloadDecryptor;
use thiserror::Error;
use tokio::{io::AsyncWriteExt as _, process::Command};

use crate::config::DecryptionConfig;

#[derive(Debug, Error)]
pub enum GpgError {
  #[error("failed to run {program}: {source}")]
  Spawn { program: String, source: io::Error },

  #[error("gpg i/o error: {0}")]
  Io(#[from] io::Error),

  #[error("gpg exited with {status}: {stderr}")]
  Failed { status: ExitStatus, stderr: String },
}

#[derive(Debug, Clone)]
pub struct GpgDecryptor {
  program:         String,
  homedir:         PathBuf,
  passphrase_file: Option<PathBuf>,
}

impl GpgDecryptor {
  pub fn new(
    program: impl Into<String>,
    homedir: impl Into<PathBuf>,
    passphrase_file: Option<PathBuf>,
  ) -> Self {
    Self {
      program: program.into(),
      homedir: homedir.into(),
      passphrase_file,
    }
  }

  /// Build a decryptor from config, importing the private key.
  ///
  /// Returns `Ok(None)` when no key is configured or the key file does not
  /// exist; encrypted payloads are then passed through unchanged.
  pub async fn from_config(cfg: &DecryptionConfig) -> Result<Option<Self>, GpgError> {
    let Some(key_path) = cfg.private_key_path.as_deref() else {
      tracing::warn!("no private key configured; encrypted payloads will be read as plaintext");
      return Ok(None);
    };
    if !tokio::fs::try_exists(key_path).await.unwrap_or(false) {
      tracing::warn!(
        key = %key_path.display(),
        "private key not found; encrypted payloads will be read as plaintext"
      );
      return Ok(None);
    }

    let decryptor = Self::new(&cfg.gpg_program, &cfg.gnupg_home, cfg.passphrase_file.clone());
    decryptor.import_key(key_path).await?;
    tracing::info!(key = %key_path.display(), "private key imported");
    Ok(Some(decryptor))
  }

  /// Import an armored or binary key into the private keyring.
  pub async fn import_key(&self, key_path: &Path) -> Result<(), GpgError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(&self.homedir).await?;

    let mut cmd = self.command();
    cmd.arg("--import").arg(key_path);
    let output = cmd
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|source| self.spawn_error(source))?;

    check_status(output.status, &output.stderr)
  }

  async fn run_decrypt(&self, ciphertext: Vec<u8>) -> Result<Vec<u8>, GpgError> {
    let mut cmd = self.command();
    cmd.arg("--decrypt");
    let mut child = cmd
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| self.spawn_error(source))?;

    // Feed stdin concurrently so a large payload cannot deadlock on a full
    // stdout pipe.
    let mut stdin = child
      .stdin
      .take()
      .ok_or_else(|| io::Error::other("gpg stdin was not captured"))?;
    let writer = tokio::spawn(async move {
      stdin.write_all(&ciphertext).await?;
      stdin.shutdown().await?;
      Ok::<_, io::Error>(())
    });

    let output = child.wait_with_output().await?;
    let written = writer.await.map_err(io::Error::other)?;

    check_status(output.status, &output.stderr)?;
    written?;
    Ok(output.stdout)
  }

  fn command(&self) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd
      .arg("--homedir")
      .arg(&self.homedir)
      .args(["--batch", "--yes", "--quiet", "--no-tty"]);
    if let Some(passphrase_file) = &self.passphrase_file {
      cmd
        .args(["--pinentry-mode", "loopback", "--passphrase-file"])
        .arg(passphrase_file);
    }
    cmd
  }

  fn spawn_error(&self, source: io::Error) -> GpgError {
    GpgError::Spawn { program: self.program.clone(), source }
  }
}

fn check_status(status: ExitStatus, stderr: &[u8]) -> Result<(), GpgError> {
  if status.success() {
    return Ok(());
  }
  Err(GpgError::Failed {
    status,
    stderr: String::from_utf8_lossy(stderr).trim().to_owned(),
  })
}

impl PayloadDecryptor for GpgDecryptor {
  type Error = GpgError;

  async fn decrypt(&self, ciphertext: Vec<u8>) -> Result<Vec<u8>, GpgError> {
    self.run_decrypt(ciphertext).await
  }
}
