//! Error types for the watcher and the per-artifact pipeline.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failure that stops one artifact (or, for `Scan`, one poll).
#[derive(Debug, Error)]
pub enum PipelineError {
  /// The trigger exists but the payload it names does not.
  #[error("trigger {trigger:?} has no payload at {payload:?}")]
  TriggerResolution { trigger: PathBuf, payload: PathBuf },

  #[error("failed to read {path:?}: {source}")]
  ReadPayload {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("decryption failed: {0}")]
  Decrypt(#[source] BoxError),

  #[error("parse failed: {0}")]
  Parse(#[from] hdl_csv::Error),

  #[error("{stage} timed out after {after:?}")]
  Timeout { stage: &'static str, after: Duration },

  #[error("failed to move {path:?}: {source}")]
  Archive {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to scan {dir:?}: {source}")]
  Scan {
    dir:    PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("blocking task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Why a single record was counted as failed.
#[derive(Debug, Error)]
pub enum RecordError {
  #[error(transparent)]
  Row(#[from] hdl_csv::RowError),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("record load timed out after {0:?}")]
  Timeout(Duration),
}
