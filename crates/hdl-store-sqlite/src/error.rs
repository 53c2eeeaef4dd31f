//! Error type for `hdl-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] hdl_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("import not found: {0}")]
  ImportNotFound(uuid::Uuid),

  /// The audit row has already reached a terminal status.
  #[error("import {import_id} is already closed as {status}")]
  ImportAlreadyClosed {
    import_id: uuid::Uuid,
    status:    String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
