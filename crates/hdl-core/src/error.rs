//! Error types for `hdl-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown schema kind: {0:?}")]
  UnknownSchemaKind(String),

  #[error("unknown import status: {0:?}")]
  UnknownImportStatus(String),

  #[error("trigger {0:?} does not carry the expected suffix")]
  NotATrigger(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
