//! Error types for the hdl-csv codec.

use hdl_core::SchemaKind;
use thiserror::Error;

/// A batch-level failure. Fatal for the artifact being decoded.
#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed batch at line {line:?}: {source}")]
  Parse {
    line:   Option<u64>,
    #[source]
    source: csv::Error,
  },

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<csv::Error> for Error {
  fn from(source: csv::Error) -> Self {
    let line = source.position().map(|p| p.line());
    Self::Parse { line, source }
  }
}

/// A record-level failure. Counted against the batch, never fatal.
#[derive(Debug, Error)]
pub enum RowError {
  #[error("line {line}: missing required field {field}")]
  MissingField { line: u64, field: &'static str },

  #[error("line {line}: {field} is not a number: {value:?}")]
  InvalidNumber {
    line:  u64,
    field: &'static str,
    value: String,
  },

  #[error("line {line}: {field} is not a date: {value:?}")]
  InvalidDate {
    line:  u64,
    field: &'static str,
    value: String,
  },

  #[error("line {line}: FileContent is not valid base64: {source}")]
  InvalidBase64 {
    line:   u64,
    #[source]
    source: base64::DecodeError,
  },

  #[error("rows of kind {0} are not loaded")]
  UnsupportedKind(SchemaKind),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
