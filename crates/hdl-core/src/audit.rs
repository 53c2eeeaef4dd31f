//! The import audit log, the only externally queryable result of a run.
//!
//! Every admitted artifact opens exactly one [`ImportRecord`] in
//! [`ImportStatus::Processing`] and closes it exactly once, either as
//! `Completed` (the pipeline ran to the end, regardless of per-record
//! failures) or `Failed` (decryption or parsing aborted the artifact).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, SchemaKind};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
  Processing,
  Completed,
  Failed,
}

impl ImportStatus {
  pub fn from_db_str(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownImportStatus(s.to_owned()))
  }
}

/// Per-artifact load counters.
///
/// `total` counts every decoded row. Rows of an `Unknown` artifact are
/// skipped, so `success + failed` may be less than `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
  pub total:   u64,
  pub success: u64,
  pub failed:  u64,
}

impl LoadSummary {
  pub fn skipped(&self) -> u64 {
    self.total.saturating_sub(self.success + self.failed)
  }
}

/// Input to [`crate::store::ImportStore::open_import`].
#[derive(Debug, Clone)]
pub struct NewImport {
  pub file_name:      String,
  pub file_type:      String,
  pub schema_kind:    SchemaKind,
  /// Hex SHA-256 of the payload as read from the drop directory.
  pub payload_sha256: Option<String>,
}

/// One audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
  pub import_id:       Uuid,
  pub file_name:       String,
  pub file_type:       String,
  pub schema_kind:     SchemaKind,
  pub status:          ImportStatus,
  pub records_total:   u64,
  pub records_success: u64,
  pub records_failed:  u64,
  pub error_message:   Option<String>,
  pub payload_sha256:  Option<String>,
  pub started_at:      DateTime<Utc>,
  pub completed_at:    Option<DateTime<Utc>>,
}

impl ImportRecord {
  pub fn summary(&self) -> LoadSummary {
    LoadSummary {
      total:   self.records_total,
      success: self.records_success,
      failed:  self.records_failed,
    }
  }
}
