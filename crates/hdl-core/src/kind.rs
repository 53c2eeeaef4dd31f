//! Schema kinds and the file-name classifier.
//!
//! The producer encodes the record shape of a batch in its file name
//! (`HCM_INT_111_PAYSLIP_MY_20240101.CSV`). Classification is a pure lookup
//! over an ordered rule table; the first rule whose token occurs in the name
//! wins.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result};

/// The record shape an artifact's rows are loaded as.
///
/// `Unknown` is a legitimate terminal classification: the artifact is
/// audited and archived, but none of its rows are loaded.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
pub enum SchemaKind {
  /// Payslips and tax statements (HDL `DocumentsOfRecord`).
  #[strum(serialize = "DocumentsOfRecord")]
  #[serde(rename = "DocumentsOfRecord")]
  DocumentOfRecord,
  /// Payroll identifiers (HDL `ExternalIdentifier`).
  #[strum(serialize = "ExternalIdentifier")]
  ExternalIdentifier,
  /// Overtime accruals (HDL `PersonAccrualDetail`).
  #[strum(serialize = "PersonAccrualDetail")]
  #[serde(rename = "PersonAccrualDetail")]
  AccrualDetail,
  #[strum(serialize = "Unknown")]
  Unknown,
}

impl SchemaKind {
  /// Parse the `hdl_object` string stored in the audit log, the inverse of
  /// `Display`.
  pub fn from_db_str(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownSchemaKind(s.to_owned()))
  }
}

// ─── Classifier ──────────────────────────────────────────────────────────────

/// Ordered `(token, kind)` rules. Order matters: a payslip file whose name
/// happens to contain `OT` elsewhere is still a document of record.
pub const RULES: &[(&str, SchemaKind)] = &[
  ("PAYSLIP", SchemaKind::DocumentOfRecord),
  ("TAX", SchemaKind::DocumentOfRecord),
  ("PAYROLLID", SchemaKind::ExternalIdentifier),
  ("OT", SchemaKind::AccrualDetail),
];

/// Classify an artifact by its file name. Matching is case-sensitive.
pub fn classify(file_name: &str) -> SchemaKind {
  RULES
    .iter()
    .find(|(token, _)| file_name.contains(token))
    .map(|(_, kind)| *kind)
    .unwrap_or(SchemaKind::Unknown)
}
