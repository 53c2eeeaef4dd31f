//! Typed inbound rows and their persisted read models.
//!
//! Each [`SchemaKind`](crate::SchemaKind) other than `Unknown` has exactly one row shape. Rows are
//! validated once when a batch is decoded, so loaders never look fields up by
//! name.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Which upstream system produced a row. Recorded for traceability only; never
/// part of a natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
  pub source_system_owner: String,
  pub source_system_id:    String,
}

// ─── Inbound rows ────────────────────────────────────────────────────────────

/// A binary attachment delivered inline (base64) with a document of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
  pub file_name: String,
  /// Decoded bytes.
  pub content:   Vec<u8>,
}

impl Attachment {
  pub fn size(&self) -> usize { self.content.len() }
}

/// Natural key: `(person_number, document_type, document_code)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOfRecordRow {
  pub person_number: String,
  pub document_type: String,
  pub document_code: String,
  pub document_name: String,
  pub provenance:    Provenance,
  pub attachment:    Option<Attachment>,
}

/// Natural key: `(person_number, identifier_type, sequence)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalIdentifierRow {
  pub person_number:     String,
  pub sequence:          i64,
  pub identifier_number: String,
  pub identifier_type:   String,
  pub date_from:         NaiveDate,
  pub provenance:        Provenance,
}

/// Insert-only; re-delivery produces duplicate rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualDetailRow {
  pub person_number: String,
  pub accrual_plan:  String,
  pub accrual_type:  String,
  pub accrual_date:  NaiveDate,
  pub hours:         f64,
  pub provenance:    Provenance,
}

/// One validated inbound row.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportRow {
  DocumentOfRecord(DocumentOfRecordRow),
  ExternalIdentifier(ExternalIdentifierRow),
  AccrualDetail(AccrualDetailRow),
}

impl ImportRow {
  pub fn person_number(&self) -> &str {
    match self {
      Self::DocumentOfRecord(r) => &r.person_number,
      Self::ExternalIdentifier(r) => &r.person_number,
      Self::AccrualDetail(r) => &r.person_number,
    }
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
  pub document_id:   Uuid,
  pub person_id:     Uuid,
  pub person_number: String,
  pub document_type: String,
  pub document_code: String,
  pub document_name: String,
  pub provenance:    Provenance,
  pub updated_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAttachment {
  pub document_id: Uuid,
  pub title:       String,
  pub file_name:   String,
  #[serde(skip)]
  pub content:     Vec<u8>,
  pub file_size:   u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredExternalIdentifier {
  pub identifier_id:     Uuid,
  pub person_id:         Uuid,
  pub person_number:     String,
  pub sequence:          i64,
  pub identifier_number: String,
  pub identifier_type:   String,
  pub date_from:         NaiveDate,
  pub provenance:        Provenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAccrualDetail {
  pub accrual_id:    Uuid,
  pub person_id:     Uuid,
  pub person_number: String,
  pub accrual_plan:  String,
  pub accrual_type:  String,
  pub accrual_date:  NaiveDate,
  pub hours:         f64,
  pub provenance:    Provenance,
}
