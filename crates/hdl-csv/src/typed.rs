//! Field-map → [`ImportRow`] validation.
//!
//! Each schema kind has a fixed column set. Conversion happens once per
//! record; every failure here is a [`RowError`] and costs only that record.

use base64::Engine as _;
use chrono::NaiveDate;
use hdl_core::{
  SchemaKind,
  row::{
    AccrualDetailRow, Attachment, DocumentOfRecordRow, ExternalIdentifierRow,
    ImportRow, Provenance,
  },
};

use crate::{FieldMap, RowError};

/// Column names per schema kind, in producer order.
pub mod columns {
  pub const PERSON_NUMBER: &str = "PersonNumber";
  pub const SOURCE_SYSTEM_OWNER: &str = "SourceSystemOwner";
  pub const SOURCE_SYSTEM_ID: &str = "SourceSystemId";

  pub const DOCUMENT_TYPE: &str = "DocumentType";
  pub const DOCUMENT_CODE: &str = "DocumentCode";
  pub const DOCUMENT_NAME: &str = "DocumentName";
  pub const FILE_NAME: &str = "FileName";
  pub const FILE_CONTENT: &str = "FileContent";

  pub const IDENTIFIER_SEQUENCE: &str = "ExternalIdentifierSequence";
  pub const IDENTIFIER_NUMBER: &str = "ExternalIdentifierNumber";
  pub const IDENTIFIER_TYPE: &str = "ExternalIdentifierType";
  pub const DATE_FROM: &str = "DateFrom";

  pub const ACCRUAL_PLAN: &str = "AccrualPlan";
  pub const ACCRUAL_TYPE: &str = "AccrualType";
  pub const ACCRUAL_DATE: &str = "AccrualDate";
  pub const HOURS: &str = "Hours";

  pub const DOCUMENT_OF_RECORD: &[&str] = &[
    PERSON_NUMBER,
    DOCUMENT_TYPE,
    DOCUMENT_CODE,
    DOCUMENT_NAME,
    SOURCE_SYSTEM_OWNER,
    SOURCE_SYSTEM_ID,
    FILE_NAME,
    FILE_CONTENT,
  ];

  pub const EXTERNAL_IDENTIFIER: &[&str] = &[
    PERSON_NUMBER,
    IDENTIFIER_SEQUENCE,
    IDENTIFIER_NUMBER,
    IDENTIFIER_TYPE,
    DATE_FROM,
    SOURCE_SYSTEM_OWNER,
    SOURCE_SYSTEM_ID,
  ];

  pub const ACCRUAL_DETAIL: &[&str] = &[
    PERSON_NUMBER,
    ACCRUAL_PLAN,
    ACCRUAL_TYPE,
    ACCRUAL_DATE,
    HOURS,
    SOURCE_SYSTEM_OWNER,
    SOURCE_SYSTEM_ID,
  ];
}

use columns::*;

/// Validate `fields` as a row of `kind`.
pub fn to_import_row(kind: SchemaKind, fields: &FieldMap) -> Result<ImportRow, RowError> {
  match kind {
    SchemaKind::DocumentOfRecord => document_of_record(fields).map(ImportRow::DocumentOfRecord),
    SchemaKind::ExternalIdentifier => {
      external_identifier(fields).map(ImportRow::ExternalIdentifier)
    }
    SchemaKind::AccrualDetail => accrual_detail(fields).map(ImportRow::AccrualDetail),
    SchemaKind::Unknown => Err(RowError::UnsupportedKind(kind)),
  }
}

// ─── Per-kind conversion ─────────────────────────────────────────────────────

fn document_of_record(f: &FieldMap) -> Result<DocumentOfRecordRow, RowError> {
  let attachment = match (opt(f, FILE_NAME), opt(f, FILE_CONTENT)) {
    (Some(file_name), Some(content)) => Some(Attachment {
      file_name,
      content: decode_base64(f.line(), &content)?,
    }),
    _ => None,
  };

  Ok(DocumentOfRecordRow {
    person_number: required(f, PERSON_NUMBER)?,
    document_type: required(f, DOCUMENT_TYPE)?,
    document_code: required(f, DOCUMENT_CODE)?,
    document_name: optional(f, DOCUMENT_NAME),
    provenance: provenance(f),
    attachment,
  })
}

fn external_identifier(f: &FieldMap) -> Result<ExternalIdentifierRow, RowError> {
  // Producers omit the sequence for a person's first identifier.
  let sequence = match opt(f, IDENTIFIER_SEQUENCE) {
    Some(s) => s.parse::<i64>().map_err(|_| RowError::InvalidNumber {
      line:  f.line(),
      field: IDENTIFIER_SEQUENCE,
      value: s,
    })?,
    None => 1,
  };

  Ok(ExternalIdentifierRow {
    person_number: required(f, PERSON_NUMBER)?,
    sequence,
    identifier_number: required(f, IDENTIFIER_NUMBER)?,
    identifier_type: required(f, IDENTIFIER_TYPE)?,
    date_from: date(f, DATE_FROM)?,
    provenance: provenance(f),
  })
}

fn accrual_detail(f: &FieldMap) -> Result<AccrualDetailRow, RowError> {
  let raw_hours = required(f, HOURS)?;
  let hours = raw_hours
    .parse::<f64>()
    .ok()
    .filter(|h| h.is_finite())
    .ok_or_else(|| RowError::InvalidNumber {
      line:  f.line(),
      field: HOURS,
      value: raw_hours,
    })?;

  Ok(AccrualDetailRow {
    person_number: required(f, PERSON_NUMBER)?,
    accrual_plan: required(f, ACCRUAL_PLAN)?,
    accrual_type: required(f, ACCRUAL_TYPE)?,
    accrual_date: date(f, ACCRUAL_DATE)?,
    hours,
    provenance: provenance(f),
  })
}

// ─── Field helpers ───────────────────────────────────────────────────────────

/// Trimmed value, `None` when the column is absent or blank.
fn opt(f: &FieldMap, field: &str) -> Option<String> {
  f.get(field)
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_owned)
}

fn optional(f: &FieldMap, field: &str) -> String { opt(f, field).unwrap_or_default() }

fn required(f: &FieldMap, field: &'static str) -> Result<String, RowError> {
  opt(f, field).ok_or(RowError::MissingField { line: f.line(), field })
}

fn provenance(f: &FieldMap) -> Provenance {
  Provenance {
    source_system_owner: optional(f, SOURCE_SYSTEM_OWNER),
    source_system_id:    optional(f, SOURCE_SYSTEM_ID),
  }
}

/// Accepts ISO `YYYY-MM-DD` and the HDL `YYYY/MM/DD` form.
fn date(f: &FieldMap, field: &'static str) -> Result<NaiveDate, RowError> {
  let value = required(f, field)?;
  NaiveDate::parse_from_str(&value, "%Y-%m-%d")
    .or_else(|_| NaiveDate::parse_from_str(&value, "%Y/%m/%d"))
    .map_err(|_| RowError::InvalidDate { line: f.line(), field, value })
}

/// Standard-alphabet base64; embedded line breaks are ignored.
fn decode_base64(line: u64, text: &str) -> Result<Vec<u8>, RowError> {
  let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
  base64::engine::general_purpose::STANDARD
    .decode(compact)
    .map_err(|source| RowError::InvalidBase64 { line, source })
}
