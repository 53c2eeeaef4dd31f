//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order is chronological order. Calendar dates are stored as
//! `YYYY-MM-DD`. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use hdl_core::{
  SchemaKind,
  audit::{ImportRecord, ImportStatus},
  person::Person,
  row::{
    Provenance, StoredAccrualDetail, StoredAttachment, StoredDocument,
    StoredExternalIdentifier,
  },
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

/// SQLite integers are signed; counters never exceed `i64::MAX` in practice.
pub fn encode_count(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

pub fn decode_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `persons` row.
pub struct RawPerson {
  pub person_id:           String,
  pub person_number:       String,
  pub full_name:           String,
  pub source_system_owner: String,
  pub source_system_id:    String,
  pub created_at:          String,
}

impl RawPerson {
  pub const COLUMNS: &'static str = "person_id, person_number, full_name, \
     source_system_owner, source_system_id, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      person_id:           row.get(0)?,
      person_number:       row.get(1)?,
      full_name:           row.get(2)?,
      source_system_owner: row.get(3)?,
      source_system_id:    row.get(4)?,
      created_at:          row.get(5)?,
    })
  }

  pub fn from_person(p: &Person) -> Self {
    Self {
      person_id:           encode_uuid(p.person_id),
      person_number:       p.person_number.clone(),
      full_name:           p.full_name.clone(),
      source_system_owner: p.source_system_owner.clone(),
      source_system_id:    p.source_system_id.clone(),
      created_at:          encode_dt(p.created_at),
    }
  }

  pub fn into_person(self) -> Result<Person> {
    Ok(Person {
      person_id:           decode_uuid(&self.person_id)?,
      person_number:       self.person_number,
      full_name:           self.full_name,
      source_system_owner: self.source_system_owner,
      source_system_id:    self.source_system_id,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `documents_of_record` row.
pub struct RawDocument {
  pub document_id:         String,
  pub person_id:           String,
  pub person_number:       String,
  pub document_type:       String,
  pub document_code:       String,
  pub document_name:       String,
  pub source_system_owner: String,
  pub source_system_id:    String,
  pub updated_at:          String,
}

impl RawDocument {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:         row.get(0)?,
      person_id:           row.get(1)?,
      person_number:       row.get(2)?,
      document_type:       row.get(3)?,
      document_code:       row.get(4)?,
      document_name:       row.get(5)?,
      source_system_owner: row.get(6)?,
      source_system_id:    row.get(7)?,
      updated_at:          row.get(8)?,
    })
  }

  pub fn into_document(self) -> Result<StoredDocument> {
    Ok(StoredDocument {
      document_id:   decode_uuid(&self.document_id)?,
      person_id:     decode_uuid(&self.person_id)?,
      person_number: self.person_number,
      document_type: self.document_type,
      document_code: self.document_code,
      document_name: self.document_name,
      provenance:    Provenance {
        source_system_owner: self.source_system_owner,
        source_system_id:    self.source_system_id,
      },
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `document_attachments` row.
pub struct RawAttachment {
  pub document_id:  String,
  pub title:        String,
  pub file_name:    String,
  pub file_content: Vec<u8>,
  pub file_size:    i64,
}

impl RawAttachment {
  pub fn into_attachment(self) -> Result<StoredAttachment> {
    Ok(StoredAttachment {
      document_id: decode_uuid(&self.document_id)?,
      title:       self.title,
      file_name:   self.file_name,
      content:     self.file_content,
      file_size:   decode_count(self.file_size),
    })
  }
}

/// Raw values read directly from an `external_identifiers` row.
pub struct RawIdentifier {
  pub identifier_id:       String,
  pub person_id:           String,
  pub person_number:       String,
  pub sequence:            i64,
  pub identifier_number:   String,
  pub identifier_type:     String,
  pub date_from:           String,
  pub source_system_owner: String,
  pub source_system_id:    String,
}

impl RawIdentifier {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      identifier_id:       row.get(0)?,
      person_id:           row.get(1)?,
      person_number:       row.get(2)?,
      sequence:            row.get(3)?,
      identifier_number:   row.get(4)?,
      identifier_type:     row.get(5)?,
      date_from:           row.get(6)?,
      source_system_owner: row.get(7)?,
      source_system_id:    row.get(8)?,
    })
  }

  pub fn into_identifier(self) -> Result<StoredExternalIdentifier> {
    Ok(StoredExternalIdentifier {
      identifier_id:     decode_uuid(&self.identifier_id)?,
      person_id:         decode_uuid(&self.person_id)?,
      person_number:     self.person_number,
      sequence:          self.sequence,
      identifier_number: self.identifier_number,
      identifier_type:   self.identifier_type,
      date_from:         decode_date(&self.date_from)?,
      provenance:        Provenance {
        source_system_owner: self.source_system_owner,
        source_system_id:    self.source_system_id,
      },
    })
  }
}

/// Raw values read directly from a `person_accrual_details` row.
pub struct RawAccrual {
  pub accrual_id:          String,
  pub person_id:           String,
  pub person_number:       String,
  pub accrual_plan:        String,
  pub accrual_type:        String,
  pub accrual_date:        String,
  pub hours:               f64,
  pub source_system_owner: String,
  pub source_system_id:    String,
}

impl RawAccrual {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      accrual_id:          row.get(0)?,
      person_id:           row.get(1)?,
      person_number:       row.get(2)?,
      accrual_plan:        row.get(3)?,
      accrual_type:        row.get(4)?,
      accrual_date:        row.get(5)?,
      hours:               row.get(6)?,
      source_system_owner: row.get(7)?,
      source_system_id:    row.get(8)?,
    })
  }

  pub fn into_accrual(self) -> Result<StoredAccrualDetail> {
    Ok(StoredAccrualDetail {
      accrual_id:    decode_uuid(&self.accrual_id)?,
      person_id:     decode_uuid(&self.person_id)?,
      person_number: self.person_number,
      accrual_plan:  self.accrual_plan,
      accrual_type:  self.accrual_type,
      accrual_date:  decode_date(&self.accrual_date)?,
      hours:         self.hours,
      provenance:    Provenance {
        source_system_owner: self.source_system_owner,
        source_system_id:    self.source_system_id,
      },
    })
  }
}

/// Raw values read directly from an `hdl_import_log` row.
pub struct RawImport {
  pub import_id:       String,
  pub file_name:       String,
  pub file_type:       String,
  pub hdl_object:      String,
  pub status:          String,
  pub records_total:   i64,
  pub records_success: i64,
  pub records_failed:  i64,
  pub error_message:   Option<String>,
  pub payload_sha256:  Option<String>,
  pub started_at:      String,
  pub completed_at:    Option<String>,
}

impl RawImport {
  pub const COLUMNS: &'static str = "import_id, file_name, file_type, hdl_object, \
     status, records_total, records_success, records_failed, error_message, \
     payload_sha256, started_at, completed_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      import_id:       row.get(0)?,
      file_name:       row.get(1)?,
      file_type:       row.get(2)?,
      hdl_object:      row.get(3)?,
      status:          row.get(4)?,
      records_total:   row.get(5)?,
      records_success: row.get(6)?,
      records_failed:  row.get(7)?,
      error_message:   row.get(8)?,
      payload_sha256:  row.get(9)?,
      started_at:      row.get(10)?,
      completed_at:    row.get(11)?,
    })
  }

  pub fn into_record(self) -> Result<ImportRecord> {
    Ok(ImportRecord {
      import_id:       decode_uuid(&self.import_id)?,
      file_name:       self.file_name,
      file_type:       self.file_type,
      schema_kind:     SchemaKind::from_db_str(&self.hdl_object)?,
      status:          ImportStatus::from_db_str(&self.status)?,
      records_total:   decode_count(self.records_total),
      records_success: decode_count(self.records_success),
      records_failed:  decode_count(self.records_failed),
      error_message:   self.error_message,
      payload_sha256:  self.payload_sha256,
      started_at:      decode_dt(&self.started_at)?,
      completed_at:    self.completed_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
