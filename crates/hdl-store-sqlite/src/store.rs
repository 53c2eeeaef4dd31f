//! [`SqliteStore`]: the SQLite implementation of [`ImportStore`].

use std::path::Path;

use chrono::Utc;
use hdl_core::{
  audit::{ImportRecord, ImportStatus, LoadSummary, NewImport},
  person::Person,
  row::{
    AccrualDetailRow, Attachment, DocumentOfRecordRow, ExternalIdentifierRow,
    StoredAccrualDetail, StoredAttachment, StoredDocument,
    StoredExternalIdentifier,
  },
  store::ImportStore,
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawAccrual, RawAttachment, RawDocument, RawIdentifier, RawImport, RawPerson,
    decode_uuid, encode_count, encode_date, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An import store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Outcome of a conditional `UPDATE` on a `PROCESSING` audit row.
enum CloseOutcome {
  Closed,
  Missing,
  AlreadyClosed(String),
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Move a `PROCESSING` row to a terminal status. The `WHERE status` guard
  /// makes the transition happen at most once.
  async fn close_import(
    &self,
    import_id: Uuid,
    status: ImportStatus,
    summary: Option<LoadSummary>,
    error_message: Option<String>,
  ) -> Result<()> {
    let id_str     = encode_uuid(import_id);
    let status_str = status.to_string();
    let at_str     = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let changed = match summary {
          Some(s) => conn.execute(
            "UPDATE hdl_import_log
             SET status = ?2, records_total = ?3, records_success = ?4,
                 records_failed = ?5, completed_at = ?6
             WHERE import_id = ?1 AND status = 'PROCESSING'",
            rusqlite::params![
              id_str,
              status_str,
              encode_count(s.total),
              encode_count(s.success),
              encode_count(s.failed),
              at_str,
            ],
          )?,
          None => conn.execute(
            "UPDATE hdl_import_log
             SET status = ?2, error_message = ?3, completed_at = ?4
             WHERE import_id = ?1 AND status = 'PROCESSING'",
            rusqlite::params![id_str, status_str, error_message, at_str],
          )?,
        };

        if changed > 0 {
          return Ok(CloseOutcome::Closed);
        }

        let current: Option<String> = conn
          .query_row(
            "SELECT status FROM hdl_import_log WHERE import_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;

        Ok(match current {
          Some(status) => CloseOutcome::AlreadyClosed(status),
          None => CloseOutcome::Missing,
        })
      })
      .await?;

    match outcome {
      CloseOutcome::Closed => Ok(()),
      CloseOutcome::Missing => Err(Error::ImportNotFound(import_id)),
      CloseOutcome::AlreadyClosed(status) => {
        Err(Error::ImportAlreadyClosed { import_id, status })
      }
    }
  }
}

/// A UNIQUE or PRIMARY KEY conflict. Other constraint failures (NOT NULL,
/// CHECK, FOREIGN KEY) are real errors and must not be retried as a re-read.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
  )
}

// ─── ImportStore impl ────────────────────────────────────────────────────────

impl ImportStore for SqliteStore {
  type Error = Error;

  // ── Persons ───────────────────────────────────────────────────────────────

  async fn find_or_create_person(&self, person_number: &str) -> Result<Person> {
    let candidate = RawPerson::from_person(&Person::placeholder(person_number));

    let (raw, created): (RawPerson, bool) = self
      .conn
      .call(move |conn| {
        let select = format!(
          "SELECT {} FROM persons WHERE person_number = ?1",
          RawPerson::COLUMNS
        );

        if let Some(existing) = conn
          .query_row(&select, rusqlite::params![candidate.person_number], RawPerson::from_row)
          .optional()?
        {
          return Ok((existing, false));
        }

        let inserted = conn.execute(
          "INSERT INTO persons (
             person_id, person_number, full_name,
             source_system_owner, source_system_id, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            candidate.person_id,
            candidate.person_number,
            candidate.full_name,
            candidate.source_system_owner,
            candidate.source_system_id,
            candidate.created_at,
          ],
        );

        match inserted {
          Ok(_) => Ok((candidate, true)),
          // Another writer created the person between our read and insert.
          Err(e) if is_unique_violation(&e) => {
            let existing = conn.query_row(
              &select,
              rusqlite::params![candidate.person_number],
              RawPerson::from_row,
            )?;
            Ok((existing, false))
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if created {
      tracing::info!(person_number, "created placeholder person");
    }
    raw.into_person()
  }

  async fn get_person(&self, person_number: &str) -> Result<Option<Person>> {
    let number = person_number.to_owned();

    let raw: Option<RawPerson> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {} FROM persons WHERE person_number = ?1", RawPerson::COLUMNS),
            rusqlite::params![number],
            RawPerson::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPerson::into_person).transpose()
  }

  async fn list_persons(&self) -> Result<Vec<Person>> {
    let raws: Vec<RawPerson> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM persons ORDER BY person_number",
          RawPerson::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawPerson::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPerson::into_person).collect()
  }

  // ── Record writes ─────────────────────────────────────────────────────────

  async fn upsert_document(&self, person: &Person, row: &DocumentOfRecordRow) -> Result<Uuid> {
    let new_id        = encode_uuid(Uuid::new_v4());
    let person_id     = encode_uuid(person.person_id);
    let person_number = row.person_number.clone();
    let document_type = row.document_type.clone();
    let document_code = row.document_code.clone();
    let document_name = row.document_name.clone();
    let owner         = row.provenance.source_system_owner.clone();
    let source_id     = row.provenance.source_system_id.clone();
    let at_str        = encode_dt(Utc::now());

    let id_str: String = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "INSERT INTO documents_of_record (
             document_id, person_id, person_number, document_type, document_code,
             document_name, source_system_owner, source_system_id, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT (person_number, document_type, document_code) DO UPDATE SET
             document_name       = excluded.document_name,
             source_system_owner = excluded.source_system_owner,
             source_system_id    = excluded.source_system_id,
             updated_at          = excluded.updated_at
           RETURNING document_id",
          rusqlite::params![
            new_id,
            person_id,
            person_number,
            document_type,
            document_code,
            document_name,
            owner,
            source_id,
            at_str,
          ],
          |r| r.get(0),
        )?)
      })
      .await?;

    decode_uuid(&id_str)
  }

  async fn upsert_attachment(
    &self,
    document_id: Uuid,
    row: &DocumentOfRecordRow,
    attachment: &Attachment,
  ) -> Result<()> {
    let id_str        = encode_uuid(document_id);
    let person_number = row.person_number.clone();
    let document_type = row.document_type.clone();
    let document_code = row.document_code.clone();
    let title         = row.document_name.clone();
    let file_name     = attachment.file_name.clone();
    let content       = attachment.content.clone();
    let size          = encode_count(attachment.size() as u64);
    let owner         = row.provenance.source_system_owner.clone();
    let source_id     = row.provenance.source_system_id.clone();
    let at_str        = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO document_attachments (
             document_id, person_number, document_type, document_code, title,
             file_name, file_content, file_size,
             source_system_owner, source_system_id, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT (document_id) DO UPDATE SET
             file_name    = excluded.file_name,
             file_content = excluded.file_content,
             file_size    = excluded.file_size,
             updated_at   = excluded.updated_at",
          rusqlite::params![
            id_str,
            person_number,
            document_type,
            document_code,
            title,
            file_name,
            content,
            size,
            owner,
            source_id,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn upsert_external_identifier(
    &self,
    person: &Person,
    row: &ExternalIdentifierRow,
  ) -> Result<()> {
    let new_id            = encode_uuid(Uuid::new_v4());
    let person_id         = encode_uuid(person.person_id);
    let person_number     = row.person_number.clone();
    let sequence          = row.sequence;
    let identifier_number = row.identifier_number.clone();
    let identifier_type   = row.identifier_type.clone();
    let date_from         = encode_date(row.date_from);
    let owner             = row.provenance.source_system_owner.clone();
    let source_id         = row.provenance.source_system_id.clone();
    let at_str            = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO external_identifiers (
             identifier_id, person_id, person_number, external_identifier_sequence,
             external_identifier_number, external_identifier_type, date_from,
             source_system_owner, source_system_id, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
           ON CONFLICT (person_number, external_identifier_type, external_identifier_sequence)
           DO UPDATE SET
             external_identifier_number = excluded.external_identifier_number,
             date_from                  = excluded.date_from,
             updated_at                 = excluded.updated_at",
          rusqlite::params![
            new_id,
            person_id,
            person_number,
            sequence,
            identifier_number,
            identifier_type,
            date_from,
            owner,
            source_id,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn insert_accrual_detail(&self, person: &Person, row: &AccrualDetailRow) -> Result<()> {
    let new_id        = encode_uuid(Uuid::new_v4());
    let person_id     = encode_uuid(person.person_id);
    let person_number = row.person_number.clone();
    let accrual_plan  = row.accrual_plan.clone();
    let accrual_type  = row.accrual_type.clone();
    let accrual_date  = encode_date(row.accrual_date);
    let hours         = row.hours;
    let owner         = row.provenance.source_system_owner.clone();
    let source_id     = row.provenance.source_system_id.clone();
    let at_str        = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO person_accrual_details (
             accrual_id, person_id, person_number, accrual_plan, accrual_type,
             accrual_date, hours, source_system_owner, source_system_id, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            new_id,
            person_id,
            person_number,
            accrual_plan,
            accrual_type,
            accrual_date,
            hours,
            owner,
            source_id,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Record reads ──────────────────────────────────────────────────────────

  async fn list_documents(&self, person_number: &str) -> Result<Vec<StoredDocument>> {
    let number = person_number.to_owned();

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT document_id, person_id, person_number, document_type,
                  document_code, document_name, source_system_owner,
                  source_system_id, updated_at
           FROM documents_of_record
           WHERE person_number = ?1
           ORDER BY document_type, document_code",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![number], RawDocument::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn get_attachment(&self, document_id: Uuid) -> Result<Option<StoredAttachment>> {
    let id_str = encode_uuid(document_id);

    let raw: Option<RawAttachment> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT document_id, title, file_name, file_content, file_size
             FROM document_attachments WHERE document_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawAttachment {
                document_id:  row.get(0)?,
                title:        row.get(1)?,
                file_name:    row.get(2)?,
                file_content: row.get(3)?,
                file_size:    row.get(4)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAttachment::into_attachment).transpose()
  }

  async fn list_external_identifiers(
    &self,
    person_number: &str,
  ) -> Result<Vec<StoredExternalIdentifier>> {
    let number = person_number.to_owned();

    let raws: Vec<RawIdentifier> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT identifier_id, person_id, person_number,
                  external_identifier_sequence, external_identifier_number,
                  external_identifier_type, date_from,
                  source_system_owner, source_system_id
           FROM external_identifiers
           WHERE person_number = ?1
           ORDER BY external_identifier_type, external_identifier_sequence",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![number], RawIdentifier::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIdentifier::into_identifier).collect()
  }

  async fn list_accrual_details(&self, person_number: &str) -> Result<Vec<StoredAccrualDetail>> {
    let number = person_number.to_owned();

    let raws: Vec<RawAccrual> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT accrual_id, person_id, person_number, accrual_plan,
                  accrual_type, accrual_date, hours,
                  source_system_owner, source_system_id
           FROM person_accrual_details
           WHERE person_number = ?1
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![number], RawAccrual::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAccrual::into_accrual).collect()
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn open_import(&self, input: NewImport) -> Result<ImportRecord> {
    let record = ImportRecord {
      import_id:       Uuid::new_v4(),
      file_name:       input.file_name,
      file_type:       input.file_type,
      schema_kind:     input.schema_kind,
      status:          ImportStatus::Processing,
      records_total:   0,
      records_success: 0,
      records_failed:  0,
      error_message:   None,
      payload_sha256:  input.payload_sha256,
      started_at:      Utc::now(),
      completed_at:    None,
    };

    let id_str     = encode_uuid(record.import_id);
    let file_name  = record.file_name.clone();
    let file_type  = record.file_type.clone();
    let kind_str   = record.schema_kind.to_string();
    let status_str = record.status.to_string();
    let sha        = record.payload_sha256.clone();
    let at_str     = encode_dt(record.started_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO hdl_import_log (
             import_id, file_name, file_type, hdl_object, status,
             payload_sha256, started_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, file_name, file_type, kind_str, status_str, sha, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn complete_import(&self, import_id: Uuid, summary: LoadSummary) -> Result<()> {
    self
      .close_import(import_id, ImportStatus::Completed, Some(summary), None)
      .await
  }

  async fn fail_import(&self, import_id: Uuid, message: String) -> Result<()> {
    self
      .close_import(import_id, ImportStatus::Failed, None, Some(message))
      .await
  }

  async fn get_import(&self, import_id: Uuid) -> Result<Option<ImportRecord>> {
    let id_str = encode_uuid(import_id);

    let raw: Option<RawImport> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM hdl_import_log WHERE import_id = ?1",
              RawImport::COLUMNS
            ),
            rusqlite::params![id_str],
            RawImport::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawImport::into_record).transpose()
  }

  async fn list_imports(&self, limit: usize) -> Result<Vec<ImportRecord>> {
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawImport> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM hdl_import_log
           ORDER BY started_at DESC, rowid DESC
           LIMIT ?1",
          RawImport::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], RawImport::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawImport::into_record).collect()
  }
}
