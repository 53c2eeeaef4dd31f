//! The loader: typed rows into the store, one record at a time.
//!
//! Every record is its own unit of work. A record that fails validation or
//! whose write fails is counted and logged; its siblings still load.

use std::time::Duration;

use hdl_core::{
  SchemaKind, audit::LoadSummary, row::ImportRow, store::ImportStore,
};
use hdl_csv::{FieldMap, columns, to_import_row};

use crate::RecordError;

/// Write one typed row, creating its person first if needed.
pub async fn load_row<S: ImportStore>(store: &S, row: &ImportRow) -> Result<(), S::Error> {
  let person = store.find_or_create_person(row.person_number()).await?;

  match row {
    ImportRow::DocumentOfRecord(doc) => {
      let document_id = store.upsert_document(&person, doc).await?;
      if let Some(attachment) = &doc.attachment {
        store.upsert_attachment(document_id, doc, attachment).await?;
      }
    }
    ImportRow::ExternalIdentifier(identifier) => {
      store.upsert_external_identifier(&person, identifier).await?;
    }
    ImportRow::AccrualDetail(accrual) => {
      store.insert_accrual_detail(&person, accrual).await?;
    }
  }
  Ok(())
}

/// Validate and write one record within `timeout`.
pub async fn load_record<S: ImportStore>(
  store: &S,
  kind: SchemaKind,
  fields: &FieldMap,
  timeout: Duration,
) -> Result<(), RecordError> {
  let row = to_import_row(kind, fields)?;
  match tokio::time::timeout(timeout, load_row(store, &row)).await {
    Ok(Ok(())) => Ok(()),
    Ok(Err(e)) => Err(RecordError::Store(Box::new(e))),
    Err(_) => Err(RecordError::Timeout(timeout)),
  }
}

/// Load every record of a batch and count the outcomes.
///
/// `Unknown` batches are not loaded at all: every row is counted in `total`
/// and neither succeeds nor fails.
pub async fn load_batch<S: ImportStore>(
  store: &S,
  kind: SchemaKind,
  records: &[FieldMap],
  stage_timeout: Duration,
) -> LoadSummary {
  let mut summary = LoadSummary {
    total: records.len() as u64,
    ..LoadSummary::default()
  };

  if kind == SchemaKind::Unknown {
    tracing::warn!(skipped = summary.skipped(), "unrecognised schema kind, nothing loaded");
    return summary;
  }

  for fields in records {
    match load_record(store, kind, fields, stage_timeout).await {
      Ok(()) => summary.success += 1,
      Err(e) => {
        summary.failed += 1;
        tracing::warn!(
          line = fields.line(),
          person_number = fields.get(columns::PERSON_NUMBER).unwrap_or_default(),
          error = %e,
          "record failed"
        );
      }
    }
  }

  summary
}

#[cfg(test)]
mod tests {
  use base64::Engine as _;
  use hdl_core::{
    audit::{ImportRecord, NewImport},
    person::Person,
    row::{
      AccrualDetailRow, Attachment, DocumentOfRecordRow, ExternalIdentifierRow,
      StoredAccrualDetail, StoredAttachment, StoredDocument, StoredExternalIdentifier,
    },
  };
  use hdl_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use super::*;

  const TIMEOUT: Duration = Duration::from_secs(5);

  async fn store() -> SqliteStore {
    SqliteStore::open_in_memory().await.expect("in-memory store")
  }

  fn batch(text: &str) -> Vec<FieldMap> {
    hdl_csv::decode_bytes(text.as_bytes()).expect("decode").records
  }

  #[tokio::test]
  async fn partial_failure_is_isolated() {
    let s = store().await;
    let records = batch(
      "PersonNumber,AccrualPlan,AccrualType,AccrualDate,Hours,SourceSystemOwner,SourceSystemId\n\
       3000000000000123,Overtime Plan,OVERTIME,2024-01-05,2.5,LEGACY_DATA,a\n\
       3000000000000123,Overtime Plan,OVERTIME,2024-01-06,lots,LEGACY_DATA,b\n\
       3000000000000124,Overtime Plan,OVERTIME,2024-01-06,1,LEGACY_DATA,c\n",
    );

    let summary = load_batch(&s, SchemaKind::AccrualDetail, &records, TIMEOUT).await;
    assert_eq!(summary, LoadSummary { total: 3, success: 2, failed: 1 });

    assert_eq!(s.list_accrual_details("3000000000000123").await.unwrap().len(), 1);
    assert_eq!(s.list_accrual_details("3000000000000124").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn unknown_kind_loads_nothing() {
    let s = store().await;
    let records = batch("A,B\n1,2\n3,4\n5,6\n7,8\n9,10\n");

    let summary = load_batch(&s, SchemaKind::Unknown, &records, TIMEOUT).await;
    assert_eq!(summary, LoadSummary { total: 5, success: 0, failed: 0 });
    assert!(s.list_persons().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn documents_and_attachments_are_idempotent_across_batches() {
    let s = store().await;
    let pdf = base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4 payslip");
    let text = format!(
      "PersonNumber,DocumentType,DocumentCode,DocumentName,SourceSystemOwner,SourceSystemId,FileName,FileContent\n\
       3000000000000123,Third Party Payslip,PS_2024_01,Payslip January,LEGACY_DATA,ps1,jan.pdf,{pdf}\n"
    );
    let records = batch(&text);

    for _ in 0..2 {
      let summary = load_batch(&s, SchemaKind::DocumentOfRecord, &records, TIMEOUT).await;
      assert_eq!(summary, LoadSummary { total: 1, success: 1, failed: 0 });
    }

    let docs = s.list_documents("3000000000000123").await.unwrap();
    assert_eq!(docs.len(), 1);
    let attachment = s.get_attachment(docs[0].document_id).await.unwrap().unwrap();
    assert_eq!(attachment.content, b"%PDF-1.4 payslip");
    assert_eq!(s.list_persons().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn identifiers_default_sequence_and_upsert() {
    let s = store().await;
    let first = batch(
      "PersonNumber,ExternalIdentifierNumber,ExternalIdentifierType,DateFrom\n\
       3000000000000123,PAY-1,ORA_3RD_PARTY_PAY_ID,2024/01/01\n",
    );
    let second = batch(
      "PersonNumber,ExternalIdentifierSequence,ExternalIdentifierNumber,ExternalIdentifierType,DateFrom\n\
       3000000000000123,1,PAY-2,ORA_3RD_PARTY_PAY_ID,2024-02-01\n",
    );

    load_batch(&s, SchemaKind::ExternalIdentifier, &first, TIMEOUT).await;
    load_batch(&s, SchemaKind::ExternalIdentifier, &second, TIMEOUT).await;

    let ids = s.list_external_identifiers("3000000000000123").await.unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].sequence, 1);
    assert_eq!(ids[0].identifier_number, "PAY-2");
  }

  #[tokio::test]
  async fn person_is_reused_across_kinds() {
    let s = store().await;
    let accruals = batch(
      "PersonNumber,AccrualPlan,AccrualType,AccrualDate,Hours\n\
       3000000000000123,Overtime Plan,OVERTIME,2024-01-05,2\n",
    );
    let identifiers = batch(
      "PersonNumber,ExternalIdentifierNumber,ExternalIdentifierType,DateFrom\n\
       3000000000000123,PAY-1,ORA_3RD_PARTY_PAY_ID,2024-01-01\n",
    );

    load_batch(&s, SchemaKind::AccrualDetail, &accruals, TIMEOUT).await;
    load_batch(&s, SchemaKind::ExternalIdentifier, &identifiers, TIMEOUT).await;

    let persons = s.list_persons().await.unwrap();
    assert_eq!(persons.len(), 1);
    let accrual = &s.list_accrual_details("3000000000000123").await.unwrap()[0];
    let identifier = &s.list_external_identifiers("3000000000000123").await.unwrap()[0];
    assert_eq!(accrual.person_id, persons[0].person_id);
    assert_eq!(identifier.person_id, persons[0].person_id);
  }

  /// Delegates to SQLite but never finishes writing `SLOW` accruals.
  struct Stalled(SqliteStore);

  impl ImportStore for Stalled {
    type Error = hdl_store_sqlite::Error;

    async fn find_or_create_person(
      &self,
      person_number: &str,
    ) -> hdl_store_sqlite::Result<Person> {
      self.0.find_or_create_person(person_number).await
    }

    async fn get_person(&self, person_number: &str) -> hdl_store_sqlite::Result<Option<Person>> {
      self.0.get_person(person_number).await
    }

    async fn list_persons(&self) -> hdl_store_sqlite::Result<Vec<Person>> {
      self.0.list_persons().await
    }

    async fn upsert_document(
      &self,
      person: &Person,
      row: &DocumentOfRecordRow,
    ) -> hdl_store_sqlite::Result<Uuid> {
      self.0.upsert_document(person, row).await
    }

    async fn upsert_attachment(
      &self,
      document_id: Uuid,
      row: &DocumentOfRecordRow,
      attachment: &Attachment,
    ) -> hdl_store_sqlite::Result<()> {
      self.0.upsert_attachment(document_id, row, attachment).await
    }

    async fn upsert_external_identifier(
      &self,
      person: &Person,
      row: &ExternalIdentifierRow,
    ) -> hdl_store_sqlite::Result<()> {
      self.0.upsert_external_identifier(person, row).await
    }

    async fn insert_accrual_detail(
      &self,
      person: &Person,
      row: &AccrualDetailRow,
    ) -> hdl_store_sqlite::Result<()> {
      if row.accrual_type == "SLOW" {
        std::future::pending::<()>().await;
      }
      self.0.insert_accrual_detail(person, row).await
    }

    async fn list_documents(
      &self,
      person_number: &str,
    ) -> hdl_store_sqlite::Result<Vec<StoredDocument>> {
      self.0.list_documents(person_number).await
    }

    async fn get_attachment(
      &self,
      document_id: Uuid,
    ) -> hdl_store_sqlite::Result<Option<StoredAttachment>> {
      self.0.get_attachment(document_id).await
    }

    async fn list_external_identifiers(
      &self,
      person_number: &str,
    ) -> hdl_store_sqlite::Result<Vec<StoredExternalIdentifier>> {
      self.0.list_external_identifiers(person_number).await
    }

    async fn list_accrual_details(
      &self,
      person_number: &str,
    ) -> hdl_store_sqlite::Result<Vec<StoredAccrualDetail>> {
      self.0.list_accrual_details(person_number).await
    }

    async fn open_import(&self, input: NewImport) -> hdl_store_sqlite::Result<ImportRecord> {
      self.0.open_import(input).await
    }

    async fn complete_import(
      &self,
      import_id: Uuid,
      summary: LoadSummary,
    ) -> hdl_store_sqlite::Result<()> {
      self.0.complete_import(import_id, summary).await
    }

    async fn fail_import(&self, import_id: Uuid, message: String) -> hdl_store_sqlite::Result<()> {
      self.0.fail_import(import_id, message).await
    }

    async fn get_import(&self, import_id: Uuid) -> hdl_store_sqlite::Result<Option<ImportRecord>> {
      self.0.get_import(import_id).await
    }

    async fn list_imports(&self, limit: usize) -> hdl_store_sqlite::Result<Vec<ImportRecord>> {
      self.0.list_imports(limit).await
    }
  }

  #[tokio::test]
  async fn stalled_write_is_a_counted_failure() {
    let s = Stalled(store().await);
    let records = batch(
      "PersonNumber,AccrualPlan,AccrualType,AccrualDate,Hours\n\
       3000000000000123,Overtime Plan,OVERTIME,2024-01-05,2\n\
       3000000000000123,Overtime Plan,SLOW,2024-01-06,3\n\
       3000000000000124,Overtime Plan,OVERTIME,2024-01-07,1\n",
    );

    let timeout = Duration::from_millis(50);
    let summary = load_batch(&s, SchemaKind::AccrualDetail, &records, timeout).await;
    assert_eq!(summary, LoadSummary { total: 3, success: 2, failed: 1 });

    let stalled = load_record(&s, SchemaKind::AccrualDetail, &records[1], timeout).await;
    assert!(matches!(stalled, Err(RecordError::Timeout(t)) if t == timeout));
    assert_eq!(s.list_accrual_details("3000000000000123").await.unwrap().len(), 1);
  }
}
