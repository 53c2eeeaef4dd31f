//! The `ImportStore` trait.
//!
//! Implemented by storage backends (e.g. `hdl-store-sqlite`). The loader and
//! the watcher depend on this abstraction, not on any concrete backend.
//!
//! Every write is its own atomic unit; there is no transaction spanning a
//! whole artifact.

use std::future::Future;

use uuid::Uuid;

use crate::{
  audit::{ImportRecord, LoadSummary, NewImport},
  person::Person,
  row::{
    AccrualDetailRow, Attachment, DocumentOfRecordRow, ExternalIdentifierRow,
    StoredAccrualDetail, StoredAttachment, StoredDocument,
    StoredExternalIdentifier,
  },
};

/// Abstraction over the relational store the importer writes into.
///
/// All methods return `Send` futures so a single store handle can be shared
/// by every worker of a multi-threaded runtime.
pub trait ImportStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Persons ───────────────────────────────────────────────────────────

  /// Return the person with `person_number`, creating a placeholder first if
  /// none exists. A unique-constraint violation on insert (a concurrent
  /// creator won the race) is resolved by re-reading.
  fn find_or_create_person<'a>(
    &'a self,
    person_number: &'a str,
  ) -> impl Future<Output = Result<Person, Self::Error>> + Send + 'a;

  fn get_person<'a>(
    &'a self,
    person_number: &'a str,
  ) -> impl Future<Output = Result<Option<Person>, Self::Error>> + Send + 'a;

  fn list_persons(
    &self,
  ) -> impl Future<Output = Result<Vec<Person>, Self::Error>> + Send + '_;

  // ── Record writes ─────────────────────────────────────────────────────

  /// Upsert by `(person_number, document_type, document_code)`; returns the
  /// document's surrogate id, which is stable across upserts.
  fn upsert_document<'a>(
    &'a self,
    person: &'a Person,
    row: &'a DocumentOfRecordRow,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + 'a;

  /// Upsert the attachment of `document_id`, replacing content and size.
  fn upsert_attachment<'a>(
    &'a self,
    document_id: Uuid,
    row: &'a DocumentOfRecordRow,
    attachment: &'a Attachment,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Upsert by `(person_number, identifier_type, sequence)`.
  fn upsert_external_identifier<'a>(
    &'a self,
    person: &'a Person,
    row: &'a ExternalIdentifierRow,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Plain insert; no conflict handling.
  fn insert_accrual_detail<'a>(
    &'a self,
    person: &'a Person,
    row: &'a AccrualDetailRow,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Record reads ──────────────────────────────────────────────────────

  fn list_documents<'a>(
    &'a self,
    person_number: &'a str,
  ) -> impl Future<Output = Result<Vec<StoredDocument>, Self::Error>> + Send + 'a;

  fn get_attachment(
    &self,
    document_id: Uuid,
  ) -> impl Future<Output = Result<Option<StoredAttachment>, Self::Error>> + Send + '_;

  fn list_external_identifiers<'a>(
    &'a self,
    person_number: &'a str,
  ) -> impl Future<Output = Result<Vec<StoredExternalIdentifier>, Self::Error>>
  + Send
  + 'a;

  fn list_accrual_details<'a>(
    &'a self,
    person_number: &'a str,
  ) -> impl Future<Output = Result<Vec<StoredAccrualDetail>, Self::Error>>
  + Send
  + 'a;

  // ── Audit log ─────────────────────────────────────────────────────────

  /// Open an audit row in `PROCESSING`.
  fn open_import(
    &self,
    input: NewImport,
  ) -> impl Future<Output = Result<ImportRecord, Self::Error>> + Send + '_;

  /// Close a `PROCESSING` row as `COMPLETED` with the given totals.
  ///
  /// Returns an error if the row does not exist or is already closed.
  fn complete_import(
    &self,
    import_id: Uuid,
    summary: LoadSummary,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Close a `PROCESSING` row as `FAILED` with `message`.
  ///
  /// Returns an error if the row does not exist or is already closed.
  fn fail_import(
    &self,
    import_id: Uuid,
    message: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_import(
    &self,
    import_id: Uuid,
  ) -> impl Future<Output = Result<Option<ImportRecord>, Self::Error>> + Send + '_;

  /// Most recently started first.
  fn list_imports(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ImportRecord>, Self::Error>> + Send + '_;
}
