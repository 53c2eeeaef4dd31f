//! The per-artifact pipeline.
//!
//! ```text
//! Detected → Decrypting → Parsing → Classified → Loading → Auditing → Archiving → Done
//!                 └────────────┴──→ Failed (audit FAILED, payload quarantined)
//! ```
//!
//! Decryption and parsing failures are fatal for the artifact. Everything
//! after classification runs to the end regardless of per-record failures.

use std::{path::PathBuf, time::Duration};

use chrono::Utc;
use hdl_core::{
  SchemaKind,
  artifact::Artifact,
  audit::{LoadSummary, NewImport},
  decrypt::PayloadDecryptor,
  store::ImportStore,
};
use hdl_csv::Batch;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Archiver, PipelineError, Result, loader::load_batch};

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
  Detected,
  Decrypting,
  Parsing,
  Classified,
  Loading,
  Auditing,
  Archiving,
  Done,
  Failed,
}

/// What happened to one artifact.
#[derive(Debug, Clone)]
pub struct ArtifactReport {
  pub file_name:   String,
  pub state:       ArtifactState,
  pub schema_kind: SchemaKind,
  /// `None` when the audit row could not be opened.
  pub import_id:   Option<Uuid>,
  pub summary:     Option<LoadSummary>,
  /// Archive or quarantine destination, when the move succeeded.
  pub archived_to: Option<PathBuf>,
  pub error:       Option<String>,
}

impl ArtifactReport {
  fn new(artifact: &Artifact) -> Self {
    Self {
      file_name:   artifact.file_name.clone(),
      state:       ArtifactState::Detected,
      schema_kind: artifact.schema_kind(),
      import_id:   None,
      summary:     None,
      archived_to: None,
      error:       None,
    }
  }

  fn advance(&mut self, next: ArtifactState) {
    tracing::debug!(file = %self.file_name, from = ?self.state, to = ?next, "artifact state");
    self.state = next;
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Runs artifacts end to end against an injected store and decryptor.
///
/// With no decryptor, encrypted payloads are parsed as plaintext.
pub struct Pipeline<S, D> {
  store:         S,
  decryptor:     Option<D>,
  archiver:      Archiver,
  stage_timeout: Duration,
}

impl<S, D> Pipeline<S, D>
where
  S: ImportStore,
  D: PayloadDecryptor,
{
  pub fn new(store: S, decryptor: Option<D>, archiver: Archiver, stage_timeout: Duration) -> Self {
    Self { store, decryptor, archiver, stage_timeout }
  }

  pub fn store(&self) -> &S { &self.store }

  /// Process one artifact. Never fails: every outcome is in the report.
  pub async fn process(&self, artifact: Artifact) -> ArtifactReport {
    let mut report = ArtifactReport::new(&artifact);
    let file = artifact.file_name.as_str();

    let payload = match tokio::fs::read(&artifact.payload_path).await {
      Ok(bytes) => bytes,
      Err(source) => {
        let err = PipelineError::ReadPayload { path: artifact.payload_path.clone(), source };
        tracing::error!(file, error = %err, "abandoning artifact");
        report.error = Some(err.to_string());
        report.advance(ArtifactState::Failed);
        return report;
      }
    };

    let opened = self
      .store
      .open_import(NewImport {
        file_name:      artifact.file_name.clone(),
        file_type:      artifact.file_type(),
        schema_kind:    report.schema_kind,
        payload_sha256: Some(hex::encode(Sha256::digest(&payload))),
      })
      .await;
    match opened {
      Ok(record) => report.import_id = Some(record.import_id),
      Err(e) => {
        tracing::error!(file, error = %e, "could not open audit row; continuing without one")
      }
    }

    let batch = match self.decode(&artifact, payload, &mut report).await {
      Ok(batch) => batch,
      Err(err) => return self.abandon(&artifact, report, err).await,
    };

    report.advance(ArtifactState::Classified);
    tracing::info!(
      file,
      kind = %report.schema_kind,
      records = batch.len(),
      "batch decoded"
    );

    report.advance(ArtifactState::Loading);
    let summary =
      load_batch(&self.store, report.schema_kind, &batch.records, self.stage_timeout).await;
    report.summary = Some(summary);

    report.advance(ArtifactState::Auditing);
    if let Some(import_id) = report.import_id
      && let Err(e) = self.store.complete_import(import_id, summary).await
    {
      tracing::error!(file, %import_id, error = %e, "could not close audit row");
    }

    report.advance(ArtifactState::Archiving);
    match self.archiver.archive(&artifact, Utc::now().naive_utc()).await {
      Ok(path) => report.archived_to = Some(path),
      Err(e) => {
        tracing::error!(file, error = %e, "archive failed; artifact left in place");
        report.error = Some(e.to_string());
      }
    }

    report.advance(ArtifactState::Done);
    tracing::info!(
      file,
      total = summary.total,
      success = summary.success,
      failed = summary.failed,
      skipped = summary.skipped(),
      "artifact processed"
    );
    report
  }

  /// Decrypt (when needed) and parse the payload.
  async fn decode(
    &self,
    artifact: &Artifact,
    payload: Vec<u8>,
    report: &mut ArtifactReport,
  ) -> Result<Batch> {
    let plaintext = match (&self.decryptor, artifact.is_encrypted) {
      (Some(decryptor), true) => {
        report.advance(ArtifactState::Decrypting);
        match tokio::time::timeout(self.stage_timeout, decryptor.decrypt(payload)).await {
          Ok(Ok(plaintext)) => plaintext,
          Ok(Err(e)) => return Err(PipelineError::Decrypt(Box::new(e))),
          Err(_) => {
            return Err(PipelineError::Timeout { stage: "decryption", after: self.stage_timeout });
          }
        }
      }
      (None, true) => {
        tracing::warn!(
          file = %artifact.file_name,
          "no decryption key available; reading encrypted payload as plaintext"
        );
        payload
      }
      (_, false) => payload,
    };

    report.advance(ArtifactState::Parsing);
    let batch = tokio::task::spawn_blocking(move || hdl_csv::decode_bytes(&plaintext)).await??;
    Ok(batch)
  }

  /// Record a fatal failure and move the payload out of the inbound directory.
  async fn abandon(
    &self,
    artifact: &Artifact,
    mut report: ArtifactReport,
    err: PipelineError,
  ) -> ArtifactReport {
    let file = artifact.file_name.as_str();
    let message = err.to_string();
    tracing::error!(file, error = %message, "artifact failed");

    if let Some(import_id) = report.import_id
      && let Err(e) = self.store.fail_import(import_id, message.clone()).await
    {
      tracing::error!(file, %import_id, error = %e, "could not close audit row");
    }

    match self.archiver.quarantine(artifact, Utc::now().naive_utc()).await {
      Ok(path) => {
        tracing::warn!(file, to = %path.display(), "payload quarantined");
        report.archived_to = Some(path);
      }
      Err(e) => tracing::error!(file, error = %e, "quarantine failed; artifact left in place"),
    }

    report.error = Some(message);
    report.advance(ArtifactState::Failed);
    report
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use hdl_core::audit::ImportStatus;
  use hdl_store_sqlite::SqliteStore;
  use tempfile::TempDir;

  use super::*;

  /// XOR "cipher" so tests can tell decrypted bytes from raw ones.
  struct Xor(u8);

  #[derive(Debug, thiserror::Error)]
  #[error("bad ciphertext")]
  struct BadCiphertext;

  impl PayloadDecryptor for Xor {
    type Error = BadCiphertext;

    async fn decrypt(&self, ciphertext: Vec<u8>) -> Result<Vec<u8>, BadCiphertext> {
      Ok(ciphertext.into_iter().map(|b| b ^ self.0).collect())
    }
  }

  struct Reject;

  impl PayloadDecryptor for Reject {
    type Error = BadCiphertext;

    async fn decrypt(&self, _ciphertext: Vec<u8>) -> Result<Vec<u8>, BadCiphertext> {
      Err(BadCiphertext)
    }
  }

  /// Never answers.
  struct Hang;

  impl PayloadDecryptor for Hang {
    type Error = BadCiphertext;

    async fn decrypt(&self, _ciphertext: Vec<u8>) -> Result<Vec<u8>, BadCiphertext> {
      std::future::pending().await
    }
  }

  const ACCRUALS: &str =
    "PersonNumber,AccrualPlan,AccrualType,AccrualDate,Hours,SourceSystemOwner,SourceSystemId\n\
     3000000000000123,Overtime Plan,OVERTIME,2024-01-05,2.5,LEGACY_DATA,a\n\
     3000000000000123,Overtime Plan,OVERTIME,2024-01-06,n/a,LEGACY_DATA,b\n\
     3000000000000124,Overtime Plan,OVERTIME,2024-01-06,1,LEGACY_DATA,c\n";

  struct Dirs {
    inbound: TempDir,
    archive: TempDir,
  }

  impl Dirs {
    fn new() -> Self {
      Self {
        inbound: tempfile::tempdir().unwrap(),
        archive: tempfile::tempdir().unwrap(),
      }
    }

    fn archiver(&self) -> Archiver {
      Archiver::new(self.archive.path(), self.quarantine())
    }

    fn quarantine(&self) -> PathBuf { self.archive.path().join("quarantine") }

    fn drop_file(&self, name: &str, body: &[u8]) -> Artifact {
      std::fs::write(self.inbound.path().join(name), body).unwrap();
      let trigger = self.inbound.path().join(format!("{name}.ok"));
      std::fs::write(&trigger, "").unwrap();
      Artifact::from_trigger(&trigger, ".ok").unwrap()
    }
  }

  async fn pipeline<D: PayloadDecryptor>(
    dirs: &Dirs,
    decryptor: Option<D>,
  ) -> Pipeline<SqliteStore, D> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Pipeline::new(store, decryptor, dirs.archiver(), Duration::from_secs(5))
  }

  fn dated(root: &Path, report: &ArtifactReport) -> bool {
    report
      .archived_to
      .as_deref()
      .and_then(Path::parent)
      .and_then(Path::parent)
      .is_some_and(|p| p == root)
  }

  #[tokio::test]
  async fn partial_failure_completes_and_archives() {
    let dirs = Dirs::new();
    let p = pipeline::<Xor>(&dirs, None).await;
    let artifact = dirs.drop_file("HCM_INT_121_OT_MY_1.CSV", ACCRUALS.as_bytes());

    let report = p.process(artifact.clone()).await;

    assert_eq!(report.state, ArtifactState::Done);
    assert_eq!(report.schema_kind, SchemaKind::AccrualDetail);
    assert_eq!(report.summary, Some(LoadSummary { total: 3, success: 2, failed: 1 }));
    assert!(dated(dirs.archive.path(), &report));
    assert!(!artifact.payload_path.exists());
    assert!(!artifact.trigger_path.exists());

    let record = p.store().get_import(report.import_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Completed);
    assert_eq!(record.summary(), LoadSummary { total: 3, success: 2, failed: 1 });
    assert_eq!(record.file_type, "CSV");
    let expected_sha = hex::encode(Sha256::digest(ACCRUALS.as_bytes()));
    assert_eq!(record.payload_sha256.as_deref(), Some(expected_sha.as_str()));
  }

  #[tokio::test]
  async fn unknown_kind_completes_with_nothing_loaded() {
    let dirs = Dirs::new();
    let p = pipeline::<Xor>(&dirs, None).await;
    let artifact = dirs.drop_file("HCM_INT_999_MISC.csv", b"A,B\n1,2\n3,4\n5,6\n7,8\n9,10\n");

    let report = p.process(artifact).await;

    assert_eq!(report.state, ArtifactState::Done);
    assert_eq!(report.schema_kind, SchemaKind::Unknown);
    let record = p.store().get_import(report.import_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Completed);
    assert_eq!(record.summary(), LoadSummary { total: 5, success: 0, failed: 0 });
  }

  #[tokio::test]
  async fn encrypted_payload_is_decrypted_first() {
    let dirs = Dirs::new();
    let p = pipeline(&dirs, Some(Xor(0x5a))).await;
    let ciphertext: Vec<u8> = ACCRUALS.bytes().map(|b| b ^ 0x5a).collect();
    let artifact = dirs.drop_file("HCM_INT_121_OT_MY_2.CSV.gpg", &ciphertext);

    let report = p.process(artifact).await;

    assert_eq!(report.state, ArtifactState::Done);
    assert_eq!(report.summary, Some(LoadSummary { total: 3, success: 2, failed: 1 }));
    let record = p.store().get_import(report.import_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.file_type, "GPG");
  }

  #[tokio::test]
  async fn encrypted_payload_without_key_is_read_as_plaintext() {
    let dirs = Dirs::new();
    let p = pipeline::<Xor>(&dirs, None).await;
    let artifact = dirs.drop_file("HCM_INT_121_OT_MY_3.CSV.gpg", ACCRUALS.as_bytes());

    let report = p.process(artifact).await;

    assert_eq!(report.state, ArtifactState::Done);
    assert_eq!(report.summary.unwrap().success, 2);
  }

  #[tokio::test]
  async fn decrypt_failure_fails_audit_and_quarantines() {
    let dirs = Dirs::new();
    let p = pipeline(&dirs, Some(Reject)).await;
    let artifact = dirs.drop_file("HCM_INT_111_PAYSLIP_MY_1.CSV.gpg", b"not really pgp");

    let report = p.process(artifact.clone()).await;

    assert_eq!(report.state, ArtifactState::Failed);
    assert!(report.summary.is_none());
    assert!(dated(&dirs.quarantine(), &report));
    assert!(!artifact.payload_path.exists());
    assert!(!artifact.trigger_path.exists());

    let record = p.store().get_import(report.import_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Failed);
    assert!(record.error_message.unwrap().contains("bad ciphertext"));
    assert!(p.store().list_persons().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn parse_failure_fails_audit_and_quarantines() {
    let dirs = Dirs::new();
    let p = pipeline::<Xor>(&dirs, None).await;
    let artifact = dirs.drop_file("HCM_INT_131_PAYROLLID_1.csv", b"A,B\n1,2,3\n");

    let report = p.process(artifact).await;

    assert_eq!(report.state, ArtifactState::Failed);
    assert!(dated(&dirs.quarantine(), &report));
    let record = p.store().get_import(report.import_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Failed);
  }

  #[tokio::test]
  async fn missing_payload_leaves_no_audit_row() {
    let dirs = Dirs::new();
    let p = pipeline::<Xor>(&dirs, None).await;
    let artifact = dirs.drop_file("HCM_INT_111_TAX_1.csv", b"x");
    std::fs::remove_file(&artifact.payload_path).unwrap();

    let report = p.process(artifact).await;

    assert_eq!(report.state, ArtifactState::Failed);
    assert!(report.import_id.is_none());
    assert!(p.store().list_imports(10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn person_is_shared_between_artifacts() {
    let dirs = Dirs::new();
    let p = pipeline::<Xor>(&dirs, None).await;

    let a = dirs.drop_file("HCM_INT_121_OT_MY_A.CSV", ACCRUALS.as_bytes());
    let b = dirs.drop_file(
      "HCM_INT_131_PAYROLLID_MY_B.CSV",
      b"PersonNumber,ExternalIdentifierNumber,ExternalIdentifierType,DateFrom\n\
        3000000000000123,PAY-1,ORA_3RD_PARTY_PAY_ID,2024-01-01\n",
    );
    p.process(a).await;
    p.process(b).await;

    let persons = p.store().list_persons().await.unwrap();
    assert_eq!(persons.len(), 2);
    let person = p.store().get_person("3000000000000123").await.unwrap().unwrap();
    let ids = p.store().list_external_identifiers("3000000000000123").await.unwrap();
    assert_eq!(ids[0].person_id, person.person_id);
  }

  #[tokio::test]
  async fn decrypt_timeout_fails_audit_and_quarantines() {
    let dirs = Dirs::new();
    let store = SqliteStore::open_in_memory().await.unwrap();
    let p = Pipeline::new(store, Some(Hang), dirs.archiver(), Duration::from_millis(50));
    let artifact = dirs.drop_file("HCM_INT_111_TAX_MY_1.CSV.gpg", b"ciphertext");

    let report = p.process(artifact.clone()).await;

    assert_eq!(report.state, ArtifactState::Failed);
    assert!(dated(&dirs.quarantine(), &report));
    assert!(!artifact.payload_path.exists());

    let record = p.store().get_import(report.import_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Failed);
    assert!(record.error_message.unwrap().contains("decryption timed out"));
  }

  #[tokio::test]
  async fn archive_failure_keeps_audit_and_leaves_artifact() {
    let dirs = Dirs::new();
    let blocked = dirs.archive.path().join("not-a-dir");
    std::fs::write(&blocked, "").unwrap();
    let store = SqliteStore::open_in_memory().await.unwrap();
    let archiver = Archiver::new(&blocked, dirs.quarantine());
    let p = Pipeline::new(store, None::<Xor>, archiver, Duration::from_secs(5));
    let artifact = dirs.drop_file("HCM_INT_121_OT_MY_4.CSV", ACCRUALS.as_bytes());

    let report = p.process(artifact.clone()).await;

    assert_eq!(report.state, ArtifactState::Done);
    assert!(report.archived_to.is_none());
    assert!(report.error.is_some());
    assert!(artifact.payload_path.exists());
    assert!(artifact.trigger_path.exists());

    let record = p.store().get_import(report.import_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, ImportStatus::Completed);
    assert_eq!(record.summary(), LoadSummary { total: 3, success: 2, failed: 1 });
  }
}
