//! Moving processed payloads out of the inbound directory.
//!
//! Completed payloads go to `<archive_root>/<YYYY-MM-DD>/<file_name>`; payloads
//! that failed decryption or parsing go to the same layout under the
//! quarantine root. The trigger file is deleted afterwards on a best-effort
//! basis.

use std::{
  io,
  path::{Path, PathBuf},
};

use chrono::NaiveDateTime;
use hdl_core::artifact::Artifact;

use crate::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct Archiver {
  archive_root:    PathBuf,
  quarantine_root: PathBuf,
}

impl Archiver {
  pub fn new(archive_root: impl Into<PathBuf>, quarantine_root: impl Into<PathBuf>) -> Self {
    Self {
      archive_root:    archive_root.into(),
      quarantine_root: quarantine_root.into(),
    }
  }

  /// Move the payload into the dated archive folder for `at` and delete its
  /// trigger. Returns the archived path.
  pub async fn archive(&self, artifact: &Artifact, at: NaiveDateTime) -> Result<PathBuf> {
    move_artifact(&self.archive_root, artifact, at).await
  }

  /// Like [`Archiver::archive`], into the quarantine root.
  pub async fn quarantine(&self, artifact: &Artifact, at: NaiveDateTime) -> Result<PathBuf> {
    move_artifact(&self.quarantine_root, artifact, at).await
  }
}

async fn move_artifact(root: &Path, artifact: &Artifact, at: NaiveDateTime) -> Result<PathBuf> {
  let dir = root.join(at.format("%Y-%m-%d").to_string());
  tokio::fs::create_dir_all(&dir)
    .await
    .map_err(|source| PipelineError::Archive { path: dir.clone(), source })?;

  let destination = free_destination(&dir, &artifact.file_name, at)
    .await
    .map_err(|source| PipelineError::Archive { path: dir.clone(), source })?;

  move_file(&artifact.payload_path, &destination)
    .await
    .map_err(|source| PipelineError::Archive {
      path: artifact.payload_path.clone(),
      source,
    })?;

  match tokio::fs::remove_file(&artifact.trigger_path).await {
    Ok(()) => {}
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => tracing::warn!(
      trigger = %artifact.trigger_path.display(),
      error = %e,
      "could not delete trigger"
    ),
  }

  Ok(destination)
}

/// `dir/file_name`, or `dir/file_name.HHMMSS[-n]` when that is taken. An
/// archived file is never overwritten.
async fn free_destination(dir: &Path, file_name: &str, at: NaiveDateTime) -> io::Result<PathBuf> {
  let plain = dir.join(file_name);
  if !tokio::fs::try_exists(&plain).await? {
    return Ok(plain);
  }

  let stamp = at.format("%H%M%S").to_string();
  let mut n = 0u32;
  loop {
    let name = match n {
      0 => format!("{file_name}.{stamp}"),
      _ => format!("{file_name}.{stamp}-{n}"),
    };
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await? {
      return Ok(candidate);
    }
    n += 1;
  }
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
  match tokio::fs::rename(from, to).await {
    Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
      tokio::fs::copy(from, to).await?;
      tokio::fs::remove_file(from).await
    }
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
      .unwrap()
      .and_hms_opt(14, 5, 7)
      .unwrap()
  }

  fn drop_file(inbound: &Path, name: &str, body: &str) -> Artifact {
    std::fs::write(inbound.join(name), body).unwrap();
    let trigger = inbound.join(format!("{name}.ok"));
    std::fs::write(&trigger, "").unwrap();
    Artifact::from_trigger(&trigger, ".ok").unwrap()
  }

  #[tokio::test]
  async fn archives_into_dated_folder_and_deletes_trigger() {
    let inbound = tempfile::tempdir().unwrap();
    let archive = tempfile::tempdir().unwrap();
    let archiver = Archiver::new(archive.path(), archive.path().join("quarantine"));

    let artifact = drop_file(inbound.path(), "A_PAYSLIP.csv", "x");
    let dest = archiver.archive(&artifact, at()).await.unwrap();

    assert_eq!(dest, archive.path().join("2024-03-09").join("A_PAYSLIP.csv"));
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "x");
    assert!(!artifact.payload_path.exists());
    assert!(!artifact.trigger_path.exists());
  }

  #[tokio::test]
  async fn same_day_redelivery_does_not_overwrite() {
    let inbound = tempfile::tempdir().unwrap();
    let archive = tempfile::tempdir().unwrap();
    let archiver = Archiver::new(archive.path(), archive.path().join("quarantine"));

    let first = drop_file(inbound.path(), "A_TAX.csv", "first");
    let first_dest = archiver.archive(&first, at()).await.unwrap();

    let second = drop_file(inbound.path(), "A_TAX.csv", "second");
    let second_dest = archiver.archive(&second, at()).await.unwrap();

    let third = drop_file(inbound.path(), "A_TAX.csv", "third");
    let third_dest = archiver.archive(&third, at()).await.unwrap();

    let day = archive.path().join("2024-03-09");
    assert_eq!(second_dest, day.join("A_TAX.csv.140507"));
    assert_eq!(third_dest, day.join("A_TAX.csv.140507-1"));
    assert_eq!(std::fs::read_to_string(first_dest).unwrap(), "first");
    assert_eq!(std::fs::read_to_string(second_dest).unwrap(), "second");
    assert_eq!(std::fs::read_to_string(third_dest).unwrap(), "third");
  }

  #[tokio::test]
  async fn missing_trigger_is_not_an_error() {
    let inbound = tempfile::tempdir().unwrap();
    let archive = tempfile::tempdir().unwrap();
    let archiver = Archiver::new(archive.path(), archive.path().join("quarantine"));

    let artifact = drop_file(inbound.path(), "B.csv", "x");
    std::fs::remove_file(&artifact.trigger_path).unwrap();

    assert!(archiver.archive(&artifact, at()).await.is_ok());
  }

  #[tokio::test]
  async fn quarantine_uses_its_own_root() {
    let inbound = tempfile::tempdir().unwrap();
    let archive = tempfile::tempdir().unwrap();
    let quarantine = archive.path().join("quarantine");
    let archiver = Archiver::new(archive.path(), &quarantine);

    let artifact = drop_file(inbound.path(), "C_PAYSLIP.csv.gpg", "garbage");
    let dest = archiver.quarantine(&artifact, at()).await.unwrap();

    assert_eq!(dest, quarantine.join("2024-03-09").join("C_PAYSLIP.csv.gpg"));
    assert!(!archive.path().join("2024-03-09").exists());
  }

  #[tokio::test]
  async fn missing_payload_is_an_archive_error() {
    let inbound = tempfile::tempdir().unwrap();
    let archive = tempfile::tempdir().unwrap();
    let archiver = Archiver::new(archive.path(), archive.path().join("quarantine"));

    let artifact = drop_file(inbound.path(), "D.csv", "x");
    std::fs::remove_file(&artifact.payload_path).unwrap();

    let err = archiver.archive(&artifact, at()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Archive { .. }));
    assert!(artifact.trigger_path.exists());
  }
}
