//! Artifact: one inbound payload-plus-trigger pair.

use std::path::{Path, PathBuf};

use crate::{Error, Result, SchemaKind, classify};

/// The suffix a producer appends to a payload name to signal it is complete.
pub const DEFAULT_TRIGGER_SUFFIX: &str = ".ok";

/// An inbound unit of work, derived from a trigger file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  /// Payload file name (no directory), e.g. `HCM_INT_121_OT_MY_….CSV.gpg`.
  pub file_name:    String,
  pub payload_path: PathBuf,
  pub trigger_path: PathBuf,
  pub is_encrypted: bool,
}

impl Artifact {
  /// Resolve the artifact a trigger file refers to by stripping `suffix`.
  ///
  /// Does not touch the filesystem; whether the payload exists is the
  /// caller's concern.
  pub fn from_trigger(trigger_path: &Path, suffix: &str) -> Result<Self> {
    let trigger_name = trigger_path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| Error::NotATrigger(trigger_path.display().to_string()))?;

    let file_name = trigger_name
      .strip_suffix(suffix)
      .filter(|n| !n.is_empty())
      .ok_or_else(|| Error::NotATrigger(trigger_name.to_owned()))?
      .to_owned();

    let payload_path = trigger_path.with_file_name(&file_name);
    let is_encrypted = file_name.to_ascii_lowercase().ends_with(".gpg");

    Ok(Self {
      file_name,
      payload_path,
      trigger_path: trigger_path.to_path_buf(),
      is_encrypted,
    })
  }

  /// Upper-cased last extension, e.g. `GPG` or `CSV`; empty when there is
  /// none.
  pub fn file_type(&self) -> String {
    Path::new(&self.file_name)
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_uppercase)
      .unwrap_or_default()
  }

  pub fn schema_kind(&self) -> SchemaKind { classify(&self.file_name) }
}
