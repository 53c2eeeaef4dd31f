//! Person: the canonical entity every inbound row hangs off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provenance tag written on persons created as placeholders by the importer.
pub const PLACEHOLDER_SOURCE_OWNER: &str = "LEGACY_DATA";

/// A person keyed by the externally assigned `person_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
  /// Surrogate identity; stable once assigned.
  pub person_id:           Uuid,
  pub person_number:       String,
  pub full_name:           String,
  pub source_system_owner: String,
  pub source_system_id:    String,
  pub created_at:          DateTime<Utc>,
}

impl Person {
  /// A minimal placeholder for a person first seen in an inbound batch.
  pub fn placeholder(person_number: &str) -> Self {
    Self {
      person_id:           Uuid::new_v4(),
      person_number:       person_number.to_owned(),
      full_name:           format!("Person {person_number}"),
      source_system_owner: PLACEHOLDER_SOURCE_OWNER.to_owned(),
      source_system_id:    person_number.to_owned(),
      created_at:          Utc::now(),
    }
  }
}
