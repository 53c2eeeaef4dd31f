//! Delimited-text codec for HDL batch files.
//!
//! A batch is a header row naming the fields followed by one record per row.
//! Fields are comma-separated; a field may be double-quoted to contain commas,
//! newlines, or quotes (escaped by doubling). Pure synchronous; no database or
//! async dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use hdl_core::SchemaKind;
//! use hdl_csv::{decode_bytes, to_import_row};
//!
//! let input = b"PersonNumber,AccrualPlan,AccrualType,AccrualDate,Hours\n\
//!               3000000000000123,Overtime Plan,OVERTIME,2024-01-05,2.5\n";
//! let batch = decode_bytes(input).unwrap();
//! let row = to_import_row(SchemaKind::AccrualDetail, &batch.records[0]).unwrap();
//! println!("{} → {row:?}", row.person_number());
//! ```

mod decode;
mod encode;
pub mod error;
mod field_map;
mod typed;

pub use decode::{Records, decode_bytes, decode_reader, records};
pub use encode::encode;
pub use error::{Error, Result, RowError};
pub use field_map::FieldMap;
pub use typed::{columns, to_import_row};

/// A fully materialised batch.
#[derive(Debug, Clone, Default)]
pub struct Batch {
  pub headers: Vec<String>,
  /// Records in file order.
  pub records: Vec<FieldMap>,
}

impl Batch {
  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

// ─── Round-trip test ─────────────────────────────────────────────────────────

#[cfg(test)]
mod roundtrip_tests {
  use super::*;

  #[test]
  fn quoting_survives_encode_then_decode() {
    let headers = ["PersonNumber", "DocumentName", "FileContent"];
    let rows = vec![
      FieldMap::from_pairs([
        ("PersonNumber", "3000000000000123"),
        ("DocumentName", "Payslip, January \"final\""),
        ("FileContent", "JVBERi0xLjQK"),
      ]),
      FieldMap::from_pairs([
        ("PersonNumber", "3000000000000124"),
        ("DocumentName", "line one\nline two"),
        ("FileContent", ""),
      ]),
      FieldMap::from_pairs([
        ("PersonNumber", "3000000000000125"),
        ("DocumentName", "\"\""),
        ("FileContent", "a,b,,c"),
      ]),
    ];

    let bytes = encode(&headers, &rows).expect("encode");
    let batch = decode_bytes(&bytes).expect("decode");

    assert_eq!(batch.headers, headers);
    assert_eq!(batch.len(), rows.len());
    for (decoded, original) in batch.records.iter().zip(&rows) {
      assert_eq!(decoded.to_pairs(), original.to_pairs());
    }
  }
}
