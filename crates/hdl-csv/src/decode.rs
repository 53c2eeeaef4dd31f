//! Streaming decoder.
//!
//! Pipeline:
//!   impl Read
//!     └─ csv::Reader (header row, RFC 4180 quoting)
//!          └─ Records       → Iterator<Item = Result<FieldMap>>
//!               └─ decode_* → Batch

use std::{io::Read, sync::Arc};

use crate::{Batch, FieldMap, Result};

/// A lazy record iterator over a batch; holds only one record at a time.
pub struct Records<R> {
  headers: Arc<[String]>,
  inner:   csv::StringRecordsIntoIter<R>,
}

impl<R: Read> Records<R> {
  pub fn headers(&self) -> &[String] { &self.headers }
}

impl<R: Read> Iterator for Records<R> {
  type Item = Result<FieldMap>;

  fn next(&mut self) -> Option<Self::Item> {
    let record = match self.inner.next()? {
      Ok(record) => record,
      Err(e) => return Some(Err(e.into())),
    };
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let values = record.iter().map(str::to_owned).collect();
    Some(Ok(FieldMap::new(Arc::clone(&self.headers), values, line)))
  }
}

/// Read the header row of `reader` and return an iterator over the records.
///
/// A record whose field count differs from the header's, or that is not
/// valid UTF-8, yields `Err` from the iterator.
pub fn records<R: Read>(reader: R) -> Result<Records<R>> {
  let mut rdr = csv::ReaderBuilder::new()
    .has_headers(true)
    .flexible(false)
    .from_reader(reader);

  let headers: Vec<String> = rdr
    .headers()?
    .iter()
    .map(|h| h.trim_start_matches('\u{feff}').trim().to_owned())
    .collect();

  Ok(Records { headers: headers.into(), inner: rdr.into_records() })
}

/// Decode a whole batch from `reader`. Header-only or empty input yields an
/// empty batch.
pub fn decode_reader<R: Read>(reader: R) -> Result<Batch> {
  let records = records(reader)?;
  let headers = records.headers().to_vec();
  let records = records.collect::<Result<Vec<_>>>()?;
  Ok(Batch { headers, records })
}

pub fn decode_bytes(input: &[u8]) -> Result<Batch> { decode_reader(input) }

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Error;

  #[test]
  fn empty_input_is_an_empty_batch() {
    let batch = decode_bytes(b"").unwrap();
    assert!(batch.is_empty());
    assert!(batch.headers.is_empty());
  }

  #[test]
  fn header_only_is_an_empty_batch() {
    let batch = decode_bytes(b"PersonNumber,Hours\n").unwrap();
    assert!(batch.is_empty());
    assert_eq!(batch.headers, ["PersonNumber", "Hours"]);
  }

  #[test]
  fn preserves_file_order() {
    let batch = decode_bytes(b"N\n1\n2\n3\n").unwrap();
    let values: Vec<_> = batch.records.iter().map(|r| r.get("N").unwrap()).collect();
    assert_eq!(values, ["1", "2", "3"]);
  }

  #[test]
  fn quoted_fields() {
    let input = b"A,B\n\"x, y\",\"say \"\"hi\"\"\"\n\"multi\nline\",plain\n";
    let batch = decode_bytes(input).unwrap();
    assert_eq!(batch.records[0].get("A"), Some("x, y"));
    assert_eq!(batch.records[0].get("B"), Some("say \"hi\""));
    assert_eq!(batch.records[1].get("A"), Some("multi\nline"));
  }

  #[test]
  fn records_carry_their_starting_line() {
    let input = b"A,B\n\"multi\nline\",1\nnext,2\n";
    let batch = decode_bytes(input).unwrap();
    assert_eq!(batch.records[0].line(), 2);
    assert!(batch.records[1].line() > batch.records[0].line() + 1);
  }

  #[test]
  fn crlf_line_endings() {
    let batch = decode_bytes(b"A,B\r\n1,2\r\n").unwrap();
    assert_eq!(batch.records[0].get("B"), Some("2"));
  }

  #[test]
  fn header_whitespace_and_bom_are_stripped() {
    let batch = decode_bytes(b"\xef\xbb\xbfPersonNumber , Hours\n1,2\n").unwrap();
    assert_eq!(batch.headers, ["PersonNumber", "Hours"]);
    assert_eq!(batch.records[0].get("Hours"), Some("2"));
  }

  #[test]
  fn unequal_field_count_is_a_parse_error() {
    let err = decode_bytes(b"A,B\n1,2\n3\n").unwrap_err();
    assert!(matches!(err, Error::Parse { line: Some(_), .. }), "{err:?}");
  }

  #[test]
  fn invalid_utf8_is_a_parse_error() {
    let err = decode_bytes(b"A,B\n\xff,1\n").unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
  }

  #[test]
  fn lazy_iteration_yields_records_before_an_error() {
    let mut it = records(&b"A,B\n1,2\n3\n4,5\n"[..]).unwrap();
    assert_eq!(it.headers(), ["A", "B"]);
    assert_eq!(it.next().unwrap().unwrap().get("B"), Some("2"));
    assert!(it.next().unwrap().is_err());
  }
}
