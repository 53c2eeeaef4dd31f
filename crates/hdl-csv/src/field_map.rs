//! [`FieldMap`]: one decoded record keyed by header name.

use std::sync::Arc;

/// A record whose values are addressed by header name, in header order.
///
/// The header list is shared between all records of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
  headers: Arc<[String]>,
  values:  Vec<String>,
  line:    u64,
}

impl FieldMap {
  pub(crate) fn new(headers: Arc<[String]>, values: Vec<String>, line: u64) -> Self {
    Self { headers, values, line }
  }

  /// Build a record from `(header, value)` pairs; the line number is 0.
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let (headers, values): (Vec<String>, Vec<String>) = pairs
      .into_iter()
      .map(|(k, v)| (k.into(), v.into()))
      .unzip();
    Self { headers: headers.into(), values, line: 0 }
  }

  /// Value of `name`, or `None` when the batch has no such column.
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .position(|h| h == name)
      .and_then(|i| self.values.get(i))
      .map(String::as_str)
  }

  /// 1-based line on which the record starts (0 for synthesised records).
  pub fn line(&self) -> u64 { self.line }

  pub fn headers(&self) -> &[String] { &self.headers }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .headers
      .iter()
      .map(String::as_str)
      .zip(self.values.iter().map(String::as_str))
  }

  pub fn to_pairs(&self) -> Vec<(String, String)> {
    self
      .iter()
      .map(|(k, v)| (k.to_owned(), v.to_owned()))
      .collect()
  }

  pub fn len(&self) -> usize { self.values.len() }

  pub fn is_empty(&self) -> bool { self.values.is_empty() }
}
