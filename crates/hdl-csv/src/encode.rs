//! Batch encoder, the inverse of the decoder.

use crate::{FieldMap, Result};

/// Encode `rows` under `headers`. Values are written in header order; a
/// column a row lacks is written empty. Fields are quoted only when they
/// contain a comma, quote, or line break.
pub fn encode<'a, H, I>(headers: &[H], rows: I) -> Result<Vec<u8>>
where
  H: AsRef<str>,
  I: IntoIterator<Item = &'a FieldMap>,
{
  let mut wtr = csv::WriterBuilder::new()
    .terminator(csv::Terminator::Any(b'\n'))
    .quote_style(csv::QuoteStyle::Necessary)
    .from_writer(Vec::new());

  wtr.write_record(headers.iter().map(AsRef::as_ref))?;
  for row in rows {
    wtr.write_record(headers.iter().map(|h| row.get(h.as_ref()).unwrap_or("")))?;
  }

  wtr.into_inner().map_err(|e| e.into_error().into())
}
