use std::borrow::Cow;
use std::collections::HashMap;

use csv::{ReaderBuilder, StringRecord, Trim};

use super::row::{Cell, Row};
use crate::errors::SeriesError;

struct DelimitedRow<'a> {
    columns: &'a HashMap<String, usize>,
    record: &'a StringRecord,
}

impl Row for DelimitedRow<'_> {
    fn cell(&self, reference: &str) -> Option<Cell<'_>> {
        let index = *self.columns.get(reference)?;
        let text = self.record.get(index)?;
        (!text.is_empty()).then(|| Cell::Text(Cow::Borrowed(text)))
    }

    fn describe(&self) -> String {
        self.record.iter().collect::<Vec<_>>().join(",")
    }
}

/// Visit every data row of a delimited table with a header row.
pub(crate) fn visit_rows(
    source_id: &str,
    text: &str,
    delimiter: char,
    visit: &mut dyn FnMut(&dyn Row) -> Result<(), SeriesError>,
) -> Result<(), SeriesError> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            SeriesError::config(format!(
                "{}: delimiter {:?} is not a single ASCII character",
                source_id, delimiter
            ))
        })?;

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SeriesError::parse(source_id, format!("header row ({})", e), text))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Err(SeriesError::parse(source_id, "header row", text));
    }
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim_start_matches('\u{feff}').to_string(), index))
        .collect();

    let mut record = StringRecord::new();
    loop {
        match reader.read_record(&mut record) {
            Ok(true) => visit(&DelimitedRow {
                columns: &columns,
                record: &record,
            })?,
            Ok(false) => break,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                return Err(SeriesError::parse(
                    source_id,
                    format!("delimited record at line {} ({})", line, e),
                    text,
                ));
            }
        }
    }
    Ok(())
}
