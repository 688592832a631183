use std::borrow::Cow;
use std::collections::HashMap;

use serde_json::{Map, Value};

use super::row::{Cell, Row};
use crate::errors::SeriesError;

fn value_cell(value: &Value) -> Option<Cell<'_>> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(Cell::Text(Cow::Borrowed(text.as_str()))),
        Value::Number(number) => Some(Cell::Number(number)),
        other => Some(Cell::Text(Cow::Owned(other.to_string()))),
    }
}

/// Resolve a selector as a JSON pointer (`/a/b`) or a top-level key.
fn select<'a>(value: &'a Value, selector: &str) -> Option<&'a Value> {
    if selector.is_empty() {
        Some(value)
    } else if selector.starts_with('/') {
        value.pointer(selector)
    } else {
        value.get(selector)
    }
}

fn parse_document(source_id: &str, text: &str) -> Result<Value, SeriesError> {
    serde_json::from_str(text)
        .map_err(|e| SeriesError::parse(source_id, format!("valid JSON ({})", e), text))
}

struct TaggedRow<'a>(&'a Map<String, Value>);

impl Row for TaggedRow<'_> {
    fn cell(&self, reference: &str) -> Option<Cell<'_>> {
        let value = match reference.strip_prefix('/') {
            // Pointer relative to the record object.
            Some(path) => {
                let mut segments = path.split('/');
                let first = self.0.get(segments.next()?)?;
                segments.try_fold(first, |value, segment| match value {
                    Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
                    _ => value.get(segment),
                })?
            }
            None => self.0.get(reference)?,
        };
        value_cell(value)
    }

    fn describe(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

/// Visit the objects of the array at `selector`.
pub(crate) fn visit_tagged(
    source_id: &str,
    text: &str,
    selector: &str,
    visit: &mut dyn FnMut(&dyn Row) -> Result<(), SeriesError>,
) -> Result<(), SeriesError> {
    let document = parse_document(source_id, text)?;
    let records = select(&document, selector)
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SeriesError::parse(
                source_id,
                format!("JSON array at '{}'", selector),
                text,
            )
        })?;

    for (index, record) in records.iter().enumerate() {
        let object = record.as_object().ok_or_else(|| {
            SeriesError::parse(
                source_id,
                format!("JSON object at index {}", index),
                record.to_string(),
            )
        })?;
        visit(&TaggedRow(object))?;
    }
    Ok(())
}

struct ColumnarRow<'a> {
    columns: &'a HashMap<&'a str, usize>,
    values: &'a [Value],
}

impl Row for ColumnarRow<'_> {
    fn cell(&self, reference: &str) -> Option<Cell<'_>> {
        let index = *self.columns.get(reference)?;
        value_cell(self.values.get(index)?)
    }

    fn describe(&self) -> String {
        Value::Array(self.values.to_vec()).to_string()
    }
}

/// Visit the rows of a `{"columns": [...], "data": [[...], ...]}` block.
pub(crate) fn visit_columnar(
    source_id: &str,
    text: &str,
    block: &str,
    visit: &mut dyn FnMut(&dyn Row) -> Result<(), SeriesError>,
) -> Result<(), SeriesError> {
    let document = parse_document(source_id, text)?;
    let expected = || format!("block '{}' with 'columns' and 'data' arrays", block);

    let block_value = select(&document, block)
        .ok_or_else(|| SeriesError::parse(source_id, expected(), text))?;
    let columns = block_value
        .get("columns")
        .and_then(Value::as_array)
        .and_then(|columns| columns.iter().map(Value::as_str).collect::<Option<Vec<_>>>())
        .ok_or_else(|| SeriesError::parse(source_id, expected(), block_value.to_string()))?;
    let data = block_value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| SeriesError::parse(source_id, expected(), block_value.to_string()))?;

    let columns: HashMap<&str, usize> = columns
        .into_iter()
        .enumerate()
        .map(|(index, name)| (name, index))
        .collect();

    for (index, row) in data.iter().enumerate() {
        let values = row.as_array().ok_or_else(|| {
            SeriesError::parse(
                source_id,
                format!("data row {} as an array", index),
                row.to_string(),
            )
        })?;
        visit(&ColumnarRow {
            columns: &columns,
            values,
        })?;
    }
    Ok(())
}
