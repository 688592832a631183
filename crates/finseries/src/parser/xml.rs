use std::borrow::Cow;

use roxmltree::{Document, Node};

use super::row::{Cell, Row};
use crate::errors::SeriesError;

struct XmlRow<'a, 'input>(Node<'a, 'input>);

impl Row for XmlRow<'_, '_> {
    fn cell(&self, reference: &str) -> Option<Cell<'_>> {
        let text = match reference.strip_prefix('@') {
            Some(attribute) => self.0.attribute(attribute),
            None => self
                .0
                .children()
                .find(|child| child.has_tag_name(reference))
                .and_then(|child| child.text()),
        }?;
        let text = text.trim();
        (!text.is_empty()).then(|| Cell::Text(Cow::Borrowed(text)))
    }

    fn describe(&self) -> String {
        let attributes: Vec<String> = self
            .0
            .attributes()
            .map(|attribute| format!("{}=\"{}\"", attribute.name(), attribute.value()))
            .collect();
        format!("<{} {}>", self.0.tag_name().name(), attributes.join(" "))
    }
}

/// Visit the record elements selected by a `Root/Child/Record` path.
///
/// The first segment must name the document root. A single-segment
/// selector matches every element with that name.
pub(crate) fn visit_rows(
    source_id: &str,
    text: &str,
    selector: &str,
    visit: &mut dyn FnMut(&dyn Row) -> Result<(), SeriesError>,
) -> Result<(), SeriesError> {
    let document = Document::parse(text)
        .map_err(|e| SeriesError::parse(source_id, format!("well-formed XML ({})", e), text))?;
    let root = document.root_element();

    let segments: Vec<&str> = selector.split('/').filter(|s| !s.is_empty()).collect();
    let records: Vec<Node<'_, '_>> = match segments.as_slice() {
        [] => {
            return Err(SeriesError::config(format!(
                "{}: XML layout needs a record path",
                source_id
            )))
        }
        [name] => document
            .descendants()
            .filter(|node| node.has_tag_name(*name))
            .collect(),
        [root_name, path @ ..] => {
            if !root.has_tag_name(*root_name) {
                return Err(SeriesError::parse(
                    source_id,
                    format!("root element <{}>", root_name),
                    text,
                ));
            }
            path.iter().fold(vec![root], |nodes, segment| {
                nodes
                    .iter()
                    .flat_map(|node| node.children())
                    .filter(|child| child.has_tag_name(*segment))
                    .collect()
            })
        }
    };

    for node in records {
        visit(&XmlRow(node))?;
    }
    Ok(())
}
