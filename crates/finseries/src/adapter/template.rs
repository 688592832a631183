//! `{placeholder}` substitution for request templates.

use std::collections::BTreeMap;

fn is_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Names of the `{placeholders}` in a template, in order of appearance.
pub(crate) fn placeholders(template: &str) -> impl Iterator<Item = &str> {
    template.split('{').skip(1).filter_map(|part| {
        let (name, _) = part.split_once('}')?;
        is_name(name).then_some(name)
    })
}

/// Substitute every placeholder; values are percent-encoded when `encode`
/// is set (URL paths). A brace that does not open a placeholder is kept.
///
/// Returns the name of the first placeholder without a value as the error.
pub(crate) fn render(
    template: &str,
    vars: &BTreeMap<&str, String>,
    encode: bool,
) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.split_once('}') {
            Some((name, tail)) if is_name(name) => {
                let value = vars.get(name).ok_or_else(|| name.to_string())?;
                if encode {
                    out.push_str(&urlencoding::encode(value));
                } else {
                    out.push_str(value);
                }
                rest = tail;
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Ok(out)
}
