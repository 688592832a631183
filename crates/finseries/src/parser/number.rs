use std::str::FromStr;

use rust_decimal::Decimal;

use crate::source::NumberFormat;

/// Convert locale-formatted numeric text to a decimal.
///
/// Returns `None` for blank or malformed text. Unit scale is not applied
/// here; see [`super::row`].
pub(crate) fn parse_number(format: &NumberFormat, text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let grouping_is_space = format
        .thousands_separator
        .is_some_and(|sep| sep.is_whitespace());

    let mut normalized = String::with_capacity(text.len());
    for c in text.chars() {
        if Some(c) == format.thousands_separator || (grouping_is_space && c.is_whitespace()) {
            continue;
        }
        if c == format.decimal_separator {
            normalized.push('.');
        } else {
            normalized.push(c);
        }
    }

    let normalized = normalized.strip_prefix('+').unwrap_or(&normalized);
    Decimal::from_str(normalized)
        .or_else(|_| Decimal::from_scientific(normalized))
        .ok()
}

/// Convert a JSON number without going through floating point.
pub(crate) fn json_number(number: &serde_json::Number) -> Option<Decimal> {
    if let Some(value) = number.as_i64() {
        return Some(Decimal::from(value));
    }
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
