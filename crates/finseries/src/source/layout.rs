//! Declarative description of where values live inside a payload.
//!
//! Layouts are part of a source's capability descriptor. The same decoders
//! serve every source; only the layout changes.
//!
//! Field references depend on the payload encoding:
//!
//! | Encoding | `records` selector | field reference |
//! |----------|--------------------|-----------------|
//! | `XML` | `"Root/Record"` element path | `"@Attr"` or `"ChildTag"` |
//! | `DELIMITED` | ignored | header name |
//! | `TAGGED_JSON` | JSON pointer to the array (`""` = top level) | key or JSON pointer |
//! | `COLUMNAR_JSON` | name of the block holding `columns`/`data` | column name |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::InstrumentType;

/// How a timestamp field is written in the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimestampFormat {
    /// chrono `strftime` pattern, date-only or date-time (e.g. `"%d.%m.%Y"`).
    Pattern { pattern: String },
    /// Milliseconds since the Unix epoch.
    EpochMillis,
    /// Seconds since the Unix epoch.
    EpochSeconds,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampSpec {
    pub field: String,
    pub format: TimestampFormat,
}

/// A numeric field extracted into a record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Name the value gets in the record (e.g. "close").
    pub name: String,

    /// Where to read it from.
    pub field: String,

    /// Further fields tried in order when `field` is absent or null.
    #[serde(default)]
    pub fallback: Vec<String>,

    /// Whether a record without this value is a parse error.
    #[serde(default = "default_required")]
    pub required: bool,

    /// Documented default substituted when an optional field is missing.
    #[serde(default)]
    pub default: Option<Decimal>,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    /// All references for this value, primary first.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.field.as_str()).chain(self.fallback.iter().map(String::as_str))
    }
}

/// Layout of history records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordLayout {
    /// Encoding-specific selector of the record collection.
    #[serde(default)]
    pub records: String,

    pub timestamp: TimestampSpec,

    /// Values stored in [`HistoricalRecord::values`](crate::models::HistoricalRecord).
    pub values: Vec<FieldSpec>,

    /// Values stored in [`HistoricalRecord::metadata`](crate::models::HistoricalRecord).
    #[serde(default)]
    pub metadata: Vec<FieldSpec>,

    /// Field holding a per-record nominal; every value is divided by it
    /// (e.g. a rate quoted per 100 units).
    #[serde(default)]
    pub nominal: Option<String>,

    /// Field holding a textual data-quality flag.
    #[serde(default)]
    pub quality: Option<String>,

    /// Treat a well-formed payload with zero records as a parse error.
    #[serde(default)]
    pub empty_is_error: bool,
}

/// Layout of instrument listing entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentLayout {
    #[serde(default)]
    pub records: String,

    pub code: String,

    pub name: String,

    #[serde(default)]
    pub currency: Option<String>,

    /// Field holding an instrument type tag, parsed with
    /// [`InstrumentType::from_tag`].
    #[serde(default)]
    pub instrument_type: Option<String>,

    /// Type used when the payload carries none or an unrecognized one.
    #[serde(default)]
    pub default_type: InstrumentType,
}

/// Locale and unit conventions for numeric text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: char,

    /// Grouping character. Any whitespace separator also matches
    /// non-breaking and narrow spaces.
    #[serde(default)]
    pub thousands_separator: Option<char>,

    /// Multiplier applied to every parsed value (e.g. 0.01 for percent points).
    #[serde(default = "default_scale")]
    pub scale: Decimal,
}

fn default_decimal_separator() -> char {
    '.'
}

fn default_scale() -> Decimal {
    Decimal::ONE
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            decimal_separator: default_decimal_separator(),
            thousands_separator: None,
            scale: default_scale(),
        }
    }
}
