use serde::{Deserialize, Serialize};

/// Instrument classification shared by all sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentType {
    #[default]
    Index,
    Equity,
    Fund,
    Bond,
    Currency,
    Commodity,
    InterestRate,
    Other,
}

impl InstrumentType {
    /// Parse a loosely formatted type tag such as `"interest-rate"` or `"ETF"`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "INDEX" => Some(Self::Index),
            "EQUITY" | "STOCK" | "SHARE" => Some(Self::Equity),
            "FUND" | "ETF" | "MUTUALFUND" => Some(Self::Fund),
            "BOND" => Some(Self::Bond),
            "CURRENCY" | "FX" => Some(Self::Currency),
            "COMMODITY" | "METAL" => Some(Self::Commodity),
            "INTEREST_RATE" | "RATE" => Some(Self::InterestRate),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// A source-scoped instrument descriptor.
///
/// Instruments are normally produced by
/// [`InstrumentInfoProvider`](crate::instruments::InstrumentInfoProvider);
/// callers that persisted a code earlier can rebuild one with [`Instrument::new`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    source_id: String,
    code: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    instrument_type: InstrumentType,
}

impl Instrument {
    pub fn new(
        source_id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        instrument_type: InstrumentType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            code: code.into(),
            name: name.into(),
            currency: None,
            instrument_type,
        }
    }

    /// Set the quote currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Identifier the source uses for this instrument (e.g. "R01235", "SBER").
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    pub fn instrument_type(&self) -> InstrumentType {
        self.instrument_type
    }
}
