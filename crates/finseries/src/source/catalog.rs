//! Read-only catalog of configured sources.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use serde::Deserialize;

use super::capabilities::FinancialSource;
use crate::errors::SeriesError;

#[derive(Deserialize)]
struct CatalogFile {
    sources: Vec<FinancialSource>,
}

/// Registry of source descriptors keyed by id.
///
/// Built once at startup; every descriptor is validated on the way in so
/// later stages can trust it. Lookups are lock-free and cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct SourceCatalog {
    sources: HashMap<String, Arc<FinancialSource>>,
    order: Vec<String>,
}

impl SourceCatalog {
    /// Build a catalog from descriptors, rejecting duplicates and invalid ones.
    pub fn from_sources(
        sources: impl IntoIterator<Item = FinancialSource>,
    ) -> Result<Self, SeriesError> {
        let mut catalog = Self::default();
        for source in sources {
            source.validate()?;
            if catalog.sources.contains_key(&source.id) {
                return Err(SeriesError::config(format!(
                    "source '{}' registered twice",
                    source.id
                )));
            }
            debug!(
                "Registered source {} ({:?}, {} granularities)",
                source.id,
                source.encoding,
                source.granularities.len()
            );
            catalog.order.push(source.id.clone());
            catalog.sources.insert(source.id.clone(), Arc::new(source));
        }
        info!("Source catalog loaded with {} sources", catalog.order.len());
        Ok(catalog)
    }

    /// Parse a `{"sources": [...]}` JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, SeriesError> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| SeriesError::config(format!("invalid source catalog: {}", e)))?;
        Self::from_sources(file.sources)
    }

    /// Capability descriptor of a source.
    pub fn describe(&self, source_id: &str) -> Result<Arc<FinancialSource>, SeriesError> {
        self.sources
            .get(source_id)
            .cloned()
            .ok_or_else(|| SeriesError::UnknownSource(source_id.to_string()))
    }

    /// All descriptors in registration order.
    pub fn sources(&self) -> impl Iterator<Item = &Arc<FinancialSource>> {
        self.order.iter().filter_map(|id| self.sources.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "sources": [
            {
                "id": "ALPHA",
                "encoding": { "type": "TAGGED_JSON" },
                "granularities": ["DAILY"],
                "instrument_types": ["INDEX"],
                "history": {
                    "request": { "url": "https://alpha.test/{code}?from={start}&to={end}" },
                    "layout": {
                        "timestamp": { "field": "date", "format": { "kind": "EPOCH_MILLIS" } },
                        "values": [{ "name": "close", "field": "value" }]
                    }
                }
            },
            {
                "id": "BETA",
                "encoding": { "type": "DELIMITED", "delimiter": ";" },
                "max_window_days": 365,
                "granularities": ["DAILY", "MONTHLY"],
                "instrument_types": ["FUND"],
                "history": {
                    "request": { "url": "https://beta.test/{code}.csv" },
                    "layout": {
                        "timestamp": { "field": "Date", "format": { "kind": "PATTERN", "pattern": "%d.%m.%Y" } },
                        "values": [{ "name": "nav", "field": "NAV" }]
                    }
                }
            }
        ]
    }"#;

    #[test]
    fn test_load_and_describe() {
        let catalog = SourceCatalog::from_json_str(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);

        let beta = catalog.describe("BETA").unwrap();
        assert_eq!(beta.max_window_days, Some(365));
        assert_eq!(beta.charset, "utf-8");

        let ids: Vec<_> = catalog.sources().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ALPHA", "BETA"]);
    }

    #[test]
    fn test_unknown_source() {
        let catalog = SourceCatalog::from_json_str(CATALOG).unwrap();
        assert_eq!(
            catalog.describe("GAMMA").unwrap_err(),
            SeriesError::UnknownSource("GAMMA".to_string())
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let catalog = SourceCatalog::from_json_str(CATALOG).unwrap();
        let alpha = (*catalog.describe("ALPHA").unwrap()).clone();
        let result = SourceCatalog::from_sources(vec![alpha.clone(), alpha]);
        assert!(matches!(result, Err(SeriesError::Config { .. })));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let result = SourceCatalog::from_json_str("{\"sources\": 5}");
        assert!(matches!(result, Err(SeriesError::Config { .. })));
    }

    #[test]
    fn test_example_catalog_is_valid() {
        let catalog =
            SourceCatalog::from_json_str(include_str!("../../config/sources.example.json"))
                .unwrap();
        assert_eq!(catalog.len(), 5);

        let cbr = catalog.describe("CBR").unwrap();
        assert_eq!(cbr.charset, "windows-1251");
        assert_eq!(cbr.number_format.decimal_separator, ',');

        let moex = catalog.describe("MOEX").unwrap();
        assert_eq!(moex.max_window_days, Some(100));
        assert!(moex.extra_field("board").is_some());
        assert!(moex.adjust_holiday_start);

        let checked: Vec<&str> = catalog
            .sources()
            .filter(|source| source.check.is_some())
            .map(|source| source.id.as_str())
            .collect();
        assert_eq!(checked, vec!["CBR", "MOEX", "SOLACTIVE", "LBMA"]);
    }
}
