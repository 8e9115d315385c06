//! Agronomy advice catalog.
//!
//! Maps crop names to fertilizer, pesticide and yield-rate advice. A crop
//! the catalog does not know gets generic advice tagged as fallback; that is
//! an expected outcome, never an error.

use std::collections::HashMap;

use cropwise_model::{round1, AdviceSource, AgronomyDetail, AgronomyRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fertilizer advice for crops outside the catalog (general-purpose nitrogen/phosphate).
pub const FALLBACK_FERTILIZER: &str = "Urea or DAP (General Purpose)";

/// Pesticide advice for crops outside the catalog (general bio-pesticide).
pub const FALLBACK_PESTICIDE: &str = "Neem Oil or Bio-Pesticide (General Use)";

/// Yield rate for crops outside the catalog, in quintals per acre.
pub const FALLBACK_YIELD_PER_ACRE: f64 = 18.0;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Could not parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Crop listed twice: {0}")]
    Duplicate(String),
}

/// Serialized catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub crop: String,
    #[serde(flatten)]
    pub record: AgronomyRecord,
}

/// Lookup table from crop name to agronomy advice.
#[derive(Debug, Clone)]
pub struct AgronomyCatalog {
    records: HashMap<String, AgronomyRecord>,
}

impl Default for AgronomyCatalog {
    fn default() -> Self {
        let builtin = [
            ("Maize", "DAP, Urea, Potash", "Chlorpyrifos, Cypermethrin", 25.0),
            (
                "Soyabean",
                "SSP, Potash, Ammonium Sulphate",
                "Imidacloprid, Lambda-cyhalothrin",
                10.0,
            ),
            ("Jowar", "Urea, DAP, Zinc Sulphate", "Dimethoate, Acephate", 18.0),
            ("Wheat", "Urea, DAP, MOP", "Chlorpyrifos, Malathion", 22.0),
            ("Rice", "Urea, Potash, DAP", "Buprofezin, Imidacloprid", 30.0),
        ];

        let records = builtin
            .into_iter()
            .map(|(crop, fertilizer, pesticide, rate)| {
                (crop.to_string(), AgronomyRecord::new(fertilizer, pesticide, rate))
            })
            .collect();

        Self { records }
    }
}

impl AgronomyCatalog {
    /// Build a catalog from explicit records.
    pub fn from_records(
        entries: impl IntoIterator<Item = CatalogEntry>,
    ) -> Result<Self, CatalogError> {
        let mut records = HashMap::new();
        for entry in entries {
            if records.contains_key(&entry.crop) {
                return Err(CatalogError::Duplicate(entry.crop));
            }
            records.insert(entry.crop, entry.record);
        }
        Ok(Self { records })
    }

    /// Parse a JSON array of catalog entries.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(raw)?;
        Self::from_records(entries)
    }

    pub fn get(&self, crop: &str) -> Option<&AgronomyRecord> {
        self.records.get(crop)
    }

    pub fn contains(&self, crop: &str) -> bool {
        self.records.contains_key(crop)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Resolve advice for `crop` grown on `area` acres.
    pub fn lookup(&self, crop: &str, area: f64) -> AgronomyDetail {
        match self.records.get(crop) {
            Some(record) => AgronomyDetail {
                fertilizer: record.fertilizer.clone(),
                pesticide: record.pesticide.clone(),
                yield_per_acre: record.yield_per_acre,
                estimated_yield: round1(record.yield_per_acre * area),
                source: AdviceSource::Catalog,
            },
            None => {
                tracing::debug!(crop, "Crop not in catalog, using general advice");
                AgronomyDetail {
                    fertilizer: FALLBACK_FERTILIZER.to_string(),
                    pesticide: FALLBACK_PESTICIDE.to_string(),
                    yield_per_acre: FALLBACK_YIELD_PER_ACRE,
                    estimated_yield: round1(FALLBACK_YIELD_PER_ACRE * area),
                    source: AdviceSource::Fallback,
                }
            }
        }
    }
}
