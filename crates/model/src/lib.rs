//! Core domain model for Cropwise crop recommendation.
//!
//! This crate defines the fundamental types used throughout the system:
//! - `FeaturePair`: The encoded (state, season) classifier input
//! - `Prediction`: A crop distribution or a single deterministic crop code
//! - `RankedCandidate`: A crop name with its confidence percentage
//! - `AgronomyRecord` / `AgronomyDetail`: Fertilizer, pesticide and yield advice
//! - `Recommendation`: The final per-request result

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer code assigned to a label by a categorical encoder.
pub type Code = u32;

/// Which input a category label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    State,
    Season,
    Crop,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Season => "season",
            Self::Crop => "crop",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded classifier input: (state code, season code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeaturePair {
    pub state: Code,
    pub season: Code,
}

impl FeaturePair {
    pub fn new(state: Code, season: Code) -> Self {
        Self { state, season }
    }
}

/// Output of a classifier for one feature pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Prediction {
    /// One weight per crop code; the weight at index `i` belongs to crop code `i`.
    Distribution(Vec<f64>),

    /// A single best crop code, equivalent to a one-hot distribution.
    SingleLabel(Code),
}

impl Prediction {
    pub fn path(&self) -> PredictionPath {
        match self {
            Self::Distribution(_) => PredictionPath::Probabilistic,
            Self::SingleLabel(_) => PredictionPath::Deterministic,
        }
    }
}

/// Which classifier capability produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionPath {
    /// Ranked from a full probability distribution
    Probabilistic,
    /// A single label reported at full confidence
    Deterministic,
}

/// A crop name with a confidence percentage in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub crop: String,
    pub confidence: f64,
}

impl RankedCandidate {
    pub fn new(crop: impl Into<String>, confidence: f64) -> Self {
        Self {
            crop: crop.into(),
            confidence,
        }
    }
}

/// Static agronomy advice for one crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgronomyRecord {
    /// Fertilizer advice text
    pub fertilizer: String,

    /// Pesticide advice text
    pub pesticide: String,

    /// Expected yield in quintals per acre
    pub yield_per_acre: f64,
}

impl AgronomyRecord {
    pub fn new(
        fertilizer: impl Into<String>,
        pesticide: impl Into<String>,
        yield_per_acre: f64,
    ) -> Self {
        Self {
            fertilizer: fertilizer.into(),
            pesticide: pesticide.into(),
            yield_per_acre,
        }
    }
}

/// Where a piece of agronomy advice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdviceSource {
    /// Crop-specific record from the catalog
    #[default]
    Catalog,
    /// Generic defaults for a crop the catalog does not know
    Fallback,
}

impl AdviceSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback)
    }

    /// Get a human-readable label for this source.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Catalog => "Crop-specific advice",
            Self::Fallback => "General advice",
        }
    }
}

/// Agronomy advice resolved for a crop and a cultivated area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgronomyDetail {
    pub fertilizer: String,
    pub pesticide: String,

    /// Yield rate used, in quintals per acre
    pub yield_per_acre: f64,

    /// `yield_per_acre * area`, rounded to one decimal place
    pub estimated_yield: f64,

    pub source: AdviceSource,
}

/// One recommended crop inside a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedCrop {
    /// 1-based position in the ranking
    pub rank: usize,

    pub crop: String,

    /// Confidence percentage in [0, 100]
    pub confidence: f64,

    pub detail: AgronomyDetail,
}

/// The final outcome of one recommendation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Normalized state label
    pub state: String,

    /// Normalized season label
    pub season: String,

    /// Cultivated area in acres
    pub area: f64,

    pub path: PredictionPath,

    /// Candidates in ranked order (1 to 3 entries)
    pub crops: Vec<RecommendedCrop>,
}

impl Recommendation {
    /// The highest-ranked crop.
    pub fn top(&self) -> Option<&RecommendedCrop> {
        self.crops.first()
    }

    /// Whether any candidate had to use fallback advice.
    pub fn has_fallback(&self) -> bool {
        self.crops.iter().any(|c| c.detail.source.is_fallback())
    }
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
