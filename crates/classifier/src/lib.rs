//! Crop classifiers and the model artifact bundle.
//!
//! The `Classifier` trait is the seam between the recommendation engine and
//! whatever fitted model a deployment ships. A classifier either returns a
//! full distribution over crop codes or a single best code; which one is
//! carried by the `Prediction` variant, not by an error.
//!
//! `ModelArtifacts` is what a model artifact provider hands over: the state,
//! season and crop encoders plus a fitted classifier, loaded once from JSON.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use cropwise_encoder::{CategoricalEncoder, EncoderError};
use cropwise_model::{Code, FeaturePair, Field, Prediction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum deviation from 1.0 accepted for a weight row.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

/// Errors raised while running inference.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifierError {
    #[error("No prediction for state code {}, season code {}", .0.state, .0.season)]
    UnseenFeatures(FeaturePair),

    #[error("Classifier computation failed: {0}")]
    Computation(String),
}

/// Errors raised while loading model artifacts. Fatal at start-up.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("Could not read artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {which} encoder: {source}")]
    Encoder {
        which: Field,
        #[source]
        source: EncoderError,
    },

    #[error("Empty {0} vocabulary")]
    EmptyVocabulary(Field),

    #[error("Invalid classifier artifact: {0}")]
    Invalid(String),
}

/// A fitted crop classifier.
pub trait Classifier: Send + Sync {
    /// Predict crops for one encoded feature pair.
    fn predict(&self, features: FeaturePair) -> Result<Prediction, ClassifierError>;

    /// Get the classifier name for logging.
    fn name(&self) -> &'static str;
}

/// One weight row of a probabilistic table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightRow {
    pub state: Code,
    pub season: Code,
    /// One weight per crop code
    pub weights: Vec<f64>,
}

/// One row of a single-label table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRow {
    pub state: Code,
    pub season: Code,
    pub crop: Code,
}

/// Serialized form of a table classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    /// Returns distributions; `prior` answers feature pairs with no row.
    Probabilistic {
        rows: Vec<WeightRow>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prior: Option<Vec<f64>>,
    },

    /// Returns single labels; `default` answers feature pairs with no row.
    SingleLabel {
        rows: Vec<LabelRow>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Code>,
    },
}

#[derive(Debug, Clone)]
enum Table {
    Weights {
        rows: HashMap<FeaturePair, Vec<f64>>,
        prior: Option<Vec<f64>>,
    },
    Labels {
        rows: HashMap<FeaturePair, Code>,
        default: Option<Code>,
    },
}

/// A classifier fitted as a lookup table over feature pairs.
#[derive(Debug, Clone)]
pub struct TableClassifier {
    table: Table,
}

impl TableClassifier {
    /// Build a probabilistic table. Later rows replace earlier ones.
    pub fn probabilistic(rows: Vec<WeightRow>, prior: Option<Vec<f64>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|r| (FeaturePair::new(r.state, r.season), r.weights))
            .collect();
        Self {
            table: Table::Weights { rows, prior },
        }
    }

    /// Build a single-label table. Later rows replace earlier ones.
    pub fn single_label(rows: Vec<LabelRow>, default: Option<Code>) -> Self {
        let rows = rows
            .into_iter()
            .map(|r| (FeaturePair::new(r.state, r.season), r.crop))
            .collect();
        Self {
            table: Table::Labels { rows, default },
        }
    }

    /// Validate a serialized table against vocabulary sizes and build the classifier.
    pub fn from_spec(
        spec: ClassifierSpec,
        states: usize,
        seasons: usize,
        crops: usize,
    ) -> Result<Self, ArtifactLoadError> {
        match spec {
            ClassifierSpec::Probabilistic { rows, prior } => {
                let mut seen = HashMap::new();
                for (i, row) in rows.iter().enumerate() {
                    check_pair(row.state, row.season, states, seasons, i)?;
                    check_weights(&row.weights, crops)
                        .map_err(|e| ArtifactLoadError::Invalid(format!("row {}: {}", i, e)))?;
                    if let Some(first) = seen.insert((row.state, row.season), i) {
                        return Err(duplicate_row(first, i));
                    }
                }
                if let Some(prior) = &prior {
                    check_weights(prior, crops)
                        .map_err(|e| ArtifactLoadError::Invalid(format!("prior: {}", e)))?;
                }
                Ok(Self::probabilistic(rows, prior))
            }
            ClassifierSpec::SingleLabel { rows, default } => {
                let mut seen = HashMap::new();
                for (i, row) in rows.iter().enumerate() {
                    check_pair(row.state, row.season, states, seasons, i)?;
                    if row.crop as usize >= crops {
                        return Err(ArtifactLoadError::Invalid(format!(
                            "row {}: crop code {} out of range",
                            i, row.crop
                        )));
                    }
                    if let Some(first) = seen.insert((row.state, row.season), i) {
                        return Err(duplicate_row(first, i));
                    }
                }
                if let Some(code) = default {
                    if code as usize >= crops {
                        return Err(ArtifactLoadError::Invalid(format!(
                            "default crop code {} out of range",
                            code
                        )));
                    }
                }
                Ok(Self::single_label(rows, default))
            }
        }
    }

    /// Whether this classifier returns distributions.
    pub fn is_probabilistic(&self) -> bool {
        matches!(self.table, Table::Weights { .. })
    }
}

impl Classifier for TableClassifier {
    fn predict(&self, features: FeaturePair) -> Result<Prediction, ClassifierError> {
        match &self.table {
            Table::Weights { rows, prior } => rows
                .get(&features)
                .or(prior.as_ref())
                .map(|w| Prediction::Distribution(w.clone()))
                .ok_or(ClassifierError::UnseenFeatures(features)),
            Table::Labels { rows, default } => rows
                .get(&features)
                .copied()
                .or(*default)
                .map(Prediction::SingleLabel)
                .ok_or(ClassifierError::UnseenFeatures(features)),
        }
    }

    fn name(&self) -> &'static str {
        match self.table {
            Table::Weights { .. } => "table-proba",
            Table::Labels { .. } => "table-label",
        }
    }
}

fn check_pair(
    state: Code,
    season: Code,
    states: usize,
    seasons: usize,
    row: usize,
) -> Result<(), ArtifactLoadError> {
    if state as usize >= states {
        return Err(ArtifactLoadError::Invalid(format!(
            "row {}: state code {} out of range",
            row, state
        )));
    }
    if season as usize >= seasons {
        return Err(ArtifactLoadError::Invalid(format!(
            "row {}: season code {} out of range",
            row, season
        )));
    }
    Ok(())
}

fn check_weights(weights: &[f64], crops: usize) -> Result<(), String> {
    if weights.len() != crops {
        return Err(format!("expected {} weights, got {}", crops, weights.len()));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err("weights must be finite and non-negative".to_string());
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(format!("weights sum to {:.4}, expected 1.0", sum));
    }
    Ok(())
}

fn duplicate_row(first: usize, second: usize) -> ArtifactLoadError {
    ArtifactLoadError::Invalid(format!(
        "rows {} and {} share a feature pair",
        first, second
    ))
}

/// Serialized artifact bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Fitted state classes, in code order
    pub states: Vec<String>,
    pub seasons: Vec<String>,
    pub crops: Vec<String>,
    pub classifier: ClassifierSpec,
}

/// Fitted encoders and classifier, loaded once per process.
pub struct ModelArtifacts {
    pub states: CategoricalEncoder,
    pub seasons: CategoricalEncoder,
    pub crops: CategoricalEncoder,
    pub classifier: Box<dyn Classifier>,
}

impl ModelArtifacts {
    /// Assemble artifacts from already-built parts.
    pub fn new(
        states: CategoricalEncoder,
        seasons: CategoricalEncoder,
        crops: CategoricalEncoder,
        classifier: Box<dyn Classifier>,
    ) -> Self {
        Self {
            states,
            seasons,
            crops,
            classifier,
        }
    }

    /// Load and validate a JSON artifact bundle from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ArtifactLoadError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifacts = Self::from_json_str(&raw)?;

        tracing::info!(
            path = %path.display(),
            states = artifacts.states.len(),
            seasons = artifacts.seasons.len(),
            crops = artifacts.crops.len(),
            classifier = artifacts.classifier.name(),
            "Loaded model artifacts"
        );

        Ok(artifacts)
    }

    /// Parse and validate a JSON artifact bundle.
    pub fn from_json_str(raw: &str) -> Result<Self, ArtifactLoadError> {
        let file: ArtifactFile = serde_json::from_str(raw)?;
        Self::from_file(file)
    }

    /// Validate a deserialized bundle.
    pub fn from_file(file: ArtifactFile) -> Result<Self, ArtifactLoadError> {
        let ArtifactFile {
            states,
            seasons,
            crops,
            classifier,
        } = file;

        let states = build_encoder(Field::State, states)?;
        let seasons = build_encoder(Field::Season, seasons)?;
        let crops = build_encoder(Field::Crop, crops)?;

        for (field, encoder) in [
            (Field::State, &states),
            (Field::Season, &seasons),
            (Field::Crop, &crops),
        ] {
            if encoder.is_empty() {
                return Err(ArtifactLoadError::EmptyVocabulary(field));
            }
        }

        let classifier =
            TableClassifier::from_spec(classifier, states.len(), seasons.len(), crops.len())?;

        Ok(Self::new(states, seasons, crops, Box::new(classifier)))
    }
}

fn build_encoder(
    which: Field,
    classes: Vec<String>,
) -> Result<CategoricalEncoder, ArtifactLoadError> {
    CategoricalEncoder::new(classes).map_err(|source| ArtifactLoadError::Encoder { which, source })
}
