//! Category label normalization and encoding.
//!
//! Provides:
//! - `normalize_label`: trim + title-case, applied before every lookup
//! - `CategoricalEncoder`: a fitted label <-> code vocabulary

use std::collections::HashMap;

use cropwise_model::Code;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncoderError {
    #[error("Unknown category: {value}")]
    UnknownCategory { value: String },

    #[error("Unknown code: {0}")]
    UnknownCode(Code),

    #[error("Duplicate class in vocabulary: {0}")]
    DuplicateClass(String),

    #[error("Empty class in vocabulary")]
    EmptyClass,
}

/// Normalize a free-form label for lookup.
///
/// Trims surrounding whitespace and title-cases the rest: the first letter
/// of every alphabetic run is upper-cased, the other letters lower-cased.
///
/// Uses simple upper-casing rather than Unicode titlecase mappings, so a
/// label starting with a multi-char uppercase letter ("ßeta" -> "SSeta") is
/// not idempotent under normalization. Vocabularies are expected to be ASCII.
pub fn normalize_label(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;

    for c in raw.trim().chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }

    out
}

/// A fitted vocabulary mapping labels to dense codes.
///
/// The code of a label is its position in the class list it was built from.
/// Lookups match on the normalized form of each class, and `decode` returns
/// the class exactly as fitted. Serializes as the plain class list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CategoricalEncoder {
    classes: Vec<String>,
    index: HashMap<String, Code>,
}

impl CategoricalEncoder {
    /// Wrap an already-fitted class list.
    pub fn new<I, S>(classes: I) -> Result<Self, EncoderError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(classes.len());

        for (code, class) in classes.iter().enumerate() {
            if class.trim().is_empty() {
                return Err(EncoderError::EmptyClass);
            }
            if index.insert(normalize_label(class), code as Code).is_some() {
                return Err(EncoderError::DuplicateClass(class.clone()));
            }
        }

        Ok(Self { classes, index })
    }

    /// Whether `label`, after normalization, belongs to the vocabulary.
    pub fn is_known(&self, label: &str) -> bool {
        self.index.contains_key(&normalize_label(label))
    }

    /// Encode a label. Callers check `is_known` first to report validation errors.
    pub fn encode(&self, label: &str) -> Result<Code, EncoderError> {
        let normalized = normalize_label(label);
        self.index
            .get(&normalized)
            .copied()
            .ok_or(EncoderError::UnknownCategory { value: normalized })
    }

    /// Decode a code produced by this encoder.
    pub fn decode(&self, code: Code) -> Result<&str, EncoderError> {
        self.classes
            .get(code as usize)
            .map(String::as_str)
            .ok_or(EncoderError::UnknownCode(code))
    }

    /// Classes in code order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Classes in alphabetical order, for selection lists.
    pub fn sorted_classes(&self) -> Vec<&str> {
        let mut sorted: Vec<&str> = self.classes.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TryFrom<Vec<String>> for CategoricalEncoder {
    type Error = EncoderError;

    fn try_from(classes: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(classes)
    }
}

impl From<CategoricalEncoder> for Vec<String> {
    fn from(encoder: CategoricalEncoder) -> Self {
        encoder.classes
    }
}
