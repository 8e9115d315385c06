//! Crop recommendation engine.
//!
//! Validates the requested state and season, asks the classifier for crops,
//! ranks the answer and attaches agronomy advice scaled to the cultivated
//! area. All inputs live in an immutable `EngineContext` built once at
//! start-up and shared by reference.

use cropwise_catalog::AgronomyCatalog;
use cropwise_classifier::{Classifier, ClassifierError, ModelArtifacts};
use cropwise_encoder::{normalize_label, CategoricalEncoder};
use cropwise_model::{
    Code, FeaturePair, Field, Prediction, RankedCandidate, Recommendation, RecommendedCrop,
};
use thiserror::Error;

/// Errors from a single recommendation request.
#[derive(Debug, Error, PartialEq)]
pub enum RecommendError {
    #[error("Area must be a positive number of acres, got {0}")]
    InvalidArea(f64),

    #[error("Unknown {field}: {value}")]
    UnknownCategory { field: Field, value: String },

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum candidates surfaced from a distribution
    pub max_candidates: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_candidates: 3 }
    }
}

/// Everything a recommendation needs, loaded once and never mutated.
pub struct EngineContext {
    states: CategoricalEncoder,
    seasons: CategoricalEncoder,
    crops: CategoricalEncoder,
    classifier: Box<dyn Classifier>,
    catalog: AgronomyCatalog,
    config: EngineConfig,
}

impl EngineContext {
    pub fn new(artifacts: ModelArtifacts, catalog: AgronomyCatalog) -> Self {
        Self {
            states: artifacts.states,
            seasons: artifacts.seasons,
            crops: artifacts.crops,
            classifier: artifacts.classifier,
            catalog,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn states(&self) -> &CategoricalEncoder {
        &self.states
    }

    pub fn seasons(&self) -> &CategoricalEncoder {
        &self.seasons
    }

    pub fn crops(&self) -> &CategoricalEncoder {
        &self.crops
    }

    pub fn catalog(&self) -> &AgronomyCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Recommend crops for a state and season on `area` acres.
pub fn recommend(
    ctx: &EngineContext,
    state_label: &str,
    season_label: &str,
    area: f64,
) -> Result<Recommendation, RecommendError> {
    if !area.is_finite() || area <= 0.0 {
        return Err(RecommendError::InvalidArea(area));
    }

    let state = normalize_label(state_label);
    let season = normalize_label(season_label);

    let features = FeaturePair::new(
        encode_checked(&ctx.states, Field::State, &state)?,
        encode_checked(&ctx.seasons, Field::Season, &season)?,
    );

    tracing::debug!(
        state = %state,
        season = %season,
        state_code = features.state,
        season_code = features.season,
        classifier = ctx.classifier.name(),
        "Running classifier"
    );

    let prediction = ctx.classifier.predict(features)?;
    let path = prediction.path();
    let candidates = rank(&prediction, &ctx.crops, ctx.config.max_candidates)?;

    let crops = candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let detail = ctx.catalog.lookup(&candidate.crop, area);
            RecommendedCrop {
                rank: i + 1,
                crop: candidate.crop,
                confidence: candidate.confidence,
                detail,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        path = ?path,
        candidates = crops.len(),
        top = crops.first().map(|c| c.crop.as_str()).unwrap_or_default(),
        "Recommendation ready"
    );

    Ok(Recommendation {
        state,
        season,
        area,
        path,
        crops,
    })
}

/// Turn a prediction into ranked, decoded candidates.
///
/// Distributions are ordered by descending weight with ties broken by
/// ascending crop code, then truncated to `limit` (at least one). A single
/// label yields one candidate at 100% confidence.
pub fn rank(
    prediction: &Prediction,
    crops: &CategoricalEncoder,
    limit: usize,
) -> Result<Vec<RankedCandidate>, ClassifierError> {
    let ranked: Vec<(Code, f64)> = match prediction {
        Prediction::Distribution(weights) => top_weights(weights, limit.max(1))?
            .into_iter()
            .map(|(code, weight)| (code, weight * 100.0))
            .collect(),
        Prediction::SingleLabel(code) => vec![(*code, 100.0)],
    };

    ranked
        .into_iter()
        .map(|(code, confidence)| {
            let crop = crops.decode(code).map_err(|_| {
                ClassifierError::Computation(format!("crop code {} not in crop vocabulary", code))
            })?;
            Ok(RankedCandidate::new(crop, confidence))
        })
        .collect()
}

fn encode_checked(
    encoder: &CategoricalEncoder,
    field: Field,
    label: &str,
) -> Result<Code, RecommendError> {
    if !encoder.is_known(label) {
        return Err(RecommendError::UnknownCategory {
            field,
            value: label.to_string(),
        });
    }
    encoder
        .encode(label)
        .map_err(|_| RecommendError::UnknownCategory {
            field,
            value: label.to_string(),
        })
}

fn top_weights(weights: &[f64], limit: usize) -> Result<Vec<(Code, f64)>, ClassifierError> {
    if weights.is_empty() {
        return Err(ClassifierError::Computation("empty distribution".to_string()));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(ClassifierError::Computation(format!(
            "invalid weight {} in distribution",
            bad
        )));
    }

    let mut indexed: Vec<(Code, f64)> = weights
        .iter()
        .enumerate()
        .map(|(code, weight)| (code as Code, *weight))
        .collect();

    // Stable: equal weights keep ascending code order
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(limit);

    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropwise_model::{AdviceSource, PredictionPath};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const SAMPLE: &str = include_str!("../../../data/sample_model.json");

    /// Returns a fixed answer and counts invocations.
    struct StubClassifier {
        answer: Result<Prediction, ClassifierError>,
        calls: Arc<AtomicUsize>,
    }

    impl Classifier for StubClassifier {
        fn predict(&self, _features: FeaturePair) -> Result<Prediction, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn context_with(
        crops: &[&str],
        answer: Result<Prediction, ClassifierError>,
    ) -> (EngineContext, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let artifacts = ModelArtifacts::new(
            CategoricalEncoder::new(["Bihar", "Maharashtra"]).unwrap(),
            CategoricalEncoder::new(["Kharif", "Rabi"]).unwrap(),
            CategoricalEncoder::new(crops.iter().copied()).unwrap(),
            Box::new(StubClassifier {
                answer,
                calls: calls.clone(),
            }),
        );
        (EngineContext::new(artifacts, AgronomyCatalog::default()), calls)
    }

    fn summary(rec: &Recommendation) -> Vec<(String, f64, AdviceSource, f64)> {
        rec.crops
            .iter()
            .map(|c| {
                (
                    c.crop.clone(),
                    (c.confidence * 1e6).round() / 1e6,
                    c.detail.source,
                    c.detail.estimated_yield,
                )
            })
            .collect()
    }

    #[test]
    fn test_maharashtra_kharif_distribution() {
        let (ctx, calls) = context_with(
            &["Maize", "Soyabean", "Wheat"],
            Ok(Prediction::Distribution(vec![0.6, 0.3, 0.1])),
        );

        let rec = recommend(&ctx, "Maharashtra", "Kharif", 5.0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(rec.path, PredictionPath::Probabilistic);
        assert_eq!(
            summary(&rec),
            vec![
                ("Maize".to_string(), 60.0, AdviceSource::Catalog, 125.0),
                ("Soyabean".to_string(), 30.0, AdviceSource::Catalog, 50.0),
                ("Wheat".to_string(), 10.0, AdviceSource::Catalog, 110.0),
            ]
        );
        assert_eq!(
            rec.crops.iter().map(|c| c.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_distribution_order_and_truncation() {
        let (ctx, _) = context_with(
            &["Barley", "Jowar", "Maize", "Rice", "Wheat"],
            Ok(Prediction::Distribution(vec![0.05, 0.15, 0.2, 0.5, 0.1])),
        );

        let rec = recommend(&ctx, "Bihar", "Rabi", 1.0).unwrap();
        let names: Vec<_> = rec.crops.iter().map(|c| c.crop.as_str()).collect();
        assert_eq!(names, vec!["Rice", "Maize", "Jowar"]);

        // Truncated confidences keep their raw values and sum below 100
        let confidences: Vec<f64> = summary(&rec).into_iter().map(|(_, c, _, _)| c).collect();
        assert_eq!(confidences, vec![50.0, 20.0, 15.0]);
        assert!(confidences.iter().sum::<f64>() < 100.0);
        assert!(rec
            .crops
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn test_fewer_crops_than_limit() {
        let (ctx, _) = context_with(
            &["Rice", "Wheat"],
            Ok(Prediction::Distribution(vec![0.3, 0.7])),
        );

        let rec = recommend(&ctx, "Bihar", "Kharif", 2.0).unwrap();
        let names: Vec<_> = rec.crops.iter().map(|c| c.crop.as_str()).collect();
        assert_eq!(names, vec!["Wheat", "Rice"]);
    }

    #[test]
    fn test_ties_break_by_ascending_code() {
        let (ctx, _) = context_with(
            &["Jowar", "Maize", "Rice", "Wheat"],
            Ok(Prediction::Distribution(vec![0.1, 0.3, 0.3, 0.3])),
        );

        let rec = recommend(&ctx, "Bihar", "Kharif", 1.0).unwrap();
        let names: Vec<_> = rec.crops.iter().map(|c| c.crop.as_str()).collect();
        assert_eq!(names, vec!["Maize", "Rice", "Wheat"]);
    }

    #[test]
    fn test_single_label_path() {
        let (ctx, _) = context_with(
            &["Maize", "Soyabean", "Wheat"],
            Ok(Prediction::SingleLabel(2)),
        );

        let rec = recommend(&ctx, "maharashtra", "rabi", 4.0).unwrap();
        assert_eq!(rec.path, PredictionPath::Deterministic);
        assert_eq!(rec.crops.len(), 1);
        assert_eq!(rec.crops[0].crop, "Wheat");
        assert_eq!(rec.crops[0].confidence, 100.0);
        assert_eq!(rec.crops[0].detail.estimated_yield, 88.0);
    }

    #[test]
    fn test_unknown_state_skips_classifier() {
        let (ctx, calls) = context_with(
            &["Maize"],
            Ok(Prediction::Distribution(vec![1.0])),
        );

        let err = recommend(&ctx, "unknownstate", "Kharif", 5.0).unwrap_err();
        assert_eq!(
            err,
            RecommendError::UnknownCategory {
                field: Field::State,
                value: "Unknownstate".to_string(),
            }
        );
        assert_eq!(err.to_string(), "Unknown state: Unknownstate");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_season_skips_classifier() {
        let (ctx, calls) = context_with(
            &["Maize"],
            Ok(Prediction::Distribution(vec![1.0])),
        );

        let err = recommend(&ctx, "Bihar", " monsoon ", 5.0).unwrap_err();
        assert_eq!(
            err,
            RecommendError::UnknownCategory {
                field: Field::Season,
                value: "Monsoon".to_string(),
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_area() {
        let (ctx, calls) = context_with(&["Maize"], Ok(Prediction::SingleLabel(0)));

        for area in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                recommend(&ctx, "Bihar", "Kharif", area),
                Err(RecommendError::InvalidArea(_))
            ));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fallback_advice() {
        let (ctx, _) = context_with(
            &["Barley", "Maize"],
            Ok(Prediction::Distribution(vec![0.8, 0.2])),
        );

        let rec = recommend(&ctx, "Bihar", "Rabi", 2.0).unwrap();
        assert!(rec.has_fallback());
        let barley = &rec.crops[0];
        assert_eq!(barley.crop, "Barley");
        assert_eq!(barley.detail.source, AdviceSource::Fallback);
        assert_eq!(barley.detail.yield_per_acre, 18.0);
        assert_eq!(barley.detail.estimated_yield, 36.0);
        assert_eq!(rec.crops[1].detail.source, AdviceSource::Catalog);
    }

    #[test]
    fn test_computation_error_propagates() {
        let failure = ClassifierError::Computation("matrix shape mismatch".to_string());
        let (ctx, calls) = context_with(&["Maize"], Err(failure.clone()));

        assert_eq!(
            recommend(&ctx, "Bihar", "Kharif", 1.0),
            Err(RecommendError::Classifier(failure))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_weights_are_computation_errors() {
        for weights in [vec![f64::NAN, 0.5], vec![-0.1, 1.1], vec![]] {
            let (ctx, _) = context_with(
                &["Maize", "Rice"],
                Ok(Prediction::Distribution(weights)),
            );
            assert!(matches!(
                recommend(&ctx, "Bihar", "Kharif", 1.0),
                Err(RecommendError::Classifier(ClassifierError::Computation(_)))
            ));
        }
    }

    #[test]
    fn test_undecodable_code() {
        let (ctx, _) = context_with(&["Maize"], Ok(Prediction::SingleLabel(7)));
        assert!(matches!(
            recommend(&ctx, "Bihar", "Kharif", 1.0),
            Err(RecommendError::Classifier(ClassifierError::Computation(msg))) if msg.contains("crop code 7")
        ));
    }

    #[test]
    fn test_max_candidates_config() {
        let (ctx, _) = context_with(
            &["Maize", "Soyabean", "Wheat"],
            Ok(Prediction::Distribution(vec![0.6, 0.3, 0.1])),
        );
        let ctx = ctx.with_config(EngineConfig { max_candidates: 1 });

        let rec = recommend(&ctx, "Maharashtra", "Kharif", 1.0).unwrap();
        assert_eq!(rec.crops.len(), 1);
        assert_eq!(rec.crops[0].crop, "Maize");
    }

    #[test]
    fn test_sample_bundle_end_to_end() {
        let artifacts = ModelArtifacts::from_json_str(SAMPLE).unwrap();
        let ctx = EngineContext::new(artifacts, AgronomyCatalog::default());

        let rec = recommend(&ctx, " maharashtra", "KHARIF ", 5.0).unwrap();
        assert_eq!(rec.state, "Maharashtra");
        assert_eq!(rec.season, "Kharif");
        assert_eq!(
            summary(&rec),
            vec![
                ("Maize".to_string(), 60.0, AdviceSource::Catalog, 125.0),
                ("Soyabean".to_string(), 30.0, AdviceSource::Catalog, 50.0),
                ("Wheat".to_string(), 10.0, AdviceSource::Catalog, 110.0),
            ]
        );

        // Punjab/Rabi ranks Barley, which has no catalog record
        // Zero weights still fill the ranking, lowest code first
        let rec = recommend(&ctx, "Punjab", "Rabi", 2.0).unwrap();
        let names: Vec<_> = rec.crops.iter().map(|c| c.crop.as_str()).collect();
        assert_eq!(names, vec!["Wheat", "Barley", "Jowar"]);
        assert_eq!(rec.crops[1].detail.source, AdviceSource::Fallback);
        assert_eq!(rec.crops[1].detail.estimated_yield, 36.0);
        assert_eq!(rec.crops[2].confidence, 0.0);
    }

    #[test]
    fn test_concurrent_requests() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineContext>();

        let artifacts = ModelArtifacts::from_json_str(SAMPLE).unwrap();
        let ctx = EngineContext::new(artifacts, AgronomyCatalog::default());

        std::thread::scope(|s| {
            let handles: Vec<_> = ["Bihar", "Karnataka", "Punjab"]
                .into_iter()
                .map(|state| {
                    let ctx = &ctx;
                    s.spawn(move || recommend(ctx, state, "Kharif", 3.0).unwrap())
                })
                .collect();
            for (handle, state) in handles.into_iter().zip(["Bihar", "Karnataka", "Punjab"]) {
                assert_eq!(handle.join().unwrap().state, state);
            }
        });
    }
}
