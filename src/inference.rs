//! Scoring of single patient records against trained artifacts.

use std::sync::Arc;
use tracing::{debug, info};

use crate::artifacts::ArtifactStore;
use crate::config::DEFAULT_THRESHOLD;
use crate::error::{Error, Result};
use crate::pipeline::{load_artifacts, TrainedArtifacts};
use crate::records::{Prediction, StrokeRecord, Verdict};
use crate::schema::STROKE_SCHEMA;
use crate::table::records_frame;

/// Impute, encode and score one record. No state is touched.
pub fn predict(record: &StrokeRecord, artifacts: &TrainedArtifacts, threshold: f64) -> Result<Prediction> {
    let frame = records_frame(std::slice::from_ref(record), &STROKE_SCHEMA)?;
    let features = artifacts.preprocessor.transform(&frame)?;
    let row = features
        .first()
        .ok_or_else(|| Error::schema("record", "encoder produced no rows"))?;
    let probability = artifacts.model.predict_proba(row)?;
    let verdict = Verdict::from_probability(probability, threshold);
    debug!(probability, ?verdict, "scored record");
    Ok(Prediction {
        probability,
        verdict,
    })
}

/// Read-only handle on loaded artifacts; cheap to clone across request
/// handlers.
#[derive(Debug, Clone)]
pub struct InferenceService {
    artifacts: Arc<TrainedArtifacts>,
    threshold: f64,
}

impl InferenceService {
    pub fn new(artifacts: TrainedArtifacts, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(InferenceService {
            artifacts: Arc::new(artifacts),
            threshold,
        })
    }

    /// Loads both artifacts once. A failed load is final; there is no fallback
    /// model.
    pub fn from_store<S: ArtifactStore>(store: &S, threshold: f64) -> Result<Self> {
        let artifacts = load_artifacts(store)?;
        info!(
            features = artifacts.feature_names().len(),
            trees = artifacts.model.n_trees(),
            threshold,
            "loaded trained artifacts"
        );
        InferenceService::new(artifacts, threshold)
    }

    pub fn with_default_threshold(artifacts: TrainedArtifacts) -> Result<Self> {
        InferenceService::new(artifacts, DEFAULT_THRESHOLD)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn artifacts(&self) -> &TrainedArtifacts {
        &self.artifacts
    }

    pub fn predict(&self, record: &StrokeRecord) -> Result<Prediction> {
        predict(record, &self.artifacts, self.threshold)
    }
}
