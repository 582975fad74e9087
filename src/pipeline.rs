//! Training flow and the artifacts it produces.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifacts::{ArtifactStore, MODEL, PREPROCESSOR};
use crate::balance::Smote;
use crate::config::TrainingConfig;
use crate::encode::{Encoder, EncodingModel};
use crate::error::{Error, Result};
use crate::evaluate::{evaluate, EvaluationReport};
use crate::forest::RandomForest;
use crate::impute::{ImputationStatistics, Imputer};
use crate::split::stratified_split;
use crate::table::LabeledTable;

/// Imputation followed by encoding, both fitted on training rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub imputation: ImputationStatistics,
    pub encoding: EncodingModel,
}

impl Preprocessor {
    pub fn fit(frame: &DataFrame) -> Result<(Preprocessor, Vec<Vec<f64>>)> {
        let (imputation, imputed) = Imputer::fit_transform(frame)?;
        let (encoding, encoded) = Encoder::fit_transform(&imputed)?;
        Ok((
            Preprocessor {
                imputation,
                encoding,
            },
            encoded,
        ))
    }

    pub fn transform(&self, frame: &DataFrame) -> Result<Vec<Vec<f64>>> {
        let imputed = Imputer::transform(frame, &self.imputation)?;
        Encoder::transform(&imputed, &self.encoding)
    }

    pub fn feature_names(&self) -> &[String] {
        self.encoding.feature_names()
    }
}

/// Everything serving needs, fitted together in one training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedArtifacts {
    pub preprocessor: Preprocessor,
    pub model: RandomForest,
}

impl TrainedArtifacts {
    pub fn new(preprocessor: Preprocessor, model: RandomForest) -> Result<Self> {
        let expected = preprocessor.encoding.width();
        if model.n_features() != expected {
            return Err(Error::FeatureWidth {
                expected,
                found: model.n_features(),
            });
        }
        Ok(TrainedArtifacts {
            preprocessor,
            model,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        self.preprocessor.feature_names()
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifacts: TrainedArtifacts,
    /// `None` when the held-out partition is empty.
    pub evaluation: Option<EvaluationReport>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub balanced_rows: usize,
}

pub fn train(table: &LabeledTable, config: &TrainingConfig) -> Result<TrainingOutcome> {
    let (train_idx, test_idx) = stratified_split(&table.labels, config.test_fraction, config.seed);
    let train_part = table.take(&train_idx)?;
    let test_part = table.take(&test_idx)?;
    info!(
        train = train_part.labels.len(),
        test = test_part.labels.len(),
        class_counts = ?train_part.class_counts(),
        "split training table"
    );

    let (preprocessor, x_train) = Preprocessor::fit(&train_part.features)?;
    info!(
        width = preprocessor.encoding.width(),
        features = ?preprocessor.feature_names(),
        "fitted preprocessor"
    );

    // Oversampling only ever sees the training partition.
    info!(rows = x_train.len(), width = preprocessor.encoding.width(), "before SMOTE");
    let smote = Smote::new(config.smote_neighbors, config.seed);
    let (x_balanced, y_balanced) = smote.fit_resample(&x_train, &train_part.labels)?;
    info!(rows = x_balanced.len(), width = preprocessor.encoding.width(), "after SMOTE");

    let model = RandomForest::fit(&x_balanced, &y_balanced, &config.forest, config.seed)?;

    let evaluation = if test_part.labels.is_empty() {
        warn!("held-out partition is empty, skipping evaluation");
        None
    } else {
        let x_test = preprocessor.transform(&test_part.features)?;
        let probabilities = model.predict_proba_batch(&x_test)?;
        let report = evaluate(&test_part.labels, &probabilities);
        info!(accuracy = report.accuracy, roc_auc = ?report.roc_auc, "evaluated on held-out rows");
        Some(report)
    };

    Ok(TrainingOutcome {
        artifacts: TrainedArtifacts::new(preprocessor, model)?,
        evaluation,
        train_rows: train_part.labels.len(),
        test_rows: test_part.labels.len(),
        balanced_rows: x_balanced.len(),
    })
}

pub fn save_artifacts<S: ArtifactStore>(store: &S, artifacts: &TrainedArtifacts) -> Result<()> {
    store.save(PREPROCESSOR, &artifacts.preprocessor)?;
    store.save(MODEL, &artifacts.model)
}

/// Loads both blobs and checks they were fitted together.
pub fn load_artifacts<S: ArtifactStore>(store: &S) -> Result<TrainedArtifacts> {
    let preprocessor: Preprocessor = store.load(PREPROCESSOR)?;
    let model: RandomForest = store.load(MODEL)?;
    TrainedArtifacts::new(preprocessor, model).map_err(|e| match e {
        Error::FeatureWidth { expected, found } => Error::corrupt(
            MODEL,
            format!("model expects {found} features, preprocessor produces {expected}"),
        ),
        other => other,
    })
}
