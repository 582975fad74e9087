//! Stroke risk prediction: feature preparation, class balancing, random
//! forest training and single-record scoring.

pub mod artifacts;
pub mod balance;
pub mod config;
pub mod encode;
pub mod error;
pub mod evaluate;
pub mod forest;
pub mod impute;
pub mod inference;
pub mod pipeline;
pub mod records;
pub mod schema;
pub mod split;
pub mod table;

pub use artifacts::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use inference::{predict, InferenceService};
pub use pipeline::{load_artifacts, save_artifacts, train, TrainedArtifacts, TrainingOutcome};
pub use records::{Prediction, RawRecord, StrokeRecord, Verdict};
pub use schema::{FeatureSchema, STROKE_SCHEMA};
