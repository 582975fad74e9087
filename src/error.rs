use polars::prelude::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("schema mismatch in column `{column}`: {reason}")]
    SchemaMismatch { column: String, reason: String },

    #[error("insufficient samples: minority class has {minority} rows, at least {required} required")]
    InsufficientSamples { minority: usize, required: usize },

    #[error("artifact `{name}` not found")]
    ArtifactNotFound { name: String },

    #[error("artifact `{name}` is corrupt: {reason}")]
    ArtifactCorrupt { name: String, reason: String },

    #[error("invalid artifact name {name:?}")]
    InvalidArtifactName { name: String },

    #[error("feature width mismatch: expected {expected}, found {found}")]
    FeatureWidth { expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("nearest-neighbour search failed: {0}")]
    Neighbors(#[from] smartcore::error::Failed),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn schema(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::SchemaMismatch {
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::ArtifactCorrupt {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
