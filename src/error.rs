use std::path::PathBuf;

use thiserror::Error;

use crate::models::Group;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{group} group has {units} usable units; at least 2 are required")]
    InsufficientSample { group: Group, units: usize },

    #[error("invalid outcome {value:?} for DMA {unit} on line {line}: revenue must be a positive number")]
    InvalidOutcome {
        line: u64,
        unit: String,
        value: Option<f64>,
    },

    #[error("{group} group has period flags {values:?}; expected exactly [0, 1]")]
    MalformedPeriod { group: Group, values: Vec<i64> },

    #[error("cannot use artifact {}: {reason}", path.display())]
    MissingArtifact { path: PathBuf, reason: String },

    #[error("estimate is not finite; check the unit differences for NaN or infinite values")]
    NonFiniteEstimate,
}

impl PipelineError {
    pub fn missing_artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::MissingArtifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
