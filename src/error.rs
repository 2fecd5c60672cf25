use std::path::PathBuf;

use thiserror::Error;

use crate::modes::UnitFamily;

/// Failures of the join and comparison pipeline.
///
/// Output collisions are not listed here: they never abort a run and are
/// reported through [`crate::pipeline::SkipReason`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("matrix file for grid ID {id} not found ({name})")]
    MissingInput { id: u64, name: String },

    #[error("travel modes '{first}' ({first_family}) and '{second}' ({second_family}) are not comparable")]
    IncompatibleMode {
        first: String,
        first_family: UnitFamily,
        second: String,
        second_family: UnitFamily,
    },

    #[error("travel mode '{0}' given twice")]
    DuplicateMode(String),

    #[error("{}: {reason}", source_name(.location))]
    MalformedTable {
        location: Option<PathBuf>,
        reason: String,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

fn source_name(location: &Option<PathBuf>) -> String {
    match location {
        Some(path) => path.display().to_string(),
        None => "in-memory table".to_string(),
    }
}

impl PipelineError {
    pub fn malformed(location: Option<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedTable {
            location,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
