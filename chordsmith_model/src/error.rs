// Error types for generation and for loading persisted tables.
//
// `ModelError` covers everything that can go wrong while serving one
// generation: bad input from the caller, a predictor returning garbage, or the
// MIDI artifact failing to land on disk. `LoadError` covers startup, when the
// vocabulary, voicing table, and predictor are read from JSON files.

use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// A seed label that the vocabulary has never seen.
    #[error("unknown chord symbol '{label}'")]
    UnknownSymbol { label: String },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The predictor errored or produced a vector that cannot be sampled.
    #[error("predictor failure: {0}")]
    PredictorFailure(String),

    /// The repetition multiplier removed every bit of probability mass.
    #[error("no probability mass left after repetition adjustment (history {history:?})")]
    DegenerateDistribution { history: Vec<usize> },

    #[error("symbol index {index} out of range for vocabulary of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to write MIDI file {}: {source}", path.display())]
    ArtifactWriteFailure { path: PathBuf, source: io::Error },
}

impl ModelError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ModelError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// True for errors caused by the request rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ModelError::UnknownSymbol { .. }
                | ModelError::InvalidParameter { .. }
                | ModelError::DegenerateDistribution { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },
}

impl LoadError {
    pub fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        LoadError::Invalid {
            what,
            reason: reason.into(),
        }
    }
}

/// Read and deserialize a JSON file, attaching the path to any failure.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let data = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}
