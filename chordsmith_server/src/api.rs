// HTTP request/response bodies and the mapping from errors to status codes.
//
// The JSON shapes match what the existing web frontend sends and expects:
// `POST /generate` takes `{length, temperature, selected_chords, repetitiveness}`
// and answers `{chord_progression, midi_url}`; `GET /chords` answers
// `{all_chords}`. Missing fields fall back to the same defaults the frontend
// assumes.
//
// The repetitiveness slider in the frontend sends 0..=4 in whole steps. Those
// exact values are remapped to much stronger multipliers before they reach the
// sampler (see `remap_repetitiveness`); anything else is passed through as-is.

use chordsmith_model::generator::GenerationParams;
use chordsmith_model::{ModelError, RenderedChord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_length() -> i64 {
    4
}

fn default_temperature() -> f64 {
    1.0
}

fn default_repetitiveness() -> f64 {
    2.0
}

fn default_window_size() -> i64 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default = "default_length")]
    pub length: i64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub selected_chords: Vec<SelectedChord>,
    #[serde(default = "default_repetitiveness")]
    pub repetitiveness: f64,
    #[serde(default = "default_window_size")]
    pub window_size: i64,
}

/// One entry from the frontend's chord picker. Only `value` is used.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedChord {
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub chord_progression: Vec<String>,
    /// `None` when the progression was generated but the MIDI file could
    /// not be written.
    pub midi_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChordsResponse {
    pub all_chords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl GenerateRequest {
    /// Validate the request and split it into seed labels and sampler
    /// parameters, with repetitiveness already remapped.
    pub fn into_generation(
        self,
        max_length: usize,
    ) -> Result<(Vec<String>, GenerationParams), ModelError> {
        let target_length = usize::try_from(self.length).map_err(|_| {
            ModelError::invalid("length", format!("must not be negative, got {}", self.length))
        })?;
        if target_length > max_length {
            return Err(ModelError::invalid(
                "length",
                format!("at most {max_length} chords can be generated, got {target_length}"),
            ));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ModelError::invalid(
                "temperature",
                format!("must be a positive number, got {}", self.temperature),
            ));
        }
        if !self.repetitiveness.is_finite() || self.repetitiveness < 0.0 {
            return Err(ModelError::invalid(
                "repetitiveness",
                format!("must be a non-negative number, got {}", self.repetitiveness),
            ));
        }

        let seed = self.selected_chords.into_iter().map(|c| c.value).collect();
        let params = GenerationParams {
            target_length,
            temperature: self.temperature,
            window_size: self.window_size,
            repetitiveness: remap_repetitiveness(self.repetitiveness),
        };
        Ok((seed, params))
    }
}

impl GenerateResponse {
    pub fn new(chords: &[RenderedChord], midi_url: Option<String>) -> Self {
        GenerateResponse {
            chord_progression: chords.iter().map(|c| c.label.clone()).collect(),
            midi_url,
        }
    }
}

/// Map the frontend's slider positions onto sampler multipliers. Only the
/// exact values 0 through 4 are remapped.
pub fn remap_repetitiveness(value: f64) -> f64 {
    const TABLE: [(f64, f64); 5] = [
        (0.0, 0.01),
        (1.0, 5.0),
        (2.0, 20.0),
        (3.0, 100.0),
        (4.0, 10_000.0),
    ];
    TABLE
        .iter()
        .find(|(slider, _)| *slider == value)
        .map_or(value, |(_, factor)| value * factor)
}

/// Failures surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("malformed request body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("request body is not readable: {0}")]
    UnreadableBody(std::io::Error),

    #[error("{0}")]
    Model(#[from] ModelError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed")]
    MethodNotAllowed,
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::MalformedBody(_) | ApiError::UnreadableBody(_) => 400,
            ApiError::Model(ModelError::DegenerateDistribution { .. }) => 422,
            ApiError::Model(err) if err.is_client_error() => 400,
            ApiError::Model(_) => 500,
            ApiError::NotFound(_) => 404,
            ApiError::MethodNotAllowed => 405,
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
        }
    }
}
