// Autoregressive progression generation.
//
// Starting from the seed, each step asks the predictor for a distribution
// given the most recent chords, samples one chord from it, and appends it.
// Steps are strictly sequential: every sampled chord feeds the next context.
//
// Two windows cover the growing sequence:
// - the prediction context, fed to the predictor;
// - the repetition history, the last `window_size` chords, fed to the sampler.
//
// How the context is chosen depends only on the seed, and is the same at
// every step:
// - empty seed: a single random chord drawn from [0, V-1), fresh each step.
//   The last vocabulary index is never used;
// - seed shorter than `LOOKBACK`: the whole sequence generated so far;
// - otherwise: the last `LOOKBACK` chords.

use crate::error::ModelError;
use crate::predictor::Predictor;
use crate::sampler::sample;
use rand::Rng;

/// Seeds at least this long switch the context to a sliding window of this size.
pub const LOOKBACK: usize = 4;

/// Knobs for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Total length of the returned sequence, seed included.
    pub target_length: usize,
    pub temperature: f64,
    /// How many trailing chords count as "recent" for the repetition
    /// multiplier. Zero or negative disables it.
    pub window_size: i64,
    /// Multiplier applied to recent chords' probabilities.
    pub repetitiveness: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            target_length: 4,
            temperature: 1.0,
            window_size: 4,
            repetitiveness: 2.0,
        }
    }
}

/// Extend `seed` to `params.target_length` chords. A seed already at or past
/// the target length is returned unchanged.
pub fn generate(
    predictor: &dyn Predictor,
    seed: &[usize],
    params: &GenerationParams,
    rng: &mut impl Rng,
) -> Result<Vec<usize>, ModelError> {
    let vocab_size = predictor.vocab_size();
    validate(seed, params, vocab_size)?;

    let mut generated = seed.to_vec();
    while generated.len() < params.target_length {
        let start;
        let context: &[usize] = if seed.is_empty() {
            start = [rng.random_range(0..vocab_size - 1)];
            &start
        } else if seed.len() < LOOKBACK {
            &generated
        } else {
            &generated[generated.len() - LOOKBACK..]
        };

        let probabilities = predictor.predict(context)?;
        if probabilities.len() != vocab_size {
            return Err(ModelError::PredictorFailure(format!(
                "expected {vocab_size} probabilities, got {}",
                probabilities.len()
            )));
        }

        let history = history_window(&generated, params.window_size);
        let next = sample(
            &probabilities,
            params.temperature,
            history,
            params.repetitiveness,
            rng,
        )?;
        log::trace!("context {context:?} history {history:?} -> {next}");
        generated.push(next);
    }
    Ok(generated)
}

/// The trailing `window_size` chords, or nothing when the window is disabled.
pub fn history_window(generated: &[usize], window_size: i64) -> &[usize] {
    if window_size <= 0 {
        return &[];
    }
    let window = usize::try_from(window_size).unwrap_or(usize::MAX);
    &generated[generated.len().saturating_sub(window)..]
}

fn validate(seed: &[usize], params: &GenerationParams, vocab_size: usize) -> Result<(), ModelError> {
    if !params.temperature.is_finite() || params.temperature <= 0.0 {
        return Err(ModelError::invalid(
            "temperature",
            format!("must be a positive number, got {}", params.temperature),
        ));
    }
    if !params.repetitiveness.is_finite() || params.repetitiveness < 0.0 {
        return Err(ModelError::invalid(
            "repetitiveness",
            format!("must be a non-negative number, got {}", params.repetitiveness),
        ));
    }
    if seed.is_empty() && params.target_length > 0 && vocab_size < 2 {
        return Err(ModelError::invalid(
            "selected_chords",
            "generating without a seed needs a vocabulary of at least two chords",
        ));
    }
    if let Some(&index) = seed.iter().find(|&&i| i >= vocab_size) {
        return Err(ModelError::invalid(
            "selected_chords",
            format!("chord index {index} is outside the vocabulary of {vocab_size}"),
        ));
    }
    Ok(())
}
