// Next-chord predictors.
//
// A `Predictor` maps a short context of recent chord indices to a probability
// vector over the whole vocabulary. The generator only ever talks to this
// trait.
//
// Two implementations ship here:
// - UniformPredictor: every chord equally likely. Used as the fallback when no
//   model file is configured, and as a stub in tests.
// - NgramPredictor: transition counts keyed by the preceding chords, loaded
//   from JSON. Lookup backs off from the longest matching suffix of the
//   context down to a unigram distribution, and additive smoothing keeps every
//   chord reachable.
//
// Predictors are shared across request threads, hence `Send + Sync`. Both
// implementations here are pure reads.

use crate::error::{LoadError, ModelError, read_json_file};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Unnormalized weight per next chord index.
type TransitionTable = BTreeMap<usize, f64>;

pub trait Predictor: Send + Sync {
    /// Probability (or unnormalized weight) for every vocabulary index, given
    /// the most recent chords in order.
    fn predict(&self, context: &[usize]) -> Result<Vec<f64>, ModelError>;

    /// Length of the vectors returned by `predict`.
    fn vocab_size(&self) -> usize;

    /// Short description for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct UniformPredictor {
    vocab_size: usize,
}

impl UniformPredictor {
    pub fn new(vocab_size: usize) -> Self {
        UniformPredictor { vocab_size }
    }
}

impl Predictor for UniformPredictor {
    fn predict(&self, _context: &[usize]) -> Result<Vec<f64>, ModelError> {
        if self.vocab_size == 0 {
            return Err(ModelError::PredictorFailure("empty vocabulary".into()));
        }
        Ok(vec![1.0 / self.vocab_size as f64; self.vocab_size])
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn describe(&self) -> String {
        format!("uniform over {} chords", self.vocab_size)
    }
}

/// Chord transition model with suffix backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgramPredictor {
    pub vocab_size: usize,
    /// Longest context consulted.
    pub order: usize,
    /// Added to every count before normalizing.
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    /// Context key (comma-joined indices, oldest first) -> next chord weights.
    #[serde(default)]
    pub contexts: BTreeMap<String, TransitionTable>,
    /// Overall next-chord distribution, used when no context matches.
    #[serde(default)]
    pub unigram: TransitionTable,
}

fn default_smoothing() -> f64 {
    1e-3
}

impl NgramPredictor {
    /// Load from JSON and check the tables against the declared vocabulary.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let model: NgramPredictor = read_json_file(path)?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if self.vocab_size == 0 {
            return Err(LoadError::invalid("n-gram model", "vocab_size is zero"));
        }
        if self.order == 0 {
            return Err(LoadError::invalid("n-gram model", "order must be at least 1"));
        }
        if !self.smoothing.is_finite() || self.smoothing < 0.0 {
            return Err(LoadError::invalid(
                "n-gram model",
                format!("smoothing must be a non-negative number, got {}", self.smoothing),
            ));
        }
        let tables = self
            .contexts
            .iter()
            .map(|(key, table)| (key.as_str(), table))
            .chain(std::iter::once(("unigram", &self.unigram)));
        for (key, table) in tables {
            for (&next, &weight) in table {
                if next >= self.vocab_size {
                    return Err(LoadError::invalid(
                        "n-gram model",
                        format!("context '{key}' names chord {next} beyond vocab_size {}", self.vocab_size),
                    ));
                }
                if !weight.is_finite() || weight < 0.0 {
                    return Err(LoadError::invalid(
                        "n-gram model",
                        format!("context '{key}' has weight {weight} for chord {next}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Find the table for the longest suffix of `context` that has data.
    fn lookup(&self, context: &[usize]) -> Option<&TransitionTable> {
        let longest = context.len().min(self.order);
        (1..=longest)
            .rev()
            .filter_map(|n| self.contexts.get(&context_key(&context[context.len() - n..])))
            .find(|table| table_total(table) > 0.0)
    }
}

impl Predictor for NgramPredictor {
    fn predict(&self, context: &[usize]) -> Result<Vec<f64>, ModelError> {
        let table = self
            .lookup(context)
            .or_else(|| Some(&self.unigram).filter(|t| table_total(t) > 0.0));

        let Some(table) = table else {
            return UniformPredictor::new(self.vocab_size).predict(context);
        };

        let total = table_total(table) + self.smoothing * self.vocab_size as f64;
        let mut probabilities = vec![self.smoothing / total; self.vocab_size];
        for (&next, &weight) in table {
            if let Some(p) = probabilities.get_mut(next) {
                *p += weight / total;
            }
        }
        Ok(probabilities)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn describe(&self) -> String {
        format!(
            "order-{} n-gram over {} chords ({} contexts)",
            self.order,
            self.vocab_size,
            self.contexts.len()
        )
    }
}

/// Encode a context (slice of chord indices) as a string key for map lookup.
pub fn context_key(context: &[usize]) -> String {
    context
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn table_total(table: &TransitionTable) -> f64 {
    table.values().sum()
}
