// Immutable model context.
//
// Everything loaded once at startup (vocabulary, voicings, predictor) lives in
// a `ModelContext`. It is never mutated after construction, so the server
// shares one instance across all request threads behind an `Arc` without any
// locking. Each request brings its own RNG and owns its own sequence.

use crate::error::{LoadError, ModelError};
use crate::generator::{GenerationParams, generate};
use crate::predictor::Predictor;
use crate::vocab::Vocabulary;
use crate::voicing::VoicingTable;
use rand::Rng;
use serde::Serialize;

/// A generated chord ready for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedChord {
    pub label: String,
    pub notes: Vec<u8>,
}

pub struct ModelContext {
    vocabulary: Vocabulary,
    voicings: VoicingTable,
    predictor: Box<dyn Predictor>,
}

impl ModelContext {
    /// Bundle the loaded pieces, checking that they agree on the vocabulary.
    pub fn new(
        vocabulary: Vocabulary,
        voicings: VoicingTable,
        predictor: Box<dyn Predictor>,
    ) -> Result<Self, LoadError> {
        if predictor.vocab_size() != vocabulary.len() {
            return Err(LoadError::invalid(
                "model context",
                format!(
                    "predictor covers {} chords but the vocabulary has {}",
                    predictor.vocab_size(),
                    vocabulary.len()
                ),
            ));
        }
        if voicings.len() < vocabulary.len() {
            return Err(LoadError::invalid(
                "model context",
                format!(
                    "voicing table has {} entries but the vocabulary has {}",
                    voicings.len(),
                    vocabulary.len()
                ),
            ));
        }
        if voicings.len() > vocabulary.len() {
            log::warn!(
                "voicing table has {} entries, ignoring the {} past the vocabulary",
                voicings.len(),
                voicings.len() - vocabulary.len()
            );
        }
        for (i, label) in vocabulary.labels().iter().enumerate() {
            if let Some(voicing) = voicings.get(i).filter(|v| &v.label != label) {
                log::warn!(
                    "chord {i} is '{label}' in the vocabulary but '{}' in the voicing table",
                    voicing.label
                );
            }
        }
        Ok(ModelContext {
            vocabulary,
            voicings,
            predictor,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    /// Encode the seed labels, extend them to the requested length, and
    /// render the result.
    pub fn generate_progression<S: AsRef<str>>(
        &self,
        seed_labels: &[S],
        params: &GenerationParams,
        rng: &mut impl Rng,
    ) -> Result<Vec<RenderedChord>, ModelError> {
        let seed = self.vocabulary.encode_all(seed_labels)?;
        let indices = generate(self.predictor.as_ref(), &seed, params, rng)?;
        self.render(&indices)
    }

    /// Look up label and notes for each index.
    pub fn render(&self, indices: &[usize]) -> Result<Vec<RenderedChord>, ModelError> {
        indices
            .iter()
            .map(|&i| {
                Ok(RenderedChord {
                    label: self.vocabulary.decode(i)?.to_string(),
                    notes: self.voicings.notes_for(i)?.to_vec(),
                })
            })
            .collect()
    }
}
