// Startup loading of the model context.
//
// The vocabulary, voicing table, and a configured model file are all required;
// any of them missing or invalid aborts startup. The uniform predictor is
// used only when no model file is configured (`--uniform`).

use crate::config::ServerConfig;
use chordsmith_model::{
    LoadError, ModelContext, NgramPredictor, Predictor, UniformPredictor, Vocabulary,
    VoicingTable,
};

pub fn load_model_context(config: &ServerConfig) -> Result<ModelContext, LoadError> {
    log::info!("Loading vocabulary from {}", config.vocabulary_path.display());
    let vocabulary = Vocabulary::load(&config.vocabulary_path)?;
    log::info!("  {} chords.", vocabulary.len());

    log::info!("Loading voicings from {}", config.voicings_path.display());
    let voicings = VoicingTable::load(&config.voicings_path)?;

    let predictor = load_predictor(config, vocabulary.len())?;
    log::info!("Predictor: {}", predictor.describe());

    ModelContext::new(vocabulary, voicings, predictor)
}

fn load_predictor(
    config: &ServerConfig,
    vocab_size: usize,
) -> Result<Box<dyn Predictor>, LoadError> {
    match &config.model_path {
        Some(path) => {
            log::info!("Loading model from {}", path.display());
            Ok(Box::new(NgramPredictor::load(path)?))
        }
        None => {
            log::info!("No model configured, using uniform predictor.");
            Ok(Box::new(UniformPredictor::new(vocab_size)))
        }
    }
}
