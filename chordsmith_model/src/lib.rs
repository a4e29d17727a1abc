// Chordsmith model core
//
// Turns a handful of seed chords into a longer chord progression by repeatedly
// asking a next-chord predictor for a probability distribution and sampling
// from it. Sampling is temperature-scaled and biased toward (or away from)
// chords heard in the last few positions, so callers can dial in how
// adventurous or how repetitive a progression sounds.
//
// Architecture:
// - vocab.rs: Chord label <-> dense index codec, loaded once from JSON
// - voicing.rs: Per-index MIDI pitch sets used when rendering a progression
// - predictor.rs: The `Predictor` capability plus a uniform predictor and a
//   JSON-loaded n-gram transition table with suffix backoff
// - sampler.rs: Temperature scaling, repetition multiplier, weighted draw
// - generator.rs: Autoregressive loop feeding a sliding context to the
//   predictor and the trailing history to the sampler
// - context.rs: Immutable bundle of vocabulary + voicings + predictor shared
//   by every request
// - midi.rs: Block-chord MIDI file output
// - error.rs: Generation and load-time error types
//
// Nothing here owns process-wide state. Everything loaded at startup lives in
// a `ModelContext` which the caller constructs and shares.

pub mod context;
pub mod error;
pub mod generator;
pub mod midi;
pub mod predictor;
pub mod sampler;
pub mod vocab;
pub mod voicing;

pub use context::{ModelContext, RenderedChord};
pub use error::{LoadError, ModelError};
pub use generator::{GenerationParams, generate};
pub use predictor::{NgramPredictor, Predictor, UniformPredictor};
pub use vocab::Vocabulary;
pub use voicing::VoicingTable;
