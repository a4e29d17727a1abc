// Chord-to-notes lookup.
//
// Each vocabulary index has one voicing: the concrete MIDI pitches played when
// the chord is rendered. The persisted table is a JSON array with one
// single-key object per index, e.g. `[{"Am": ["A3", "C4", "E4"]}, ...]`, and is
// looked up by position rather than by key. Pitches may be MIDI numbers or
// note names; names use `#` for sharps and `-` or `b` for flats, with the
// octave defaulting to 4 when omitted.

use crate::error::{LoadError, ModelError, read_json_file};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Highest valid MIDI note number.
const MAX_MIDI_NOTE: i32 = 127;

/// The pitch set for one chord label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voicing {
    pub label: String,
    pub notes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct VoicingTable {
    voicings: Vec<Voicing>,
}

/// One pitch as it appears in the persisted table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PitchSpec {
    Midi(u8),
    Name(String),
}

impl PitchSpec {
    fn resolve(&self) -> Option<u8> {
        match self {
            PitchSpec::Midi(n) if i32::from(*n) <= MAX_MIDI_NOTE => Some(*n),
            PitchSpec::Midi(_) => None,
            PitchSpec::Name(name) => parse_pitch_name(name),
        }
    }
}

impl VoicingTable {
    pub fn new(voicings: Vec<Voicing>) -> Self {
        VoicingTable { voicings }
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let entries: Vec<BTreeMap<String, Vec<PitchSpec>>> = read_json_file(path)?;
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<BTreeMap<String, Vec<PitchSpec>>>) -> Result<Self, LoadError> {
        let mut voicings = Vec::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            if entry.len() != 1 {
                return Err(LoadError::invalid(
                    "voicing table",
                    format!("entry {i} has {} keys, expected exactly one", entry.len()),
                ));
            }
            for (label, pitches) in entry {
                let notes = pitches
                    .iter()
                    .map(|p| {
                        p.resolve().ok_or_else(|| {
                            LoadError::invalid(
                                "voicing table",
                                format!("unreadable pitch {p:?} in chord '{label}'"),
                            )
                        })
                    })
                    .collect::<Result<Vec<u8>, LoadError>>()?;
                voicings.push(Voicing { label, notes });
            }
        }
        Ok(VoicingTable { voicings })
    }

    pub fn len(&self) -> usize {
        self.voicings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voicings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Voicing> {
        self.voicings.get(index)
    }

    pub fn notes_for(&self, index: usize) -> Result<&[u8], ModelError> {
        self.voicings
            .get(index)
            .map(|v| v.notes.as_slice())
            .ok_or(ModelError::IndexOutOfRange {
                index,
                len: self.voicings.len(),
            })
    }
}

/// Parse a note name such as `C4`, `F#3`, `B-2`, or `Eb` into a MIDI number.
/// Middle C (`C4`) is 60.
pub fn parse_pitch_name(name: &str) -> Option<u8> {
    let mut chars = name.trim().chars().peekable();
    let pitch_class = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut accidental = 0;
    while let Some(&c) = chars.peek() {
        match c {
            '#' => accidental += 1,
            '-' | 'b' => accidental -= 1,
            _ => break,
        }
        chars.next();
    }

    let rest: String = chars.collect();
    let octave: i32 = if rest.is_empty() { 4 } else { rest.parse().ok()? };

    let midi = (octave + 1) * 12 + pitch_class + accidental;
    if (0..=MAX_MIDI_NOTE).contains(&midi) {
        u8::try_from(midi).ok()
    } else {
        None
    }
}
