// Chord symbol codec.
//
// The vocabulary is the ordered list of chord labels the predictor was trained
// on. A label's position in the list is its index, so indices are always the
// contiguous range [0, len). Loaded once from a JSON array of strings and never
// mutated afterwards.

use crate::error::{LoadError, ModelError, read_json_file};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Vocabulary {
    labels: Vec<String>,
    index: BTreeMap<String, usize>,
}

impl Vocabulary {
    /// Build a vocabulary from labels in index order. Rejects an empty list
    /// and duplicate labels, either of which would break the bijection.
    pub fn new(labels: Vec<String>) -> Result<Self, LoadError> {
        if labels.is_empty() {
            return Err(LoadError::invalid("vocabulary", "no chord labels"));
        }
        let mut index = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            if let Some(previous) = index.insert(label.clone(), i) {
                return Err(LoadError::invalid(
                    "vocabulary",
                    format!("label '{label}' appears at both {previous} and {i}"),
                ));
            }
        }
        Ok(Vocabulary { labels, index })
    }

    /// Load from a JSON array of labels.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let labels: Vec<String> = read_json_file(path)?;
        Self::new(labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn encode(&self, label: &str) -> Result<usize, ModelError> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| ModelError::UnknownSymbol {
                label: label.to_string(),
            })
    }

    /// Encode a sequence of labels, failing on the first unknown one.
    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, ModelError> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    pub fn decode(&self, index: usize) -> Result<&str, ModelError> {
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(ModelError::IndexOutOfRange {
                index,
                len: self.labels.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vocab() -> Vocabulary {
        Vocabulary::new(vec!["Cmaj".into(), "Am".into(), "G7".into()]).unwrap()
    }

    #[test]
    fn encode_decode_every_label() {
        let vocab = sample_vocab();
        for label in vocab.labels() {
            let idx = vocab.encode(label).unwrap();
            assert_eq!(vocab.decode(idx).unwrap(), label);
        }
        assert_eq!(vocab.encode("G7").unwrap(), 2);
    }

    #[test]
    fn unknown_label_is_reported() {
        let vocab = sample_vocab();
        match vocab.encode("F#dim") {
            Err(ModelError::UnknownSymbol { label }) => assert_eq!(label, "F#dim"),
            other => panic!("expected UnknownSymbol, got {other:?}"),
        }
    }

    #[test]
    fn encode_all_stops_at_first_unknown() {
        let vocab = sample_vocab();
        assert_eq!(vocab.encode_all(&["Am", "Cmaj"]).unwrap(), vec![1, 0]);
        assert!(vocab.encode_all(&["Am", "Bbsus4", "Cmaj"]).is_err());
    }

    #[test]
    fn decode_out_of_range() {
        let vocab = sample_vocab();
        assert!(matches!(
            vocab.decode(3),
            Err(ModelError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn rejects_duplicates_and_empty() {
        assert!(Vocabulary::new(vec![]).is_err());
        let err = Vocabulary::new(vec!["Am".into(), "C".into(), "Am".into()]).unwrap_err();
        assert!(err.to_string().contains("'Am'"), "got {err}");
    }

    #[test]
    fn load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocabulary.json");
        std::fs::write(&path, r#"["A7", "Am", "C"]"#).unwrap();
        let vocab = Vocabulary::load(&path).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.encode("C").unwrap(), 2);
    }
}
