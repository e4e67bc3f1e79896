//! Axis labels
//!
//! A [LabelIndex] holds the ordered, deduplicated labels of one matrix axis together with a map
//! from label back to its dense index. The position of a label in the sequence is the index used
//! for that label in the sparse cell structure.

use hashbrown::HashMap;

use crate::error::SpnetError;

/// Ordered set of labels with a two-way label/index mapping.
#[derive(Clone, Debug, Default)]
pub struct LabelIndex {
    /// Labels in index order.
    labels: Vec<String>,
    /// Label to index lookup.
    index: HashMap<String, u32>,
}

impl LabelIndex {
    /// Create an empty LabelIndex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a LabelIndex from a label sequence, which must not contain duplicates.
    pub fn from_labels(labels: Vec<String>) -> Result<Self, SpnetError> {
        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), u32::try_from(i)?).is_some() {
                return Err(SpnetError::archive(format!("duplicate label {}", label)));
            }
        }
        Ok(LabelIndex { labels, index })
    }

    /// Return the index of a label, assigning the next free index if it has not been seen.
    pub fn get_or_insert(&mut self, label: &str) -> Result<u32, SpnetError> {
        if let Some(idx) = self.index.get(label) {
            return Ok(*idx);
        }
        let idx = u32::try_from(self.labels.len())?;
        self.labels.push(label.to_string());
        self.index.insert(label.to_string(), idx);
        Ok(idx)
    }

    /// Index of a label, if present.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.index.get(label).map(|idx| *idx as usize)
    }

    /// Label at an index, if in bounds.
    pub fn label(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there are no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in index order.
    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

impl PartialEq for LabelIndex {
    // The lookup map is derived from the labels.
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for LabelIndex {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_order() {
        let mut labels = LabelIndex::new();
        assert_eq!(0, labels.get_or_insert("b").unwrap());
        assert_eq!(1, labels.get_or_insert("a").unwrap());
        assert_eq!(0, labels.get_or_insert("b").unwrap());
        assert_eq!(2, labels.get_or_insert("c").unwrap());
        assert_eq!(&["b", "a", "c"], labels.as_slice());
        assert_eq!(Some(1), labels.position("a"));
        assert_eq!(None, labels.position("d"));
        assert_eq!(Some("c"), labels.label(2));
        assert_eq!(None, labels.label(3));
        assert_eq!(3, labels.len());
    }

    #[test]
    fn from_labels() {
        let labels = LabelIndex::from_labels(vec!["x".to_string(), "y".to_string()]).unwrap();
        assert_eq!(Some(1), labels.position("y"));
        let mut expected = LabelIndex::new();
        expected.get_or_insert("x").unwrap();
        expected.get_or_insert("y").unwrap();
        assert_eq!(expected, labels);
    }

    #[test]
    fn from_labels_duplicate() {
        let err = LabelIndex::from_labels(vec!["x".to_string(), "x".to_string()]).unwrap_err();
        assert_eq!("invalid archive: duplicate label x", err.to_string());
    }

    #[test]
    fn empty() {
        let labels = LabelIndex::new();
        assert!(labels.is_empty());
        assert_eq!(0, labels.len());
        assert_eq!(None, labels.label(0));
    }
}
