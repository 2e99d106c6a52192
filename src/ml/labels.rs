use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bijective mapping between label text and dense class keys.
///
/// Keys are assigned in first-seen order starting at 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelDictionary {
    labels: Vec<String>,
    keys: HashMap<String, usize>,
}

impl LabelDictionary {
    /// Build the dictionary from observed labels
    pub fn fit<'a, I>(observed: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut dictionary = Self::default();
        for label in observed {
            dictionary.insert(label);
        }
        dictionary
    }

    fn insert(&mut self, label: &str) -> usize {
        if let Some(&key) = self.keys.get(label) {
            return key;
        }
        let key = self.labels.len();
        self.labels.push(label.to_string());
        self.keys.insert(label.to_string(), key);
        key
    }

    /// Key for a label, `None` when the label was never observed
    pub fn key_of(&self, label: &str) -> Option<usize> {
        self.keys.get(label).copied()
    }

    /// Label text for a key
    pub fn label(&self, key: usize) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Labels in key order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Check that the forward and inverse maps agree
    pub fn is_consistent(&self) -> bool {
        self.keys.len() == self.labels.len()
            && self
                .labels
                .iter()
                .enumerate()
                .all(|(key, label)| self.keys.get(label) == Some(&key))
    }
}
