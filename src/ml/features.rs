use crate::error::{AppError, Result};
use crate::ml::models::FeatureConfig;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const TEXT_START: char = '\u{2}';
const TEXT_END: char = '\u{3}';

/// Bag-of-n-grams featurizer for a single text column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextFeaturizer {
    /// Configuration
    config: FeatureConfig,

    /// Vocabulary mapping (term -> index)
    vocabulary: HashMap<String, usize>,

    /// Inverse document frequency per vocabulary index
    idf: Vec<f64>,

    /// Is fitted (vocabulary built)
    is_fitted: bool,
}

impl TextFeaturizer {
    /// Create a new featurizer
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            vocabulary: HashMap::new(),
            idf: Vec::new(),
            is_fitted: false,
        }
    }

    /// Build the vocabulary from a set of documents
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<()> {
        let mut term_doc_freq: BTreeMap<String, usize> = BTreeMap::new();

        for document in documents {
            let unique_terms: HashSet<String> =
                self.extract_terms(document.as_ref()).into_iter().collect();
            for term in unique_terms {
                *term_doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        // Filter vocabulary by document frequency
        let min_df = self.config.min_doc_freq;
        let mut vocab_list: Vec<(String, usize)> = term_doc_freq
            .into_iter()
            .filter(|(_, freq)| *freq >= min_df)
            .collect();

        // Most frequent first, ties by term so indices never depend on hash order
        vocab_list.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max) = self.config.max_vocab_size {
            vocab_list.truncate(max);
        }

        let n_docs = documents.len() as f64;
        self.idf = vocab_list
            .iter()
            .map(|(_, doc_freq)| ((n_docs + 1.0) / (*doc_freq as f64 + 1.0)).ln() + 1.0)
            .collect();

        self.vocabulary = vocab_list
            .into_iter()
            .enumerate()
            .map(|(idx, (term, _))| (term, idx))
            .collect();

        self.is_fitted = true;

        Ok(())
    }

    /// Transform a document into an L2-normalized feature vector
    pub fn transform(&self, document: &str) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(AppError::Internal(
                "TextFeaturizer must be fitted before transform".to_string(),
            ));
        }

        let mut features: Array1<f64> = Array1::zeros(self.dim());

        for term in self.extract_terms(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                features[idx] += 1.0;
            }
        }

        if self.config.use_tfidf {
            for (value, idf) in features.iter_mut().zip(self.idf.iter()) {
                *value *= idf;
            }
        }

        let norm = features.dot(&features).sqrt();
        if norm > 0.0 {
            features /= norm;
        }

        Ok(features)
    }

    /// Transform many documents into a row-per-document matrix
    pub fn transform_batch<S: AsRef<str>>(&self, documents: &[S]) -> Result<Array2<f64>> {
        let mut matrix = Array2::zeros((documents.len(), self.dim()));
        for (mut row, document) in matrix.rows_mut().into_iter().zip(documents) {
            row.assign(&self.transform(document.as_ref())?);
        }
        Ok(matrix)
    }

    /// Fit and transform in one step
    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<Array2<f64>> {
        self.fit(documents)?;
        self.transform_batch(documents)
    }

    /// Word n-grams and character n-grams of a document
    fn extract_terms(&self, text: &str) -> Vec<String> {
        let text = TextPreprocessor::normalize(text);
        let words: Vec<&str> = TextPreprocessor::tokenize(&text)
            .filter(|w| !self.config.remove_stopwords || !TextPreprocessor::is_stopword(w))
            .collect();

        let mut terms = Vec::new();

        for n in 1..=self.config.word_ngram_length {
            for window in words.windows(n) {
                terms.push(format!("w:{}", window.join(" ")));
            }
        }

        let n = self.config.char_ngram_length;
        if n > 0 {
            let chars: Vec<char> = std::iter::once(TEXT_START)
                .chain(text.chars())
                .chain(std::iter::once(TEXT_END))
                .collect();
            for window in chars.windows(n) {
                terms.push(format!("c:{}", window.iter().collect::<String>()));
            }
        }

        terms
    }

    /// Output dimension
    pub fn dim(&self) -> usize {
        self.vocabulary.len()
    }

    /// Check if fitted
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Check internal shapes after deserialization
    pub fn is_consistent(&self) -> bool {
        self.idf.len() == self.vocabulary.len()
            && self.vocabulary.values().all(|&idx| idx < self.idf.len())
    }
}

/// Text preprocessing utilities
pub struct TextPreprocessor;

impl TextPreprocessor {
    const STOPWORDS: [&'static str; 40] = [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "up", "about", "into", "through", "during", "is", "was", "are", "were", "been",
        "be", "have", "has", "had", "do", "does", "did", "will", "would", "could", "should",
        "may", "might", "must", "can",
    ];

    /// Normalize text (lowercase, trim)
    pub fn normalize(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// Split on anything that is not a letter or digit
    pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
    }

    pub fn is_stopword(word: &str) -> bool {
        Self::STOPWORDS.contains(&word)
    }
}
