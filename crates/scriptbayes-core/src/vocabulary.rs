//! Ordered feature vocabulary.
//!
//! Position `j` of every feature vector, every `thetas` row, and the
//! `features` template parameter all refer to the same term.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// An ordered list of unique terms. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureVocabulary {
    terms: Vec<String>,
}

impl FeatureVocabulary {
    /// Build from terms that are already unique.
    pub fn new(terms: Vec<String>) -> Result<Self, ModelError> {
        if terms.is_empty() {
            return Err(ModelError::EmptyVocabulary);
        }
        let mut seen = HashSet::with_capacity(terms.len());
        for term in &terms {
            if !seen.insert(term.as_str()) {
                return Err(ModelError::DuplicateTerm(term.clone()));
            }
        }
        Ok(Self { terms })
    }

    /// Merge term lists, dropping repeats while keeping first-seen order.
    pub fn merge<I, S>(terms: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for term in terms {
            let term = term.into();
            if seen.insert(term.clone()) {
                merged.push(term);
            }
        }
        Self::new(merged)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for FeatureVocabulary {
    type Error = ModelError;

    fn try_from(terms: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(terms)
    }
}

impl From<FeatureVocabulary> for Vec<String> {
    fn from(vocab: FeatureVocabulary) -> Self {
        vocab.terms
    }
}
