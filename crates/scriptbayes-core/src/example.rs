//! Labelled training vectors and their decoding from search hits.
//!
//! The backend returns hit fields as loosely typed JSON: every field is a
//! list, and the scripted `vector` field wraps its array in one more list.
//! Decoding checks arity and types field by field instead of trusting shape.

use serde_json::{Map, Value};

use crate::DecodeError;

/// Name of the scripted field carrying the per-document feature vector.
pub const VECTOR_FIELD: &str = "vector";

pub const POSITIVE: f64 = 1.0;
pub const NEGATIVE: f64 = 0.0;

/// A binary label plus a feature vector aligned with the vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub label: f64,
    pub features: Vec<f64>,
}

/// Collapses raw label values to the binary labels the model trains on.
///
/// The designated token maps to [`POSITIVE`]; every other token maps to
/// [`NEGATIVE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMapping {
    positive: String,
}

impl LabelMapping {
    pub fn new(positive: impl Into<String>) -> Self {
        Self {
            positive: positive.into(),
        }
    }

    pub fn positive_token(&self) -> &str {
        &self.positive
    }

    pub fn label_of(&self, token: &str) -> f64 {
        if token == self.positive {
            POSITIVE
        } else {
            NEGATIVE
        }
    }
}

impl Default for LabelMapping {
    fn default() -> Self {
        Self::new("positive")
    }
}

/// Decodes hit `fields` into training examples for a vocabulary of `dim` terms.
#[derive(Debug, Clone)]
pub struct HitDecoder {
    label_field: String,
    mapping: LabelMapping,
    dim: usize,
}

impl HitDecoder {
    pub fn new(label_field: impl Into<String>, mapping: LabelMapping, dim: usize) -> Self {
        Self {
            label_field: label_field.into(),
            mapping,
            dim,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Decode one hit's `fields` object.
    pub fn decode(&self, fields: &Map<String, Value>) -> Result<TrainingExample, DecodeError> {
        let label = self.decode_label(fields)?;
        let features = self.decode_vector(fields)?;
        Ok(TrainingExample { label, features })
    }

    /// Expects `[<token>]`.
    fn decode_label(&self, fields: &Map<String, Value>) -> Result<f64, DecodeError> {
        let value = single(fields, &self.label_field)?;
        let token = value.as_str().ok_or_else(|| DecodeError::Type {
            field: self.label_field.clone(),
            expected: "a string",
        })?;
        Ok(self.mapping.label_of(token))
    }

    /// Expects `[[w0, w1, ...]]`; unwraps exactly one level.
    fn decode_vector(&self, fields: &Map<String, Value>) -> Result<Vec<f64>, DecodeError> {
        let inner = single(fields, VECTOR_FIELD)?;
        let weights = inner.as_array().ok_or_else(|| DecodeError::Type {
            field: VECTOR_FIELD.to_string(),
            expected: "a numeric array",
        })?;
        if weights.len() != self.dim {
            return Err(DecodeError::Length {
                expected: self.dim,
                found: weights.len(),
            });
        }

        weights
            .iter()
            .enumerate()
            .map(|(index, w)| match w.as_f64() {
                Some(x) if x.is_finite() && x >= 0.0 => Ok(x),
                _ => Err(DecodeError::BadWeight { index }),
            })
            .collect()
    }
}

/// The only element of a single-valued list field.
fn single<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<&'a Value, DecodeError> {
    let value = fields
        .get(name)
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))?;
    let list = value.as_array().ok_or_else(|| DecodeError::Type {
        field: name.to_string(),
        expected: "a list",
    })?;
    match list.as_slice() {
        [only] => Ok(only),
        other => Err(DecodeError::Arity {
            field: name.to_string(),
            found: other.len(),
        }),
    }
}
