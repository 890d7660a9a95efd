//! Training run parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ScriptRef, TEMPLATE_ID};

/// Term significance score used when picking features per class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceHeuristic {
    /// Foreground/background frequency ratio weighted by absolute change.
    #[default]
    Jlh,
    ChiSquare,
    Gnd,
    MutualInformation,
}

impl SignificanceHeuristic {
    /// Name the aggregation engine expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jlh => "jlh",
            Self::ChiSquare => "chi_square",
            Self::Gnd => "gnd",
            Self::MutualInformation => "mutual_information",
        }
    }
}

impl fmt::Display for SignificanceHeuristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignificanceHeuristic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "jlh" => Ok(Self::Jlh),
            "chi_square" => Ok(Self::ChiSquare),
            "gnd" => Ok(Self::Gnd),
            "mutual_information" => Ok(Self::MutualInformation),
            other => Err(format!(
                "unknown heuristic '{other}' (expected jlh, chi-square, gnd, mutual-information)"
            )),
        }
    }
}

/// Everything a training run needs besides the backend connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub index: String,
    pub label_field: String,
    pub text_field: String,
    /// Total vocabulary size requested; each class contributes half.
    pub num_features: usize,
    pub positive_label: String,
    /// Laplace smoothing.
    pub smoothing: f64,
    /// Relative weights of the train and test partitions.
    pub split_weights: Vec<f64>,
    pub seed: Option<u64>,
    /// Largest tolerated share of malformed documents.
    pub max_malformed_ratio: f64,
    pub page_size: usize,
    pub heuristic: SignificanceHeuristic,
    pub template_id: String,
    pub vector_script: ScriptRef,
    pub model_script: ScriptRef,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            index: "movie-reviews".into(),
            label_field: "label".into(),
            text_field: "text".into(),
            num_features: 200,
            positive_label: "positive".into(),
            smoothing: 1.0,
            split_weights: vec![1.0, 2.0],
            seed: None,
            max_malformed_ratio: 0.05,
            page_size: 500,
            heuristic: SignificanceHeuristic::Jlh,
            template_id: TEMPLATE_ID.into(),
            vector_script: ScriptRef::new("native", "vector"),
            model_script: ScriptRef::new("native", "nb_model"),
        }
    }
}

impl TrainConfig {
    /// Terms requested from each class bucket.
    pub fn terms_per_class(&self) -> usize {
        self.num_features / 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("index", &self.index),
            ("label_field", &self.label_field),
            ("text_field", &self.text_field),
            ("positive_label", &self.positive_label),
            ("template_id", &self.template_id),
            ("vector_script", &self.vector_script.source),
            ("model_script", &self.model_script.source),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if self.num_features < 2 {
            return Err(invalid("num_features", "need at least one term per class"));
        }
        if !self.smoothing.is_finite() || self.smoothing <= 0.0 {
            return Err(invalid("smoothing", "must be a positive number"));
        }
        if self.split_weights.len() != 2 {
            return Err(invalid("split_weights", "expected a train and a test weight"));
        }
        if self
            .split_weights
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(invalid("split_weights", "weights must be finite and non-negative"));
        }
        if self.split_weights.iter().sum::<f64>() <= 0.0 {
            return Err(invalid("split_weights", "weights must not sum to zero"));
        }
        if !(0.0..=1.0).contains(&self.max_malformed_ratio) {
            return Err(invalid("max_malformed_ratio", "must lie in [0, 1]"));
        }
        if self.page_size == 0 {
            return Err(invalid("page_size", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
