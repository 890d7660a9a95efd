//! Trained multinomial naive Bayes parameters and the decision rule.

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Number of classes the binary classifier carries.
pub const NUM_LABELS: usize = 2;

/// Per-class log priors and per-class per-feature log likelihoods.
///
/// `labels[i]`, `pi[i]`, and `theta[i]` always describe the same class.
/// Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    labels: Vec<f64>,
    pi: Vec<f64>,
    theta: Vec<Vec<f64>>,
}

impl ClassifierModel {
    /// Assemble a model, checking that all three arrays agree in shape.
    pub fn new(labels: Vec<f64>, pi: Vec<f64>, theta: Vec<Vec<f64>>) -> Result<Self, ModelError> {
        if labels.len() != NUM_LABELS {
            return Err(ModelError::LabelCount {
                expected: NUM_LABELS,
                found: labels.len(),
            });
        }
        for (i, a) in labels.iter().enumerate() {
            if labels[..i].contains(a) {
                return Err(ModelError::DuplicateLabel(*a));
            }
        }
        if pi.len() != labels.len() {
            return Err(ModelError::PriorCount {
                expected: labels.len(),
                found: pi.len(),
            });
        }
        if theta.len() != labels.len() {
            return Err(ModelError::ThetaRows {
                rows: theta.len(),
                labels: labels.len(),
            });
        }
        let width = theta[0].len();
        if width == 0 {
            return Err(ModelError::EmptyVocabulary);
        }
        for (row, values) in theta.iter().enumerate() {
            if values.len() != width {
                return Err(ModelError::ThetaColumns {
                    row,
                    expected: width,
                    found: values.len(),
                });
            }
        }
        Ok(Self { labels, pi, theta })
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn pi(&self) -> &[f64] {
        &self.pi
    }

    pub fn theta(&self) -> &[Vec<f64>] {
        &self.theta
    }

    /// Width of every `theta` row.
    pub fn num_features(&self) -> usize {
        self.theta[0].len()
    }

    /// `pi[i] + theta[i] · v` for every class, in label order.
    pub fn scores(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        if features.len() != self.num_features() {
            return Err(ModelError::VectorLength {
                expected: self.num_features(),
                found: features.len(),
            });
        }
        Ok(self
            .pi
            .iter()
            .zip(&self.theta)
            .map(|(prior, row)| prior + dot(row, features))
            .collect())
    }

    /// Label with the highest score. Ties go to the lower index.
    pub fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        let scores = self.scores(features)?;
        let mut best = 0;
        for (i, &score) in scores.iter().enumerate().skip(1) {
            if score > scores[best] {
                best = i;
            }
        }
        Ok(self.labels[best])
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ClassifierModel {
        // Class 0.0 favours feature 0, class 1.0 favours feature 1.
        ClassifierModel::new(
            vec![0.0, 1.0],
            vec![0.5f64.ln(), 0.5f64.ln()],
            vec![
                vec![0.8f64.ln(), 0.2f64.ln()],
                vec![0.2f64.ln(), 0.8f64.ln()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn predict_follows_argmax_of_prior_plus_dot() {
        let m = model();
        assert_eq!(m.predict(&[5.0, 1.0]).unwrap(), 0.0);
        assert_eq!(m.predict(&[1.0, 5.0]).unwrap(), 1.0);
    }

    #[test]
    fn ties_resolve_to_first_label() {
        let m = model();
        assert_eq!(m.predict(&[2.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn prior_breaks_even_evidence() {
        let m = ClassifierModel::new(
            vec![0.0, 1.0],
            vec![0.1f64.ln(), 0.9f64.ln()],
            vec![vec![0.5f64.ln()], vec![0.5f64.ln()]],
        )
        .unwrap();
        assert_eq!(m.predict(&[3.0]).unwrap(), 1.0);
    }

    #[test]
    fn wrong_vector_length_rejected() {
        assert_eq!(
            model().predict(&[1.0]).unwrap_err(),
            ModelError::VectorLength {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn shape_mismatches_rejected() {
        assert!(matches!(
            ClassifierModel::new(vec![0.0], vec![0.0], vec![vec![0.0]]),
            Err(ModelError::LabelCount { .. })
        ));
        assert!(matches!(
            ClassifierModel::new(vec![0.0, 0.0], vec![0.0, 0.0], vec![vec![0.0], vec![0.0]]),
            Err(ModelError::DuplicateLabel(_))
        ));
        assert!(matches!(
            ClassifierModel::new(vec![0.0, 1.0], vec![0.0], vec![vec![0.0], vec![0.0]]),
            Err(ModelError::PriorCount { .. })
        ));
        assert!(matches!(
            ClassifierModel::new(vec![0.0, 1.0], vec![0.0, 0.0], vec![vec![0.0]]),
            Err(ModelError::ThetaRows { .. })
        ));
        assert!(matches!(
            ClassifierModel::new(
                vec![0.0, 1.0],
                vec![0.0, 0.0],
                vec![vec![0.0, 1.0], vec![0.0]]
            ),
            Err(ModelError::ThetaColumns { row: 1, .. })
        ));
    }
}
