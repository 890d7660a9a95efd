//! Multinomial naive Bayes with Laplace smoothing.
//!
//! With `K` classes, `F` features, `N` training rows, `n_i` rows of class
//! `i`, and `S_ij` the summed weight of feature `j` over class `i`:
//!
//! ```text
//! pi[i]       = ln(n_i + λ) − ln(N + K·λ)
//! theta[i][j] = ln(S_ij + λ) − ln(Σ_j S_ij + F·λ)
//! ```
//!
//! Labels are sorted ascending; row `i` of every output array belongs to
//! `labels[i]`.

use arrow::record_batch::RecordBatch;
use scriptbayes_core::model::NUM_LABELS;
use scriptbayes_core::{ClassifierModel, TrainingExample, dataset};
use tracing::debug;

use crate::TrainError;

/// Running totals for one class.
struct ClassStats {
    label: f64,
    count: usize,
    sums: Vec<f64>,
}

pub struct NaiveBayes {
    smoothing: f64,
}

impl NaiveBayes {
    pub fn new(smoothing: f64) -> Self {
        Self { smoothing }
    }

    /// Fit on a dataset batch (see [`dataset::schema`]).
    pub fn fit(&self, train: &RecordBatch) -> Result<ClassifierModel, TrainError> {
        let examples = dataset::to_examples(train)?;
        self.fit_examples(&examples)
    }

    pub fn fit_examples(&self, examples: &[TrainingExample]) -> Result<ClassifierModel, TrainError> {
        let dim = match examples.first() {
            Some(first) => first.features.len(),
            None => return Err(TrainError::EmptyTrainingSet),
        };

        let mut classes: Vec<ClassStats> = Vec::new();
        for (row, example) in examples.iter().enumerate() {
            if example.features.len() != dim {
                return Err(TrainError::Model(scriptbayes_core::ModelError::VectorLength {
                    expected: dim,
                    found: example.features.len(),
                }));
            }
            if example.features.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(TrainError::NegativeFeature { row });
            }

            let idx = match classes.iter().position(|c| c.label == example.label) {
                Some(idx) => idx,
                None => {
                    classes.push(ClassStats {
                        label: example.label,
                        count: 0,
                        sums: vec![0.0; dim],
                    });
                    classes.len() - 1
                }
            };
            let stats = &mut classes[idx];
            stats.count += 1;
            for (acc, &w) in stats.sums.iter_mut().zip(&example.features) {
                *acc += w;
            }
        }

        if classes.len() != NUM_LABELS {
            return Err(TrainError::MissingClass {
                found: classes.len(),
            });
        }
        classes.sort_by(|a, b| a.label.total_cmp(&b.label));

        let lambda = self.smoothing;
        let num_docs = examples.len() as f64;
        let pi_log_denom = (num_docs + classes.len() as f64 * lambda).ln();

        let mut labels = Vec::with_capacity(classes.len());
        let mut pi = Vec::with_capacity(classes.len());
        let mut theta = Vec::with_capacity(classes.len());
        for class in &classes {
            let total: f64 = class.sums.iter().sum();
            let theta_log_denom = (total + dim as f64 * lambda).ln();

            labels.push(class.label);
            pi.push((class.count as f64 + lambda).ln() - pi_log_denom);
            theta.push(
                class
                    .sums
                    .iter()
                    .map(|s| (s + lambda).ln() - theta_log_denom)
                    .collect(),
            );
            debug!(label = class.label, docs = class.count, weight = total, "class totals");
        }

        Ok(ClassifierModel::new(labels, pi, theta)?)
    }
}
