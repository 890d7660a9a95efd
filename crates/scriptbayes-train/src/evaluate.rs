//! Held-out evaluation.

use arrow::record_batch::RecordBatch;
use scriptbayes_core::{ClassifierModel, dataset};

use crate::TrainError;

/// Held-out accuracy of a trained model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub train_count: usize,
    pub test_count: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// `(predicted, actual)` for every row of `test`.
pub fn predict_batch(
    model: &ClassifierModel,
    test: &RecordBatch,
) -> Result<Vec<(f64, f64)>, TrainError> {
    dataset::to_examples(test)?
        .iter()
        .map(|e| Ok((model.predict(&e.features)?, e.label)))
        .collect()
}

/// Share of pairs whose prediction equals the label.
pub fn accuracy(pairs: &[(f64, f64)]) -> Result<f64, TrainError> {
    if pairs.is_empty() {
        return Err(TrainError::EmptyTestSet);
    }
    Ok(correct_count(pairs) as f64 / pairs.len() as f64)
}

pub(crate) fn correct_count(pairs: &[(f64, f64)]) -> usize {
    pairs.iter().filter(|(p, l)| p == l).count()
}
