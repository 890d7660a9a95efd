//! Training layer: weighted train/test split, multinomial naive Bayes, held-out accuracy.

mod error;
pub mod evaluate;
pub mod naive_bayes;
pub mod split;

pub use error::TrainError;
pub use evaluate::{Evaluation, accuracy, predict_batch};
pub use naive_bayes::NaiveBayes;
pub use split::{Split, random_split, train_test_split};

use arrow::record_batch::RecordBatch;
use rand::SeedableRng;
use rand::rngs::StdRng;
use scriptbayes_core::{ClassifierModel, TrainConfig};
use tracing::info;

/// Split, fit on the train partition, score on the test partition.
pub struct Trainer {
    smoothing: f64,
    split_weights: Vec<f64>,
    seed: Option<u64>,
}

/// A fitted model and how it did on held-out data.
pub struct TrainedModel {
    pub model: ClassifierModel,
    pub evaluation: Evaluation,
}

impl Trainer {
    pub fn new(smoothing: f64, split_weights: Vec<f64>, seed: Option<u64>) -> Self {
        Self {
            smoothing,
            split_weights,
            seed,
        }
    }

    pub fn from_config(config: &TrainConfig) -> Self {
        Self::new(config.smoothing, config.split_weights.clone(), config.seed)
    }

    /// Run on a full vectorized dataset.
    ///
    /// Unseeded trainers split differently on every call.
    pub fn run(&self, dataset: &RecordBatch) -> Result<TrainedModel, TrainError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let Split { train, test } = train_test_split(dataset, &self.split_weights, &mut rng)?;
        info!(
            train = train.num_rows(),
            test = test.num_rows(),
            "split dataset"
        );
        if test.num_rows() == 0 {
            return Err(TrainError::EmptyTestSet);
        }

        let model = NaiveBayes::new(self.smoothing).fit(&train)?;
        let pairs = predict_batch(&model, &test)?;
        let evaluation = Evaluation {
            train_count: train.num_rows(),
            test_count: test.num_rows(),
            correct: evaluate::correct_count(&pairs),
            accuracy: accuracy(&pairs)?,
        };
        info!(
            accuracy = evaluation.accuracy,
            correct = evaluation.correct,
            test = evaluation.test_count,
            "evaluated classifier"
        );

        Ok(TrainedModel { model, evaluation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptbayes_core::{TrainingExample, dataset};

    fn separable(n: usize) -> RecordBatch {
        let examples: Vec<TrainingExample> = (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    TrainingExample {
                        label: 1.0,
                        features: vec![0.0, 3.0, 1.0],
                    }
                } else {
                    TrainingExample {
                        label: 0.0,
                        features: vec![4.0, 0.0, 1.0],
                    }
                }
            })
            .collect();
        dataset::to_batch(&examples, 3).unwrap()
    }

    #[test]
    fn run_reports_partition_sizes_and_accuracy() {
        let trainer = Trainer::new(1.0, vec![1.0, 1.0], Some(42));
        let trained = trainer.run(&separable(100)).unwrap();
        let eval = trained.evaluation;
        assert_eq!(eval.train_count + eval.test_count, 100);
        assert_eq!(eval.accuracy, 1.0);
        assert_eq!(eval.correct, eval.test_count);
        assert_eq!(trained.model.num_features(), 3);
    }

    #[test]
    fn empty_test_partition_fails() {
        let trainer = Trainer::new(1.0, vec![1.0, 0.0], Some(1));
        assert!(matches!(
            trainer.run(&separable(20)),
            Err(TrainError::EmptyTestSet)
        ));
    }

    #[test]
    fn from_config_uses_split_and_seed() {
        let config = TrainConfig {
            seed: Some(9),
            ..Default::default()
        };
        let a = Trainer::from_config(&config).run(&separable(60)).unwrap();
        let b = Trainer::from_config(&config).run(&separable(60)).unwrap();
        assert_eq!(a.evaluation, b.evaluation);
        assert_eq!(a.model, b.model);
    }
}
