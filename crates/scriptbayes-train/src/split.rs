//! Weighted random partitioning of a dataset batch.
//!
//! Each row draws one uniform number and lands in the partition whose
//! normalized cumulative weight range contains it. Rows are then selected
//! with one boolean mask per partition, so partitions are disjoint and cover
//! every row. Without a fixed seed the assignment changes from run to run.

use arrow::array::BooleanArray;
use arrow::compute::filter_record_batch;
use arrow::record_batch::RecordBatch;
use rand::Rng;

use crate::TrainError;

/// Train and test partitions of one dataset.
pub struct Split {
    pub train: RecordBatch,
    pub test: RecordBatch,
}

/// Split `batch` into `[train, test]` using `weights = [train_weight, test_weight]`.
pub fn train_test_split<R: Rng + ?Sized>(
    batch: &RecordBatch,
    weights: &[f64],
    rng: &mut R,
) -> Result<Split, TrainError> {
    if weights.len() != 2 {
        return Err(TrainError::SplitWeights(format!(
            "expected 2 weights, got {}",
            weights.len()
        )));
    }
    let mut parts = random_split(batch, weights, rng)?.into_iter();
    match (parts.next(), parts.next()) {
        (Some(train), Some(test)) => Ok(Split { train, test }),
        _ => Err(TrainError::SplitWeights("split produced too few partitions".into())),
    }
}

/// Split `batch` into one partition per weight.
pub fn random_split<R: Rng + ?Sized>(
    batch: &RecordBatch,
    weights: &[f64],
    rng: &mut R,
) -> Result<Vec<RecordBatch>, TrainError> {
    let bounds = cumulative_bounds(weights)?;
    let last = bounds.len() - 1;

    let assignment: Vec<usize> = (0..batch.num_rows())
        .map(|_| {
            let x: f64 = rng.random();
            bounds.iter().position(|&upper| x < upper).unwrap_or(last)
        })
        .collect();

    (0..bounds.len())
        .map(|part| {
            let mask: BooleanArray = assignment.iter().map(|&a| Some(a == part)).collect();
            Ok(filter_record_batch(batch, &mask)?)
        })
        .collect()
}

/// Upper bound of each partition's range within `[0, 1)`.
fn cumulative_bounds(weights: &[f64]) -> Result<Vec<f64>, TrainError> {
    if weights.is_empty() {
        return Err(TrainError::SplitWeights("no weights given".into()));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(TrainError::SplitWeights(
            "weights must be finite and non-negative".into(),
        ));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(TrainError::SplitWeights("weights sum to zero".into()));
    }

    let mut acc = 0.0;
    Ok(weights
        .iter()
        .map(|w| {
            acc += w / total;
            acc
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use scriptbayes_core::{TrainingExample, dataset};

    fn batch(n: usize) -> RecordBatch {
        // Feature 0 carries the row number so rows can be told apart.
        let examples: Vec<TrainingExample> = (0..n)
            .map(|i| TrainingExample {
                label: (i % 2) as f64,
                features: vec![i as f64, 1.0],
            })
            .collect();
        dataset::to_batch(&examples, 2).unwrap()
    }

    fn row_ids(batch: &RecordBatch) -> Vec<usize> {
        dataset::to_examples(batch)
            .unwrap()
            .iter()
            .map(|e| e.features[0] as usize)
            .collect()
    }

    #[test]
    fn split_is_a_partition() {
        let data = batch(200);
        for (seed, weights) in [(1, [1.0, 2.0]), (2, [3.0, 1.0]), (3, [1.0, 1.0])] {
            let mut rng = StdRng::seed_from_u64(seed);
            let split = train_test_split(&data, &weights, &mut rng).unwrap();
            assert_eq!(split.train.num_rows() + split.test.num_rows(), 200);

            let mut all = row_ids(&split.train);
            all.extend(row_ids(&split.test));
            all.sort_unstable();
            assert_eq!(all, (0..200).collect::<Vec<_>>(), "rows lost or duplicated");
        }
    }

    #[test]
    fn weights_shape_partition_sizes() {
        let data = batch(3000);
        let mut rng = StdRng::seed_from_u64(7);
        let split = train_test_split(&data, &[1.0, 2.0], &mut rng).unwrap();
        let train_share = split.train.num_rows() as f64 / 3000.0;
        assert!((train_share - 1.0 / 3.0).abs() < 0.05, "train share {train_share}");
    }

    #[test]
    fn zero_weight_partition_is_empty() {
        let data = batch(50);
        let mut rng = StdRng::seed_from_u64(11);
        let split = train_test_split(&data, &[1.0, 0.0], &mut rng).unwrap();
        assert_eq!(split.train.num_rows(), 50);
        assert_eq!(split.test.num_rows(), 0);
    }

    #[test]
    fn same_seed_same_split() {
        let data = batch(100);
        let a = train_test_split(&data, &[1.0, 2.0], &mut StdRng::seed_from_u64(5)).unwrap();
        let b = train_test_split(&data, &[1.0, 2.0], &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(row_ids(&a.train), row_ids(&b.train));
    }

    #[test]
    fn more_than_two_partitions() {
        let data = batch(90);
        let parts = random_split(&data, &[1.0, 1.0, 1.0], &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.iter().map(|p| p.num_rows()).sum::<usize>(), 90);
    }

    #[test]
    fn bad_weights_rejected() {
        let data = batch(10);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(train_test_split(&data, &[0.0, 0.0], &mut rng).is_err());
        assert!(train_test_split(&data, &[-1.0, 2.0], &mut rng).is_err());
        assert!(train_test_split(&data, &[1.0], &mut rng).is_err());
    }
}
