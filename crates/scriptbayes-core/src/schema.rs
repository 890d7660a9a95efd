/// Arrow layout of a vectorized dataset.
///
/// One row per document: `label` (Float64) and `features`
/// (FixedSizeList<Float64, F>). The fixed list size pins every vector to the
/// vocabulary length.
pub mod dataset {
    use std::sync::Arc;

    use arrow::array::{Array, FixedSizeListArray, FixedSizeListBuilder, Float64Array, Float64Builder};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::error::ArrowError;
    use arrow::record_batch::RecordBatch;

    use crate::TrainingExample;

    pub const LABEL_COLUMN: &str = "label";
    pub const FEATURES_COLUMN: &str = "features";

    /// Schema for a dataset over a vocabulary of `dim` terms.
    pub fn schema(dim: usize) -> Result<Schema, ArrowError> {
        let size = list_size(dim)?;
        Ok(Schema::new(vec![
            Field::new(LABEL_COLUMN, DataType::Float64, false),
            Field::new(
                FEATURES_COLUMN,
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float64, true)),
                    size,
                ),
                false,
            ),
        ]))
    }

    /// Arrow list sizes are `i32`.
    fn list_size(dim: usize) -> Result<i32, ArrowError> {
        i32::try_from(dim).map_err(|_| {
            ArrowError::InvalidArgumentError(format!(
                "vocabulary of {dim} terms exceeds the fixed-size list limit of {}",
                i32::MAX
            ))
        })
    }

    /// Pack examples into one batch. Fails if any vector is not `dim` long.
    pub fn to_batch(examples: &[TrainingExample], dim: usize) -> Result<RecordBatch, ArrowError> {
        let schema = schema(dim)?;
        let mut labels = Float64Builder::with_capacity(examples.len());
        let mut features = FixedSizeListBuilder::with_capacity(
            Float64Builder::with_capacity(examples.len() * dim),
            list_size(dim)?,
            examples.len(),
        );

        for (row, example) in examples.iter().enumerate() {
            if example.features.len() != dim {
                return Err(ArrowError::InvalidArgumentError(format!(
                    "row {row}: vector has {} entries, expected {dim}",
                    example.features.len()
                )));
            }
            labels.append_value(example.label);
            features.values().append_slice(&example.features);
            features.append(true);
        }

        RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(labels.finish()), Arc::new(features.finish())],
        )
    }

    /// Unpack a batch back into examples.
    pub fn to_examples(batch: &RecordBatch) -> Result<Vec<TrainingExample>, ArrowError> {
        let labels = batch
            .column_by_name(LABEL_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .ok_or_else(|| ArrowError::SchemaError(format!("missing Float64 '{LABEL_COLUMN}'")))?;
        let features = batch
            .column_by_name(FEATURES_COLUMN)
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| {
                ArrowError::SchemaError(format!("missing FixedSizeList '{FEATURES_COLUMN}'"))
            })?;

        (0..batch.num_rows())
            .map(|row| {
                let vector = features.value(row);
                let values = vector
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| ArrowError::SchemaError("feature values are not Float64".into()))?;
                Ok(TrainingExample {
                    label: labels.value(row),
                    features: values.values().to_vec(),
                })
            })
            .collect()
    }
}
