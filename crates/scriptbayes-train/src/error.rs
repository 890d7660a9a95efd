use scriptbayes_core::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("test partition is empty, accuracy is undefined")]
    EmptyTestSet,

    #[error("training partition is empty")]
    EmptyTrainingSet,

    #[error("training partition holds {found} distinct label(s), need 2")]
    MissingClass { found: usize },

    #[error("row {row} has a negative or non-finite feature weight")]
    NegativeFeature { row: usize },

    #[error("invalid split weights: {0}")]
    SplitWeights(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}
