use thiserror::Error;

/// Shape and contract violations in vocabularies, models, and templates.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("feature vocabulary is empty")]
    EmptyVocabulary,

    #[error("duplicate feature term: {0}")]
    DuplicateTerm(String),

    #[error("expected {expected} labels, found {found}")]
    LabelCount { expected: usize, found: usize },

    #[error("labels must be distinct, found {0} twice")]
    DuplicateLabel(f64),

    #[error("expected {expected} priors, found {found}")]
    PriorCount { expected: usize, found: usize },

    #[error("thetas has {rows} rows, expected one per label ({labels})")]
    ThetaRows { rows: usize, labels: usize },

    #[error("thetas row {row} has {found} columns, expected {expected}")]
    ThetaColumns {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("non-finite value in `{param}`")]
    NonFinite { param: &'static str },

    #[error("template is missing parameter `{0}`")]
    MissingParam(&'static str),

    #[error("template parameter `{param}` is malformed: {reason}")]
    MalformedParam {
        param: &'static str,
        reason: String,
    },

    #[error("template is missing `{0}`")]
    MissingSection(&'static str),

    #[error("feature vector has {found} entries, vocabulary has {expected}")]
    VectorLength { expected: usize, found: usize },

    #[error("model has {columns} feature columns, vocabulary has {vocabulary} terms")]
    VocabularyMismatch { vocabulary: usize, columns: usize },
}

/// Why a single search hit could not become a [`TrainingExample`](crate::TrainingExample).
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("field `{field}` should hold exactly one value, found {found}")]
    Arity { field: String, found: usize },

    #[error("field `{field}` is not {expected}")]
    Type {
        field: String,
        expected: &'static str,
    },

    #[error("vector has {found} entries, vocabulary has {expected}")]
    Length { expected: usize, found: usize },

    #[error("vector entry {index} is not a finite non-negative number")]
    BadWeight { index: usize },
}

/// Rejected training configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
