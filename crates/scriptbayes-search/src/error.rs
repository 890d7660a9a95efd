use scriptbayes_core::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search backend unavailable: {0}")]
    BackendUnavailable(#[from] reqwest::Error),

    #[error("search backend returned {status}: {body}")]
    BackendRejected { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected two label buckets, found {found}")]
    InsufficientClasses { found: usize },

    #[error("{skipped} of {scanned} documents were malformed, above the {max_ratio} limit")]
    DataQuality {
        skipped: usize,
        scanned: usize,
        max_ratio: f64,
    },

    #[error("index '{index}' returned no documents")]
    EmptyCollection { index: String },

    #[error("template store rejected '{id}' with {status}: {body}")]
    Publish { id: String, status: u16, body: String },

    #[error("no stored template '{0}'")]
    TemplateNotFound(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl SearchError {
    /// Transport failures and non-2xx search responses both mean the backend
    /// could not serve the request.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::BackendRejected { .. })
    }
}
