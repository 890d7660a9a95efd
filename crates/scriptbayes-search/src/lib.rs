//! Search engine side of scriptbayes: significant-terms vocabulary selection,
//! scripted vectorization over scrolls, template publishing, and query-time
//! classification.

pub mod backend;
pub mod classify;
pub mod client;
mod error;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod publish;
pub mod vectorize;
pub mod vocabulary;

pub use backend::{SearchBackend, SearchResponse, StoredScript};
pub use classify::{Classified, LabelCount, Prediction, classify};
pub use client::{ClientConfig, EsClient};
pub use error::SearchError;
pub use publish::{fetch_template, publish};
pub use vectorize::{Vectorized, vectorize};
pub use vocabulary::select_vocabulary;
