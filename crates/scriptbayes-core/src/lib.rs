pub mod config;
mod error;
pub mod example;
pub mod model;
pub mod schema;
pub mod template;
pub mod vocabulary;

pub use config::{SignificanceHeuristic, TrainConfig};
pub use error::{ConfigError, DecodeError, ModelError};
pub use example::{HitDecoder, LabelMapping, TrainingExample};
pub use model::ClassifierModel;
pub use schema::dataset;
pub use template::{InferenceTemplate, ModelParams, ScriptRef, TEMPLATE_ID};
pub use vocabulary::FeatureVocabulary;
