//! Query-time classification through the stored template.

use scriptbayes_core::template::{PREDICTED_LABEL, TERMS_AGGREGATION};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::backend::SearchBackend;
use crate::SearchError;

/// The engine's prediction for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: String,
    /// `None` when the hit carried no `predicted_label`.
    pub label: Option<f64>,
    pub source: Option<Value>,
}

/// How many documents the engine put in each predicted class.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelCount {
    pub key: f64,
    pub doc_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Classified {
    pub predictions: Vec<Prediction>,
    pub counts: Vec<LabelCount>,
}

#[derive(Deserialize)]
struct CountBuckets {
    #[serde(default)]
    buckets: Vec<CountBucket>,
}

/// Scripted `terms` buckets come back keyed by string (`"1.0"`) unless the
/// script declares a numeric value type, so both forms are accepted.
#[derive(Deserialize)]
struct CountBucket {
    key: Value,
    #[serde(default)]
    key_as_string: Option<String>,
    #[serde(default)]
    doc_count: u64,
}

impl CountBucket {
    fn label(&self) -> Option<f64> {
        if let Some(text) = &self.key_as_string
            && let Ok(label) = text.trim().parse()
        {
            return Some(label);
        }
        match &self.key {
            Value::Number(n) => n.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

fn label_counts(agg: &Value) -> Result<Vec<LabelCount>, SearchError> {
    let parsed: CountBuckets = serde_json::from_value(agg.clone())?;
    Ok(parsed
        .buckets
        .into_iter()
        .filter_map(|bucket| match bucket.label() {
            Some(key) => Some(LabelCount {
                key,
                doc_count: bucket.doc_count,
            }),
            None => {
                warn!(key = %bucket.key, "ignoring non-numeric label bucket");
                None
            }
        })
        .collect())
}

/// Invoke template `template_id` on `index`, binding its field parameter to
/// `field`.
pub async fn classify<B: SearchBackend + ?Sized>(
    backend: &B,
    index: &str,
    template_id: &str,
    field: &str,
) -> Result<Classified, SearchError> {
    info!(index, template_id, field, "classifying with stored template");
    let resp = backend
        .search_template(index, template_id, &json!({ "field": field }))
        .await?;

    let predictions: Vec<Prediction> = resp
        .hits
        .hits
        .into_iter()
        .map(|hit| Prediction {
            label: hit
                .fields
                .get(PREDICTED_LABEL)
                .and_then(|v| v.get(0))
                .and_then(Value::as_f64),
            id: hit.id,
            source: hit.source,
        })
        .collect();

    let counts = match resp
        .aggregations
        .as_ref()
        .and_then(|a| a.get(TERMS_AGGREGATION))
    {
        Some(agg) => label_counts(agg)?,
        None => Vec::new(),
    };
    debug!(hits = predictions.len(), buckets = counts.len(), "template response");
    Ok(Classified {
        predictions,
        counts,
    })
}
