//! Feature vocabulary selection from per-class significant terms.
//!
//! One aggregation request buckets the collection by label and, inside each
//! bucket, asks for the terms of the text field that are most significant
//! against the whole collection. The two buckets' term lists are merged in
//! order with repeats dropped.

use scriptbayes_core::{FeatureVocabulary, SignificanceHeuristic, TrainConfig};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::backend::SearchBackend;
use crate::SearchError;

const CLASSES_AGG: &str = "classes";
const FEATURES_AGG: &str = "features";

#[derive(Debug, Deserialize)]
struct ClassAggregations {
    classes: Buckets<LabelBucket>,
}

#[derive(Debug, Deserialize)]
struct Buckets<T> {
    #[serde(default = "Vec::new")]
    buckets: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct LabelBucket {
    key: Value,
    doc_count: u64,
    features: Buckets<TermBucket>,
}

/// One significant term as scored by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct TermBucket {
    pub key: String,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub bg_count: u64,
}

/// Significant terms found for one label value.
#[derive(Debug, Clone)]
pub struct ClassTerms {
    pub label: String,
    pub doc_count: u64,
    pub terms: Vec<TermBucket>,
}

/// Aggregation body: label buckets with per-bucket significant terms.
pub fn aggregation_body(
    label_field: &str,
    text_field: &str,
    terms_per_class: usize,
    heuristic: SignificanceHeuristic,
) -> Value {
    json!({
        "size": 0,
        "aggs": {
            CLASSES_AGG: {
                "terms": { "field": label_field },
                "aggs": {
                    FEATURES_AGG: {
                        "significant_terms": {
                            "field": text_field,
                            "size": terms_per_class,
                            heuristic.as_str(): {},
                        }
                    }
                }
            }
        }
    })
}

/// Run the aggregation and return the significant terms of each label bucket,
/// in the order the engine returned the buckets.
pub async fn significant_terms<B: SearchBackend + ?Sized>(
    backend: &B,
    config: &TrainConfig,
) -> Result<Vec<ClassTerms>, SearchError> {
    let body = aggregation_body(
        &config.label_field,
        &config.text_field,
        config.terms_per_class(),
        config.heuristic,
    );
    let resp = backend.search(&config.index, &body, None).await?;
    let aggs = resp.aggregations.ok_or_else(|| {
        SearchError::Json(<serde_json::Error as serde::de::Error>::missing_field(
            "aggregations",
        ))
    })?;
    let parsed: ClassAggregations = serde_json::from_value(aggs)?;

    Ok(parsed
        .classes
        .buckets
        .into_iter()
        .map(|b| ClassTerms {
            label: match b.key {
                Value::String(s) => s,
                other => other.to_string(),
            },
            doc_count: b.doc_count,
            terms: b.features.buckets,
        })
        .collect())
}

/// Select the feature vocabulary for a training run.
///
/// Only the first two label buckets are used. Fewer than two is an error.
pub async fn select_vocabulary<B: SearchBackend + ?Sized>(
    backend: &B,
    config: &TrainConfig,
) -> Result<FeatureVocabulary, SearchError> {
    info!(
        index = %config.index,
        label_field = %config.label_field,
        text_field = %config.text_field,
        features = config.num_features,
        heuristic = %config.heuristic,
        "selecting feature vocabulary"
    );
    let classes = significant_terms(backend, config).await?;
    if classes.len() < 2 {
        return Err(SearchError::InsufficientClasses {
            found: classes.len(),
        });
    }
    if classes.len() > 2 {
        warn!(
            found = classes.len(),
            ignored = ?classes[2..].iter().map(|c| c.label.as_str()).collect::<Vec<_>>(),
            "more than two label buckets, using the first two"
        );
    }

    for class in &classes[..2] {
        debug!(
            label = %class.label,
            docs = class.doc_count,
            terms = class.terms.len(),
            top = ?class.terms.iter().take(5).map(|t| t.key.as_str()).collect::<Vec<_>>(),
            "significant terms"
        );
    }

    let vocab = FeatureVocabulary::merge(
        classes[..2]
            .iter()
            .flat_map(|c| c.terms.iter().map(|t| t.key.clone())),
    )?;
    info!(terms = vocab.len(), "selected feature vocabulary");
    Ok(vocab)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn canned(buckets: Value) -> MemoryBackend {
        MemoryBackend::new().with_aggregations(json!({ "classes": { "buckets": buckets } }))
    }

    fn bucket(label: &str, terms: &[&str]) -> Value {
        json!({
            "key": label,
            "doc_count": 10,
            "features": {
                "doc_count": 10,
                "buckets": terms
                    .iter()
                    .enumerate()
                    .map(|(i, t)| json!({"key": t, "doc_count": 5, "score": 1.0 / (i + 1) as f64, "bg_count": 6}))
                    .collect::<Vec<_>>()
            }
        })
    }

    #[test]
    fn body_nests_significant_terms_under_label_buckets() {
        let body = aggregation_body("label", "text", 100, SignificanceHeuristic::ChiSquare);
        assert_eq!(body["size"], 0);
        assert_eq!(body["aggs"]["classes"]["terms"]["field"], "label");
        let sig = &body["aggs"]["classes"]["aggs"]["features"]["significant_terms"];
        assert_eq!(sig["field"], "text");
        assert_eq!(sig["size"], 100);
        assert!(sig.get("chi_square").is_some());
    }

    #[tokio::test]
    async fn merges_buckets_in_order_without_repeats() {
        let backend = canned(json!([
            bucket("negative", &["bad", "worst", "plot"]),
            bucket("positive", &["great", "plot", "wonderful"]),
        ]));
        let vocab = select_vocabulary(&backend, &TrainConfig::default()).await.unwrap();
        assert_eq!(vocab.terms(), ["bad", "worst", "plot", "great", "wonderful"]);
    }

    #[tokio::test]
    async fn one_bucket_is_insufficient() {
        let backend = canned(json!([bucket("positive", &["great"])]));
        let err = select_vocabulary(&backend, &TrainConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InsufficientClasses { found: 1 }));
    }

    #[tokio::test]
    async fn reply_without_aggregations_is_malformed() {
        let backend = MemoryBackend::new()
            .with_document("1", json!({"label": "positive", "text": "great"}))
            .without_aggregations();
        let err = select_vocabulary(&backend, &TrainConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Json(_)), "got {err}");
    }

    #[tokio::test]
    async fn extra_buckets_ignored() {
        let backend = canned(json!([
            bucket("negative", &["bad"]),
            bucket("positive", &["great"]),
            bucket("neutral", &["okay"]),
        ]));
        let vocab = select_vocabulary(&backend, &TrainConfig::default()).await.unwrap();
        assert_eq!(vocab.terms(), ["bad", "great"]);
    }

    #[tokio::test]
    async fn computed_by_memory_backend() {
        let backend = MemoryBackend::new()
            .with_document("1", json!({"label": "positive", "text": "great fun great cast"}))
            .with_document("2", json!({"label": "positive", "text": "wonderful great film"}))
            .with_document("3", json!({"label": "negative", "text": "bad boring film"}))
            .with_document("4", json!({"label": "negative", "text": "worst bad cast"}));
        let config = TrainConfig {
            num_features: 2,
            ..Default::default()
        };
        let classes = significant_terms(&backend, &config).await.unwrap();
        assert_eq!(classes.len(), 2);
        let vocab = select_vocabulary(&backend, &config).await.unwrap();
        assert_eq!(vocab.len(), 2);
        assert!(vocab.iter().any(|t| t == "bad"));
        assert!(vocab.iter().any(|t| t == "great"));
    }
}
