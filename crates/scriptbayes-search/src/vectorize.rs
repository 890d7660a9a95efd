//! Scripted per-document vectorization over the whole collection.
//!
//! The engine computes each document's weight for every vocabulary term in a
//! script field named `vector`; the raw label field comes back alongside.
//! Documents that fail to decode are skipped and counted.

use scriptbayes_core::example::VECTOR_FIELD;
use scriptbayes_core::{FeatureVocabulary, HitDecoder, LabelMapping, TrainConfig, TrainingExample};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::backend::{Hit, SCROLL_KEEP_ALIVE, SearchBackend, SearchResponse};
use crate::SearchError;

/// Result of scanning a collection.
#[derive(Debug, Clone, Default)]
pub struct Vectorized {
    pub examples: Vec<TrainingExample>,
    pub scanned: usize,
    pub skipped: usize,
}

impl Vectorized {
    fn absorb(&mut self, hits: &[Hit], decoder: &HitDecoder) {
        for hit in hits {
            self.scanned += 1;
            match decoder.decode(&hit.fields) {
                Ok(example) => self.examples.push(example),
                Err(e) => {
                    self.skipped += 1;
                    error!(id = %hit.id, reason = %e, "malformed document skipped");
                }
            }
        }
    }

    /// Share of scanned documents that were skipped.
    pub fn skipped_ratio(&self) -> f64 {
        if self.scanned == 0 {
            0.0
        } else {
            self.skipped as f64 / self.scanned as f64
        }
    }
}

/// Search body asking for the `vector` script field and the label field.
pub fn vector_request(vocab: &FeatureVocabulary, config: &TrainConfig) -> Value {
    json!({
        "size": config.page_size,
        "query": { "match_all": {} },
        "_source": false,
        "script_fields": {
            VECTOR_FIELD: {
                "script": config.vector_script.invoke(json!({
                    "features": vocab.terms(),
                    "field": config.text_field,
                })),
            }
        },
        "fields": [config.label_field],
    })
}

/// Vectorize every document in `config.index` against `vocab`.
///
/// The scroll opened here is cleared on every exit path.
pub async fn vectorize<B: SearchBackend + ?Sized>(
    backend: &B,
    vocab: &FeatureVocabulary,
    config: &TrainConfig,
) -> Result<Vectorized, SearchError> {
    info!(index = %config.index, terms = vocab.len(), page_size = config.page_size, "vectorizing documents");
    let decoder = HitDecoder::new(
        config.label_field.clone(),
        LabelMapping::new(config.positive_label.clone()),
        vocab.len(),
    );
    let body = vector_request(vocab, config);

    let first = backend
        .search(&config.index, &body, Some(SCROLL_KEEP_ALIVE))
        .await?;
    let mut scroll_id = first.scroll_id.clone();
    let scanned = drain(backend, first, &decoder, &mut scroll_id).await;

    if let Some(id) = scroll_id
        && let Err(e) = backend.clear_scroll(&id).await
    {
        warn!(error = %e, "failed to clear scroll");
    }
    let result = scanned?;

    info!(
        scanned = result.scanned,
        kept = result.examples.len(),
        skipped = result.skipped,
        "vectorized documents"
    );
    if result.scanned == 0 {
        return Err(SearchError::EmptyCollection {
            index: config.index.clone(),
        });
    }
    if result.skipped_ratio() > config.max_malformed_ratio {
        return Err(SearchError::DataQuality {
            skipped: result.skipped,
            scanned: result.scanned,
            max_ratio: config.max_malformed_ratio,
        });
    }
    Ok(result)
}

/// Decode pages until the scroll runs dry. Keeps `scroll_id` pointing at the
/// latest live scroll so the caller can clear it.
async fn drain<B: SearchBackend + ?Sized>(
    backend: &B,
    first: SearchResponse,
    decoder: &HitDecoder,
    scroll_id: &mut Option<String>,
) -> Result<Vectorized, SearchError> {
    let mut out = Vectorized::default();
    let mut page = first;
    loop {
        if page.hits.hits.is_empty() {
            return Ok(out);
        }
        out.absorb(&page.hits.hits, decoder);

        let Some(id) = scroll_id.clone() else {
            return Ok(out);
        };
        page = backend.scroll(&id, SCROLL_KEEP_ALIVE).await?;
        if let Some(next) = &page.scroll_id {
            *scroll_id = Some(next.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn vocab() -> FeatureVocabulary {
        FeatureVocabulary::merge(["bad", "great", "film"]).unwrap()
    }

    fn corpus() -> MemoryBackend {
        MemoryBackend::new()
            .with_document("1", json!({"label": "positive", "text": "great great film"}))
            .with_document("2", json!({"label": "negative", "text": "bad film"}))
            .with_document("3", json!({"label": "neutral", "text": "film"}))
    }

    #[test]
    fn request_carries_vocabulary_and_field() {
        let body = vector_request(&vocab(), &TrainConfig::default());
        let script = &body["script_fields"]["vector"]["script"];
        assert_eq!(script["source"], "vector");
        assert_eq!(script["lang"], "native");
        assert_eq!(script["params"]["features"], json!(["bad", "great", "film"]));
        assert_eq!(script["params"]["field"], "text");
        assert_eq!(body["fields"], json!(["label"]));
    }

    #[tokio::test]
    async fn scrolls_all_pages_and_clears_scroll() {
        let backend = corpus();
        let config = TrainConfig {
            page_size: 1,
            ..Default::default()
        };
        let out = vectorize(&backend, &vocab(), &config).await.unwrap();
        assert_eq!(out.scanned, 3);
        assert_eq!(out.skipped, 0);
        assert_eq!(
            out.examples,
            vec![
                TrainingExample {
                    label: 1.0,
                    features: vec![0.0, 2.0, 1.0]
                },
                TrainingExample {
                    label: 0.0,
                    features: vec![1.0, 0.0, 1.0]
                },
                TrainingExample {
                    label: 0.0,
                    features: vec![0.0, 0.0, 1.0]
                },
            ]
        );
        assert_eq!(backend.open_scroll_count(), 0);
    }

    #[tokio::test]
    async fn every_vector_matches_vocabulary_length() {
        let backend = corpus();
        let out = vectorize(&backend, &vocab(), &TrainConfig::default())
            .await
            .unwrap();
        assert!(out.examples.iter().all(|e| e.features.len() == vocab().len()));
    }

    #[tokio::test]
    async fn malformed_documents_skipped_within_threshold() {
        let backend = corpus()
            .with_hit("bad-1", json!({"vector": [[1.0]], "label": ["positive"]}));
        let config = TrainConfig {
            max_malformed_ratio: 0.5,
            ..Default::default()
        };
        let out = vectorize(&backend, &vocab(), &config).await.unwrap();
        assert_eq!(out.scanned, 4);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.examples.len(), 3);
    }

    #[tokio::test]
    async fn too_many_malformed_documents_fail_the_run() {
        let backend = corpus()
            .with_hit("bad-1", json!({"vector": [[1.0]], "label": ["positive"]}))
            .with_hit("bad-2", json!({"vector": [[1.0, 2.0, 3.0]], "label": []}));
        let config = TrainConfig {
            max_malformed_ratio: 0.2,
            page_size: 2,
            ..Default::default()
        };
        let err = vectorize(&backend, &vocab(), &config).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::DataQuality {
                skipped: 2,
                scanned: 5,
                ..
            }
        ));
        assert_eq!(backend.open_scroll_count(), 0);
    }

    #[tokio::test]
    async fn empty_index_is_an_error() {
        let err = vectorize(&MemoryBackend::new(), &vocab(), &TrainConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::EmptyCollection { .. }));
    }
}
