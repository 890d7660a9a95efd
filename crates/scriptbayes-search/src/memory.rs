//! In-process search backend.
//!
//! Holds one collection of documents (the `index` argument is ignored) and
//! evaluates the small subset of the query language the pipeline uses:
//! paging and scrolls, `fields`, the `vector` and `nb_model` native scripts,
//! `terms` aggregations by field or by script, and `significant_terms`
//! scored with JLH against the whole collection. Stored templates are kept in
//! memory and can be invoked with [`SearchBackend::search_template`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use scriptbayes_core::template::{TEMPLATE_LANG, parse_params};
use scriptbayes_core::{ClassifierModel, FeatureVocabulary, InferenceTemplate};
use serde_json::{Map, Value, json};

use crate::backend::{Hit, Hits, SearchBackend, SearchResponse, StoredScript};
use crate::SearchError;

/// Native script computing per-term frequencies.
pub const VECTOR_SCRIPT: &str = "vector";
/// Native script evaluating the naive Bayes decision rule.
pub const MODEL_SCRIPT: &str = "nb_model";

const DEFAULT_SIZE: usize = 10;

enum Entry {
    /// A document with a `_source`; script fields are computed from it.
    Document { id: String, source: Map<String, Value> },
    /// A hit returned verbatim, whatever the request asked for.
    Raw { id: String, fields: Map<String, Value> },
}

impl Entry {
    fn source(&self) -> Option<&Map<String, Value>> {
        match self {
            Entry::Document { source, .. } => Some(source),
            Entry::Raw { .. } => None,
        }
    }
}

/// A script compiled once per request.
enum Script {
    Vector {
        features: Vec<String>,
        field: String,
    },
    Model {
        vocab: FeatureVocabulary,
        model: ClassifierModel,
        field: String,
    },
}

impl Script {
    fn compile(script: &Value) -> Result<Self, SearchError> {
        let params = script.get("params").cloned().unwrap_or(Value::Null);
        match script.get("source").and_then(Value::as_str) {
            Some(VECTOR_SCRIPT) => {
                let features = params
                    .get("features")
                    .and_then(Value::as_array)
                    .ok_or_else(|| rejected(400, "vector script needs `features`"))?
                    .iter()
                    .map(|f| f.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| rejected(400, "vector features must be strings"))?;
                let field = string_param(&params, "field")?;
                Ok(Script::Vector { features, field })
            }
            Some(MODEL_SCRIPT) => {
                let parsed = parse_params(&params)?;
                let field = parsed.field.clone();
                let (vocab, model) = parsed.into_parts()?;
                Ok(Script::Model {
                    vocab,
                    model,
                    field,
                })
            }
            other => Err(rejected(400, &format!("unknown script {other:?}"))),
        }
    }

    fn run(&self, source: &Map<String, Value>) -> Result<Value, SearchError> {
        match self {
            Script::Vector { features, field } => {
                Ok(json!(term_frequencies(source, field, features)))
            }
            Script::Model {
                vocab,
                model,
                field,
            } => {
                let v = term_frequencies(source, field, vocab.terms());
                Ok(json!(model.predict(&v)?))
            }
        }
    }
}

struct ScrollState {
    pending: VecDeque<Hit>,
    size: usize,
}

/// In-memory [`SearchBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    entries: Vec<Entry>,
    canned_aggregations: Option<Value>,
    drop_aggregations: bool,
    reject_publish: bool,
    scrolls: Mutex<HashMap<String, ScrollState>>,
    scripts: Mutex<HashMap<String, StoredScript>>,
    next_scroll: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document; `source` must be a JSON object.
    pub fn with_document(mut self, id: &str, source: Value) -> Self {
        let source = match source {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.entries.push(Entry::Document {
            id: id.to_string(),
            source,
        });
        self
    }

    /// Add a hit whose `fields` are returned as-is.
    pub fn with_hit(mut self, id: &str, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.entries.push(Entry::Raw {
            id: id.to_string(),
            fields,
        });
        self
    }

    /// Answer every aggregation request with `aggregations` instead of computing it.
    pub fn with_aggregations(mut self, aggregations: Value) -> Self {
        self.canned_aggregations = Some(aggregations);
        self
    }

    /// Leave `aggregations` out of every response, like a proxy that strips them.
    pub fn without_aggregations(mut self) -> Self {
        self.drop_aggregations = true;
        self
    }

    /// Make the script store refuse writes.
    pub fn rejecting_publish(mut self) -> Self {
        self.reject_publish = true;
        self
    }

    pub fn open_scroll_count(&self) -> usize {
        self.scrolls.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn stored_script(&self, id: &str) -> Option<StoredScript> {
        self.scripts.lock().ok().and_then(|s| s.get(id).cloned())
    }

    fn execute(&self, body: &Value) -> Result<(Vec<Hit>, Option<Value>), SearchError> {
        let script_fields = body
            .get("script_fields")
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(name, spec)| {
                        let script = spec
                            .get("script")
                            .ok_or_else(|| rejected(400, "script field without script"))?;
                        Ok((name.clone(), Script::compile(script)?))
                    })
                    .collect::<Result<Vec<_>, SearchError>>()
            })
            .transpose()?
            .unwrap_or_default();
        let requested: Vec<&str> = body
            .get("fields")
            .and_then(Value::as_array)
            .map(|f| f.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut hits = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            hits.push(match entry {
                Entry::Raw { id, fields } => Hit {
                    id: id.clone(),
                    fields: fields.clone(),
                    source: None,
                },
                Entry::Document { id, source } => {
                    let mut fields = Map::new();
                    for name in &requested {
                        if let Some(value) = source.get(*name) {
                            fields.insert(name.to_string(), as_list(value));
                        }
                    }
                    for (name, script) in &script_fields {
                        fields.insert(name.clone(), json!([script.run(source)?]));
                    }
                    Hit {
                        id: id.clone(),
                        fields,
                        source: requested
                            .contains(&"_source")
                            .then(|| Value::Object(source.clone())),
                    }
                }
            });
        }

        let aggs = body.get("aggs").or_else(|| body.get("aggregations"));
        let aggregations = match aggs {
            _ if self.drop_aggregations => None,
            Some(_) if self.canned_aggregations.is_some() => self.canned_aggregations.clone(),
            Some(Value::Object(aggs)) => {
                let docs: Vec<&Map<String, Value>> =
                    self.entries.iter().filter_map(Entry::source).collect();
                Some(self.aggregate(aggs, &docs, &docs)?)
            }
            _ => None,
        };
        Ok((hits, aggregations))
    }

    fn aggregate(
        &self,
        aggs: &Map<String, Value>,
        docs: &[&Map<String, Value>],
        background: &[&Map<String, Value>],
    ) -> Result<Value, SearchError> {
        let mut out = Map::new();
        for (name, spec) in aggs {
            let sub = spec
                .get("aggs")
                .or_else(|| spec.get("aggregations"))
                .and_then(Value::as_object);
            let result = if let Some(terms) = spec.get("terms") {
                let keyed = self.bucket_keys(terms, docs)?;
                let mut buckets = Vec::with_capacity(keyed.len());
                for (key, members) in keyed {
                    let mut bucket = Map::new();
                    bucket.insert("key".into(), key);
                    bucket.insert("doc_count".into(), json!(members.len()));
                    if let Some(sub) = sub
                        && let Value::Object(inner) = self.aggregate(sub, &members, background)?
                    {
                        bucket.extend(inner);
                    }
                    buckets.push(Value::Object(bucket));
                }
                json!({ "buckets": buckets })
            } else if let Some(sig) = spec.get("significant_terms") {
                let field = string_param(sig, "field")?;
                let size = sig
                    .get("size")
                    .and_then(Value::as_u64)
                    .map_or(DEFAULT_SIZE, |s| s as usize);
                json!({
                    "doc_count": docs.len(),
                    "bg_count": background.len(),
                    "buckets": jlh_terms(docs, background, &field, size),
                })
            } else {
                return Err(rejected(400, &format!("unsupported aggregation '{name}'")));
            };
            out.insert(name.clone(), result);
        }
        Ok(Value::Object(out))
    }

    /// Group `docs` by a field value or script result, largest group first,
    /// ties broken by key.
    fn bucket_keys<'a>(
        &self,
        terms: &Value,
        docs: &[&'a Map<String, Value>],
    ) -> Result<Vec<(Value, Vec<&'a Map<String, Value>>)>, SearchError> {
        let script = terms.get("script").map(Script::compile).transpose()?;
        let field = terms.get("field").and_then(Value::as_str);

        let mut groups: Vec<(Value, Vec<&'a Map<String, Value>>)> = Vec::new();
        for &doc in docs {
            let key = match (&script, field) {
                // Scripted terms are keyed by the value's text.
                (Some(script), _) => Value::String(key_text(&script.run(doc)?)),
                (None, Some(field)) => match doc.get(field) {
                    Some(v) => v.clone(),
                    None => continue,
                },
                (None, None) => return Err(rejected(400, "terms needs a field or a script")),
            };
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(doc),
                None => groups.push((key, vec![doc])),
            }
        }
        groups.sort_by(|(ka, a), (kb, b)| {
            b.len()
                .cmp(&a.len())
                .then_with(|| key_text(ka).cmp(&key_text(kb)))
        });
        Ok(groups)
    }

    fn open_scroll(&self, hits: Vec<Hit>, size: usize) -> SearchResponse {
        let id = format!("scroll-{}", self.next_scroll.fetch_add(1, Ordering::SeqCst));
        let mut pending: VecDeque<Hit> = hits.into();
        let page: Vec<Hit> = pending.drain(..size.min(pending.len())).collect();
        if let Ok(mut scrolls) = self.scrolls.lock() {
            scrolls.insert(id.clone(), ScrollState { pending, size });
        }
        SearchResponse {
            scroll_id: Some(id),
            hits: Hits { hits: page },
            aggregations: None,
        }
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn search(
        &self,
        _index: &str,
        body: &Value,
        scroll: Option<&str>,
    ) -> Result<SearchResponse, SearchError> {
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_SIZE, |s| s as usize);
        let (hits, aggregations) = self.execute(body)?;
        if scroll.is_some() {
            let mut resp = self.open_scroll(hits, size);
            resp.aggregations = aggregations;
            return Ok(resp);
        }
        let from = body
            .get("from")
            .and_then(Value::as_u64)
            .map_or(0, |f| f as usize);
        Ok(SearchResponse {
            scroll_id: None,
            hits: Hits {
                hits: hits.into_iter().skip(from).take(size).collect(),
            },
            aggregations,
        })
    }

    async fn scroll(
        &self,
        scroll_id: &str,
        _keep_alive: &str,
    ) -> Result<SearchResponse, SearchError> {
        let mut scrolls = self
            .scrolls
            .lock()
            .map_err(|_| rejected(500, "scroll table poisoned"))?;
        let state = scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| rejected(404, &format!("no scroll '{scroll_id}'")))?;
        let take = state.size.min(state.pending.len());
        let page: Vec<Hit> = state.pending.drain(..take).collect();
        Ok(SearchResponse {
            scroll_id: Some(scroll_id.to_string()),
            hits: Hits { hits: page },
            aggregations: None,
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError> {
        if let Ok(mut scrolls) = self.scrolls.lock() {
            scrolls.remove(scroll_id);
        }
        Ok(())
    }

    async fn put_script(&self, id: &str, body: &Value) -> Result<(), SearchError> {
        if self.reject_publish {
            return Err(SearchError::Publish {
                id: id.to_string(),
                status: 403,
                body: "security_exception: action [cluster:admin/script/put] is unauthorized"
                    .into(),
            });
        }
        let script: StoredScript = body
            .get("script")
            .cloned()
            .ok_or_else(|| publish_error(id, "missing `script`"))
            .and_then(|s| serde_json::from_value(s).map_err(|e| publish_error(id, &e.to_string())))?;
        // Object sources are stored as their JSON text.
        let source = match script.source {
            Value::Object(_) => Value::String(script.source.to_string()),
            other => other,
        };
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(
                id.to_string(),
                StoredScript {
                    lang: script.lang,
                    source,
                },
            );
        }
        Ok(())
    }

    async fn get_script(&self, id: &str) -> Result<Option<StoredScript>, SearchError> {
        Ok(self.stored_script(id))
    }

    async fn search_template(
        &self,
        _index: &str,
        id: &str,
        params: &Value,
    ) -> Result<SearchResponse, SearchError> {
        let stored = self
            .stored_script(id)
            .ok_or_else(|| rejected(404, &format!("unable to find script [{id}]")))?;
        if stored.lang != TEMPLATE_LANG {
            return Err(rejected(400, &format!("script [{id}] is not a template")));
        }
        let template = InferenceTemplate::from_stored(id, &stored.source)?;
        // Unbound mustache variables render empty.
        let field = params.get("field").and_then(Value::as_str).unwrap_or("");
        let body = template.render(field);
        let (hits, aggregations) = self.execute(&body)?;
        Ok(SearchResponse {
            scroll_id: None,
            hits: Hits { hits },
            aggregations,
        })
    }
}

fn rejected(status: u16, body: &str) -> SearchError {
    SearchError::BackendRejected {
        status,
        body: body.to_string(),
    }
}

fn publish_error(id: &str, body: &str) -> SearchError {
    SearchError::Publish {
        id: id.to_string(),
        status: 400,
        body: body.to_string(),
    }
}

fn string_param(params: &Value, name: &str) -> Result<String, SearchError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| rejected(400, &format!("missing string parameter `{name}`")))
}

fn as_list(value: &Value) -> Value {
    match value {
        Value::Array(_) => value.clone(),
        other => json!([other]),
    }
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lower-cased alphanumeric tokens of a text field.
fn tokens(source: &Map<String, Value>, field: &str) -> Vec<String> {
    let text = match source.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    };
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn term_frequencies(source: &Map<String, Value>, field: &str, features: &[String]) -> Vec<f64> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in tokens(source, field) {
        *counts.entry(token).or_default() += 1;
    }
    features
        .iter()
        .map(|f| counts.get(f).copied().unwrap_or(0) as f64)
        .collect()
}

fn doc_frequencies(docs: &[&Map<String, Value>], field: &str) -> HashMap<String, usize> {
    let mut df: HashMap<String, usize> = HashMap::new();
    for doc in docs {
        let unique: HashSet<String> = tokens(doc, field).into_iter().collect();
        for term in unique {
            *df.entry(term).or_default() += 1;
        }
    }
    df
}

/// `(fg% − bg%) · (fg% / bg%)` for terms more common in `docs` than overall.
fn jlh_terms(
    docs: &[&Map<String, Value>],
    background: &[&Map<String, Value>],
    field: &str,
    size: usize,
) -> Vec<Value> {
    if docs.is_empty() || background.is_empty() {
        return Vec::new();
    }
    let fg = doc_frequencies(docs, field);
    let bg = doc_frequencies(background, field);

    let mut scored: Vec<(String, usize, usize, f64)> = fg
        .into_iter()
        .filter_map(|(term, fg_count)| {
            let bg_count = bg.get(&term).copied().unwrap_or(fg_count);
            let fg_pct = fg_count as f64 / docs.len() as f64;
            let bg_pct = bg_count as f64 / background.len() as f64;
            (fg_pct > bg_pct).then(|| {
                let score = (fg_pct - bg_pct) * (fg_pct / bg_pct);
                (term, fg_count, bg_count, score)
            })
        })
        .collect();
    scored.sort_by(|a, b| b.3.total_cmp(&a.3).then_with(|| a.0.cmp(&b.0)));
    scored
        .into_iter()
        .take(size)
        .map(|(term, doc_count, bg_count, score)| {
            json!({ "key": term, "doc_count": doc_count, "score": score, "bg_count": bg_count })
        })
        .collect()
}
