//! The seam between the pipeline and the search engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::SearchError;

/// How long the engine keeps a scroll context alive between pages.
pub const SCROLL_KEEP_ALIVE: &str = "1m";

/// A search (or scroll page) response, reduced to what the pipeline reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub hits: Hits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// One document. `fields` holds requested and scripted fields, each as a list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

/// A stored script or template as the engine returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScript {
    pub lang: String,
    pub source: Value,
}

/// Operations the pipeline needs from the search engine.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one search. With `scroll` set, opens a scroll context kept alive that long.
    async fn search(
        &self,
        index: &str,
        body: &Value,
        scroll: Option<&str>,
    ) -> Result<SearchResponse, SearchError>;

    /// Fetch the next page of an open scroll.
    async fn scroll(
        &self,
        scroll_id: &str,
        keep_alive: &str,
    ) -> Result<SearchResponse, SearchError>;

    /// Release a scroll context.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError>;

    /// Store or overwrite a script/template. `body` is the full store request.
    async fn put_script(&self, id: &str, body: &Value) -> Result<(), SearchError>;

    /// Read a stored script back. `None` if nothing is stored under `id`.
    async fn get_script(&self, id: &str) -> Result<Option<StoredScript>, SearchError>;

    /// Invoke a stored template against an index.
    async fn search_template(
        &self,
        index: &str,
        id: &str,
        params: &Value,
    ) -> Result<SearchResponse, SearchError>;
}
