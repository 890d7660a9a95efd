//! HTTP client for an Elasticsearch-compatible search engine.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::backend::{SearchBackend, SearchResponse, StoredScript};
use crate::SearchError;

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Like `http://localhost:9200`.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Search engine client. Remembers the scrolls it opened so they can be
/// released at shutdown even if a caller bailed out early.
pub struct EsClient {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    open_scrolls: Mutex<HashSet<String>>,
}

#[derive(Deserialize)]
struct GetScriptResponse {
    #[serde(default)]
    found: bool,
    script: Option<StoredScript>,
}

impl EsClient {
    pub fn new(config: &ClientConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            open_scrolls: Mutex::new(HashSet::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let req = self.client.request(method, url);
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    /// Send and decode a JSON response, mapping non-2xx to `BackendRejected`.
    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, SearchError> {
        let resp = req.send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Remember the scroll `resp` opened so [`EsClient::release_scrolls`] can clear it.
    pub fn track_scroll(&self, resp: &SearchResponse) {
        if let Some(id) = &resp.scroll_id
            && let Ok(mut open) = self.open_scrolls.lock()
        {
            open.insert(id.clone());
        }
    }

    fn forget_scroll(&self, scroll_id: &str) {
        if let Ok(mut open) = self.open_scrolls.lock() {
            open.remove(scroll_id);
        }
    }

    /// Scroll ids opened through this client and not yet cleared.
    pub fn open_scrolls(&self) -> Vec<String> {
        self.open_scrolls
            .lock()
            .map(|open| open.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Clear every scroll this client still holds open.
    pub async fn release_scrolls(&self) {
        for id in self.open_scrolls() {
            if let Err(e) = self.clear_scroll(&id).await {
                warn!(error = %e, "failed to clear scroll");
            }
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, SearchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SearchError::BackendRejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl SearchBackend for EsClient {
    async fn search(
        &self,
        index: &str,
        body: &Value,
        scroll: Option<&str>,
    ) -> Result<SearchResponse, SearchError> {
        let mut req = self.request(Method::POST, &format!("{index}/_search"));
        if let Some(keep_alive) = scroll {
            req = req.query(&[("scroll", keep_alive)]);
        }
        debug!(index, "search request");
        let resp: SearchResponse = self.send_json(req.json(body)).await?;
        self.track_scroll(&resp);
        Ok(resp)
    }

    async fn scroll(
        &self,
        scroll_id: &str,
        keep_alive: &str,
    ) -> Result<SearchResponse, SearchError> {
        let req = self
            .request(Method::POST, "_search/scroll")
            .json(&json!({ "scroll": keep_alive, "scroll_id": scroll_id }));
        let resp: SearchResponse = self.send_json(req).await?;
        if resp.scroll_id.as_deref() != Some(scroll_id) {
            self.forget_scroll(scroll_id);
        }
        self.track_scroll(&resp);
        Ok(resp)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), SearchError> {
        let resp = self
            .request(Method::DELETE, "_search/scroll")
            .json(&json!({ "scroll_id": [scroll_id] }))
            .send()
            .await?;
        self.forget_scroll(scroll_id);
        // Already expired.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(resp).await?;
        Ok(())
    }

    async fn put_script(&self, id: &str, body: &Value) -> Result<(), SearchError> {
        info!(id, url = %self.base_url, "storing script");
        let resp = self
            .request(Method::PUT, &format!("_scripts/{id}"))
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Publish {
                id: id.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn get_script(&self, id: &str) -> Result<Option<StoredScript>, SearchError> {
        let resp = self
            .request(Method::GET, &format!("_scripts/{id}"))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let parsed: GetScriptResponse = check_status(resp).await?.json().await?;
        Ok(if parsed.found { parsed.script } else { None })
    }

    async fn search_template(
        &self,
        index: &str,
        id: &str,
        params: &Value,
    ) -> Result<SearchResponse, SearchError> {
        let req = self
            .request(Method::POST, &format!("{index}/_search/template"))
            .json(&json!({ "id": id, "params": params }));
        self.send_json(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = EsClient::new(&ClientConfig {
            base_url: "http://localhost:9200/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:9200");
    }

    #[test]
    fn scroll_tracking() {
        let client = EsClient::new(&ClientConfig::default()).unwrap();
        client.track_scroll(&SearchResponse {
            scroll_id: Some("s1".into()),
            ..Default::default()
        });
        assert_eq!(client.open_scrolls(), vec!["s1".to_string()]);
        client.forget_scroll("s1");
        assert!(client.open_scrolls().is_empty());
    }

    #[test]
    fn stored_script_response_parses() {
        let json = r#"{"_id": "model_script", "found": true,
                       "script": {"lang": "mustache", "source": "{\"fields\": []}"}}"#;
        let parsed: GetScriptResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.found);
        assert_eq!(parsed.script.unwrap().lang, "mustache");
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        // Port 9 (discard) on localhost is not an HTTP server.
        let client = EsClient::new(&ClientConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        let err = client
            .search("movie-reviews", &json!({}), None)
            .await
            .unwrap_err();
        assert!(err.is_backend_failure(), "got {err}");
    }
}
