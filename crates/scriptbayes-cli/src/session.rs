//! One search engine connection per process run.

use std::time::Duration;

use scriptbayes_search::{ClientConfig, EsClient, SearchError};
use tracing::{debug, info, warn};

/// Owns the backend client for the lifetime of a command. Stages borrow it
/// through [`Session::backend`]; [`Session::close`] runs once at the end,
/// whether the command succeeded or not.
pub struct Session {
    client: EsClient,
    grace: Duration,
}

impl Session {
    pub fn open(config: &ClientConfig, grace: Duration) -> Result<Self, SearchError> {
        let client = EsClient::new(config)?;
        info!(url = client.base_url(), "opened search session");
        Ok(Self { client, grace })
    }

    pub fn backend(&self) -> &EsClient {
        &self.client
    }

    /// Release any scroll still open, waiting at most the grace period.
    pub async fn close(self) {
        let open = self.client.open_scrolls().len();
        if open > 0 {
            debug!(open, "releasing scrolls");
        }
        match tokio::time::timeout(self.grace, self.client.release_scrolls()).await {
            Ok(()) => info!("closed search session"),
            Err(_) => warn!(
                grace_secs = self.grace.as_secs_f64(),
                "search session did not drain within the grace period"
            ),
        }
    }
}
