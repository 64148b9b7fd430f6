//! Tracker transports

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, trace};

use crate::tracker::error::TrackerError;

/// Default timeout for a tracker request
pub const DEFAULT_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches an announce url and returns the raw response body
#[async_trait]
pub trait TrackerTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TrackerError>;
}

/// HTTP(S) transport backed by reqwest
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new transport with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("torrent-fetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TrackerTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TrackerError> {
        trace!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Transport(format!("tracker responded with HTTP {}", status)));
        }

        let body = response.bytes().await?;
        debug!("Tracker responded with {} bytes", body.len());
        Ok(body.to_vec())
    }
}
