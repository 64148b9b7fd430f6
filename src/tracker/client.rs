//! Tracker client

use std::sync::Arc;

use tracing::{error, info};

use crate::torrent::Metainfo;
use crate::tracker::announce::AnnounceRequest;
use crate::tracker::error::TrackerError;
use crate::tracker::response::{AnnounceResponse, PeerAddress};
use crate::tracker::transport::{HttpTransport, TrackerTransport, DEFAULT_TRACKER_TIMEOUT};

/// Announces to the single tracker named in the metainfo
#[derive(Clone)]
pub struct TrackerClient {
    transport: Arc<dyn TrackerTransport>,
}

impl TrackerClient {
    /// Create a new client over an arbitrary transport
    pub fn new(transport: Arc<dyn TrackerTransport>) -> Self {
        Self { transport }
    }

    /// Create a new HTTP client with the default timeout
    pub fn http() -> Result<Self, TrackerError> {
        Self::http_with_timeout(DEFAULT_TRACKER_TIMEOUT)
    }

    pub fn http_with_timeout(timeout: std::time::Duration) -> Result<Self, TrackerError> {
        Ok(Self::new(Arc::new(HttpTransport::new(timeout)?)))
    }

    /// Announce and return the full decoded response
    pub async fn announce_full(&self, request: &AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        let url = request.to_url()?;
        info!("Announcing to {} (left={})", request.announce_url, request.left);

        let body = self.transport.get(&url).await.map_err(|e| {
            error!("Announce to {} failed: {}", request.announce_url, e);
            e
        })?;

        AnnounceResponse::from_bytes(&body)
    }

    /// Announce a fresh download and return the peer list.
    ///
    /// An empty list is returned as-is; deciding whether that is fatal is up
    /// to the caller.
    pub async fn announce(
        &self,
        metainfo: &Metainfo,
        peer_id: [u8; 20],
        port: u16,
        bytes_left: u64,
    ) -> Result<Vec<PeerAddress>, TrackerError> {
        let request = AnnounceRequest::new(metainfo, peer_id, port, bytes_left);
        let response = self.announce_full(&request).await?;
        info!("Tracker returned {} peers", response.peers.len());
        Ok(response.peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    struct FakeTransport {
        reply: Result<Vec<u8>, TrackerError>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(reply: Result<Vec<u8>, TrackerError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TrackerTransport for FakeTransport {
        async fn get(&self, url: &str) -> Result<Vec<u8>, TrackerError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.reply.clone()
        }
    }

    fn metainfo() -> Metainfo {
        Metainfo::for_content(&[0u8; 100], 32)
    }

    #[tokio::test]
    async fn test_announce_returns_peers() {
        let transport = FakeTransport::new(Ok(b"d5:peers6:\x7f\x00\x00\x01\x1a\xe1e".to_vec()));
        let client = TrackerClient::new(transport.clone());

        let peers = client.announce(&metainfo(), [b'p'; 20], 6881, 100).await.unwrap();
        assert_eq!(peers, vec![PeerAddress::new(Ipv4Addr::LOCALHOST, 6881)]);

        let requested = transport.requested.lock().unwrap();
        assert_eq!(requested.len(), 1);
        assert!(requested[0].contains("info_hash=%AB%AB"));
        assert!(requested[0].contains("&left=100&compact=1"));
    }

    #[tokio::test]
    async fn test_announce_transport_failure() {
        let transport = FakeTransport::new(Err(TrackerError::Transport("connection refused".to_string())));
        let client = TrackerClient::new(transport);

        let err = client.announce(&metainfo(), [0; 20], 6881, 100).await.unwrap_err();
        assert_eq!(err.kind(), "transport-failure");
    }

    #[tokio::test]
    async fn test_announce_tracker_failure() {
        let transport = FakeTransport::new(Ok(b"d14:failure reason4:nopee".to_vec()));
        let client = TrackerClient::new(transport);

        let err = client.announce(&metainfo(), [0; 20], 6881, 100).await.unwrap_err();
        assert_eq!(err, TrackerError::TrackerFailure("nope".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_sent() {
        let transport = FakeTransport::new(Ok(b"d5:peers0:e".to_vec()));
        let client = TrackerClient::new(transport.clone());
        let mut meta = metainfo();
        meta.announce = "udp://tracker.example.com:1337".to_string();

        let err = client.announce(&meta, [0; 20], 6881, 100).await.unwrap_err();
        assert_eq!(err.kind(), "invalid-announce-url");
        assert!(transport.requested.lock().unwrap().is_empty());
    }
}
