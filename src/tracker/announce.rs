//! Announce request construction

use url::Url;

use crate::torrent::Metainfo;
use crate::tracker::error::TrackerError;

/// Parameters of a single announce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceRequest {
    pub announce_url: String,
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

impl AnnounceRequest {
    /// Create a new request for a fresh download
    pub fn new(metainfo: &Metainfo, peer_id: [u8; 20], port: u16, left: u64) -> Self {
        Self {
            announce_url: metainfo.announce.clone(),
            info_hash: metainfo.info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left,
        }
    }

    /// Build the full GET url, percent-encoding the raw hash and peer id
    pub fn to_url(&self) -> Result<String, TrackerError> {
        let parsed = Url::parse(&self.announce_url)
            .map_err(|e| TrackerError::InvalidAnnounceUrl(format!("{}: {}", self.announce_url, e)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(TrackerError::InvalidAnnounceUrl(format!(
                    "unsupported scheme \"{}\" in {}",
                    other, self.announce_url
                )))
            }
        }

        let separator = if self.announce_url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.announce_url,
            separator,
            urlencoding::encode_binary(&self.info_hash),
            urlencoding::encode_binary(&self.peer_id),
            self.port,
            self.uploaded,
            self.downloaded,
            self.left
        ))
    }
}
