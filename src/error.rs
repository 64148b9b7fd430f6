//! Error types for the torrent downloader
//!
//! Module-level failures (bencode, metainfo, tracker) have their own typed
//! errors; this module folds them into a single [`TorrentError`] that carries
//! enough context for logging and for the process exit label.

use std::fmt;

use crate::bencode::BencodeError;
use crate::torrent::MetainfoError;
use crate::tracker::TrackerError;

/// Crate-wide error type
#[derive(Debug, Clone)]
pub enum TorrentError {
    /// Malformed bencode input
    ParseError {
        message: String,
        source: Option<String>,
    },

    /// Torrent metadata missing or invalid
    MetainfoError {
        message: String,
        field: Option<String>,
    },

    /// Tracker unreachable, malformed reply, or tracker-reported failure
    TrackerError {
        message: String,
        url: Option<String>,
        source: Option<String>,
    },

    /// Tracker answered with no usable peers
    NoPeers {
        url: String,
    },

    /// Peer wire protocol violations (handshake, framing, indices)
    ProtocolError {
        message: String,
        source: Option<String>,
    },

    /// Peer connection errors
    PeerError {
        message: String,
        peer: Option<String>,
        source: Option<String>,
    },

    /// A completed piece failed digest verification
    IntegrityError {
        piece_index: u32,
        message: String,
    },

    /// File I/O errors
    StorageError {
        message: String,
        path: Option<String>,
        source: Option<String>,
    },

    /// Configuration errors
    ConfigError {
        message: String,
        field: Option<String>,
    },

    /// Network errors
    NetworkError {
        message: String,
        address: Option<String>,
        source: Option<String>,
    },
}

impl TorrentError {
    pub fn parse_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ParseError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn metainfo_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::MetainfoError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn no_peers(url: impl Into<String>) -> Self {
        TorrentError::NoPeers { url: url.into() }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: None,
        }
    }

    /// Protocol violation with the offending detail, e.g. the bad value
    pub fn protocol_error_with_source(message: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::ProtocolError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn peer_error_with_peer(message: impl Into<String>, peer: impl Into<String>) -> Self {
        TorrentError::PeerError {
            message: message.into(),
            peer: Some(peer.into()),
            source: None,
        }
    }

    pub fn peer_error_full(message: impl Into<String>, peer: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::PeerError {
            message: message.into(),
            peer: Some(peer.into()),
            source: Some(source.into()),
        }
    }

    /// A piece's digest did not match; `piece_index` names it
    pub fn integrity_error(piece_index: u32, message: impl Into<String>) -> Self {
        TorrentError::IntegrityError {
            piece_index,
            message: message.into(),
        }
    }

    pub fn storage_error_full(message: impl Into<String>, path: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::StorageError {
            message: message.into(),
            path: Some(path.into()),
            source: Some(source.into()),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: None,
        }
    }

    pub fn config_error_with_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        TorrentError::ConfigError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: None,
            source: None,
        }
    }

    /// Create a new NetworkError with address and source
    pub fn network_error_full(message: impl Into<String>, address: impl Into<String>, source: impl Into<String>) -> Self {
        TorrentError::NetworkError {
            message: message.into(),
            address: Some(address.into()),
            source: Some(source.into()),
        }
    }

    /// Short kebab-case label printed on fatal exit
    pub fn label(&self) -> &'static str {
        match self {
            TorrentError::ParseError { .. } => "parse-error",
            TorrentError::MetainfoError { .. } => "metainfo-error",
            TorrentError::TrackerError { .. } => "tracker-error",
            TorrentError::NoPeers { .. } => "no-peers",
            TorrentError::ProtocolError { .. } => "protocol-error",
            TorrentError::PeerError { .. } => "peer-error",
            TorrentError::IntegrityError { .. } => "integrity-error",
            TorrentError::StorageError { .. } => "storage-error",
            TorrentError::ConfigError { .. } => "config-error",
            TorrentError::NetworkError { .. } => "network-error",
        }
    }

    /// Whether a peer connection must be torn down after this error.
    ///
    /// Integrity failures only cost the piece; everything else raised while
    /// talking to a peer ends that connection.
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(self, TorrentError::IntegrityError { .. })
    }

    /// Append `context` to the error's source chain
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match &mut self {
            TorrentError::ParseError { source, .. }
            | TorrentError::TrackerError { source, .. }
            | TorrentError::ProtocolError { source, .. }
            | TorrentError::PeerError { source, .. }
            | TorrentError::StorageError { source, .. }
            | TorrentError::NetworkError { source, .. } => {
                *source = Some(match source.take() {
                    Some(existing) => format!("{}: {}", existing, ctx),
                    None => ctx,
                });
            }
            _ => {}
        }
        self
    }

    /// Heading, message and the optional `(name: value)` details for display
    fn parts(&self) -> (&'static str, String, Vec<(&'static str, &str)>) {
        fn opt<'a>(name: &'static str, value: &'a Option<String>) -> Option<(&'static str, &'a str)> {
            value.as_deref().map(|v| (name, v))
        }

        match self {
            TorrentError::ParseError { message, source } => {
                ("Parse error", message.clone(), opt("source", source).into_iter().collect())
            }
            TorrentError::MetainfoError { message, field } => {
                ("Metainfo error", message.clone(), opt("field", field).into_iter().collect())
            }
            TorrentError::TrackerError { message, url, source } => (
                "Tracker error",
                message.clone(),
                [opt("url", url), opt("source", source)].into_iter().flatten().collect(),
            ),
            TorrentError::NoPeers { url } => {
                ("No peers", "tracker returned an empty peer list".to_string(), vec![("url", url.as_str())])
            }
            TorrentError::ProtocolError { message, source } => {
                ("Protocol error", message.clone(), opt("source", source).into_iter().collect())
            }
            TorrentError::PeerError { message, peer, source } => (
                "Peer error",
                message.clone(),
                [opt("peer", peer), opt("source", source)].into_iter().flatten().collect(),
            ),
            TorrentError::IntegrityError { piece_index, message } => {
                ("Integrity error", format!("{} (piece: {})", message, piece_index), Vec::new())
            }
            TorrentError::StorageError { message, path, source } => (
                "Storage error",
                message.clone(),
                [opt("path", path), opt("source", source)].into_iter().flatten().collect(),
            ),
            TorrentError::ConfigError { message, field } => {
                ("Config error", message.clone(), opt("field", field).into_iter().collect())
            }
            TorrentError::NetworkError { message, address, source } => (
                "Network error",
                message.clone(),
                [opt("address", address), opt("source", source)].into_iter().flatten().collect(),
            ),
        }
    }
}

impl fmt::Display for TorrentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (heading, message, details) = self.parts();
        write!(f, "{}: {}", heading, message)?;
        if !details.is_empty() {
            let rendered: Vec<String> = details.iter().map(|(name, value)| format!("{}: {}", name, value)).collect();
            write!(f, " ({})", rendered.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for TorrentError {}

impl From<BencodeError> for TorrentError {
    fn from(err: BencodeError) -> Self {
        TorrentError::parse_error_with_source(format!("Malformed bencode ({})", err.kind()), err.to_string())
    }
}

impl From<MetainfoError> for TorrentError {
    fn from(err: MetainfoError) -> Self {
        TorrentError::MetainfoError {
            message: err.to_string(),
            field: err.field().map(str::to_string),
        }
    }
}

impl From<TrackerError> for TorrentError {
    fn from(err: TrackerError) -> Self {
        TorrentError::TrackerError {
            message: format!("Announce failed ({})", err.kind()),
            url: None,
            source: Some(err.to_string()),
        }
    }
}

impl From<std::io::Error> for TorrentError {
    fn from(err: std::io::Error) -> Self {
        TorrentError::network_error_full(err.to_string(), "unknown".to_string(), err.kind().to_string())
    }
}

impl From<serde_json::Error> for TorrentError {
    fn from(err: serde_json::Error) -> Self {
        TorrentError::config_error(format!("Failed to parse JSON config: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for TorrentError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        TorrentError::network_error("Operation timed out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_without_details() {
        let err = TorrentError::protocol_error("Invalid frame");
        assert_eq!(err.to_string(), "Protocol error: Invalid frame");
        assert_eq!(err.label(), "protocol-error");
    }

    #[test]
    fn test_display_with_details() {
        let err = TorrentError::storage_error_full("Failed to create file", "/tmp/x", "denied");
        assert_eq!(err.to_string(), "Storage error: Failed to create file (path: /tmp/x, source: denied)");
    }

    #[test]
    fn test_parse_error_with_source() {
        let err = TorrentError::parse_error_with_source("Invalid torrent file", "bencode error");
        assert!(err.to_string().contains("Parse error"));
        assert!(err.to_string().contains("Invalid torrent file"));
        assert!(err.to_string().contains("bencode error"));
    }

    #[test]
    fn test_from_bencode_error() {
        let err: TorrentError = BencodeError::UnexpectedEof { offset: 2 }.into();
        assert!(matches!(err, TorrentError::ParseError { .. }));
        assert!(err.to_string().contains("unexpected-eof"));
    }

    #[test]
    fn test_from_metainfo_error_keeps_field() {
        let err: TorrentError = MetainfoError::MissingField("piece length").into();
        match &err {
            TorrentError::MetainfoError { field, .. } => {
                assert_eq!(field.as_deref(), Some("piece length"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.label(), "metainfo-error");
    }

    #[test]
    fn test_from_tracker_error() {
        let err: TorrentError = TrackerError::TrackerFailure("unregistered torrent".into()).into();
        assert_eq!(err.label(), "tracker-error");
        assert!(err.to_string().contains("unregistered torrent"));
    }

    #[test]
    fn test_peer_error_with_peer() {
        let err = TorrentError::peer_error_with_peer("Connection failed", "127.0.0.1:6881");
        assert!(err.to_string().contains("Peer error"));
        assert!(err.to_string().contains("127.0.0.1:6881"));
    }

    #[test]
    fn test_integrity_error_is_not_fatal_to_connection() {
        assert!(!TorrentError::integrity_error(3, "digest mismatch").is_fatal_to_connection());
        assert!(TorrentError::protocol_error("bad frame").is_fatal_to_connection());
    }

    #[test]
    fn test_no_peers_label() {
        let err = TorrentError::no_peers("http://tracker.example.com/announce");
        assert_eq!(err.label(), "no-peers");
        assert!(err.to_string().contains("tracker.example.com"));
    }

    #[test]
    fn test_with_context() {
        let err = TorrentError::protocol_error("Invalid data").with_context("while reading handshake");
        assert!(err.to_string().contains("while reading handshake"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: TorrentError = io_err.into();
        assert!(matches!(err, TorrentError::NetworkError { .. }));
    }

    #[tokio::test]
    async fn test_from_elapsed() {
        let elapsed = tokio::time::timeout(std::time::Duration::from_millis(1), std::future::pending::<()>())
            .await
            .unwrap_err();
        let err: TorrentError = elapsed.into();
        assert_eq!(err.label(), "network-error");
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_config_error_with_field() {
        let err = TorrentError::config_error_with_field("Invalid value", "max_connections");
        assert!(err.to_string().contains("Config error"));
        assert!(err.to_string().contains("max_connections"));
    }
}
