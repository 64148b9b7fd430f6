//! Announce response decoding

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use tracing::{debug, trace, warn};

use crate::bencode::{decode, BencodeValue};
use crate::tracker::error::TrackerError;

/// Size of one entry in the compact peer list
pub const COMPACT_PEER_LENGTH: usize = 6;

/// A peer endpoint returned by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse one compact entry: 4-byte big-endian IP, 2-byte big-endian port
    pub fn from_compact(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < COMPACT_PEER_LENGTH {
            return None;
        }
        let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let port = u16::from_be_bytes([bytes[4], bytes[5]]);
        Some(Self { ip, port })
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }
}

impl From<PeerAddress> for SocketAddr {
    fn from(peer: PeerAddress) -> Self {
        peer.to_socket_addr()
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Decoded announce reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub peers: Vec<PeerAddress>,
    /// Seconds the tracker asks us to wait before re-announcing
    pub interval: Option<u32>,
    pub warning_message: Option<String>,
}

impl AnnounceResponse {
    /// Decode a bencoded tracker reply
    pub fn from_bytes(body: &[u8]) -> Result<Self, TrackerError> {
        trace!("Decoding {} byte tracker response", body.len());
        let value = decode(body)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| TrackerError::MalformedResponse(format!("expected dictionary, found {}", value.kind_name())))?;

        if let Some(reason) = dict.get(b"failure reason".as_slice()) {
            let reason = reason
                .as_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_else(|| "unspecified".to_string());
            return Err(TrackerError::TrackerFailure(reason));
        }

        let interval = dict
            .get(b"interval".as_slice())
            .and_then(|v| v.as_integer())
            .and_then(|v| u32::try_from(v).ok());

        let warning_message = dict
            .get(b"warning message".as_slice())
            .and_then(|v| v.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned());
        if let Some(warning) = &warning_message {
            warn!("Tracker warning: {}", warning);
        }

        let peers = match dict.get(b"peers".as_slice()) {
            Some(BencodeValue::ByteString(bytes)) => parse_compact_peers(bytes)?,
            Some(BencodeValue::List(list)) => parse_peer_list(list)?,
            Some(other) => {
                return Err(TrackerError::MalformedResponse(format!(
                    "\"peers\" must be a byte string or list, found {}",
                    other.kind_name()
                )))
            }
            None => return Err(TrackerError::MalformedResponse("missing \"peers\"".to_string())),
        };

        debug!("Tracker returned {} peers (interval {:?})", peers.len(), interval);
        Ok(Self {
            peers,
            interval,
            warning_message,
        })
    }
}

/// Parse the compact peer form
pub fn parse_compact_peers(data: &[u8]) -> Result<Vec<PeerAddress>, TrackerError> {
    if data.len() % COMPACT_PEER_LENGTH != 0 {
        return Err(TrackerError::MalformedResponse(format!(
            "compact peer list length {} is not a multiple of {}",
            data.len(),
            COMPACT_PEER_LENGTH
        )));
    }
    Ok(data
        .chunks_exact(COMPACT_PEER_LENGTH)
        .filter_map(PeerAddress::from_compact)
        .collect())
}

/// Parse the list-of-dictionaries peer form; entries without an IPv4 address are skipped
pub fn parse_peer_list(list: &[BencodeValue]) -> Result<Vec<PeerAddress>, TrackerError> {
    let mut peers = Vec::with_capacity(list.len());
    for entry in list {
        let dict = entry
            .as_dict()
            .ok_or_else(|| TrackerError::MalformedResponse(format!("peer entry is a {}", entry.kind_name())))?;

        let ip = dict
            .get(b"ip".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| TrackerError::MalformedResponse("peer entry without \"ip\"".to_string()))?;
        let port = dict
            .get(b"port".as_slice())
            .and_then(|v| v.as_integer())
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| TrackerError::MalformedResponse("peer entry without a valid \"port\"".to_string()))?;

        match ip.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => peers.push(PeerAddress::new(v4, port)),
            Ok(IpAddr::V6(_)) | Err(_) => trace!("Skipping non-IPv4 peer entry {}", ip),
        }
    }
    Ok(peers)
}
