//! BitTorrent handshake protocol
//!
//! Handles the initial 68-byte exchange between peers. The layout is
//! `[19]["BitTorrent protocol"][8 reserved][info hash][peer id]`, and it is
//! parsed in three steps so a peer connection can advance as bytes arrive.

use bytes::{BufMut, BytesMut};
use tracing::{debug, error, info, trace};

use crate::error::TorrentError;

/// BitTorrent protocol identifier string
pub const PROTOCOL_STRING: &[u8; 19] = b"BitTorrent protocol";

/// Length of the protocol string
pub const PROTOCOL_LENGTH: u8 = 19;

/// Length byte + protocol string + reserved bytes
pub const HEADER_LENGTH: usize = 1 + PROTOCOL_LENGTH as usize + 8;

/// Full handshake length
pub const HANDSHAKE_LENGTH: usize = HEADER_LENGTH + 20 + 20;

/// Client prefix of generated peer ids
pub const PEER_ID_PREFIX: &[u8; 8] = b"-TF0001-";

/// BitTorrent handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Reserved extension bits; always zero on our side
    pub reserved: [u8; 8],
    /// Torrent info hash
    pub info_hash: [u8; 20],
    /// Sender's peer ID
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a new handshake with info_hash and peer_id
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        debug!("Creating new handshake for info_hash: {}", hex::encode(info_hash));
        Self {
            reserved: [0u8; 8],
            info_hash,
            peer_id,
        }
    }

    /// Generate a random peer ID with the client prefix
    pub fn generate_peer_id() -> [u8; 20] {
        let mut peer_id = [0u8; 20];
        peer_id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX);
        for byte in &mut peer_id[PEER_ID_PREFIX.len()..] {
            // Printable so the id survives logs and tracker dashboards
            *byte = rand::random::<u8>() % 10 + b'0';
        }
        info!("Generated new peer ID: {}", String::from_utf8_lossy(&peer_id));
        peer_id
    }

    /// Serialize the handshake to bytes
    pub fn serialize(&self) -> Vec<u8> {
        trace!("Serializing handshake");
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LENGTH);
        buf.put_u8(PROTOCOL_LENGTH);
        buf.put_slice(PROTOCOL_STRING);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.to_vec()
    }

    /// Deserialize a complete handshake from bytes
    pub fn deserialize(data: &[u8]) -> Result<Self, TorrentError> {
        trace!("Deserializing handshake from {} bytes", data.len());

        if data.len() < HANDSHAKE_LENGTH {
            error!("Handshake data too short: expected {} bytes, got {}", HANDSHAKE_LENGTH, data.len());
            return Err(TorrentError::protocol_error_with_source(
                "Handshake data too short",
                format!("expected {} bytes, got {}", HANDSHAKE_LENGTH, data.len()),
            ));
        }

        let reserved = parse_header(&data[..HEADER_LENGTH])?;
        let info_hash = parse_hash(&data[HEADER_LENGTH..HEADER_LENGTH + 20])?;
        let peer_id = parse_hash(&data[HEADER_LENGTH + 20..HANDSHAKE_LENGTH])?;

        Ok(Self {
            reserved,
            info_hash,
            peer_id,
        })
    }

    /// Check that the handshake belongs to our swarm
    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> bool {
        self.info_hash == *expected_info_hash
    }
}

/// Validate the fixed 28-byte header and return the reserved bytes
pub fn parse_header(header: &[u8]) -> Result<[u8; 8], TorrentError> {
    if header.len() != HEADER_LENGTH {
        return Err(TorrentError::protocol_error_with_source(
            "Handshake header has wrong size",
            format!("expected {} bytes, got {}", HEADER_LENGTH, header.len()),
        ));
    }

    if header[0] != PROTOCOL_LENGTH {
        return Err(TorrentError::protocol_error_with_source(
            "Invalid protocol length",
            format!("expected {}, got {}", PROTOCOL_LENGTH, header[0]),
        ));
    }

    if &header[1..20] != PROTOCOL_STRING {
        return Err(TorrentError::protocol_error_with_source(
            "Invalid protocol string",
            String::from_utf8_lossy(&header[1..20]).into_owned(),
        ));
    }

    let mut reserved = [0u8; 8];
    reserved.copy_from_slice(&header[20..28]);
    if reserved != [0u8; 8] {
        debug!("Peer advertises reserved bits {}", hex::encode(reserved));
    }
    Ok(reserved)
}

/// Read a 20-byte info hash or peer id
pub fn parse_hash(data: &[u8]) -> Result<[u8; 20], TorrentError> {
    data.try_into().map_err(|_| {
        TorrentError::protocol_error_with_source("Expected a 20-byte hash", format!("got {} bytes", data.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_serialize_deserialize() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);

        let serialized = handshake.serialize();
        assert_eq!(serialized.len(), HANDSHAKE_LENGTH);
        assert_eq!(serialized[0], 19);
        assert_eq!(&serialized[1..20], b"BitTorrent protocol");
        assert_eq!(&serialized[20..28], &[0u8; 8]);

        let deserialized = Handshake::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, handshake);
    }

    #[test]
    fn test_generate_peer_id() {
        let peer_id = Handshake::generate_peer_id();
        assert_eq!(&peer_id[0..8], b"-TF0001-");
        assert!(peer_id[8..].iter().all(u8::is_ascii_digit));
    }

    #[test]
    fn test_handshake_validate() {
        let handshake = Handshake::new([1u8; 20], [2u8; 20]);
        assert!(handshake.validate(&[1u8; 20]));
        assert!(!handshake.validate(&[3u8; 20]));
    }

    #[test]
    fn test_bad_header() {
        let mut data = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        data[5] = b'x';
        let err = Handshake::deserialize(&data).unwrap_err();
        assert_eq!(err.label(), "protocol-error");

        let mut data = Handshake::new([1u8; 20], [2u8; 20]).serialize();
        data[0] = 18;
        assert!(parse_header(&data[..HEADER_LENGTH]).is_err());
    }

    #[test]
    fn test_short_handshake() {
        assert!(Handshake::deserialize(&[19u8; 40]).is_err());
        assert!(parse_hash(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_reserved_bits_preserved() {
        let mut handshake = Handshake::new([1u8; 20], [2u8; 20]);
        handshake.reserved[5] = 0x10;
        let deserialized = Handshake::deserialize(&handshake.serialize()).unwrap();
        assert_eq!(deserialized.reserved[5], 0x10);
    }
}
