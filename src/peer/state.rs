//! Peer state module
//!
//! Defines the connection lifecycle, choke/interest flags and per-peer counters.

use std::fmt;

/// Lifecycle of a single peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Waiting for the transport to connect
    #[default]
    Connecting,
    /// Waiting for the 28-byte handshake header
    HandshakeHeaderWait,
    /// Waiting for the remote info hash
    HandshakeInfoHashWait,
    /// Waiting for the remote peer id
    HandshakePeerIdWait,
    /// Exchanging length-prefixed messages
    Established,
    /// Close requested, teardown pending
    Closing,
    /// Terminal
    Closed,
}

impl ConnectionState {
    /// Check if the handshake is still in progress
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            ConnectionState::HandshakeHeaderWait | ConnectionState::HandshakeInfoHashWait | ConnectionState::HandshakePeerIdWait
        )
    }

    pub fn is_established(&self) -> bool {
        matches!(self, ConnectionState::Established)
    }

    /// Check if input may still be processed
    pub fn is_open(&self) -> bool {
        !matches!(self, ConnectionState::Closing | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::HandshakeHeaderWait => "handshake-header",
            ConnectionState::HandshakeInfoHashWait => "handshake-info-hash",
            ConnectionState::HandshakePeerIdWait => "handshake-peer-id",
            ConnectionState::Established => "established",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Choke and interest flags in both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChokeFlags {
    /// The peer is choking us
    pub me_choked: bool,
    /// We told the peer we are interested
    pub me_interested: bool,
    /// We are choking the peer
    pub them_choked: bool,
    /// The peer told us it is interested
    pub them_interested: bool,
}

impl Default for ChokeFlags {
    fn default() -> Self {
        Self {
            me_choked: true,
            me_interested: false,
            them_choked: true,
            them_interested: false,
        }
    }
}

impl ChokeFlags {
    /// Check if we can request from peer
    pub fn can_request(&self) -> bool {
        !self.me_choked && self.me_interested
    }
}

/// Counters for one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub messages_received: u64,
    pub blocks_received: u64,
    pub bytes_received: u64,
    pub requests_sent: u64,
    pub pieces_verified: u32,
    pub integrity_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_flags() {
        let flags = ChokeFlags::default();
        assert!(flags.me_choked);
        assert!(flags.them_choked);
        assert!(!flags.can_request());
    }

    #[test]
    fn test_can_request() {
        let flags = ChokeFlags {
            me_choked: false,
            me_interested: true,
            ..ChokeFlags::default()
        };
        assert!(flags.can_request());
    }

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::HandshakeInfoHashWait.is_handshaking());
        assert!(!ConnectionState::Established.is_handshaking());
        assert!(ConnectionState::Connecting.is_open());
        assert!(!ConnectionState::Closing.is_open());
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
