//! Peer connection module
//!
//! The per-peer protocol state machine. It performs no I/O: the driver feeds
//! it raw reads and writes out whatever [`Outbound`] units it returns, so the
//! same machine can be exercised byte by byte in tests.

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::state::{ChokeFlags, ConnectionState, PeerStats};
use crate::protocol::handshake::{parse_hash, parse_header};
use crate::protocol::{Handshake, Message, ReadQueue, HEADER_LENGTH, MAX_MESSAGE_LENGTH};
use crate::storage::{Bitfield, BlockOutcome, BlockRequest, DownloadState};

/// Upper bound on outstanding block requests per peer
pub const MAX_IN_FLIGHT_REQUESTS: usize = 5;

/// A unit the driver must write to the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Handshake(Handshake),
    Message(Message),
}

impl Outbound {
    /// Serialize to wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Outbound::Handshake(handshake) => handshake.serialize(),
            Outbound::Message(message) => message.serialize(),
        }
    }
}

/// Protocol state for one remote peer
#[derive(Debug)]
pub struct PeerConnection {
    addr: SocketAddr,
    info_hash: [u8; 20],
    local_peer_id: [u8; 20],
    piece_count: usize,
    state: ConnectionState,
    flags: ChokeFlags,
    remote_peer_id: Option<[u8; 20]>,
    remote_pieces: Bitfield,
    /// Whether the peer has sent a bitfield or any have message
    remote_advertised: bool,
    in_flight: Vec<BlockRequest>,
    read_queue: ReadQueue,
    handshake_sent: bool,
    error: Option<TorrentError>,
    stats: PeerStats,
}

impl PeerConnection {
    /// Create a new connection in the `Connecting` state
    pub fn new(addr: SocketAddr, info_hash: [u8; 20], local_peer_id: [u8; 20], piece_count: usize) -> Self {
        Self {
            addr,
            info_hash,
            local_peer_id,
            piece_count,
            state: ConnectionState::Connecting,
            flags: ChokeFlags::default(),
            remote_peer_id: None,
            remote_pieces: Bitfield::new(piece_count),
            remote_advertised: false,
            in_flight: Vec::with_capacity(MAX_IN_FLIGHT_REQUESTS),
            read_queue: ReadQueue::new(),
            handshake_sent: false,
            error: None,
            stats: PeerStats::default(),
        }
    }

    /// Create a connection for the swarm tracked by `download`
    pub fn for_download(addr: SocketAddr, download: &DownloadState) -> Self {
        Self::new(addr, download.info_hash(), download.peer_id(), download.piece_count())
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn flags(&self) -> ChokeFlags {
        self.flags
    }

    /// Peer id recorded from the remote handshake
    pub fn remote_peer_id(&self) -> Option<[u8; 20]> {
        self.remote_peer_id
    }

    pub fn remote_pieces(&self) -> &Bitfield {
        &self.remote_pieces
    }

    pub fn in_flight(&self) -> &[BlockRequest] {
        &self.in_flight
    }

    /// The error that closed the connection, if any
    pub fn error(&self) -> Option<&TorrentError> {
        self.error.as_ref()
    }

    pub fn stats(&self) -> &PeerStats {
        &self.stats
    }

    /// Bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.read_queue.len()
    }

    /// Transport connected: send our handshake and wait for theirs
    pub fn on_connected(&mut self) -> Vec<Outbound> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        debug!("Connected to {}, sending handshake", self.addr);
        self.state = ConnectionState::HandshakeHeaderWait;
        vec![self.local_handshake()]
    }

    /// Transport failed to connect; nothing was ever in flight
    pub fn on_connect_failed(&mut self, error: TorrentError) {
        warn!("Failed to connect to {}: {}", self.addr, error);
        self.error = Some(error);
        self.state = ConnectionState::Closed;
    }

    /// Feed one raw read into the machine.
    ///
    /// Consumes as many complete units as are buffered. A protocol violation
    /// records the error and closes the connection; the returned units are
    /// still safe to write.
    pub fn on_read(&mut self, data: impl Into<Bytes>, download: &mut DownloadState) -> Vec<Outbound> {
        let mut out = Vec::new();
        if !self.state.is_open() {
            trace!("Ignoring read on {} connection to {}", self.state, self.addr);
            return out;
        }
        if self.state == ConnectionState::Connecting {
            warn!("Data from {} before the connection completed", self.addr);
            return out;
        }

        self.read_queue.push(data);
        loop {
            match self.process_next(download, &mut out) {
                Ok(true) => continue,
                Ok(false) => break,
                Err(error) => {
                    self.fail(error, download);
                    break;
                }
            }
        }
        out
    }

    /// Request the close. Returns false if it was already requested.
    ///
    /// Every block still in flight is handed back to the coordinator.
    pub fn close(&mut self, download: &mut DownloadState) -> bool {
        if !self.state.is_open() {
            return false;
        }
        debug!(
            "Closing connection to {} in state {} ({} requests in flight)",
            self.addr,
            self.state,
            self.in_flight.len()
        );
        for request in self.in_flight.drain(..) {
            download.release_block(&request, self.addr);
        }
        self.state = ConnectionState::Closing;
        true
    }

    /// Record a fatal error and close
    pub fn fail(&mut self, error: TorrentError, download: &mut DownloadState) {
        if self.state.is_open() {
            warn!("Dropping peer {}: {}", self.addr, error);
            self.error = Some(error);
        }
        self.close(download);
    }

    /// Transport torn down
    pub fn on_closed(&mut self) {
        if self.state != ConnectionState::Closed {
            info!(
                "Connection to {} closed after {} blocks ({} bytes)",
                self.addr, self.stats.blocks_received, self.stats.bytes_received
            );
        }
        self.state = ConnectionState::Closed;
        self.read_queue = ReadQueue::new();
    }

    fn local_handshake(&mut self) -> Outbound {
        self.handshake_sent = true;
        Outbound::Handshake(Handshake::new(self.info_hash, self.local_peer_id))
    }

    /// Try to consume one unit from the read queue
    fn process_next(&mut self, download: &mut DownloadState, out: &mut Vec<Outbound>) -> Result<bool, TorrentError> {
        match self.state {
            ConnectionState::HandshakeHeaderWait => {
                let Some(header) = self.read_queue.take_exact(HEADER_LENGTH) else {
                    return Ok(false);
                };
                parse_header(&header)?;
                trace!("Handshake header from {} accepted", self.addr);
                self.state = ConnectionState::HandshakeInfoHashWait;
            }
            ConnectionState::HandshakeInfoHashWait => {
                let Some(hash) = self.read_queue.take_exact(20) else {
                    return Ok(false);
                };
                let info_hash = parse_hash(&hash)?;
                if info_hash != self.info_hash {
                    return Err(TorrentError::protocol_error_with_source(
                        "Peer is in a different swarm",
                        format!("expected info hash {}, got {}", hex::encode(self.info_hash), hex::encode(info_hash)),
                    ));
                }
                self.state = ConnectionState::HandshakePeerIdWait;
            }
            ConnectionState::HandshakePeerIdWait => {
                let Some(peer_id) = self.read_queue.take_exact(20) else {
                    return Ok(false);
                };
                let peer_id = parse_hash(&peer_id)?;
                self.remote_peer_id = Some(peer_id);
                self.state = ConnectionState::Established;
                info!("Handshake complete with {} (peer id {})", self.addr, String::from_utf8_lossy(&peer_id));

                if !self.handshake_sent {
                    out.push(self.local_handshake());
                }
                self.flags.me_interested = true;
                out.push(Outbound::Message(Message::Interested));
            }
            ConnectionState::Established => {
                let Some(frame) = self.read_queue.read_frame(MAX_MESSAGE_LENGTH)? else {
                    return Ok(false);
                };
                let message = Message::deserialize(&frame)?;
                self.stats.messages_received += 1;
                self.handle_message(message, download, out)?;
            }
            ConnectionState::Connecting | ConnectionState::Closing | ConnectionState::Closed => return Ok(false),
        }
        Ok(true)
    }

    fn handle_message(&mut self, message: Message, download: &mut DownloadState, out: &mut Vec<Outbound>) -> Result<(), TorrentError> {
        match message {
            Message::KeepAlive => trace!("KeepAlive from {}", self.addr),
            Message::Choke => {
                debug!("Choked by {} ({} requests left outstanding)", self.addr, self.in_flight.len());
                self.flags.me_choked = true;
            }
            Message::Unchoke => {
                debug!("Unchoked by {}", self.addr);
                self.flags.me_choked = false;
                self.fill_pipeline(download, out);
            }
            Message::Interested => self.flags.them_interested = true,
            Message::NotInterested => self.flags.them_interested = false,
            Message::Have { piece_index } => {
                self.check_piece_index(piece_index, "have")?;
                self.remote_pieces.set(piece_index as usize);
                self.remote_advertised = true;
                self.fill_pipeline(download, out);
            }
            Message::Bitfield { bitfield } => {
                self.remote_pieces = Bitfield::from_bytes(&bitfield, self.piece_count)?;
                self.remote_advertised = true;
                debug!("{} has {}/{} pieces", self.addr, self.remote_pieces.count(), self.piece_count);
                self.fill_pipeline(download, out);
            }
            Message::Request { index, begin, length } => {
                // We never unchoke, so requests are only validated
                self.check_piece_index(index, "request")?;
                trace!("Ignoring request {}:{}+{} from {}", index, begin, length, self.addr);
            }
            Message::Cancel { index, begin, length } => {
                self.check_piece_index(index, "cancel")?;
                trace!("Ignoring cancel {}:{}+{} from {}", index, begin, length, self.addr);
            }
            Message::Piece { index, begin, block } => self.handle_block(index, begin, &block, download, out)?,
            Message::Unknown { id } => debug!("Skipped unknown message id {} from {}", id, self.addr),
        }
        Ok(())
    }

    fn handle_block(
        &mut self,
        index: u32,
        begin: u32,
        block: &[u8],
        download: &mut DownloadState,
        out: &mut Vec<Outbound>,
    ) -> Result<(), TorrentError> {
        match self.in_flight.iter().position(|r| r.piece_index == index && r.begin == begin) {
            Some(slot) => {
                self.in_flight.swap_remove(slot);
            }
            None => debug!("Unrequested block {}:{} from {}", index, begin, self.addr),
        }
        self.stats.blocks_received += 1;
        self.stats.bytes_received += block.len() as u64;

        match download.mark_block_complete(index, begin, block) {
            Ok(BlockOutcome::PieceVerified(piece)) => {
                self.stats.pieces_verified += 1;
                trace!("Piece {} verified from {}", piece, self.addr);
            }
            Ok(BlockOutcome::DownloadComplete) => {
                self.stats.pieces_verified += 1;
                info!("Final piece received from {}", self.addr);
                self.flags.me_interested = false;
                out.push(Outbound::Message(Message::NotInterested));
                return Ok(());
            }
            Ok(BlockOutcome::Accepted) | Ok(BlockOutcome::Duplicate) => {}
            Err(error) if !error.is_fatal_to_connection() => {
                self.stats.integrity_failures += 1;
                warn!("{} (from {})", error, self.addr);
            }
            Err(error) => return Err(error),
        }

        self.fill_pipeline(download, out);
        Ok(())
    }

    /// Issue requests until the pipeline is full or the coordinator runs dry
    fn fill_pipeline(&mut self, download: &mut DownloadState, out: &mut Vec<Outbound>) {
        if self.state != ConnectionState::Established || !self.flags.can_request() {
            return;
        }
        while self.in_flight.len() < MAX_IN_FLIGHT_REQUESTS {
            let hints = self.remote_advertised.then_some(&self.remote_pieces);
            let Some(request) = download.request_next_block(hints, self.addr) else {
                break;
            };
            trace!("Requesting {}:{}+{} from {}", request.piece_index, request.begin, request.length, self.addr);
            self.in_flight.push(request);
            self.stats.requests_sent += 1;
            out.push(Outbound::Message(request.to_message()));
        }
    }

    fn check_piece_index(&self, index: u32, kind: &str) -> Result<(), TorrentError> {
        if index as usize >= self.piece_count {
            return Err(TorrentError::protocol_error_with_source(
                format!("Invalid piece index in {} message", kind),
                format!("{} >= {}", index, self.piece_count),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::piece::BLOCK_LENGTH;
    use crate::storage::PieceStatus;
    use crate::torrent::Metainfo;
    use std::sync::Arc;

    const REMOTE_ID: [u8; 20] = *b"-XX0001-remotepeer01";

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 241) as u8).collect()
    }

    fn download_for(content: &[u8], piece_length: u64) -> DownloadState {
        DownloadState::new(Arc::new(Metainfo::for_content(content, piece_length)), [b'L'; 20]).unwrap()
    }

    fn remote_handshake(download: &DownloadState) -> Vec<u8> {
        Handshake::new(download.info_hash(), REMOTE_ID).serialize()
    }

    fn connected(download: &DownloadState) -> PeerConnection {
        let mut conn = PeerConnection::for_download("127.0.0.1:6881".parse().unwrap(), download);
        let out = conn.on_connected();
        assert!(matches!(out.as_slice(), [Outbound::Handshake(_)]));
        conn
    }

    fn established(download: &mut DownloadState) -> PeerConnection {
        let mut conn = connected(download);
        let handshake = remote_handshake(download);
        conn.on_read(handshake, download);
        assert_eq!(conn.state(), ConnectionState::Established);
        conn
    }

    fn established_at(port: u16, download: &mut DownloadState) -> PeerConnection {
        let mut conn = PeerConnection::for_download(SocketAddr::from(([127, 0, 0, 1], port)), download);
        conn.on_connected();
        let handshake = remote_handshake(download);
        conn.on_read(handshake, download);
        assert_eq!(conn.state(), ConnectionState::Established);
        conn
    }

    fn requests(out: &[Outbound]) -> Vec<BlockRequest> {
        out.iter()
            .filter_map(|o| match o {
                Outbound::Message(Message::Request { index, begin, length }) => {
                    Some(BlockRequest::new(*index, *begin, *length))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_handshake_in_one_read() {
        let mut download = download_for(&content(100), 32);
        let mut conn = connected(&download);

        let out = conn.on_read(remote_handshake(&download), &mut download);
        assert_eq!(conn.state(), ConnectionState::Established);
        assert_eq!(conn.remote_peer_id(), Some(REMOTE_ID));
        assert_eq!(out, vec![Outbound::Message(Message::Interested)]);
        assert!(conn.flags().me_interested);
    }

    #[test]
    fn test_handshake_split_across_reads() {
        let mut download = download_for(&content(100), 32);
        let mut conn = connected(&download);
        let handshake = remote_handshake(&download);

        assert!(conn.on_read(handshake[..1].to_vec(), &mut download).is_empty());
        assert_eq!(conn.state(), ConnectionState::HandshakeHeaderWait);
        assert!(conn.on_read(handshake[1..31].to_vec(), &mut download).is_empty());
        assert_eq!(conn.state(), ConnectionState::HandshakeInfoHashWait);
        let out = conn.on_read(handshake[31..].to_vec(), &mut download);

        assert_eq!(conn.state(), ConnectionState::Established);
        assert_eq!(conn.remote_peer_id(), Some(REMOTE_ID));
        assert_eq!(out, vec![Outbound::Message(Message::Interested)]);
        assert_eq!(conn.buffered(), 0);
    }

    #[test]
    fn test_handshake_byte_by_byte_with_trailing_message() {
        let mut download = download_for(&content(100), 32);
        let mut conn = connected(&download);
        let mut bytes = remote_handshake(&download);
        bytes.extend_from_slice(&Message::Unchoke.serialize());

        let mut out = Vec::new();
        for byte in bytes {
            out.extend(conn.on_read(vec![byte], &mut download));
        }
        assert_eq!(conn.state(), ConnectionState::Established);
        assert!(!conn.flags().me_choked);
        assert_eq!(requests(&out).len(), 4);
    }

    #[test]
    fn test_inbound_handshake_is_answered_once() {
        let mut download = download_for(&content(100), 32);
        let mut conn = PeerConnection::for_download("127.0.0.1:1".parse().unwrap(), &download);
        // Accepted connections skip on_connected's handshake
        conn.state = ConnectionState::HandshakeHeaderWait;

        let out = conn.on_read(remote_handshake(&download), &mut download);
        assert!(matches!(out.as_slice(), [Outbound::Handshake(_), Outbound::Message(Message::Interested)]));
    }

    #[test]
    fn test_wrong_protocol_string_closes() {
        let mut download = download_for(&content(100), 32);
        let mut conn = connected(&download);
        let mut handshake = remote_handshake(&download);
        handshake[3] = b'?';

        conn.on_read(handshake, &mut download);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(conn.error().map(|e| e.label()), Some("protocol-error"));
    }

    #[test]
    fn test_different_swarm_closes() {
        let mut download = download_for(&content(100), 32);
        let mut conn = connected(&download);
        let handshake = Handshake::new([0x11; 20], REMOTE_ID).serialize();

        conn.on_read(handshake, &mut download);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.error().unwrap().to_string().contains("different swarm"));
        assert_eq!(conn.remote_peer_id(), None);
    }

    #[test]
    fn test_choke_frame_sets_me_choked() {
        let mut download = download_for(&content(100), 32);
        let mut conn = established(&mut download);

        conn.on_read(Message::Unchoke.serialize(), &mut download);
        assert!(!conn.flags().me_choked);
        conn.on_read(vec![0u8, 0, 0, 1, 0], &mut download);
        assert!(conn.flags().me_choked);
        assert_eq!(conn.state(), ConnectionState::Established);
    }

    #[test]
    fn test_choke_keeps_outstanding_requests() {
        let mut download = download_for(&content(100), 32);
        let mut conn = established(&mut download);

        conn.on_read(Message::Unchoke.serialize(), &mut download);
        let outstanding = conn.in_flight().len();
        conn.on_read(Message::Choke.serialize(), &mut download);
        assert_eq!(conn.in_flight().len(), outstanding);
        assert_eq!(download.piece_status(0), Some(PieceStatus::InFlight));
    }

    #[test]
    fn test_have_out_of_range_closes() {
        let mut download = download_for(&content(100), 32);
        let mut conn = established(&mut download);

        conn.on_read(Message::Have { piece_index: 3 }.serialize(), &mut download);
        assert_eq!(conn.state(), ConnectionState::Established);
        assert!(conn.remote_pieces().has(3));

        conn.on_read(Message::Have { piece_index: 4 }.serialize(), &mut download);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(conn.error().map(|e| e.label()), Some("protocol-error"));
    }

    #[test]
    fn test_oversized_frame_closes() {
        let mut download = download_for(&content(100), 32);
        let mut conn = established(&mut download);

        conn.on_read(vec![0x7fu8, 0, 0, 0, 7], &mut download);
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_pipeline_is_capped() {
        let data = content(4 * BLOCK_LENGTH as usize * 4);
        let mut download = download_for(&data, 4 * BLOCK_LENGTH as u64);
        let mut conn = established(&mut download);

        let out = conn.on_read(Message::Unchoke.serialize(), &mut download);
        let sent = requests(&out);
        assert_eq!(sent.len(), MAX_IN_FLIGHT_REQUESTS);
        assert_eq!(conn.in_flight().len(), MAX_IN_FLIGHT_REQUESTS);
        assert!(sent[..4].iter().all(|r| r.piece_index == 0));

        // One delivered block frees exactly one slot
        let first = sent[0];
        let start = first.begin as usize;
        let block = data[start..start + first.length as usize].to_vec();
        let out = conn.on_read(
            Message::Piece { index: 0, begin: first.begin, block }.serialize(),
            &mut download,
        );
        assert_eq!(requests(&out).len(), 1);
        assert_eq!(conn.in_flight().len(), MAX_IN_FLIGHT_REQUESTS);
    }

    #[test]
    fn test_bitfield_limits_requests() {
        let mut download = download_for(&content(100), 32);
        let mut conn = established(&mut download);

        conn.on_read(Message::Bitfield { bitfield: vec![0b0010_0000] }.serialize(), &mut download);
        let out = conn.on_read(Message::Unchoke.serialize(), &mut download);
        let sent = requests(&out);
        assert_eq!(sent, vec![BlockRequest::new(2, 0, 32)]);
    }

    #[test]
    fn test_bad_bitfield_closes() {
        let mut download = download_for(&content(100), 32);
        let mut conn = established(&mut download);

        conn.on_read(Message::Bitfield { bitfield: vec![0, 0] }.serialize(), &mut download);
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_download_to_completion() {
        let data = content(100);
        let mut download = download_for(&data, 32);
        let mut conn = established(&mut download);

        let mut pending = requests(&conn.on_read(Message::Unchoke.serialize(), &mut download));
        let mut saw_not_interested = false;
        while let Some(request) = pending.pop() {
            let start = (request.piece_index * 32 + request.begin) as usize;
            let block = data[start..start + request.length as usize].to_vec();
            let out = conn.on_read(
                Message::Piece { index: request.piece_index, begin: request.begin, block }.serialize(),
                &mut download,
            );
            saw_not_interested |= out.contains(&Outbound::Message(Message::NotInterested));
            pending.extend(requests(&out));
        }

        assert!(download.is_complete());
        assert!(saw_not_interested);
        assert_eq!(conn.stats().pieces_verified, 4);
        assert!(conn.in_flight().is_empty());
    }

    #[test]
    fn test_corrupt_block_is_not_fatal() {
        let data = content(100);
        let mut download = download_for(&data, 32);
        let mut conn = established(&mut download);
        conn.on_read(Message::Bitfield { bitfield: vec![0b1000_0000] }.serialize(), &mut download);
        conn.on_read(Message::Unchoke.serialize(), &mut download);

        let out = conn.on_read(
            Message::Piece { index: 0, begin: 0, block: vec![0xee; 32] }.serialize(),
            &mut download,
        );
        assert_eq!(conn.state(), ConnectionState::Established);
        assert_eq!(conn.stats().integrity_failures, 1);
        // The reset piece is requested again right away
        assert_eq!(requests(&out), vec![BlockRequest::new(0, 0, 32)]);
    }

    #[test]
    fn test_close_is_idempotent_and_releases_blocks() {
        let mut download = download_for(&content(100), 32);
        let mut conn = established(&mut download);
        conn.on_read(Message::Unchoke.serialize(), &mut download);
        assert_eq!(download.piece_status(0), Some(PieceStatus::InFlight));

        assert!(conn.close(&mut download));
        assert!(!conn.close(&mut download));
        assert!(conn.in_flight().is_empty());
        assert_eq!(download.piece_status(0), Some(PieceStatus::Needed));
        assert_eq!(download.request_next_block(None, conn.addr()), Some(BlockRequest::new(0, 0, 32)));

        conn.on_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.on_read(Message::Unchoke.serialize(), &mut download).is_empty());
        assert!(!conn.close(&mut download));
    }

    #[test]
    fn test_close_after_piece_reset_keeps_reclaimed_block() {
        let data = content(100);
        let mut download = download_for(&data, 32);

        let mut a = established_at(1, &mut download);
        a.on_read(Message::Bitfield { bitfield: vec![0b1000_0000] }.serialize(), &mut download);
        let out = a.on_read(Message::Unchoke.serialize(), &mut download);
        assert_eq!(requests(&out), vec![BlockRequest::new(0, 0, 32)]);

        // b delivers piece 0 without asking for it, and the data is corrupt
        let mut b = established_at(2, &mut download);
        b.on_read(Message::Bitfield { bitfield: vec![0b0100_0000] }.serialize(), &mut download);
        b.on_read(Message::Unchoke.serialize(), &mut download);
        b.on_read(
            Message::Piece { index: 0, begin: 0, block: vec![0xee; 32] }.serialize(),
            &mut download,
        );
        assert_eq!(b.stats().integrity_failures, 1);

        let mut c = established_at(3, &mut download);
        c.on_read(Message::Bitfield { bitfield: vec![0b1000_0000] }.serialize(), &mut download);
        let out = c.on_read(Message::Unchoke.serialize(), &mut download);
        assert_eq!(requests(&out), vec![BlockRequest::new(0, 0, 32)]);

        // a still lists 0:0 as in flight, but c holds it now
        assert_eq!(a.in_flight(), &[BlockRequest::new(0, 0, 32)]);
        assert!(a.close(&mut download));
        let mut only_first = Bitfield::new(4);
        only_first.set(0);
        assert_eq!(download.request_next_block(Some(&only_first), "127.0.0.1:4".parse().unwrap()), None);
        assert_eq!(download.piece_status(0), Some(PieceStatus::InFlight));

        c.on_read(
            Message::Piece { index: 0, begin: 0, block: data[..32].to_vec() }.serialize(),
            &mut download,
        );
        assert_eq!(download.piece_status(0), Some(PieceStatus::Have));
        assert_eq!(c.stats().pieces_verified, 1);
    }

    #[test]
    fn test_connect_failure() {
        let download = download_for(&content(100), 32);
        let mut conn = PeerConnection::for_download("127.0.0.1:1".parse().unwrap(), &download);
        conn.on_connect_failed(TorrentError::network_error("refused"));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.on_connected().is_empty());
    }

    #[test]
    fn test_unknown_message_is_skipped() {
        let mut download = download_for(&content(100), 32);
        let mut conn = established(&mut download);

        conn.on_read(vec![0u8, 0, 0, 3, 20, 1, 2], &mut download);
        assert_eq!(conn.state(), ConnectionState::Established);
        assert_eq!(conn.stats().messages_received, 1);
    }
}
