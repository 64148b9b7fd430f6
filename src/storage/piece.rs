//! Piece storage module
//!
//! Manages individual pieces, their blocks and the piece bitfield.

use std::net::SocketAddr;

use sha1::{Digest, Sha1};
use tracing::trace;

use crate::error::TorrentError;
use crate::protocol::Message;

/// Size of a requested block; only the last block of a piece can be shorter
pub const BLOCK_LENGTH: u32 = 16 * 1024;

/// Status of a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PieceStatus {
    /// Nothing requested or received
    #[default]
    Needed,
    /// Some blocks requested or received, not yet verified
    InFlight,
    /// Verified against its digest
    Have,
}

/// A block to request from a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece_index: u32,
    pub begin: u32,
    pub length: u32,
}

impl BlockRequest {
    /// Create a new block request
    pub fn new(piece_index: u32, begin: u32, length: u32) -> Self {
        Self {
            piece_index,
            begin,
            length,
        }
    }

    /// The `request` message asking for this block
    pub fn to_message(&self) -> Message {
        Message::Request {
            index: self.piece_index,
            begin: self.begin,
            length: self.length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockSlot {
    Missing,
    /// Held by the peer at this address
    Requested(SocketAddr),
    Received,
}

/// Represents a piece of the torrent
#[derive(Debug, Clone)]
pub struct Piece {
    index: u32,
    length: u32,
    hash: [u8; 20],
    /// Allocated on the first received block
    data: Vec<u8>,
    blocks: Vec<BlockSlot>,
    verified: bool,
}

impl Piece {
    /// Create a new piece
    pub fn new(index: u32, length: u32, expected_hash: [u8; 20]) -> Self {
        let num_blocks = length.div_ceil(BLOCK_LENGTH) as usize;
        Self {
            index,
            length,
            hash: expected_hash,
            data: Vec::new(),
            blocks: vec![BlockSlot::Missing; num_blocks],
            verified: false,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Get the number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Length of the block starting at `begin`
    pub fn block_length(&self, begin: u32) -> u32 {
        BLOCK_LENGTH.min(self.length.saturating_sub(begin))
    }

    pub fn status(&self) -> PieceStatus {
        if self.verified {
            PieceStatus::Have
        } else if self.blocks.iter().all(|b| *b == BlockSlot::Missing) {
            PieceStatus::Needed
        } else {
            PieceStatus::InFlight
        }
    }

    /// Claim the first block that is neither requested nor received on
    /// behalf of `owner`
    pub fn claim_next_block(&mut self, owner: SocketAddr) -> Option<BlockRequest> {
        if self.verified {
            return None;
        }
        let slot = self.blocks.iter().position(|b| *b == BlockSlot::Missing)?;
        self.blocks[slot] = BlockSlot::Requested(owner);
        let begin = slot as u32 * BLOCK_LENGTH;
        Some(BlockRequest::new(self.index, begin, self.block_length(begin)))
    }

    /// Return a block to the missing pool if `owner` still holds it.
    ///
    /// A slot reclaimed by another peer after a reset is left alone.
    pub fn release_block(&mut self, begin: u32, owner: SocketAddr) -> bool {
        match self.slot_for(begin) {
            Some(slot) if self.blocks[slot] == BlockSlot::Requested(owner) => {
                self.blocks[slot] = BlockSlot::Missing;
                true
            }
            _ => false,
        }
    }

    /// Check that `begin`/`len` describe exactly one block of this piece
    pub fn check_block(&self, begin: u32, len: usize) -> Result<(), TorrentError> {
        if self.slot_for(begin).is_none() {
            return Err(TorrentError::protocol_error_with_source(
                "Block offset out of range",
                format!("piece {} begin {}", self.index, begin),
            ));
        }
        let expected = self.block_length(begin) as usize;
        if len != expected {
            return Err(TorrentError::protocol_error_with_source(
                "Block has wrong length",
                format!("piece {} begin {}: expected {} bytes, got {}", self.index, begin, expected, len),
            ));
        }
        Ok(())
    }

    /// Store a block; returns false if it was already present
    pub fn add_block(&mut self, begin: u32, data: &[u8]) -> Result<bool, TorrentError> {
        self.check_block(begin, data.len())?;
        let Some(slot) = self.slot_for(begin) else {
            return Ok(false);
        };
        if self.verified || self.blocks[slot] == BlockSlot::Received {
            return Ok(false);
        }

        if self.data.is_empty() {
            self.data = vec![0u8; self.length as usize];
        }
        let start = begin as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        self.blocks[slot] = BlockSlot::Received;
        trace!("Stored block {}:{} ({} bytes)", self.index, begin, data.len());
        Ok(true)
    }

    /// Check if all blocks are downloaded
    pub fn is_complete(&self) -> bool {
        self.blocks.iter().all(|b| *b == BlockSlot::Received)
    }

    /// Verify the piece hash
    pub fn verify(&mut self) -> bool {
        let mut hasher = Sha1::new();
        hasher.update(&self.data);
        let digest: [u8; 20] = hasher.finalize().into();
        self.verified = digest == self.hash;
        self.verified
    }

    /// Drop all data and return every block to the missing pool
    pub fn reset(&mut self) {
        self.data = Vec::new();
        self.verified = false;
        self.blocks.fill(BlockSlot::Missing);
    }

    /// Bytes received but not yet verified
    pub fn received_bytes(&self) -> u64 {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == BlockSlot::Received)
            .map(|(i, _)| self.block_length(i as u32 * BLOCK_LENGTH) as u64)
            .sum()
    }

    /// Get the piece data (empty until the first block arrives)
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn slot_for(&self, begin: u32) -> Option<usize> {
        if begin % BLOCK_LENGTH != 0 {
            return None;
        }
        let slot = (begin / BLOCK_LENGTH) as usize;
        (slot < self.blocks.len()).then_some(slot)
    }
}

/// Piece availability bitmap, most significant bit first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    len: usize,
}

impl Bitfield {
    /// Create an empty bitfield for `len` pieces
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Validate a bitfield received from a peer
    pub fn from_bytes(bytes: &[u8], len: usize) -> Result<Self, TorrentError> {
        if bytes.len() != len.div_ceil(8) {
            return Err(TorrentError::protocol_error_with_source(
                "Bitfield has wrong length",
                format!("expected {} bytes for {} pieces, got {}", len.div_ceil(8), len, bytes.len()),
            ));
        }
        let spare = bytes.len() * 8 - len;
        if spare > 0 {
            if let Some(last) = bytes.last() {
                if last & ((1u8 << spare) - 1) != 0 {
                    return Err(TorrentError::protocol_error("Bitfield sets bits past the last piece"));
                }
            }
        }
        Ok(Self {
            bits: bytes.to_vec(),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has(&self, index: usize) -> bool {
        index < self.len && self.bits[index / 8] & (0x80 >> (index % 8)) != 0
    }

    pub fn set(&mut self, index: usize) {
        if index < self.len {
            self.bits[index / 8] |= 0x80 >> (index % 8);
        }
    }

    /// Number of pieces set
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }
}
