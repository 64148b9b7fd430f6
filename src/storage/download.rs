//! Download coordinator
//!
//! Shared per-swarm state: which pieces are needed, in flight or verified,
//! and how many bytes are still missing. Every peer connection asks it for
//! work and hands received blocks back to it.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, trace, warn};

use crate::error::TorrentError;
use crate::storage::piece::{Bitfield, BlockRequest, Piece, PieceStatus};
use crate::torrent::Metainfo;

/// Download statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Payload bytes accepted into pieces
    pub downloaded_bytes: u64,
    /// Pieces verified
    pub pieces_verified: usize,
    /// Pieces that failed verification
    pub pieces_failed: usize,
    /// Blocks received more than once
    pub duplicate_blocks: usize,
}

/// Result of handing a block to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Stored; its piece still has blocks outstanding
    Accepted,
    /// Stored and completed a piece that matched its digest
    PieceVerified(u32),
    /// Stored, verified the final piece, nothing remains
    DownloadComplete,
    /// Already had it
    Duplicate,
}

/// Shared download state for one swarm
#[derive(Debug)]
pub struct DownloadState {
    metainfo: Arc<Metainfo>,
    peer_id: [u8; 20],
    pieces: Vec<Piece>,
    bytes_remaining: u64,
    stats: DownloadStats,
}

impl DownloadState {
    /// Create a new download state with every piece needed.
    ///
    /// Fails if a piece or the piece count does not fit the 32-bit wire fields.
    pub fn new(metainfo: Arc<Metainfo>, peer_id: [u8; 20]) -> Result<Self, TorrentError> {
        let pieces = (0..metainfo.piece_count())
            .map(|index| {
                let size = metainfo.piece_size(index).unwrap_or(0);
                let length = u32::try_from(size).map_err(|_| {
                    TorrentError::metainfo_error_with_field(
                        format!("Piece {} is {} bytes, larger than the protocol allows", index, size),
                        "piece length",
                    )
                })?;
                let index = u32::try_from(index)
                    .map_err(|_| TorrentError::metainfo_error_with_field("Too many pieces", "pieces"))?;
                let hash = metainfo.piece_hash(index as usize).unwrap_or([0u8; 20]);
                Ok(Piece::new(index, length, hash))
            })
            .collect::<Result<Vec<Piece>, TorrentError>>()?;

        info!(
            "Tracking {} pieces ({} bytes) for {}",
            pieces.len(),
            metainfo.total_size(),
            metainfo.info_hash_hex()
        );

        Ok(Self {
            bytes_remaining: metainfo.total_size(),
            metainfo,
            peer_id,
            pieces,
            stats: DownloadStats::default(),
        })
    }

    pub fn metainfo(&self) -> &Arc<Metainfo> {
        &self.metainfo
    }

    pub fn info_hash(&self) -> [u8; 20] {
        self.metainfo.info_hash
    }

    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Pick the next free block of the lowest-indexed incomplete piece and
    /// record `owner` as its holder.
    ///
    /// With `available`, only pieces the peer advertised are considered.
    pub fn request_next_block(&mut self, available: Option<&Bitfield>, owner: SocketAddr) -> Option<BlockRequest> {
        let request = self
            .pieces
            .iter_mut()
            .filter(|piece| available.map_or(true, |bits| bits.has(piece.index() as usize)))
            .find_map(|piece| piece.claim_next_block(owner));

        if let Some(request) = &request {
            trace!(
                "Assigned block {}:{} ({} bytes) to {}",
                request.piece_index,
                request.begin,
                request.length,
                owner
            );
        }
        request
    }

    /// Return an in-flight block to the needed pool if `owner` still holds it
    pub fn release_block(&mut self, request: &BlockRequest, owner: SocketAddr) {
        if let Some(piece) = self.pieces.get_mut(request.piece_index as usize) {
            if piece.release_block(request.begin, owner) {
                trace!("Released block {}:{} from {}", request.piece_index, request.begin, owner);
            }
        }
    }

    /// Store a received block and verify its piece once complete.
    ///
    /// Out-of-range indices or wrongly sized blocks are protocol errors. A
    /// digest mismatch resets the piece and returns an integrity error, which
    /// is not fatal to the connection that delivered it.
    pub fn mark_block_complete(&mut self, piece_index: u32, begin: u32, data: &[u8]) -> Result<BlockOutcome, TorrentError> {
        let piece_count = self.pieces.len();
        let Some(piece) = self.pieces.get_mut(piece_index as usize) else {
            return Err(TorrentError::protocol_error_with_source(
                "Piece index out of range",
                format!("{} >= {}", piece_index, piece_count),
            ));
        };

        if !piece.add_block(begin, data)? {
            self.stats.duplicate_blocks += 1;
            debug!("Duplicate block {}:{}", piece_index, begin);
            return Ok(BlockOutcome::Duplicate);
        }

        self.bytes_remaining -= data.len() as u64;
        self.stats.downloaded_bytes += data.len() as u64;

        if !piece.is_complete() {
            return Ok(BlockOutcome::Accepted);
        }

        if !piece.verify() {
            let length = piece.length() as u64;
            piece.reset();
            self.bytes_remaining += length;
            self.stats.pieces_failed += 1;
            warn!("Piece {} failed hash verification, re-queueing", piece_index);
            return Err(TorrentError::integrity_error(piece_index, "SHA-1 digest mismatch"));
        }

        self.stats.pieces_verified += 1;
        debug!(
            "Piece {} verified ({}/{} pieces, {} bytes left)",
            piece_index,
            self.stats.pieces_verified,
            piece_count,
            self.bytes_remaining
        );

        if self.is_complete() {
            info!("Download complete: all {} pieces verified", piece_count);
            return Ok(BlockOutcome::DownloadComplete);
        }
        Ok(BlockOutcome::PieceVerified(piece_index))
    }

    /// True once every byte is present and every piece verified
    pub fn is_complete(&self) -> bool {
        self.bytes_remaining == 0 && self.pieces.iter().all(|p| p.status() == PieceStatus::Have)
    }

    pub fn bytes_remaining(&self) -> u64 {
        self.bytes_remaining
    }

    /// Fraction of verified bytes, 0.0 to 1.0
    pub fn progress(&self) -> f64 {
        let total = self.metainfo.total_size();
        if total == 0 {
            return 1.0;
        }
        let verified: u64 = self
            .pieces
            .iter()
            .filter(|p| p.status() == PieceStatus::Have)
            .map(|p| p.length() as u64)
            .sum();
        verified as f64 / total as f64
    }

    pub fn piece_status(&self, index: usize) -> Option<PieceStatus> {
        self.pieces.get(index).map(Piece::status)
    }

    /// Bitfield of verified pieces
    pub fn bitfield(&self) -> Bitfield {
        let mut bitfield = Bitfield::new(self.pieces.len());
        for piece in self.pieces.iter().filter(|p| p.status() == PieceStatus::Have) {
            bitfield.set(piece.index() as usize);
        }
        bitfield
    }

    pub fn stats(&self) -> DownloadStats {
        self.stats.clone()
    }

    /// Write the verified content to `path`
    pub async fn write_to(&self, path: &Path) -> Result<(), TorrentError> {
        if !self.is_complete() {
            error!("Refusing to write incomplete download to {}", path.display());
            return Err(TorrentError::storage_error_full(
                "Download is incomplete",
                path.display().to_string(),
                format!("{} bytes remaining", self.bytes_remaining),
            ));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                TorrentError::storage_error_full("Failed to create directory", parent.display().to_string(), e.to_string())
            })?;
        }

        let mut file = fs::File::create(path).await.map_err(|e| {
            TorrentError::storage_error_full("Failed to create file", path.display().to_string(), e.to_string())
        })?;
        for piece in &self.pieces {
            file.write_all(piece.data()).await.map_err(|e| {
                TorrentError::storage_error_full("Failed to write to file", path.display().to_string(), e.to_string())
            })?;
        }
        file.flush().await.map_err(|e| {
            TorrentError::storage_error_full("Failed to flush file", path.display().to_string(), e.to_string())
        })?;

        info!("Wrote {} bytes to {}", self.metainfo.total_size(), path.display());
        Ok(())
    }
}
