//! Storage module
//!
//! Piece bookkeeping, block assembly and the shared download coordinator.

pub mod download;
pub mod piece;

// Re-export piece types
pub use piece::{Bitfield, BlockRequest, Piece, PieceStatus, BLOCK_LENGTH};

// Re-export download types
pub use download::{BlockOutcome, DownloadState, DownloadStats};
