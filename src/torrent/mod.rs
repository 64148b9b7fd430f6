//! Torrent file handling module
//!
//! Validates bencoded `.torrent` data and flattens it into [`Metainfo`].

pub mod error;
pub mod info;
pub mod parser;

pub use error::MetainfoError;
pub use info::{extract, Metainfo, HASH_LENGTH, MAX_PIECE_LENGTH};
pub use parser::TorrentParser;
