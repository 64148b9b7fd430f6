//! Torrent file parser
//!
//! Handles parsing of .torrent files and extracting metadata.

use std::path::Path;

use tracing::{debug, error, info, trace, warn};

use crate::bencode::{parse, ParsedDocument};
use crate::error::TorrentError;
use crate::torrent::error::MetainfoError;
use crate::torrent::info::{extract, Metainfo};

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: &[u8]) -> Result<Metainfo, TorrentError> {
        info!("Parsing torrent file from {} bytes", data.len());
        trace!("Torrent data (first 100 bytes): {:?}", &data[..data.len().min(100)]);

        let document = parse(data)?;
        if document.consumed != data.len() {
            warn!("Ignoring {} trailing bytes after torrent dictionary", data.len() - document.consumed);
        }

        Self::extract_from_document(&document, data)
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &Path) -> Result<Metainfo, TorrentError> {
        info!("Loading torrent file from: {}", path.display());

        let data = std::fs::read(path).map_err(|e| {
            error!("Failed to read torrent file '{}': {}", path.display(), e);
            TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
        })?;

        debug!("Read {} bytes from torrent file", data.len());
        Self::parse_bytes(&data)
    }

    fn extract_from_document(document: &ParsedDocument, data: &[u8]) -> Result<Metainfo, TorrentError> {
        let Some(info_bytes) = document.info_bytes(data) else {
            // Report the structural problem if there is one; otherwise the span itself is missing
            return Err(match extract(&document.value, &[]) {
                Err(e) => e,
                Ok(_) => MetainfoError::MissingInfoSpan,
            }
            .into());
        };
        debug!("Info dictionary spans {} raw bytes", info_bytes.len());

        let metainfo = extract(&document.value, info_bytes)?;
        info!(
            "Parsed torrent '{}' ({} bytes, {} pieces, info hash {})",
            metainfo.display_name(),
            metainfo.total_size(),
            metainfo.piece_count(),
            metainfo.info_hash_hex()
        );
        Ok(metainfo)
    }
}
