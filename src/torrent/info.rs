//! Torrent metainfo
//!
//! Flattened, validated swarm metadata extracted from a parsed `.torrent`.

use sha1::{Digest, Sha1};
use tracing::{debug, trace};

use crate::bencode::{BencodeValue, Dictionary};
use crate::torrent::error::MetainfoError;

/// Length of a SHA-1 digest in the piece table
pub const HASH_LENGTH: usize = 20;

/// Largest piece length; block offsets within a piece are 32-bit
pub const MAX_PIECE_LENGTH: u64 = u32::MAX as u64;

/// Swarm metadata for a single-file torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    /// Tracker announce URL
    pub announce: String,
    /// Size of each piece in bytes (the last piece may be shorter)
    pub piece_length: u64,
    /// Concatenated 20-byte SHA-1 digests, one per piece
    pub pieces: Vec<u8>,
    /// Total content length in bytes
    pub length: u64,
    /// Suggested file name
    pub name: Option<String>,
    /// SHA-1 of the raw serialized info dictionary
    pub info_hash: [u8; 20],
}

impl Metainfo {
    /// Number of pieces: `ceil(length / piece_length)`
    pub fn piece_count(&self) -> usize {
        if self.piece_length == 0 {
            return 0;
        }
        self.length.div_ceil(self.piece_length) as usize
    }

    /// Total content size
    pub fn total_size(&self) -> u64 {
        self.length
    }

    /// Expected digest of a piece
    pub fn piece_hash(&self, index: usize) -> Option<[u8; 20]> {
        let start = index.checked_mul(HASH_LENGTH)?;
        let slice = self.pieces.get(start..start + HASH_LENGTH)?;
        slice.try_into().ok()
    }

    /// Size in bytes of a piece; only the last one can be short
    pub fn piece_size(&self, index: usize) -> Option<u64> {
        if index >= self.piece_count() {
            return None;
        }
        let start = index as u64 * self.piece_length;
        Some(self.piece_length.min(self.length - start))
    }

    /// Get info hash as a hex string
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Name to show and to save under; falls back to the info hash
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.info_hash_hex())
    }

    /// Generate info hash from info dictionary bytes
    pub fn generate_info_hash(info_dict_bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(info_dict_bytes);
        hasher.finalize().into()
    }

    /// Build metainfo describing `content`, for tests
    #[cfg(test)]
    pub(crate) fn for_content(content: &[u8], piece_length: u64) -> Self {
        let pieces = content
            .chunks(piece_length as usize)
            .flat_map(|chunk| Self::generate_info_hash(chunk))
            .collect();
        Self {
            announce: "http://tracker.example.com/announce".to_string(),
            piece_length,
            pieces,
            length: content.len() as u64,
            name: Some("content.bin".to_string()),
            info_hash: [0xab; 20],
        }
    }
}

fn require<'a>(dict: &'a Dictionary, field: &'static str) -> Result<&'a BencodeValue, MetainfoError> {
    dict.get(field.as_bytes()).ok_or(MetainfoError::MissingField(field))
}

fn require_bytes<'a>(dict: &'a Dictionary, field: &'static str) -> Result<&'a [u8], MetainfoError> {
    let value = require(dict, field)?;
    value.as_bytes().ok_or(MetainfoError::WrongType {
        field,
        expected: "byte string",
        found: value.kind_name(),
    })
}

fn require_integer(dict: &Dictionary, field: &'static str) -> Result<i64, MetainfoError> {
    let value = require(dict, field)?;
    value.as_integer().ok_or(MetainfoError::WrongType {
        field,
        expected: "integer",
        found: value.kind_name(),
    })
}

fn require_dict<'a>(dict: &'a Dictionary, field: &'static str) -> Result<&'a Dictionary, MetainfoError> {
    let value = require(dict, field)?;
    value.as_dict().ok_or(MetainfoError::WrongType {
        field,
        expected: "dictionary",
        found: value.kind_name(),
    })
}

/// Validate a parsed torrent and flatten it into [`Metainfo`].
///
/// `info_bytes` must be the raw bytes of the top-level `"info"` value as
/// they appeared in the source buffer; the info hash is computed over them.
pub fn extract(value: &BencodeValue, info_bytes: &[u8]) -> Result<Metainfo, MetainfoError> {
    let root = value.as_dict().ok_or(MetainfoError::WrongType {
        field: "<root>",
        expected: "dictionary",
        found: value.kind_name(),
    })?;

    let announce = std::str::from_utf8(require_bytes(root, "announce")?)
        .map_err(|_| MetainfoError::WrongType {
            field: "announce",
            expected: "UTF-8 string",
            found: "binary byte string",
        })?
        .to_string();
    trace!("Announce URL: {}", announce);

    let info = require_dict(root, "info")?;

    if info.contains_key(b"files".as_slice()) {
        return Err(MetainfoError::UnsupportedMultiFile);
    }

    let piece_length = require_integer(info, "piece length")?;
    if piece_length <= 0 {
        return Err(MetainfoError::InvalidValue {
            field: "piece length",
            reason: format!("must be positive, got {}", piece_length),
        });
    }
    if piece_length as u64 > MAX_PIECE_LENGTH {
        return Err(MetainfoError::InvalidValue {
            field: "piece length",
            reason: format!("must not exceed {}, got {}", MAX_PIECE_LENGTH, piece_length),
        });
    }

    let pieces = require_bytes(info, "pieces")?;
    if pieces.len() % HASH_LENGTH != 0 {
        return Err(MetainfoError::InvalidPieceTableLength(pieces.len()));
    }

    let length = require_integer(info, "length")?;
    if length < 0 {
        return Err(MetainfoError::InvalidValue {
            field: "length",
            reason: format!("must not be negative, got {}", length),
        });
    }

    let name = match info.get(b"name".as_slice()) {
        None => None,
        Some(BencodeValue::ByteString(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Some(other) => {
            return Err(MetainfoError::WrongType {
                field: "name",
                expected: "byte string",
                found: other.kind_name(),
            })
        }
    };

    let metainfo = Metainfo {
        announce,
        piece_length: piece_length as u64,
        pieces: pieces.to_vec(),
        length: length as u64,
        name,
        info_hash: Metainfo::generate_info_hash(info_bytes),
    };

    let expected = metainfo.piece_count() as u64;
    let actual = (pieces.len() / HASH_LENGTH) as u64;
    if expected != actual {
        return Err(MetainfoError::PieceCountMismatch { expected, actual });
    }

    debug!(
        "Extracted metainfo: {} bytes in {} pieces of {} bytes, info hash {}",
        metainfo.length,
        expected,
        metainfo.piece_length,
        metainfo.info_hash_hex()
    );
    Ok(metainfo)
}
