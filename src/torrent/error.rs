//! Metainfo validation errors

use thiserror::Error;

/// Reasons a parsed bencode tree is not a usable single-file torrent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetainfoError {
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),

    #[error("field \"{field}\" has the wrong type: expected {expected}, found {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("piece table length {0} is not a multiple of 20")]
    InvalidPieceTableLength(usize),

    #[error("multi-file torrents are not supported")]
    UnsupportedMultiFile,

    #[error("field \"{field}\" is invalid: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("piece table holds {actual} hashes but the content needs {expected}")]
    PieceCountMismatch { expected: u64, actual: u64 },

    #[error("no top-level \"info\" entry was located in the source bytes")]
    MissingInfoSpan,
}

impl MetainfoError {
    /// Stable label for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            MetainfoError::MissingField(_) => "missing-field",
            MetainfoError::WrongType { .. } => "wrong-type",
            MetainfoError::InvalidPieceTableLength(_) => "invalid-piece-table-length",
            MetainfoError::UnsupportedMultiFile => "unsupported-multi-file",
            MetainfoError::InvalidValue { .. } => "invalid-value",
            MetainfoError::PieceCountMismatch { .. } => "piece-count-mismatch",
            MetainfoError::MissingInfoSpan => "missing-info-span",
        }
    }

    /// The metadata field the error refers to, when there is one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            MetainfoError::MissingField(field) => Some(field),
            MetainfoError::WrongType { field, .. } | MetainfoError::InvalidValue { field, .. } => Some(field),
            MetainfoError::InvalidPieceTableLength(_) | MetainfoError::PieceCountMismatch { .. } => Some("pieces"),
            MetainfoError::UnsupportedMultiFile => Some("files"),
            MetainfoError::MissingInfoSpan => Some("info"),
        }
    }
}
