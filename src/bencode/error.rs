//! Bencode parse errors

use thiserror::Error;

/// Reasons a byte buffer is not valid bencode.
///
/// Every variant records the byte offset at which parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BencodeError {
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof { offset: usize },

    #[error("unexpected character 0x{byte:02x} at byte {offset}")]
    UnexpectedCharacter { byte: u8, offset: usize },

    #[error("malformed integer at byte {offset}")]
    MalformedInteger { offset: usize },

    #[error("non-canonical integer at byte {offset}")]
    NonCanonicalInteger { offset: usize },

    #[error("invalid string length at byte {offset}")]
    InvalidStringLength { offset: usize },

    #[error("dictionary key is not a byte string at byte {offset}")]
    DictKeyNotString { offset: usize },

    #[error("nesting deeper than {max} levels at byte {offset}")]
    NestingTooDeep { max: usize, offset: usize },
}

impl BencodeError {
    /// Stable label for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            BencodeError::UnexpectedEof { .. } => "unexpected-eof",
            BencodeError::UnexpectedCharacter { .. } => "unexpected-character",
            BencodeError::MalformedInteger { .. } => "malformed-integer",
            BencodeError::NonCanonicalInteger { .. } => "non-canonical-integer",
            BencodeError::InvalidStringLength { .. } => "invalid-string-length",
            BencodeError::DictKeyNotString { .. } => "dict-key-not-string",
            BencodeError::NestingTooDeep { .. } => "nesting-too-deep",
        }
    }

    /// Byte offset where the error was detected
    pub fn offset(&self) -> usize {
        match self {
            BencodeError::UnexpectedEof { offset }
            | BencodeError::UnexpectedCharacter { offset, .. }
            | BencodeError::MalformedInteger { offset }
            | BencodeError::NonCanonicalInteger { offset }
            | BencodeError::InvalidStringLength { offset }
            | BencodeError::DictKeyNotString { offset }
            | BencodeError::NestingTooDeep { offset, .. } => *offset,
        }
    }
}
