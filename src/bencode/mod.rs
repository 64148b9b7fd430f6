//! Bencode module
//!
//! Value model, recursive-descent parser, canonical encoder and a
//! human-readable dump for the bencode serialization format.

pub mod dump;
pub mod encode;
pub mod error;
pub mod parser;
pub mod value;

// Re-export main types
pub use dump::dump;
pub use encode::{encode, encode_into};
pub use error::BencodeError;
pub use parser::{decode, parse, parse_with, ParseOptions, ParsedDocument, MAX_DEPTH};
pub use value::{BencodeValue, Dictionary};
