//! Tracker module
//!
//! Builds announce requests and decodes the peer list from the reply.

pub mod announce;
pub mod client;
pub mod error;
pub mod response;
pub mod transport;

// Re-export main types
pub use announce::AnnounceRequest;
pub use client::TrackerClient;
pub use error::TrackerError;
pub use response::{AnnounceResponse, PeerAddress};
pub use transport::{HttpTransport, TrackerTransport};
