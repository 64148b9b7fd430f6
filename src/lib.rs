//! torrent-fetch
//!
//! A single-tracker BitTorrent downloader: a hand-written bencode parser,
//! metainfo extraction, an HTTP tracker client and pipelined peer
//! connections that reassemble messages split across reads.

pub mod bencode;
pub mod cli;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod torrent;
pub mod tracker;

pub use error::TorrentError;

pub use bencode::{BencodeError, BencodeValue};
pub use cli::{CliArgs, Config, ProgressDisplay, ProgressStats};
pub use peer::{PeerConnection, PeerManager, SessionConfig, SwarmSummary};
pub use protocol::{Handshake, Message, MessageId};
pub use storage::{BlockOutcome, DownloadState, DownloadStats, PieceStatus};
pub use torrent::{Metainfo, MetainfoError, TorrentParser};
pub use tracker::{PeerAddress, TrackerClient, TrackerError};
