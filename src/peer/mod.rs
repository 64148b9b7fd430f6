//! Peer management module
//!
//! The per-peer protocol state machine, the task that drives it over a
//! socket, and the manager that runs many of them.

pub mod connection;
pub mod manager;
pub mod session;
pub mod state;

// Re-export main types
pub use connection::{Outbound, PeerConnection, MAX_IN_FLIGHT_REQUESTS};
pub use manager::{PeerManager, SwarmSummary};
pub use session::{SessionConfig, SessionSummary};
pub use state::{ChokeFlags, ConnectionState, PeerStats};
