//! Tracker client errors

use thiserror::Error;

use crate::bencode::BencodeError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Network or HTTP failure, including non-2xx status codes
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed tracker response: {0}")]
    MalformedResponse(String),

    /// The tracker answered with a `failure reason`
    #[error("tracker reported failure: {0}")]
    TrackerFailure(String),

    #[error("invalid announce url: {0}")]
    InvalidAnnounceUrl(String),
}

impl TrackerError {
    /// Stable label for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::Transport(_) => "transport-failure",
            TrackerError::MalformedResponse(_) => "malformed-tracker-response",
            TrackerError::TrackerFailure(_) => "tracker-reported-failure",
            TrackerError::InvalidAnnounceUrl(_) => "invalid-announce-url",
        }
    }
}

impl From<BencodeError> for TrackerError {
    fn from(err: BencodeError) -> Self {
        TrackerError::MalformedResponse(err.to_string())
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::Transport(err.to_string())
    }
}
