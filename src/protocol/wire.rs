//! Wire protocol utilities
//!
//! Reassembly of protocol units that arrive split across arbitrary reads.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{error, trace};

use crate::error::TorrentError;

/// Largest frame body accepted from a peer: a full 128 KiB block plus the piece header
pub const MAX_MESSAGE_LENGTH: usize = 128 * 1024 + 9;

/// Queue of received chunks.
///
/// Each read is appended whole. Consumers take complete units from the front;
/// a take either removes exactly the requested bytes or leaves the queue untouched.
#[derive(Debug, Default)]
pub struct ReadQueue {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl ReadQueue {
    /// Create a new, empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw read
    pub fn push(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        if data.is_empty() {
            return;
        }
        trace!("Queued {} bytes ({} chunks buffered)", data.len(), self.chunks.len() + 1);
        self.len += data.len();
        self.chunks.push_back(data);
    }

    /// Total buffered bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buffered chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Copy the first `n` bytes without consuming them
    pub fn peek(&self, n: usize) -> Option<Vec<u8>> {
        if self.len < n {
            return None;
        }
        let mut out = Vec::with_capacity(n);
        for chunk in &self.chunks {
            let needed = n - out.len();
            if needed == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..needed.min(chunk.len())]);
        }
        Some(out)
    }

    /// Remove exactly `n` bytes from the front, or nothing if fewer are buffered
    pub fn take_exact(&mut self, n: usize) -> Option<Bytes> {
        if self.len < n {
            return None;
        }
        self.len -= n;

        // Fast path: the unit lies inside the first chunk
        if let Some(front) = self.chunks.front_mut() {
            if front.len() >= n {
                let unit = front.split_to(n);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                return Some(unit);
            }
        }

        let mut unit = BytesMut::with_capacity(n);
        while unit.len() < n {
            let Some(mut front) = self.chunks.pop_front() else {
                break;
            };
            let needed = n - unit.len();
            if front.len() > needed {
                unit.put_slice(&front[..needed]);
                front.advance(needed);
                self.chunks.push_front(front);
            } else {
                unit.put_slice(&front);
            }
        }
        Some(unit.freeze())
    }

    /// Take one length-prefixed frame body.
    ///
    /// Returns `Ok(None)` until the whole frame is buffered. A declared length
    /// above `max_length` is a protocol error.
    pub fn read_frame(&mut self, max_length: usize) -> Result<Option<Bytes>, TorrentError> {
        let Some(prefix) = self.peek(4) else {
            return Ok(None);
        };
        let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;

        if length > max_length {
            error!("Peer announced a {} byte message (limit {})", length, max_length);
            return Err(TorrentError::protocol_error_with_source(
                "Message length exceeds limit",
                format!("{} > {}", length, max_length),
            ));
        }

        if self.len < 4 + length {
            trace!("Waiting for {} more bytes of a {} byte frame", 4 + length - self.len, length);
            return Ok(None);
        }

        self.take_exact(4);
        Ok(self.take_exact(length))
    }
}
