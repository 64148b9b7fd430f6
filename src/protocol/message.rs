//! BitTorrent protocol messages
//!
//! Defines the message types exchanged after the handshake. A frame is a
//! 4-byte big-endian length followed by a 1-byte id and the payload; a zero
//! length frame is a keep-alive.

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, error, trace};

use crate::error::TorrentError;

/// BitTorrent message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
}

impl TryFrom<u8> for MessageId {
    type Error = TorrentError;

    fn try_from(value: u8) -> Result<Self, TorrentError> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            _ => Err(TorrentError::protocol_error_with_source(
                "Invalid message ID",
                format!("value: {}", value),
            )),
        }
    }
}

/// BitTorrent protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield { bitfield: Vec<u8> },
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
    /// A message id this client does not implement; its payload is discarded
    Unknown { id: u8 },
}

impl Message {
    /// Get the message ID (returns None for KeepAlive and unknown ids)
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield { .. } => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
            Message::KeepAlive | Message::Unknown { .. } => None,
        }
    }

    /// Get the message length (excluding the length prefix)
    pub fn length(&self) -> u32 {
        match self {
            Message::KeepAlive => 0,
            Message::Choke | Message::Unchoke | Message::Interested | Message::NotInterested => 1,
            Message::Unknown { .. } => 1,
            Message::Have { .. } => 5,
            Message::Bitfield { bitfield } => 1 + bitfield.len() as u32,
            Message::Request { .. } | Message::Cancel { .. } => 13,
            Message::Piece { block, .. } => 9 + block.len() as u32,
        }
    }

    /// Serialize the message to bytes (including length prefix)
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + self.length() as usize);
        buf.put_u32(self.length());

        match self {
            Message::KeepAlive => return buf.to_vec(),
            Message::Unknown { id } => buf.put_u8(*id),
            _ => {
                if let Some(id) = self.message_id() {
                    buf.put_u8(id as u8);
                }
            }
        }

        match self {
            Message::Have { piece_index } => buf.put_u32(*piece_index),
            Message::Bitfield { bitfield } => buf.put_slice(bitfield),
            Message::Request { index, begin, length } | Message::Cancel { index, begin, length } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, block } => {
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(block);
            }
            _ => {}
        }

        trace!("Serialized {:?} ({} bytes)", self.message_id(), buf.len());
        buf.to_vec()
    }

    /// Deserialize a message from a frame body (the bytes after the length prefix)
    pub fn deserialize(body: &[u8]) -> Result<Self, TorrentError> {
        let Some((&id, mut payload)) = body.split_first() else {
            trace!("Received KeepAlive message");
            return Ok(Message::KeepAlive);
        };

        let Ok(message_id) = MessageId::try_from(id) else {
            debug!("Skipping message with unknown id {} ({} bytes)", id, payload.len());
            return Ok(Message::Unknown { id });
        };

        check_payload_length(message_id, payload)?;

        let message = match message_id {
            MessageId::Choke => Message::Choke,
            MessageId::Unchoke => Message::Unchoke,
            MessageId::Interested => Message::Interested,
            MessageId::NotInterested => Message::NotInterested,
            MessageId::Have => Message::Have { piece_index: payload.get_u32() },
            MessageId::Bitfield => Message::Bitfield { bitfield: payload.to_vec() },
            MessageId::Request => Message::Request {
                index: payload.get_u32(),
                begin: payload.get_u32(),
                length: payload.get_u32(),
            },
            MessageId::Piece => {
                let index = payload.get_u32();
                let begin = payload.get_u32();
                Message::Piece { index, begin, block: payload.to_vec() }
            }
            MessageId::Cancel => Message::Cancel {
                index: payload.get_u32(),
                begin: payload.get_u32(),
                length: payload.get_u32(),
            },
        };

        trace!("Decoded {:?} message", message_id);
        Ok(message)
    }
}

impl MessageId {
    /// Exact payload size for fixed-size messages
    fn fixed_payload_length(self) -> Option<usize> {
        match self {
            MessageId::Choke | MessageId::Unchoke | MessageId::Interested | MessageId::NotInterested => Some(0),
            MessageId::Have => Some(4),
            MessageId::Request | MessageId::Cancel => Some(12),
            MessageId::Bitfield | MessageId::Piece => None,
        }
    }
}

fn check_payload_length(id: MessageId, payload: &[u8]) -> Result<(), TorrentError> {
    let problem = match id.fixed_payload_length() {
        Some(expected) if payload.len() != expected => {
            format!("expected {} payload bytes, got {}", expected, payload.len())
        }
        None if id == MessageId::Piece && payload.len() < 8 => {
            format!("expected at least 8 payload bytes, got {}", payload.len())
        }
        _ => return Ok(()),
    };
    error!("Malformed {:?} message: {}", id, problem);
    Err(TorrentError::protocol_error_with_source(format!("Malformed {:?} message", id), problem))
}
