//! Wire-format definitions for protocol packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (id, ack, marker, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated or malformed input.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **little-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Packet Id                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Cumulative Ack Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Marker     |              Payload ...                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 9 bytes.
//! id(4) + ack(4) + marker(1).  The payload runs to the end of the datagram;
//! there is no length field.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 9;

// Byte offsets of each field within the serialised header.
const OFF_ID: usize = 0;
const OFF_ACK: usize = 4;
const OFF_MARKER: usize = 8;

/// Position of a packet within an application message.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The packet carries a whole message (or nothing, for a pure ACK).
    None = 0,
    /// One fragment of a larger message; more follow.
    More = 1,
    /// Final fragment of a multi-fragment message.
    Last = 2,
}

impl TryFrom<u8> for Marker {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Marker::None),
            1 => Ok(Marker::More),
            2 => Ok(Marker::Last),
            other => Err(PacketError::UnknownMarker(other)),
        }
    }
}

/// A complete protocol datagram: header fields + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sender-assigned sequence number.
    pub id: u32,
    /// Highest contiguous id the sender has received from its peer.
    ///
    /// Overwritten with fresh state right before every transmission.
    pub ack: u32,
    pub marker: Marker,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a data packet.  `ack` is left at zero until transmission.
    pub fn data(id: u32, marker: Marker, payload: Vec<u8>) -> Self {
        Self {
            id,
            ack: 0,
            marker,
            payload,
        }
    }

    /// Build a pure acknowledgement (heartbeat) packet.
    ///
    /// The id is a placeholder; the endpoint stamps it on transmission.
    pub fn pure_ack(ack: u32) -> Self {
        Self {
            id: 0,
            ack,
            marker: Marker::None,
            payload: Vec::new(),
        }
    }

    /// `true` for an empty, unfragmented packet that only carries an ACK.
    pub fn is_pure_ack(&self) -> bool {
        self.payload.is_empty() && self.marker == Marker::None
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];

        buf[OFF_ID..OFF_ID + 4].copy_from_slice(&self.id.to_le_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_le_bytes());
        buf[OFF_MARKER] = self.marker as u8;
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the marker byte is not one of the known [`Marker`] values.
    ///
    /// Any bytes after the header are the payload, whatever their length.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }

        let id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let ack = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let marker = Marker::try_from(buf[OFF_MARKER])?;

        Ok(Packet {
            id,
            ack,
            marker,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    #[error("buffer of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    /// Marker byte outside the 0..=2 range.
    #[error("unknown fragment marker {0}")]
    UnknownMarker(u8),
}
