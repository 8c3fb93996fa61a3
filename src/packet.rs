//! Network-layer packets and their wire encoding.
//!
//! Every packet travels as a fixed-width ASCII header followed by the raw
//! payload:
//!
//! ```text
//! [destination: W1 digits][kind: '1' | '2'][source: W2 digits][payload ...]
//! ```
//!
//! W1 and W2 are carried by [`WireFormat`] and must be identical on every
//! node of a deployment; a node decoding with different widths will read
//! garbage or reject the packet.
//!
//! # Example
//!
//! ```
//! use dvnet::packet::{Packet, WireFormat};
//!
//! let wire = WireFormat::default();
//! let packet = Packet::data(3, 1, b"hello".to_vec());
//!
//! let bytes = wire.encode(&packet);
//! assert_eq!(&bytes[..], b"00003100001hello");
//! assert_eq!(wire.decode(&bytes).unwrap(), packet);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{NodeAddress, LINK_LOCAL};

/// Errors raised while decoding a packet or its control payload.
///
/// Every variant means the packet is malformed; it is dropped and the
/// receiver moves on to the next one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet of {len} bytes is shorter than the {header}-byte header")]
    Truncated { len: usize, header: usize },

    #[error("{field} address is not a decimal number")]
    InvalidAddress { field: &'static str },

    #[error("unknown packet kind tag {0:#04x}")]
    UnknownKind(u8),

    #[error("control payload is not a distance vector: {0}")]
    InvalidVector(String),
}

/// The upper-layer protocol carried by a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    /// Application data addressed to a host.
    Data,
    /// A distance-vector advertisement for the adjacent router.
    Control,
}

impl PacketKind {
    /// Returns the single-byte wire tag for this kind.
    pub const fn tag(self) -> u8 {
        match self {
            PacketKind::Data => b'1',
            PacketKind::Control => b'2',
        }
    }

    /// Parses a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'1' => Some(PacketKind::Data),
            b'2' => Some(PacketKind::Control),
            _ => None,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Data => write!(f, "data"),
            PacketKind::Control => write!(f, "control"),
        }
    }
}

/// A network-layer packet.
///
/// Packets are immutable once built: a router that forwards a packet
/// re-encodes the same value on the outgoing interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Address the packet is travelling to
    pub destination: NodeAddress,
    /// Data or control
    pub kind: PacketKind,
    /// Address of the node that originated the packet
    pub source: NodeAddress,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl Packet {
    /// Creates a new packet.
    pub fn new(
        destination: NodeAddress,
        kind: PacketKind,
        source: NodeAddress,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            destination,
            kind,
            source,
            payload: payload.into(),
        }
    }

    /// Creates an application data packet.
    pub fn data(destination: NodeAddress, source: NodeAddress, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(destination, PacketKind::Data, source, payload)
    }

    /// Creates a link-local control packet carrying an encoded advertisement.
    pub fn control(source: NodeAddress, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(LINK_LOCAL, PacketKind::Control, source, payload)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} \"{}\"",
            self.kind,
            self.source,
            self.destination,
            String::from_utf8_lossy(&self.payload)
        )
    }
}

/// Field widths of the packet header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFormat {
    /// Number of decimal digits in the destination field (W1)
    #[serde(default = "default_width")]
    pub destination_width: usize,
    /// Number of decimal digits in the source field (W2)
    #[serde(default = "default_width")]
    pub source_width: usize,
}

fn default_width() -> usize {
    5
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            destination_width: default_width(),
            source_width: default_width(),
        }
    }
}

impl WireFormat {
    /// Creates a wire format with the given field widths.
    pub fn new(destination_width: usize, source_width: usize) -> Self {
        Self {
            destination_width,
            source_width,
        }
    }

    /// Total header length in bytes.
    pub fn header_len(&self) -> usize {
        self.destination_width + 1 + self.source_width
    }

    /// Returns true if `address` can be written in both address fields.
    pub fn fits(&self, address: NodeAddress) -> bool {
        let width = self.destination_width.min(self.source_width);
        // 10^20 exceeds u64, and every u32 fits in 10 digits anyway
        width >= 10 || u64::from(address) < 10u64.pow(width as u32)
    }

    /// Encodes a packet into its wire representation.
    ///
    /// Addresses wider than the configured field are written in full,
    /// which the peer will then misparse; callers must only encode
    /// addresses for which [`WireFormat::fits`] holds.
    pub fn encode(&self, packet: &Packet) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header_len() + packet.payload.len());
        bytes.extend_from_slice(
            format!("{:0width$}", packet.destination, width = self.destination_width).as_bytes(),
        );
        bytes.push(packet.kind.tag());
        bytes.extend_from_slice(
            format!("{:0width$}", packet.source, width = self.source_width).as_bytes(),
        );
        bytes.extend_from_slice(&packet.payload);
        bytes
    }

    /// Renders a packet as its wire text, with lossy UTF-8.
    pub fn render(&self, packet: &Packet) -> String {
        String::from_utf8_lossy(&self.encode(packet)).into_owned()
    }

    /// Decodes a packet from its wire representation.
    pub fn decode(&self, bytes: &[u8]) -> Result<Packet, CodecError> {
        let header = self.header_len();
        if bytes.len() < header {
            return Err(CodecError::Truncated {
                len: bytes.len(),
                header,
            });
        }

        let kind_at = self.destination_width;
        let destination = parse_address(&bytes[..kind_at], "destination")?;
        let tag = bytes[kind_at];
        let kind = PacketKind::from_tag(tag).ok_or(CodecError::UnknownKind(tag))?;
        let source = parse_address(&bytes[kind_at + 1..header], "source")?;

        Ok(Packet {
            destination,
            kind,
            source,
            payload: bytes[header..].to_vec(),
        })
    }
}

fn parse_address(field: &[u8], name: &'static str) -> Result<NodeAddress, CodecError> {
    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(CodecError::InvalidAddress { field: name });
    }
    std::str::from_utf8(field)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or(CodecError::InvalidAddress { field: name })
}
