//! The packed 8-byte message header.
//!
//! Layout: magic (2) ‖ version_using (1) ‖ version_min (1) ‖ version_max (1)
//! ‖ message_type (1) ‖ extensions (2, big-endian).

use chr_types::{NetworkId, PROTOCOL_VERSION, PROTOCOL_VERSION_MIN};

pub const HEADER_SIZE: usize = 8;

/// Extensions bit assignments.
pub const EXT_BLOCK_KIND_MASK: u16 = 0x0F00;
pub const EXT_BLOCK_KIND_SHIFT: u16 = 8;
pub const EXT_VOTE_COUNT_MASK: u16 = 0xF000;
pub const EXT_VOTE_COUNT_SHIFT: u16 = 12;
pub const EXT_HANDSHAKE_QUERY: u16 = 0x0001;
pub const EXT_HANDSHAKE_RESPONSE: u16 = 0x0002;

/// Every message kind on the wire. The bootstrap kinds ride TCP only; a
/// UDP frame naming one is a protocol violation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Invalid = 0,
    NotAType = 1,
    Keepalive = 2,
    Publish = 3,
    ConfirmReq = 4,
    ConfirmAck = 5,
    BulkPull = 6,
    BulkPush = 7,
    NodeIdHandshake = 10,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Invalid,
            1 => Self::NotAType,
            2 => Self::Keepalive,
            3 => Self::Publish,
            4 => Self::ConfirmReq,
            5 => Self::ConfirmAck,
            6 => Self::BulkPull,
            7 => Self::BulkPush,
            10 => Self::NodeIdHandshake,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub magic: [u8; 2],
    pub version_using: u8,
    pub version_min: u8,
    pub version_max: u8,
    pub message_type: MessageType,
    pub extensions: u16,
}

impl MessageHeader {
    pub fn new(network: NetworkId, message_type: MessageType, extensions: u16) -> Self {
        Self {
            magic: network.magic(),
            version_using: PROTOCOL_VERSION,
            version_min: PROTOCOL_VERSION_MIN,
            version_max: PROTOCOL_VERSION,
            message_type,
            extensions,
        }
    }

    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.magic);
        buffer.push(self.version_using);
        buffer.push(self.version_min);
        buffer.push(self.version_max);
        buffer.push(self.message_type as u8);
        buffer.extend_from_slice(&self.extensions.to_be_bytes());
    }

    /// Decode a header. `None` covers short input and unknown type bytes;
    /// the caller distinguishes those cases by length.
    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: [bytes[0], bytes[1]],
            version_using: bytes[2],
            version_min: bytes[3],
            version_max: bytes[4],
            message_type: MessageType::from_u8(bytes[5])?,
            extensions: u16::from_be_bytes([bytes[6], bytes[7]]),
        })
    }

    pub fn block_kind_bits(&self) -> u8 {
        ((self.extensions & EXT_BLOCK_KIND_MASK) >> EXT_BLOCK_KIND_SHIFT) as u8
    }

    pub fn vote_count(&self) -> usize {
        ((self.extensions & EXT_VOTE_COUNT_MASK) >> EXT_VOTE_COUNT_SHIFT) as usize
    }
}
