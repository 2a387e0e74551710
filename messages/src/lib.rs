//! UDP wire messages: framing, strict parsing, and visitor dispatch.
//!
//! All integers are big-endian. Bodies are packed with no padding; a frame
//! with trailing bytes is rejected as firmly as a truncated one.

pub mod header;

pub use header::{MessageHeader, MessageType, HEADER_SIZE};

use chr_consensus::{Vote, VoteBlock};
use chr_ledger::{Block, BlockKind, BLOCK_WIRE_SIZE};
use chr_types::{Account, BlockHash, NetworkId, PublicKey, Signature, PROTOCOL_VERSION_MIN};
use chr_work::validate_work;
use header::{
    EXT_BLOCK_KIND_SHIFT, EXT_HANDSHAKE_QUERY, EXT_HANDSHAKE_RESPONSE, EXT_VOTE_COUNT_SHIFT,
};
use std::net::{Ipv6Addr, SocketAddrV6};

/// Slots in a keepalive's peer list.
pub const KEEPALIVE_PEERS: usize = 8;
const ENDPOINT_SIZE: usize = 18;
const VOTE_PREFIX_SIZE: usize = 32 + 64 + 8;

/// Outcome of parsing one datagram. Everything except `Success` counts
/// against the error statistics; `InsufficientWork` carries its own detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStatus {
    Success,
    InsufficientWork,
    InvalidHeader,
    InvalidMessageType,
    InvalidKeepaliveMessage,
    InvalidPublishMessage,
    InvalidConfirmReqMessage,
    InvalidConfirmAckMessage,
    InvalidNodeIdHandshakeMessage,
}

/// Keepalive: eight peer endpoints, padded with unspecified addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keepalive {
    pub peers: [SocketAddrV6; KEEPALIVE_PEERS],
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            peers: [SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0); KEEPALIVE_PEERS],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publish {
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmReq {
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmAck {
    pub vote: Vote,
}

/// Identity handshake: a cookie challenge, a signed response, or both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdHandshake {
    pub query: Option<[u8; 32]>,
    pub response: Option<(Account, Signature)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Keepalive(Keepalive),
    Publish(Publish),
    ConfirmReq(ConfirmReq),
    ConfirmAck(ConfirmAck),
    NodeIdHandshake(NodeIdHandshake),
}

/// One method per message kind; the node installs the visitor that feeds
/// its processors.
pub trait MessageVisitor {
    fn keepalive(&mut self, message: &Keepalive);
    fn publish(&mut self, message: &Publish);
    fn confirm_req(&mut self, message: &ConfirmReq);
    fn confirm_ack(&mut self, message: &ConfirmAck);
    fn node_id_handshake(&mut self, message: &NodeIdHandshake);
}

impl Message {
    pub fn visit(&self, visitor: &mut dyn MessageVisitor) {
        match self {
            Self::Keepalive(m) => visitor.keepalive(m),
            Self::Publish(m) => visitor.publish(m),
            Self::ConfirmReq(m) => visitor.confirm_req(m),
            Self::ConfirmAck(m) => visitor.confirm_ack(m),
            Self::NodeIdHandshake(m) => visitor.node_id_handshake(m),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Keepalive(_) => MessageType::Keepalive,
            Self::Publish(_) => MessageType::Publish,
            Self::ConfirmReq(_) => MessageType::ConfirmReq,
            Self::ConfirmAck(_) => MessageType::ConfirmAck,
            Self::NodeIdHandshake(_) => MessageType::NodeIdHandshake,
        }
    }

    /// Frame the message for `network`.
    pub fn to_bytes(&self, network: NetworkId) -> Vec<u8> {
        let extensions = match self {
            Self::Publish(m) => (m.block.kind() as u16) << EXT_BLOCK_KIND_SHIFT,
            Self::ConfirmReq(m) => (m.block.kind() as u16) << EXT_BLOCK_KIND_SHIFT,
            Self::ConfirmAck(m) => (m.vote.blocks.len() as u16) << EXT_VOTE_COUNT_SHIFT,
            Self::NodeIdHandshake(m) => {
                let mut bits = 0;
                if m.query.is_some() {
                    bits |= EXT_HANDSHAKE_QUERY;
                }
                if m.response.is_some() {
                    bits |= EXT_HANDSHAKE_RESPONSE;
                }
                bits
            }
            Self::Keepalive(_) => 0,
        };
        let mut buffer = Vec::with_capacity(HEADER_SIZE + 256);
        MessageHeader::new(network, self.message_type(), extensions).serialize(&mut buffer);
        match self {
            Self::Keepalive(m) => {
                for peer in &m.peers {
                    buffer.extend_from_slice(&peer.ip().octets());
                    buffer.extend_from_slice(&peer.port().to_be_bytes());
                }
            }
            Self::Publish(m) => m.block.serialize(&mut buffer),
            Self::ConfirmReq(m) => m.block.serialize(&mut buffer),
            Self::ConfirmAck(m) => {
                buffer.extend_from_slice(m.vote.account.as_bytes());
                buffer.extend_from_slice(m.vote.signature.as_bytes());
                buffer.extend_from_slice(&m.vote.sequence.to_be_bytes());
                for entry in &m.vote.blocks {
                    match entry {
                        VoteBlock::Hash(hash) => {
                            buffer.push(BlockKind::NotABlock as u8);
                            buffer.extend_from_slice(hash.as_bytes());
                        }
                        VoteBlock::Block(block) => {
                            buffer.push(block.kind() as u8);
                            block.serialize(&mut buffer);
                        }
                    }
                }
            }
            Self::NodeIdHandshake(m) => {
                if let Some(query) = &m.query {
                    buffer.extend_from_slice(query);
                }
                if let Some((account, signature)) = &m.response {
                    buffer.extend_from_slice(account.as_bytes());
                    buffer.extend_from_slice(signature.as_bytes());
                }
            }
        }
        buffer
    }
}

/// Strict datagram parser bound to a network and work threshold.
pub struct Parser {
    pub network: NetworkId,
    pub work_threshold: u64,
}

impl Parser {
    pub fn new(network: NetworkId, work_threshold: u64) -> Self {
        Self {
            network,
            work_threshold,
        }
    }

    /// Parse one datagram. On failure the status pinpoints the stage.
    pub fn parse(&self, bytes: &[u8]) -> Result<(Message, MessageHeader), ParseStatus> {
        let Some(header) = MessageHeader::deserialize(bytes) else {
            return Err(if bytes.len() < HEADER_SIZE {
                ParseStatus::InvalidHeader
            } else {
                ParseStatus::InvalidMessageType
            });
        };
        if header.magic != self.network.magic() || header.version_using < PROTOCOL_VERSION_MIN {
            return Err(ParseStatus::InvalidHeader);
        }
        let body = &bytes[HEADER_SIZE..];
        let message = match header.message_type {
            MessageType::Keepalive => self.parse_keepalive(body),
            MessageType::Publish => self
                .parse_block_body(&header, body)
                .map(|block| Message::Publish(Publish { block }))
                .map_err(|status| {
                    if status == ParseStatus::InsufficientWork {
                        status
                    } else {
                        ParseStatus::InvalidPublishMessage
                    }
                }),
            MessageType::ConfirmReq => self
                .parse_block_body(&header, body)
                .map(|block| Message::ConfirmReq(ConfirmReq { block }))
                .map_err(|status| {
                    if status == ParseStatus::InsufficientWork {
                        status
                    } else {
                        ParseStatus::InvalidConfirmReqMessage
                    }
                }),
            MessageType::ConfirmAck => self.parse_confirm_ack(&header, body),
            MessageType::NodeIdHandshake => self.parse_handshake(&header, body),
            // Bootstrap traffic never arrives over UDP.
            MessageType::BulkPull
            | MessageType::BulkPush
            | MessageType::Invalid
            | MessageType::NotAType => Err(ParseStatus::InvalidMessageType),
        }?;
        Ok((message, header))
    }

    fn parse_keepalive(&self, body: &[u8]) -> Result<Message, ParseStatus> {
        if body.len() != KEEPALIVE_PEERS * ENDPOINT_SIZE {
            return Err(ParseStatus::InvalidKeepaliveMessage);
        }
        let mut keepalive = Keepalive::default();
        for (slot, chunk) in keepalive
            .peers
            .iter_mut()
            .zip(body.chunks_exact(ENDPOINT_SIZE))
        {
            let octets: [u8; 16] = chunk[..16].try_into().expect("chunk length fixed");
            let port = u16::from_be_bytes([chunk[16], chunk[17]]);
            *slot = SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0);
        }
        Ok(Message::Keepalive(keepalive))
    }

    fn parse_block_body(
        &self,
        header: &MessageHeader,
        body: &[u8],
    ) -> Result<Block, ParseStatus> {
        let kind = BlockKind::from_u8(header.block_kind_bits())
            .filter(|kind| *kind != BlockKind::NotABlock)
            .ok_or(ParseStatus::InvalidMessageType)?;
        if body.len() != BLOCK_WIRE_SIZE {
            return Err(ParseStatus::InvalidMessageType);
        }
        let block =
            Block::deserialize(kind, body).ok_or(ParseStatus::InvalidMessageType)?;
        if !validate_work(&block.root(), block.work(), self.work_threshold) {
            return Err(ParseStatus::InsufficientWork);
        }
        Ok(block)
    }

    fn parse_confirm_ack(
        &self,
        header: &MessageHeader,
        body: &[u8],
    ) -> Result<Message, ParseStatus> {
        let count = header.vote_count();
        if count == 0 || body.len() < VOTE_PREFIX_SIZE {
            return Err(ParseStatus::InvalidConfirmAckMessage);
        }
        let account = PublicKey(body[..32].try_into().expect("length checked"));
        let signature = Signature(body[32..96].try_into().expect("length checked"));
        let sequence = u64::from_be_bytes(body[96..104].try_into().expect("length checked"));

        let mut blocks = Vec::with_capacity(count);
        let mut offset = VOTE_PREFIX_SIZE;
        for _ in 0..count {
            let Some(&kind_byte) = body.get(offset) else {
                return Err(ParseStatus::InvalidConfirmAckMessage);
            };
            offset += 1;
            let kind = BlockKind::from_u8(kind_byte)
                .ok_or(ParseStatus::InvalidConfirmAckMessage)?;
            if kind == BlockKind::NotABlock {
                let Some(slice) = body.get(offset..offset + 32) else {
                    return Err(ParseStatus::InvalidConfirmAckMessage);
                };
                blocks.push(VoteBlock::Hash(BlockHash::new(
                    slice.try_into().expect("length checked"),
                )));
                offset += 32;
            } else {
                let Some(slice) = body.get(offset..offset + BLOCK_WIRE_SIZE) else {
                    return Err(ParseStatus::InvalidConfirmAckMessage);
                };
                let block = Block::deserialize(kind, slice)
                    .ok_or(ParseStatus::InvalidConfirmAckMessage)?;
                if !validate_work(&block.root(), block.work(), self.work_threshold) {
                    return Err(ParseStatus::InsufficientWork);
                }
                blocks.push(VoteBlock::Block(block));
                offset += BLOCK_WIRE_SIZE;
            }
        }
        if offset != body.len() {
            return Err(ParseStatus::InvalidConfirmAckMessage);
        }
        Ok(Message::ConfirmAck(ConfirmAck {
            vote: Vote {
                account,
                sequence,
                signature,
                blocks,
            },
        }))
    }

    fn parse_handshake(
        &self,
        header: &MessageHeader,
        body: &[u8],
    ) -> Result<Message, ParseStatus> {
        let has_query = header.extensions & EXT_HANDSHAKE_QUERY != 0;
        let has_response = header.extensions & EXT_HANDSHAKE_RESPONSE != 0;
        if !has_query && !has_response {
            return Err(ParseStatus::InvalidNodeIdHandshakeMessage);
        }
        let expected = if has_query { 32 } else { 0 } + if has_response { 96 } else { 0 };
        if body.len() != expected {
            return Err(ParseStatus::InvalidNodeIdHandshakeMessage);
        }
        let mut offset = 0;
        let query = has_query.then(|| {
            let cookie: [u8; 32] = body[..32].try_into().expect("length checked");
            offset = 32;
            cookie
        });
        let response = has_response.then(|| {
            let account = PublicKey(body[offset..offset + 32].try_into().expect("length checked"));
            let signature = Signature(
                body[offset + 32..offset + 96]
                    .try_into()
                    .expect("length checked"),
            );
            (account, signature)
        });
        Ok(Message::NodeIdHandshake(NodeIdHandshake { query, response }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chr_ledger::{CommonFields, StateBlock};
    use chr_types::Amount;

    fn parser() -> Parser {
        Parser::new(NetworkId::Test, 0)
    }

    fn sample_block() -> Block {
        Block::State(StateBlock {
            fields: CommonFields {
                account: PublicKey([1u8; 32]),
                previous: BlockHash::new([2u8; 32]),
                representative: PublicKey([3u8; 32]),
                balance: Amount::raw(77),
                dividend: BlockHash::ZERO,
                link: BlockHash::new([4u8; 32]),
            },
            signature: Signature([5u8; 64]),
            work: 42,
        })
    }

    #[test]
    fn keepalive_roundtrip() {
        let mut keepalive = Keepalive::default();
        keepalive.peers[0] = SocketAddrV6::new(Ipv6Addr::LOCALHOST, 8275, 0, 0);
        keepalive.peers[7] = SocketAddrV6::new(Ipv6Addr::from([0xFE80, 0, 0, 0, 0, 0, 0, 1]), 9, 0, 0);
        let message = Message::Keepalive(keepalive.clone());
        let bytes = message.to_bytes(NetworkId::Test);
        match parser().parse(&bytes).unwrap().0 {
            Message::Keepalive(decoded) => assert_eq!(decoded, keepalive),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn publish_roundtrip() {
        let message = Message::Publish(Publish {
            block: sample_block(),
        });
        let bytes = message.to_bytes(NetworkId::Test);
        assert_eq!(parser().parse(&bytes).unwrap().0, message);
    }

    #[test]
    fn confirm_req_roundtrip() {
        let message = Message::ConfirmReq(ConfirmReq {
            block: sample_block(),
        });
        let bytes = message.to_bytes(NetworkId::Test);
        assert_eq!(parser().parse(&bytes).unwrap().0, message);
    }

    #[test]
    fn insufficient_work_detected() {
        let message = Message::Publish(Publish {
            block: sample_block(),
        });
        let bytes = message.to_bytes(NetworkId::Test);
        let strict = Parser::new(NetworkId::Test, u64::MAX);
        assert_eq!(strict.parse(&bytes), Err(ParseStatus::InsufficientWork));
    }

    #[test]
    fn confirm_ack_heterogeneous_roundtrip() {
        let vote = Vote {
            account: PublicKey([9u8; 32]),
            sequence: 31,
            signature: Signature([8u8; 64]),
            blocks: vec![
                VoteBlock::Hash(BlockHash::new([0xAA; 32])),
                VoteBlock::Block(sample_block()),
                VoteBlock::Hash(BlockHash::new([0xBB; 32])),
            ],
        };
        let message = Message::ConfirmAck(ConfirmAck { vote });
        let bytes = message.to_bytes(NetworkId::Test);
        assert_eq!(parser().parse(&bytes).unwrap().0, message);
    }

    #[test]
    fn confirm_ack_truncated_entry_rejected() {
        let vote = Vote {
            account: PublicKey([9u8; 32]),
            sequence: 31,
            signature: Signature([8u8; 64]),
            blocks: vec![VoteBlock::Hash(BlockHash::new([0xAA; 32]))],
        };
        let mut bytes = Message::ConfirmAck(ConfirmAck { vote }).to_bytes(NetworkId::Test);
        bytes.pop();
        assert_eq!(
            parser().parse(&bytes),
            Err(ParseStatus::InvalidConfirmAckMessage)
        );
    }

    #[test]
    fn confirm_ack_trailing_bytes_rejected() {
        let vote = Vote {
            account: PublicKey([9u8; 32]),
            sequence: 31,
            signature: Signature([8u8; 64]),
            blocks: vec![VoteBlock::Hash(BlockHash::new([0xAA; 32]))],
        };
        let mut bytes = Message::ConfirmAck(ConfirmAck { vote }).to_bytes(NetworkId::Test);
        bytes.push(0);
        assert_eq!(
            parser().parse(&bytes),
            Err(ParseStatus::InvalidConfirmAckMessage)
        );
    }

    #[test]
    fn handshake_query_and_response_roundtrip() {
        let message = Message::NodeIdHandshake(NodeIdHandshake {
            query: Some([7u8; 32]),
            response: Some((PublicKey([1u8; 32]), Signature([2u8; 64]))),
        });
        let bytes = message.to_bytes(NetworkId::Test);
        assert_eq!(parser().parse(&bytes).unwrap().0, message);

        let query_only = Message::NodeIdHandshake(NodeIdHandshake {
            query: Some([7u8; 32]),
            response: None,
        });
        let bytes = query_only.to_bytes(NetworkId::Test);
        assert_eq!(parser().parse(&bytes).unwrap().0, query_only);
    }

    #[test]
    fn empty_handshake_rejected() {
        let message = Message::NodeIdHandshake(NodeIdHandshake {
            query: None,
            response: None,
        });
        let bytes = message.to_bytes(NetworkId::Test);
        assert_eq!(
            parser().parse(&bytes),
            Err(ParseStatus::InvalidNodeIdHandshakeMessage)
        );
    }

    #[test]
    fn wrong_magic_is_invalid_header() {
        let bytes = Message::Keepalive(Keepalive::default()).to_bytes(NetworkId::Live);
        assert_eq!(parser().parse(&bytes), Err(ParseStatus::InvalidHeader));
    }

    #[test]
    fn outdated_version_is_invalid_header() {
        let mut bytes = Message::Keepalive(Keepalive::default()).to_bytes(NetworkId::Test);
        bytes[2] = PROTOCOL_VERSION_MIN - 1;
        assert_eq!(parser().parse(&bytes), Err(ParseStatus::InvalidHeader));
    }

    #[test]
    fn truncated_frame_is_invalid_header() {
        assert_eq!(parser().parse(&[0u8; 3]), Err(ParseStatus::InvalidHeader));
    }

    #[test]
    fn bootstrap_kind_over_udp_is_fatal() {
        let mut bytes = Message::Keepalive(Keepalive::default()).to_bytes(NetworkId::Test);
        bytes[5] = MessageType::BulkPull as u8;
        bytes.truncate(HEADER_SIZE);
        assert_eq!(
            parser().parse(&bytes),
            Err(ParseStatus::InvalidMessageType)
        );
    }

    #[test]
    fn keepalive_wrong_length_rejected() {
        let mut bytes = Message::Keepalive(Keepalive::default()).to_bytes(NetworkId::Test);
        bytes.pop();
        assert_eq!(
            parser().parse(&bytes),
            Err(ParseStatus::InvalidKeepaliveMessage)
        );
    }

    #[test]
    fn publish_wrong_length_rejected() {
        let mut bytes = Message::Publish(Publish {
            block: sample_block(),
        })
        .to_bytes(NetworkId::Test);
        bytes.push(0);
        assert_eq!(
            parser().parse(&bytes),
            Err(ParseStatus::InvalidPublishMessage)
        );
    }
}
