//! Network identity and protocol versioning.

use serde::{Deserialize, Serialize};

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 12;
/// Oldest protocol version we still talk to.
pub const PROTOCOL_VERSION_MIN: u8 = 7;
/// First protocol version that performs the node-id handshake. Peers below
/// this are legacy peers and are inserted without identity proof.
pub const NODE_ID_VERSION: u8 = 12;

/// Identifies which CHR network a node participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkId {
    /// The production network.
    Live,
    /// The public beta network.
    Beta,
    /// Local test network.
    Test,
}

impl NetworkId {
    /// Two-byte magic prefixed to every datagram.
    pub fn magic(&self) -> [u8; 2] {
        match self {
            Self::Live => *b"RC",
            Self::Beta => *b"RB",
            Self::Test => *b"RA",
        }
    }

    /// Default peering port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Live => 8275,
            Self::Beta => 18275,
            Self::Test => 28275,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Beta => "beta",
            Self::Test => "test",
        }
    }

    /// Whether private and carrier-grade-NAT ranges are rejected as peers.
    pub fn filters_private_ranges(&self) -> bool {
        matches!(self, Self::Live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_is_distinct_per_network() {
        assert_ne!(NetworkId::Live.magic(), NetworkId::Test.magic());
        assert_ne!(NetworkId::Live.magic(), NetworkId::Beta.magic());
    }

    #[test]
    fn only_live_filters_private_ranges() {
        assert!(NetworkId::Live.filters_private_ranges());
        assert!(!NetworkId::Beta.filters_private_ranges());
        assert!(!NetworkId::Test.filters_private_ranges());
    }
}
