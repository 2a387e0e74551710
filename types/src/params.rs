//! Protocol timing and capacity parameters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Amount, NetworkId};

/// Design-level timing and capacity constants, scaled per network.
///
/// The live values follow the protocol defaults; the test network shortens
/// every interval so integration tests converge in milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkParams {
    pub network: NetworkId,
    /// Keepalive/housekeeping period.
    pub period: Duration,
    /// Peers silent for longer than this are purged (5 × period).
    pub cutoff: Duration,
    /// Outstanding syn cookies older than this are discarded.
    pub syn_cookie_cutoff: Duration,
    /// Interval between election announcement passes.
    pub announce_interval: Duration,
    /// Wall-clock limit for one block-processor write transaction.
    pub transaction_timeout: Duration,
    /// Delay before a gap-cache hit triggers a bootstrap.
    pub gap_cache_bootstrap_delay: Duration,
    /// Maximum peers per IP address.
    pub max_peers_per_ip: usize,
    /// Maximum legacy (pre-handshake) peers per IP address.
    pub max_legacy_peers_per_ip: usize,
    /// Maximum legacy peers across the whole container.
    pub max_legacy_peers: usize,
    /// Floor for the online-stake estimate; elections cannot confirm with
    /// less than this much stake voting.
    pub online_weight_minimum: Amount,
    /// Percentage of online stake the winner must lead the runner-up by.
    pub online_weight_quorum: u8,
    /// Numerator over 256 of online stake required of gap voters before a
    /// bootstrap is scheduled.
    pub bootstrap_fraction_numerator: u8,
}

impl NetworkParams {
    pub fn new(network: NetworkId) -> Self {
        let period = match network {
            NetworkId::Test => Duration::from_secs(1),
            _ => Duration::from_secs(60),
        };
        Self {
            network,
            period,
            cutoff: period * 5,
            syn_cookie_cutoff: Duration::from_secs(300),
            announce_interval: match network {
                NetworkId::Test => Duration::from_millis(10),
                _ => Duration::from_millis(16_000),
            },
            transaction_timeout: Duration::from_secs(1),
            gap_cache_bootstrap_delay: match network {
                NetworkId::Test => Duration::from_millis(5),
                _ => Duration::from_secs(5),
            },
            max_peers_per_ip: 10,
            max_legacy_peers_per_ip: 5,
            max_legacy_peers: 500,
            online_weight_minimum: Amount::raw(60_000 * 10u128.pow(24)),
            online_weight_quorum: 50,
            bootstrap_fraction_numerator: 1,
        }
    }

    pub fn live() -> Self {
        Self::new(NetworkId::Live)
    }

    pub fn test() -> Self {
        Self::new(NetworkId::Test)
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::live()
    }
}
