//! Per-network work thresholds.

use chr_types::NetworkId;

/// Minimum acceptable work digest value for a block on the given network.
pub fn work_threshold(network: NetworkId) -> u64 {
    match network {
        NetworkId::Live | NetworkId::Beta => 0xFFFF_FFC0_0000_0000,
        NetworkId::Test => 0xFF00_0000_0000_0000,
    }
}
