//! Node configuration with TOML file support.

use crate::NodeError;
use chr_types::{Amount, NetworkId};
use serde::{Deserialize, Serialize};

/// Configuration for a CHR node.
///
/// Loadable from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically for tests.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to join.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// UDP peering port. Zero binds an ephemeral port (tests).
    #[serde(default = "default_peering_port")]
    pub peering_port: u16,

    /// I/O executor worker count.
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,

    /// Proof-of-work pool worker count.
    #[serde(default = "default_work_threads")]
    pub work_threads: usize,

    /// Whether this node votes with its local representative keys.
    #[serde(default)]
    pub enable_voting: bool,

    /// Peers contacted at startup, as `host:port` strings.
    #[serde(default)]
    pub preconfigured_peers: Vec<String>,

    /// Floor for the online-stake estimate, as a raw-unit decimal string
    /// (raw amounts overflow TOML integers).
    #[serde(default)]
    pub online_weight_minimum: Option<String>,

    /// Quorum percentage: the winner must lead the runner-up by this share
    /// of online stake.
    #[serde(default = "default_quorum")]
    pub online_weight_quorum: u8,

    /// Gap-cache voters must hold this many 256ths of online stake to
    /// trigger a bootstrap.
    #[serde(default = "default_bootstrap_fraction")]
    pub bootstrap_fraction_numerator: u8,

    /// Smallest distributable dividend, as a raw-unit decimal string.
    #[serde(default = "default_dividend_minimum")]
    pub minimum_dividend_amount: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_network() -> NetworkId {
    NetworkId::Live
}

fn default_peering_port() -> u16 {
    NetworkId::Live.default_port()
}

fn default_io_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .max(4)
}

fn default_work_threads() -> usize {
    default_io_threads()
}

fn default_quorum() -> u8 {
    50
}

fn default_bootstrap_fraction() -> u8 {
    1
}

fn default_dividend_minimum() -> String {
    10u128.pow(30).to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// A test-network config bound to an ephemeral port.
    pub fn test() -> Self {
        Self {
            network: NetworkId::Test,
            peering_port: 0,
            online_weight_minimum: Some("1000".to_string()),
            minimum_dividend_amount: "10".to_string(),
            ..Self::default()
        }
    }

    /// The configured online weight minimum, if overridden and well-formed.
    pub fn online_weight_minimum(&self) -> Option<Amount> {
        self.online_weight_minimum
            .as_deref()
            .and_then(|text| Amount::decode_dec(text).ok())
    }

    /// The smallest distributable dividend; a malformed value falls back
    /// to the protocol default.
    pub fn minimum_dividend(&self) -> Amount {
        Amount::decode_dec(&self.minimum_dividend_amount)
            .unwrap_or_else(|_| Amount::raw(10u128.pow(30)))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            peering_port: default_peering_port(),
            io_threads: default_io_threads(),
            work_threads: default_work_threads(),
            enable_voting: false,
            preconfigured_peers: Vec::new(),
            online_weight_minimum: None,
            online_weight_quorum: default_quorum(),
            bootstrap_fraction_numerator: default_bootstrap_fraction(),
            minimum_dividend_amount: default_dividend_minimum(),
            log_level: default_log_level(),
        }
    }
}
