//! Peer tracking and UDP transport.

pub mod error;
pub mod peers;
pub mod reserved;
pub mod syn_cookies;
pub mod udp;

pub use error::NetworkError;
pub use peers::{PeerContainer, PeerInfo};
pub use reserved::{map_endpoint_to_v6, reserved_address};
pub use syn_cookies::SynCookies;
pub use udp::UdpNetwork;
