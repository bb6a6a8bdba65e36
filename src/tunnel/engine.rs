//! Capabilities the tunnel manager drives
//!
//! The WireGuard engine owns handshakes, sessions and packet framing. The
//! network stack owns the default route. The manager only sequences calls
//! into both.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::EngineError;

/// Handle to a network interface in the device's stack
///
/// Holding one never keeps the interface alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetifId(pub u32);

impl fmt::Display for NetifId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "netif#{}", self.0)
    }
}

/// Engine-assigned index of a configured peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerIndex(pub u8);

/// Everything the engine needs to register the virtual interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceSpec<'a> {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// Always unspecified; the tunnel has no next hop
    pub gateway: Ipv4Addr,
    /// Base64 private key
    pub private_key: &'a str,
    pub listen_port: u16,
    /// Physical interface the engine's own UDP traffic must leave through
    pub bind_netif: Option<NetifId>,
}

/// Everything the engine needs to register the single peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerSpec<'a> {
    /// Base64 public key
    pub public_key: &'a str,
    pub preshared_key: Option<&'a str>,
    pub allowed_address: Ipv4Addr,
    pub allowed_mask: Ipv4Addr,
    pub endpoint: SocketAddrV4,
}

/// What the engine currently knows about a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStatus {
    /// At least one handshake has completed and the keys are still valid
    pub session_valid: bool,
    /// Last observed source address of the peer
    pub endpoint: Option<SocketAddr>,
}

/// Interface registration and peer management of the WireGuard engine
pub trait TunnelEngine: Send {
    fn add_interface(&mut self, spec: &InterfaceSpec<'_>) -> Result<NetifId, EngineError>;

    fn remove_interface(&mut self, netif: NetifId);

    fn add_peer(&mut self, netif: NetifId, peer: &PeerSpec<'_>) -> Result<PeerIndex, EngineError>;

    fn remove_peer(&mut self, netif: NetifId, peer: PeerIndex);

    /// Mark the interface administratively up
    fn set_up(&mut self, netif: NetifId);

    /// Start handshaking with the peer; completes asynchronously
    fn connect(&mut self, netif: NetifId, peer: PeerIndex) -> Result<(), EngineError>;

    fn peer_status(&self, netif: NetifId, peer: PeerIndex) -> Option<PeerStatus>;
}

/// Default-route control of the network stack
pub trait RouteTable: Send {
    /// Interface currently carrying the default route
    fn default_netif(&self) -> Option<NetifId>;

    fn set_default_netif(&mut self, netif: NetifId);
}
