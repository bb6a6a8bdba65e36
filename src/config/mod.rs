//! Tunnel configuration
//!
//! Holds the single-peer [`TunnelConfig`] consumed by the tunnel manager and
//! loads it from standard WireGuard `.conf` files.

mod parser;

pub use parser::{KeyMaterial, RoutingMode, TunnelConfig};
