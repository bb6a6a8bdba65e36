//! picoguard - WireGuard tunnel lifecycle for small devices
//!
//! Brings a single WireGuard tunnel up and down on top of an external
//! protocol engine and the device's network stack.
//!
//! # Features
//!
//! - Route-all or split routing, chosen from the peer's allowed range
//! - Previous default route restored on teardown
//! - Endpoint resolution with a strict dotted-quad fast path
//! - Platform services for the engine (entropy, tick clock, TAI64N, load)
//! - Rate-limited handshake kicks and peer liveness queries
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use picoguard::tunnel::{RouteTable, TunnelEngine};
//! use picoguard::{HostPlatform, TunnelConfig, TunnelManager};
//!
//! async fn bring_up(
//!     engine: impl TunnelEngine + 'static,
//!     routes: impl RouteTable + 'static,
//! ) -> picoguard::Result<TunnelManager> {
//!     let config = TunnelConfig::from_file("wg0.conf")?;
//!     let mut manager = TunnelManager::new(engine, routes, Arc::new(HostPlatform::new()));
//!     manager.activate(&config).await?;
//!     Ok(manager)
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod resolver;
pub mod tunnel;

pub use config::{KeyMaterial, RoutingMode, TunnelConfig};
pub use error::{PicoGuardError, Result};
pub use platform::{HostPlatform, Platform};
pub use resolver::Resolver;
pub use tunnel::TunnelManager;
