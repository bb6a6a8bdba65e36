//! Tunnel lifecycle and routing
//!
//! [`TunnelManager`] owns the one virtual WireGuard interface and its one
//! peer. It registers both with the engine, decides whether the tunnel takes
//! over the default route, and puts the previous default back on teardown.
//!
//! The manager is not internally synchronized. Callers serialize
//! `activate`, `deactivate`, liveness queries and kicks themselves.

pub mod engine;
pub mod probe;


use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use crate::config::{RoutingMode, TunnelConfig};
use crate::error::{Result, TunnelError};
use crate::platform::{elapsed_ms, Platform};
use crate::resolver::{NameLookup, Resolver};

pub use engine::{
    InterfaceSpec, NetifId, PeerIndex, PeerSpec, PeerStatus, RouteTable, TunnelEngine,
};
pub use probe::{ProbeTransport, UdpProbe, PROBE_PAYLOAD};

/// Default minimum spacing between kick probes
pub const DEFAULT_KICK_INTERVAL_MS: u32 = 250;

/// Result of a kick request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickOutcome {
    /// A probe datagram was handed to the transport
    Sent,
    /// The previous probe was too recent; nothing was sent
    Throttled,
}

/// Peer session state as seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerLiveness {
    /// A handshake has completed and the session is usable
    pub session_valid: bool,
    /// Where the peer's packets currently come from. Non-IPv4 sources are
    /// reported as 0.0.0.0 with the observed port.
    pub endpoint: Option<SocketAddrV4>,
}

#[derive(Debug)]
struct ActiveTunnel {
    netif: NetifId,
    peer: PeerIndex,
    /// Default interface at activation; a plain reference, never owned
    previous_default: Option<NetifId>,
    mode: RoutingMode,
}

#[derive(Debug)]
enum TunnelState {
    Inactive,
    Active(ActiveTunnel),
}

/// Manages the single WireGuard tunnel of the device
pub struct TunnelManager {
    engine: Box<dyn TunnelEngine>,
    routes: Box<dyn RouteTable>,
    platform: Arc<dyn Platform>,
    resolver: Resolver,
    probe: Box<dyn ProbeTransport>,
    state: TunnelState,
    /// Tick of the last probe actually sent; survives deactivation
    last_kick_ms: Option<u32>,
}

impl TunnelManager {
    /// Create an inactive manager using the system resolver and UDP probes
    pub fn new(
        engine: impl TunnelEngine + 'static,
        routes: impl RouteTable + 'static,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            engine: Box::new(engine),
            routes: Box::new(routes),
            platform,
            resolver: Resolver::default(),
            probe: Box::new(UdpProbe),
            state: TunnelState::Inactive,
            last_kick_ms: None,
        }
    }

    /// Replace the host name lookup used for non-literal endpoints
    pub fn with_name_lookup(mut self, lookup: impl NameLookup + 'static) -> Self {
        self.resolver = Resolver::new(lookup);
        self
    }

    /// Replace the transport used for kick probes
    pub fn with_probe_transport(mut self, probe: impl ProbeTransport + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Platform services shared with the engine
    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, TunnelState::Active(_))
    }

    /// Routing mode of the active tunnel
    pub fn routing_mode(&self) -> Option<RoutingMode> {
        match &self.state {
            TunnelState::Active(tunnel) => Some(tunnel.mode),
            TunnelState::Inactive => None,
        }
    }

    /// Bring the tunnel up
    ///
    /// Returns immediately if already active. On failure nothing stays
    /// registered with the engine and the default route is untouched.
    pub async fn activate(&mut self, config: &TunnelConfig) -> Result<()> {
        if self.is_active() {
            tracing::debug!("Tunnel already active, ignoring activation");
            return Ok(());
        }

        config.validate()?;

        self.platform.init();

        let endpoint_ip = self
            .resolver
            .resolve(&config.endpoint_host)
            .await
            .map_err(|e| {
                tracing::error!("Failed to resolve endpoint '{}': {}", config.endpoint_host, e);
                e
            })?;
        let endpoint = SocketAddrV4::new(endpoint_ip, config.endpoint_port);

        let mode = config.routing_mode();
        let netmask = config.interface_netmask();
        let listen_port = config.effective_listen_port();

        // Route-all overwrites the default route, and the engine's UDP
        // socket must stay on the physical interface either way.
        let previous_default = self.routes.default_netif();

        let netif = self
            .engine
            .add_interface(&InterfaceSpec {
                address: config.local_address,
                netmask,
                gateway: Ipv4Addr::UNSPECIFIED,
                private_key: config.private_key.as_str(),
                listen_port,
                bind_netif: previous_default,
            })
            .map_err(|source| {
                tracing::error!("Interface registration failed: {}", source);
                TunnelError::InterfaceRegistration { source }
            })?;

        let peer = match self.engine.add_peer(
            netif,
            &PeerSpec {
                public_key: config.peer_public_key.as_str(),
                preshared_key: None,
                allowed_address: config.allowed_address,
                allowed_mask: config.allowed_mask,
                endpoint,
            },
        ) {
            Ok(peer) => peer,
            Err(source) => {
                tracing::error!("Peer registration failed: {}", source);
                self.engine.remove_interface(netif);
                return Err(TunnelError::PeerRegistration { source }.into());
            }
        };

        self.engine.set_up(netif);
        if let Err(source) = self.engine.connect(netif, peer) {
            tracing::error!("Engine refused to start the handshake: {}", source);
            self.engine.remove_peer(netif, peer);
            self.engine.remove_interface(netif);
            return Err(TunnelError::HandshakeStart { source }.into());
        }

        if mode == RoutingMode::RouteAll {
            self.routes.set_default_netif(netif);
        }

        self.state = TunnelState::Active(ActiveTunnel {
            netif,
            peer,
            previous_default,
            mode,
        });

        tracing::info!(
            "WireGuard initialized. local={} endpoint={} allowed={}/{} listen={} mode={:?}",
            config.local_address,
            endpoint,
            config.allowed_address,
            config.allowed_mask,
            listen_port,
            mode
        );

        Ok(())
    }

    /// Tear the tunnel down and restore the previous default route
    ///
    /// Safe to call at any time; does nothing when inactive.
    pub fn deactivate(&mut self) {
        let TunnelState::Active(tunnel) = std::mem::replace(&mut self.state, TunnelState::Inactive)
        else {
            tracing::debug!("Tunnel not active, nothing to tear down");
            return;
        };

        // peer before interface so the engine never sees a half-removed netif
        self.engine.remove_peer(tunnel.netif, tunnel.peer);
        self.engine.remove_interface(tunnel.netif);

        match tunnel.previous_default {
            Some(previous) => {
                self.routes.set_default_netif(previous);
                tracing::debug!("Restored default route to {}", previous);
            }
            None if tunnel.mode == RoutingMode::RouteAll => {
                tracing::warn!(
                    "No default route to restore; default still points at removed {}",
                    tunnel.netif
                );
            }
            None => {}
        }

        tracing::info!("WireGuard tunnel stopped");
    }

    /// Session state of the peer, `None` when inactive or unknown to the engine
    pub fn peer_liveness(&self) -> Option<PeerLiveness> {
        let TunnelState::Active(tunnel) = &self.state else {
            return None;
        };

        let status = self.engine.peer_status(tunnel.netif, tunnel.peer)?;
        Some(PeerLiveness {
            session_valid: status.session_valid,
            endpoint: status.endpoint.map(ipv4_view),
        })
    }

    /// Whether the peer currently has a valid session
    pub fn peer_up(&self) -> bool {
        self.peer_liveness().map_or(false, |l| l.session_valid)
    }

    /// Send a one-byte probe through the tunnel to trigger a handshake
    ///
    /// Probes closer together than `min_interval_ms` are skipped. The first
    /// probe after construction is never throttled. The send itself is
    /// fire-and-forget.
    pub async fn kick_handshake(
        &mut self,
        target: SocketAddrV4,
        min_interval_ms: u32,
    ) -> Result<KickOutcome> {
        if !self.is_active() {
            return Err(TunnelError::NotActive.into());
        }

        let now = self.platform.now_ms();
        if let Some(last) = self.last_kick_ms {
            if elapsed_ms(now, last) < min_interval_ms {
                tracing::trace!("Kick throttled ({} ms since last probe)", elapsed_ms(now, last));
                return Ok(KickOutcome::Throttled);
            }
        }
        self.last_kick_ms = Some(now);

        match self.probe.send_probe(target).await {
            Ok(()) => tracing::debug!("Sent handshake kick probe to {}", target),
            Err(e) => tracing::debug!("Handshake kick probe to {} failed: {}", target, e),
        }

        Ok(KickOutcome::Sent)
    }
}

impl Drop for TunnelManager {
    fn drop(&mut self) {
        self.deactivate();
    }
}

fn ipv4_view(addr: SocketAddr) -> SocketAddrV4 {
    match addr {
        SocketAddr::V4(v4) => v4,
        SocketAddr::V6(v6) => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, v6.port()),
    }
}
