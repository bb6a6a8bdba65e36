//! Tunnel configuration and WireGuard `.conf` parser
//!
//! Parses standard WireGuard `.conf` files with one [Interface] and exactly
//! one [Peer] section into a [`TunnelConfig`].

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ipnet::{IpNet, Ipv4Net};

use crate::error::ConfigError;

/// Opaque key material handed to the engine as base64 text.
///
/// `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("KeyMaterial(<empty>)")
        } else {
            f.write_str("KeyMaterial(<redacted>)")
        }
    }
}

impl From<&str> for KeyMaterial {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for KeyMaterial {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// How traffic is steered into the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// The tunnel becomes the default route for all traffic
    RouteAll,
    /// Only the allowed range is routed through the tunnel
    Split,
}

/// Configuration for the single tunnel and its single peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Our address inside the tunnel
    pub local_address: Ipv4Addr,
    /// Our private key
    pub private_key: KeyMaterial,
    /// Peer's public key
    pub peer_public_key: KeyMaterial,
    /// Peer endpoint, dotted-quad literal or host name
    pub endpoint_host: String,
    /// Peer endpoint UDP port
    pub endpoint_port: u16,
    /// Allowed range network address (0.0.0.0 with a 0.0.0.0 mask means route-all)
    pub allowed_address: Ipv4Addr,
    /// Allowed range mask
    pub allowed_mask: Ipv4Addr,
    /// Local UDP listen port, 0 to reuse the endpoint port
    pub listen_port: u16,
}

impl TunnelConfig {
    /// Route-all configuration listening on the endpoint port
    pub fn new(
        local_address: Ipv4Addr,
        private_key: impl Into<KeyMaterial>,
        endpoint_host: impl Into<String>,
        peer_public_key: impl Into<KeyMaterial>,
        endpoint_port: u16,
    ) -> Self {
        Self {
            local_address,
            private_key: private_key.into(),
            peer_public_key: peer_public_key.into(),
            endpoint_host: endpoint_host.into(),
            endpoint_port,
            allowed_address: Ipv4Addr::UNSPECIFIED,
            allowed_mask: Ipv4Addr::UNSPECIFIED,
            listen_port: 0,
        }
    }

    /// Restrict the tunnel to an allowed range given as address and mask
    pub fn with_allowed_range(mut self, address: Ipv4Addr, mask: Ipv4Addr) -> Self {
        self.allowed_address = address;
        self.allowed_mask = mask;
        self
    }

    /// Restrict the tunnel to an allowed range given in CIDR form
    pub fn with_allowed_net(self, net: Ipv4Net) -> Self {
        self.with_allowed_range(net.network(), net.netmask())
    }

    /// Override the local UDP listen port (0 keeps the endpoint port)
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Route-all when both the allowed address and mask are the wildcard
    pub fn routing_mode(&self) -> RoutingMode {
        if self.allowed_address.is_unspecified() && self.allowed_mask.is_unspecified() {
            RoutingMode::RouteAll
        } else {
            RoutingMode::Split
        }
    }

    /// Netmask for the virtual interface
    ///
    /// Route-all uses a host-only mask so only our tunnel address is
    /// locally attached.
    pub fn interface_netmask(&self) -> Ipv4Addr {
        match self.routing_mode() {
            RoutingMode::RouteAll => Ipv4Addr::BROADCAST,
            RoutingMode::Split => self.allowed_mask,
        }
    }

    /// Listen port actually requested from the engine
    pub fn effective_listen_port(&self) -> u16 {
        if self.listen_port != 0 {
            self.listen_port
        } else {
            self.endpoint_port
        }
    }

    /// Check the fields activation cannot proceed without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.private_key.is_empty() {
            return Err(ConfigError::MissingField {
                field: "PrivateKey".to_string(),
            });
        }
        if self.peer_public_key.is_empty() {
            return Err(ConfigError::MissingField {
                field: "PublicKey".to_string(),
            });
        }
        if self.endpoint_host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "Endpoint".to_string(),
            });
        }
        Ok(())
    }

    /// Parse a tunnel configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parse a tunnel configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut interface: Option<InterfaceBuilder> = None;
        let mut peer: Option<PeerBuilder> = None;
        let mut current_section: Option<Section> = None;

        for (line_num, line) in content.lines().enumerate() {
            let line_num = line_num + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.eq_ignore_ascii_case("[interface]") {
                if interface.is_some() {
                    return Err(ConfigError::ParseError {
                        line: line_num,
                        message: "Duplicate [Interface] section".to_string(),
                    });
                }
                interface = Some(InterfaceBuilder::default());
                current_section = Some(Section::Interface);
                continue;
            } else if line.eq_ignore_ascii_case("[peer]") {
                if peer.is_some() {
                    return Err(ConfigError::ParseError {
                        line: line_num,
                        message: "Only one [Peer] section is supported".to_string(),
                    });
                }
                peer = Some(PeerBuilder::default());
                current_section = Some(Section::Peer);
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::ParseError {
                    line: line_num,
                    message: format!("Expected 'key = value', got: {}", line),
                });
            };

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match current_section {
                Some(Section::Interface) => {
                    let iface = interface.get_or_insert_with(InterfaceBuilder::default);

                    match key.as_str() {
                        "privatekey" => {
                            iface.private_key = Some(parse_key(value, "PrivateKey")?);
                        }
                        "address" => {
                            if iface.address.is_none() {
                                iface.address = parse_interface_address(value)?;
                            }
                        }
                        "listenport" => {
                            iface.listen_port = Some(value.parse().map_err(|_| {
                                ConfigError::ParseError {
                                    line: line_num,
                                    message: format!("Invalid ListenPort: {}", value),
                                }
                            })?);
                        }
                        _ => {
                            tracing::debug!("Ignoring interface key: {}", key);
                        }
                    }
                }
                Some(Section::Peer) => {
                    let peer = peer.as_mut().ok_or(ConfigError::ParseError {
                        line: line_num,
                        message: "Peer value outside of [Peer] section".to_string(),
                    })?;

                    match key.as_str() {
                        "publickey" => {
                            peer.public_key = Some(parse_key(value, "PublicKey")?);
                        }
                        "presharedkey" => {
                            return Err(ConfigError::UnsupportedOption {
                                field: "PresharedKey".to_string(),
                            });
                        }
                        "endpoint" => {
                            peer.endpoint = Some(parse_endpoint(value)?);
                        }
                        "allowedips" => {
                            for ip_str in value.split(',') {
                                let ip_str = ip_str.trim();
                                if ip_str.is_empty() {
                                    continue;
                                }
                                let ip: IpNet =
                                    ip_str.parse().map_err(|_| ConfigError::InvalidCidr {
                                        value: ip_str.to_string(),
                                    })?;
                                peer.allowed_ips.push(ip);
                            }
                        }
                        _ => {
                            tracing::debug!("Ignoring peer key: {}", key);
                        }
                    }
                }
                None => {
                    return Err(ConfigError::ParseError {
                        line: line_num,
                        message: "Configuration value outside of any section".to_string(),
                    });
                }
            }
        }

        let interface = interface.ok_or(ConfigError::MissingField {
            field: "[Interface] section".to_string(),
        })?;
        let peer = peer.ok_or(ConfigError::MissingField {
            field: "[Peer] section".to_string(),
        })?;

        let private_key = interface.private_key.ok_or(ConfigError::MissingField {
            field: "PrivateKey".to_string(),
        })?;
        let local_address = interface.address.ok_or(ConfigError::MissingField {
            field: "Address".to_string(),
        })?;
        let public_key = peer.public_key.ok_or(ConfigError::MissingField {
            field: "PublicKey in [Peer]".to_string(),
        })?;
        let (endpoint_host, endpoint_port) = peer.endpoint.ok_or(ConfigError::MissingField {
            field: "Endpoint in [Peer]".to_string(),
        })?;
        let allowed = select_allowed_range(&peer.allowed_ips)?;

        Ok(TunnelConfig::new(
            local_address,
            private_key,
            endpoint_host,
            public_key,
            endpoint_port,
        )
        .with_allowed_net(allowed)
        .with_listen_port(interface.listen_port.unwrap_or(0)))
    }
}

/// Section type during parsing
#[derive(Clone, Copy)]
enum Section {
    Interface,
    Peer,
}

#[derive(Default)]
struct InterfaceBuilder {
    private_key: Option<KeyMaterial>,
    address: Option<Ipv4Addr>,
    listen_port: Option<u16>,
}

#[derive(Default)]
struct PeerBuilder {
    public_key: Option<KeyMaterial>,
    endpoint: Option<(String, u16)>,
    allowed_ips: Vec<IpNet>,
}

/// Pick the single IPv4 allowed range out of an AllowedIPs list
fn select_allowed_range(allowed_ips: &[IpNet]) -> Result<Ipv4Net, ConfigError> {
    let v4: Vec<Ipv4Net> = allowed_ips
        .iter()
        .filter_map(|net| match net {
            IpNet::V4(v4) => Some(*v4),
            IpNet::V6(v6) => {
                tracing::debug!("Ignoring IPv6 allowed range {}", v6);
                None
            }
        })
        .collect();

    if v4.is_empty() {
        return match allowed_ips.first() {
            Some(net) => Err(ConfigError::UnsupportedIpv6 {
                value: net.to_string(),
            }),
            None => Err(ConfigError::MissingField {
                field: "AllowedIPs in [Peer]".to_string(),
            }),
        };
    }

    if let Some(default) = v4.iter().find(|net| net.prefix_len() == 0) {
        return Ok(*default);
    }

    if v4.len() > 1 {
        tracing::warn!(
            "Only one allowed range is supported, using {} and ignoring {} others",
            v4[0],
            v4.len() - 1
        );
    }
    Ok(v4[0])
}

/// Parse the first IPv4 entry of an Address line, with or without a prefix
fn parse_interface_address(value: &str) -> Result<Option<Ipv4Addr>, ConfigError> {
    for addr_str in value.split(',') {
        let addr_str = addr_str.trim();
        if addr_str.is_empty() {
            continue;
        }
        let addr = if addr_str.contains('/') {
            let net: IpNet = addr_str.parse().map_err(|_| ConfigError::InvalidCidr {
                value: addr_str.to_string(),
            })?;
            net.addr()
        } else {
            addr_str
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidAddress {
                    value: addr_str.to_string(),
                })?
        };
        if let IpAddr::V4(v4) = addr {
            return Ok(Some(v4));
        }
    }
    Ok(None)
}

/// Parse a base64-encoded 32-byte key, keeping its text form
fn parse_key(value: &str, field_name: &str) -> Result<KeyMaterial, ConfigError> {
    let bytes = BASE64
        .decode(value)
        .map_err(|_| ConfigError::InvalidKey {
            field: field_name.to_string(),
        })?;

    if bytes.len() != 32 {
        return Err(ConfigError::InvalidKey {
            field: field_name.to_string(),
        });
    }

    Ok(KeyMaterial::new(value))
}

/// Parse an endpoint (host:port), where host may be a name
fn parse_endpoint(value: &str) -> Result<(String, u16), ConfigError> {
    if value.starts_with('[') {
        return Err(ConfigError::UnsupportedIpv6 {
            value: value.to_string(),
        });
    }

    let invalid = || ConfigError::InvalidAddress {
        value: value.to_string(),
    };

    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim();
    if host.is_empty() || host.contains(':') {
        return Err(invalid());
    }
    let port: u16 = port.trim().parse().map_err(|_| invalid())?;

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PRIVATE_KEY: &str = "UOvtcWdILFwjb1UnsnK+a9lcqYvNTmtPv+fvqIVOz3w=";
    const PUBLIC_KEY: &str = "YgkBjKXER5YarD8STsvMFURw/5nhCLIFOJ5uKWrrMW4=";

    const SPLIT_CONFIG: &str = r#"
[Interface]
PrivateKey = UOvtcWdILFwjb1UnsnK+a9lcqYvNTmtPv+fvqIVOz3w=
Address = 10.8.0.2/24
DNS = 8.8.8.8

[Peer]
PublicKey = YgkBjKXER5YarD8STsvMFURw/5nhCLIFOJ5uKWrrMW4=
AllowedIPs = 10.8.0.0/24
Endpoint = vpn.example.net:51820
PersistentKeepalive = 25
"#;

    #[test]
    fn test_parse_split_config() {
        let config = TunnelConfig::parse(SPLIT_CONFIG).unwrap();

        assert_eq!(config.local_address, Ipv4Addr::new(10, 8, 0, 2));
        assert_eq!(config.private_key.as_str(), PRIVATE_KEY);
        assert_eq!(config.peer_public_key.as_str(), PUBLIC_KEY);
        assert_eq!(config.endpoint_host, "vpn.example.net");
        assert_eq!(config.endpoint_port, 51820);
        assert_eq!(config.allowed_address, Ipv4Addr::new(10, 8, 0, 0));
        assert_eq!(config.allowed_mask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(config.routing_mode(), RoutingMode::Split);
        assert_eq!(config.interface_netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(config.effective_listen_port(), 51820);
    }

    #[test]
    fn test_default_range_means_route_all() {
        let content = format!(
            "[Interface]\nPrivateKey = {}\nAddress = 10.0.0.2/32\nListenPort = 40000\n\n\
             [Peer]\nPublicKey = {}\nAllowedIPs = 10.0.0.0/24, 0.0.0.0/0\nEndpoint = 203.0.113.7:51820\n",
            PRIVATE_KEY, PUBLIC_KEY
        );
        let config = TunnelConfig::parse(&content).unwrap();

        assert_eq!(config.routing_mode(), RoutingMode::RouteAll);
        assert_eq!(config.interface_netmask(), Ipv4Addr::BROADCAST);
        assert_eq!(config.effective_listen_port(), 40000);
    }

    #[test]
    fn test_simple_form_defaults() {
        let config = TunnelConfig::new(
            Ipv4Addr::new(10, 8, 0, 2),
            PRIVATE_KEY,
            "203.0.113.7",
            PUBLIC_KEY,
            51820,
        );
        assert_eq!(config.routing_mode(), RoutingMode::RouteAll);
        assert_eq!(config.effective_listen_port(), 51820);
        assert!(config.validate().is_ok());

        let config = config
            .with_allowed_range(Ipv4Addr::new(10, 8, 0, 0), Ipv4Addr::new(255, 255, 255, 0))
            .with_listen_port(12345);
        assert_eq!(config.routing_mode(), RoutingMode::Split);
        assert_eq!(config.effective_listen_port(), 12345);
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let base = TunnelConfig::new(Ipv4Addr::new(10, 8, 0, 2), PRIVATE_KEY, "host", PUBLIC_KEY, 1);

        let mut config = base.clone();
        config.private_key = KeyMaterial::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field }) if field == "PrivateKey"
        ));

        let mut config = base.clone();
        config.peer_public_key = KeyMaterial::new("  ");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field }) if field == "PublicKey"
        ));

        let mut config = base;
        config.endpoint_host = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { field }) if field == "Endpoint"
        ));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = KeyMaterial::new(PRIVATE_KEY);
        let printed = format!("{:?}", key);
        assert!(!printed.contains("UOvt"));
        assert_eq!(printed, "KeyMaterial(<redacted>)");
    }

    #[test]
    fn test_invalid_key() {
        assert!(parse_key("invalid-base64!", "TestKey").is_err());
        assert!(parse_key("dG9vIHNob3J0", "TestKey").is_err());
        assert!(parse_key(PRIVATE_KEY, "TestKey").is_ok());
    }

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("10.0.0.1:51820").unwrap(),
            ("10.0.0.1".to_string(), 51820)
        );
        assert_eq!(
            parse_endpoint("wg.example.org:443").unwrap(),
            ("wg.example.org".to_string(), 443)
        );
        assert!(matches!(
            parse_endpoint("[2001:db8::1]:51820"),
            Err(ConfigError::UnsupportedIpv6 { .. })
        ));
        assert!(parse_endpoint("no-port").is_err());
        assert!(parse_endpoint(":51820").is_err());
        assert!(parse_endpoint("host:99999").is_err());
    }

    #[test]
    fn test_second_peer_rejected() {
        let content = format!(
            "[Interface]\nPrivateKey = {k}\nAddress = 10.0.0.2\n\
             [Peer]\nPublicKey = {p}\nAllowedIPs = 0.0.0.0/0\nEndpoint = 1.2.3.4:1\n\
             [Peer]\nPublicKey = {p}\nAllowedIPs = 0.0.0.0/0\nEndpoint = 1.2.3.4:1\n",
            k = PRIVATE_KEY,
            p = PUBLIC_KEY
        );
        assert!(matches!(
            TunnelConfig::parse(&content),
            Err(ConfigError::ParseError { line: 8, .. })
        ));
    }

    #[test]
    fn test_preshared_key_rejected() {
        let content = format!(
            "[Interface]\nPrivateKey = {k}\nAddress = 10.0.0.2\n\
             [Peer]\nPublicKey = {p}\nPresharedKey = {p}\n",
            k = PRIVATE_KEY,
            p = PUBLIC_KEY
        );
        assert!(matches!(
            TunnelConfig::parse(&content),
            Err(ConfigError::UnsupportedOption { .. })
        ));
    }

    #[test]
    fn test_ipv6_only_allowed_range_rejected() {
        let content = format!(
            "[Interface]\nPrivateKey = {k}\nAddress = 10.0.0.2\n\
             [Peer]\nPublicKey = {p}\nAllowedIPs = ::/0\nEndpoint = 1.2.3.4:1\n",
            k = PRIVATE_KEY,
            p = PUBLIC_KEY
        );
        assert!(matches!(
            TunnelConfig::parse(&content),
            Err(ConfigError::UnsupportedIpv6 { .. })
        ));
    }

    #[test]
    fn test_missing_interface() {
        let config = format!("[Peer]\nPublicKey = {}\n", PUBLIC_KEY);
        assert!(TunnelConfig::parse(&config).is_err());
    }

    #[test]
    fn test_missing_private_key() {
        let config = "[Interface]\nAddress = 10.0.0.2/24\n";
        assert!(TunnelConfig::parse(config).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(SPLIT_CONFIG.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = TunnelConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.endpoint_host, "vpn.example.net");

        assert!(matches!(
            TunnelConfig::from_file("/nonexistent/picoguard.conf"),
            Err(ConfigError::FileNotFound { .. })
        ));
    }
}
