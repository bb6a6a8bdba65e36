//! Error types for the picoguard tunnel manager

use thiserror::Error;

/// Main error type for picoguard
#[derive(Error, Debug)]
pub enum PicoGuardError {
    /// Configuration errors (including activation preconditions)
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Endpoint resolution and probe errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Tunnel lifecycle errors
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    /// Platform self-test errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// System I/O errors
    #[error("System error: {0}")]
    System(#[from] std::io::Error),
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid config format at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Invalid base64 key: {field}")]
    InvalidKey { field: String },

    #[error("Invalid IP address: {value}")]
    InvalidAddress { value: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid CIDR notation: {value}")]
    InvalidCidr { value: String },

    #[error("IPv6 is not supported: {value}")]
    UnsupportedIpv6 { value: String },

    #[error("Unsupported option: {field}")]
    UnsupportedOption { field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Network-level errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("DNS resolution failed for {host}")]
    DnsResolutionFailed { host: String },

    #[error("No IPv4 address found for {host}")]
    NoIpv4Address { host: String },

    #[error("Probe to {target} failed: {reason}")]
    ProbeFailed { target: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by the external WireGuard engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("rejected by engine: {reason}")]
    Rejected { reason: String },

    #[error("no free slot")]
    NoFreeSlot,

    #[error("unknown interface")]
    UnknownInterface,
}

/// Tunnel lifecycle errors
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Tunnel is not active")]
    NotActive,

    #[error("Interface registration failed: {source}")]
    InterfaceRegistration {
        #[source]
        source: EngineError,
    },

    #[error("Peer registration failed: {source}")]
    PeerRegistration {
        #[source]
        source: EngineError,
    },

    #[error("Handshake start failed: {source}")]
    HandshakeStart {
        #[source]
        source: EngineError,
    },
}

/// Platform self-test failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Entropy source returned a constant buffer")]
    EntropyConstant,

    #[error("Entropy source repeated its output")]
    EntropyRepeated,

    #[error("Monotonic clock went backwards: {first} ms then {second} ms")]
    ClockWentBackwards { first: u32, second: u32 },

    #[error("TAI64N timestamp went backwards")]
    TimestampWentBackwards,

    #[error("Malformed TAI64N timestamp: {reason}")]
    MalformedTimestamp { reason: String },
}

impl PicoGuardError {
    /// Get a user-friendly error message with suggested action
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!(
                    "Config file not found: {}\n  Check the path and try again.",
                    path
                )
            }

            Self::Config(ConfigError::InvalidKey { field }) => {
                format!(
                    "Invalid {} in config. Expected 32-byte base64-encoded key.",
                    field
                )
            }

            Self::Config(ConfigError::MissingField { field }) => {
                format!(
                    "Missing {}. The private key, peer public key and endpoint are required.",
                    field
                )
            }

            Self::Network(NetworkError::DnsResolutionFailed { host }) => {
                format!(
                    "Could not resolve endpoint '{}'.\n  \
                    Check that the network is up and the name is correct.",
                    host
                )
            }

            Self::Tunnel(TunnelError::NotActive) => {
                "The tunnel is not active. Activate it first.".to_string()
            }

            Self::Platform(e) => {
                format!(
                    "Platform self-test failed: {}.\n  \
                    Entropy or clock hardware is not usable on this device.",
                    e
                )
            }

            _ => format!("{}", self),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Fatal errors
            Self::Config(_) => false,
            Self::Platform(_) => false,

            // Recoverable errors
            Self::Network(_) => true,
            Self::Tunnel(TunnelError::NotActive) => true,
            Self::Tunnel(TunnelError::HandshakeStart { .. }) => true,
            Self::Tunnel(TunnelError::PeerRegistration { source })
            | Self::Tunnel(TunnelError::InterfaceRegistration { source }) => {
                matches!(source, EngineError::NoFreeSlot)
            }

            _ => false,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Network(_) => 3,
            Self::Tunnel(_) => 6,
            Self::Platform(_) => 5,
            Self::System(_) => 7,
        }
    }
}

/// Result type alias for picoguard operations
pub type Result<T> = std::result::Result<T, PicoGuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_fatal() {
        let err: PicoGuardError = ConfigError::MissingField {
            field: "PrivateKey".to_string(),
        }
        .into();
        assert!(!err.is_recoverable());
        assert_eq!(err.exit_code(), 1);
        assert!(err.user_message().contains("PrivateKey"));
    }

    #[test]
    fn test_engine_slot_exhaustion_is_recoverable() {
        let err: PicoGuardError = TunnelError::PeerRegistration {
            source: EngineError::NoFreeSlot,
        }
        .into();
        assert!(err.is_recoverable());

        let err: PicoGuardError = TunnelError::InterfaceRegistration {
            source: EngineError::Rejected {
                reason: "bad key".to_string(),
            },
        }
        .into();
        assert!(!err.is_recoverable());
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_resolution_failure_message() {
        let err: PicoGuardError = NetworkError::DnsResolutionFailed {
            host: "vpn.example.invalid".to_string(),
        }
        .into();
        assert!(err.is_recoverable());
        assert!(err.user_message().contains("vpn.example.invalid"));
    }
}
