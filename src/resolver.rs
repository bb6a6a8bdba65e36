//! Endpoint resolution
//!
//! Dotted-quad literals are parsed locally without any network I/O.
//! Everything else goes to the host stack's name lookup.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;

use crate::error::NetworkError;

/// Name resolution capability supplied by the host network stack
#[async_trait]
pub trait NameLookup: Send + Sync {
    async fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, NetworkError>;
}

/// Resolver backed by the system resolver through tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

#[async_trait]
impl NameLookup for SystemLookup {
    async fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, NetworkError> {
        let addrs = tokio::net::lookup_host((host, 0)).await.map_err(|e| {
            tracing::debug!("Lookup of {} failed: {}", host, e);
            NetworkError::DnsResolutionFailed {
                host: host.to_string(),
            }
        })?;

        addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| NetworkError::NoIpv4Address {
                host: host.to_string(),
            })
    }
}

/// Turns an endpoint host or literal into an IPv4 address
pub struct Resolver {
    lookup: Box<dyn NameLookup>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(SystemLookup)
    }
}

impl Resolver {
    pub fn new(lookup: impl NameLookup + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    /// Resolve `host`, trying the literal fast path first
    pub async fn resolve(&self, host: &str) -> Result<Ipv4Addr, NetworkError> {
        if let Some(addr) = parse_ipv4(host) {
            return Ok(addr);
        }
        tracing::debug!("'{}' is not a dotted-quad literal, looking it up", host);
        self.lookup.lookup_ipv4(host).await
    }
}

/// Strict dotted-quad parser
///
/// Exactly four groups of one to three decimal digits, each at most 255,
/// separated by single periods. No whitespace or other characters.
pub fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut part = 0usize;
    let mut value = 0u32;
    let mut digits = 0usize;

    for c in s.bytes() {
        match c {
            b'0'..=b'9' => {
                value = value * 10 + u32::from(c - b'0');
                digits += 1;
                if digits > 3 || value > 255 {
                    return None;
                }
            }
            b'.' => {
                if digits == 0 || part >= 3 {
                    return None;
                }
                octets[part] = value as u8;
                part += 1;
                value = 0;
                digits = 0;
            }
            _ => return None,
        }
    }

    if digits == 0 || part != 3 {
        return None;
    }
    octets[3] = value as u8;

    Some(Ipv4Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts lookups and answers with a fixed result
    struct CountingLookup {
        calls: Arc<AtomicUsize>,
        answer: Option<Ipv4Addr>,
    }

    #[async_trait]
    impl NameLookup for CountingLookup {
        async fn lookup_ipv4(&self, host: &str) -> Result<Ipv4Addr, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.ok_or_else(|| NetworkError::DnsResolutionFailed {
                host: host.to_string(),
            })
        }
    }

    fn resolver(answer: Option<Ipv4Addr>) -> (Resolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let lookup = CountingLookup {
            calls: Arc::clone(&calls),
            answer,
        };
        (Resolver::new(lookup), calls)
    }

    #[test]
    fn test_parse_valid_literals() {
        assert_eq!(parse_ipv4("10.8.0.1"), Some(Ipv4Addr::new(10, 8, 0, 1)));
        assert_eq!(parse_ipv4("0.0.0.0"), Some(Ipv4Addr::UNSPECIFIED));
        assert_eq!(parse_ipv4("255.255.255.255"), Some(Ipv4Addr::BROADCAST));
        assert_eq!(parse_ipv4("001.02.3.004"), Some(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in [
            "1..2.3",
            "256.1.1.1",
            "1.2.3.4.5",
            "abc",
            "",
            "1.2.3",
            "1.2.3.",
            ".1.2.3",
            " 1.2.3.4",
            "1.2.3.4 ",
            "1.2.3.4\n",
            "0001.2.3.4",
            "1.2.3.-4",
            "1.2.3.4:51820",
        ] {
            assert_eq!(parse_ipv4(input), None, "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_every_octet_value() {
        for octet in 0..=255u8 {
            let text = format!("{o}.{o}.{o}.{o}", o = octet);
            assert_eq!(parse_ipv4(&text), Some(Ipv4Addr::new(octet, octet, octet, octet)));
        }
    }

    #[tokio::test]
    async fn test_literal_skips_lookup() {
        let (resolver, calls) = resolver(Some(Ipv4Addr::new(9, 9, 9, 9)));
        let addr = resolver.resolve("10.8.0.1").await.unwrap();
        assert_eq!(addr, Ipv4Addr::new(10, 8, 0, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_literal_falls_back() {
        let (resolver, calls) = resolver(Some(Ipv4Addr::new(203, 0, 113, 5)));
        let addr = resolver.resolve("256.1.1.1").await.unwrap();
        assert_eq!(addr, Ipv4Addr::new(203, 0, 113, 5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_fails_resolution() {
        let (resolver, calls) = resolver(None);
        for input in ["", "abc", "1.2.3.4.5"] {
            assert!(matches!(
                resolver.resolve(input).await,
                Err(NetworkError::DnsResolutionFailed { .. })
            ));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
