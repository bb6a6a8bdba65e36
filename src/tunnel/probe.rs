//! Handshake kick probes
//!
//! A single byte sent towards an address behind the tunnel makes an idle
//! engine initiate a handshake on demand.

use std::net::{Ipv4Addr, SocketAddrV4};

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::error::NetworkError;

/// Payload of a kick probe
pub const PROBE_PAYLOAD: [u8; 1] = [0];

/// Sends one kick datagram
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn send_probe(&self, target: SocketAddrV4) -> Result<(), NetworkError>;
}

/// Sends from an ephemeral UDP socket that is closed right after the send
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpProbe;

#[async_trait]
impl ProbeTransport for UdpProbe {
    async fn send_probe(&self, target: SocketAddrV4) -> Result<(), NetworkError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket
            .send_to(&PROBE_PAYLOAD, target)
            .await
            .map_err(|e| NetworkError::ProbeFailed {
                target: target.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_udp_probe_sends_single_byte() {
        let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        UdpProbe
            .send_probe(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();

        let mut buf = [0xffu8; 16];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], &PROBE_PAYLOAD);
    }
}
