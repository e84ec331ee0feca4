use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

use hyper::Uri;
use tokio::net::UdpSocket;

use crate::{internal_metrics::InternalMetrics, Error};

/**
The IP family used to send UDP datagrams.
*/
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UdpType {
    #[default]
    Udp4,
    Udp6,
}

impl UdpType {
    fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            UdpType::Udp4 => addr.is_ipv4(),
            UdpType::Udp6 => addr.is_ipv6(),
        }
    }

    fn unspecified(&self) -> SocketAddr {
        match self {
            UdpType::Udp4 => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            UdpType::Udp6 => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
        }
    }
}

impl FromStr for UdpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp4" => Ok(UdpType::Udp4),
            "udp6" => Ok(UdpType::Udp6),
            _ => Err(Error::msg(format_args!(
                "unsupported UDP type `{s}`; supported types are udp4 or udp6"
            ))),
        }
    }
}

/**
Sends each payload as a single datagram to a fixed host and port.
*/
pub(crate) struct UdpConnection {
    host: String,
    port: u16,
    udp_type: UdpType,
    metrics: Arc<InternalMetrics>,
}

impl UdpConnection {
    pub fn new(metrics: Arc<InternalMetrics>, uri: Uri, udp_type: UdpType) -> Result<Self, Error> {
        let host = uri
            .host()
            .ok_or_else(|| Error::msg(format_args!("{uri} is missing a host")))?;

        let port = uri
            .port_u16()
            .ok_or_else(|| Error::msg(format_args!("{uri} is missing a port")))?;

        // IPv6 literals are bracketed in URIs but not in socket addresses
        let host = host.trim_start_matches('[').trim_end_matches(']').to_owned();

        Ok(UdpConnection {
            host,
            port,
            udp_type,
            metrics,
        })
    }

    async fn resolve(&self) -> Result<SocketAddr, Error> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| Error::new(format_args!("failed to resolve {}", self.host), e))?;

        addrs.find(|addr| self.udp_type.accepts(addr)).ok_or_else(|| {
            Error::msg(format_args!(
                "{} has no {:?} address",
                self.host, self.udp_type
            ))
        })
    }

    pub async fn send(&self, payload: String) -> Result<(), Error> {
        let sent = async {
            let addr = self.resolve().await?;

            let socket = UdpSocket::bind(self.udp_type.unspecified())
                .await
                .map_err(|e| Error::new("failed to bind UDP socket", e))?;

            socket
                .send_to(payload.as_bytes(), addr)
                .await
                .map_err(|e| Error::new(format_args!("failed to send datagram to {addr}"), e))?;

            Ok(())
        }
        .await;

        match sent {
            Ok(()) => self.metrics.udp_datagram_sent.increment(),
            Err(_) => self.metrics.udp_datagram_failed.increment(),
        }

        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_type_parse() {
        assert_eq!(UdpType::Udp4, "udp4".parse().unwrap());
        assert_eq!(UdpType::Udp6, "udp6".parse().unwrap());
        assert!("udp".parse::<UdpType>().is_err());
        assert_eq!(UdpType::Udp4, UdpType::default());
    }

    #[test]
    fn new_requires_port() {
        let metrics = Arc::new(InternalMetrics::default());

        let no_port = Uri::from_static("udp://localhost");
        assert!(UdpConnection::new(metrics.clone(), no_port, UdpType::Udp4).is_err());

        let ipv6 = Uri::from_static("udp://[::1]:8089");
        let conn = UdpConnection::new(metrics, ipv6, UdpType::Udp6).unwrap();
        assert_eq!("::1", conn.host);
        assert_eq!(8089, conn.port);
    }
}
