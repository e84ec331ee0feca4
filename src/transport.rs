/*!
Delivery of encoded batches.

The transport is picked from the scheme of the endpoint: `http` and `https` POST each batch, `udp` sends each batch as one datagram.
*/

use std::{sync::Arc, time::Duration};

use hyper::Uri;

use crate::{internal_metrics::InternalMetrics, Error};

mod http;
mod udp;

pub use self::udp::UdpType;

use self::{http::HttpConnection, udp::UdpConnection};

pub(crate) enum Transport {
    Http(HttpConnection),
    Udp(UdpConnection),
}

impl Transport {
    pub fn new(
        metrics: Arc<InternalMetrics>,
        endpoint: &str,
        headers: Vec<(String, String)>,
        udp_type: UdpType,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let uri: Uri = endpoint
            .parse()
            .map_err(|e| Error::new(format_args!("failed to parse {endpoint}"), e))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => Ok(Transport::Http(HttpConnection::new(
                metrics, uri, headers, timeout,
            )?)),
            Some("udp") => Ok(Transport::Udp(UdpConnection::new(metrics, uri, udp_type)?)),
            scheme => Err(Error::msg(format_args!(
                "unsupported protocol `{}`; supported protocols are udp, http or https",
                scheme.unwrap_or("")
            ))),
        }
    }

    pub async fn send(&self, payload: String) -> Result<(), Error> {
        match self {
            Transport::Http(conn) => conn.send(payload).await,
            Transport::Udp(conn) => conn.send(payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(endpoint: &str) -> Result<Transport, Error> {
        Transport::new(
            Arc::new(InternalMetrics::default()),
            endpoint,
            Vec::new(),
            UdpType::Udp4,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn scheme_selects_transport() {
        assert!(matches!(
            transport("http://localhost:8086/write?db=test"),
            Ok(Transport::Http(_))
        ));
        assert!(matches!(transport("udp://localhost:8089"), Ok(Transport::Udp(_))));
    }

    #[test]
    fn unsupported_scheme() {
        let err = transport("ftp://localhost:21").err().unwrap();

        assert!(err.to_string().contains("unsupported protocol `ftp`"));
    }
}
