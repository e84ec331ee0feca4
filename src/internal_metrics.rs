use std::sync::atomic::{AtomicUsize, Ordering};

use good_influx_batcher::Metric;

#[derive(Default)]
pub(crate) struct InternalMetrics {
    pub(crate) event_unencoded: Counter,
    pub(crate) http_conn_established: Counter,
    pub(crate) http_conn_failed: Counter,
    pub(crate) http_conn_tls_handshake: Counter,
    pub(crate) http_conn_tls_failed: Counter,
    pub(crate) http_request_sent: Counter,
    pub(crate) http_request_failed: Counter,
    pub(crate) udp_datagram_sent: Counter,
    pub(crate) udp_datagram_failed: Counter,
}

#[derive(Default)]
pub(crate) struct Counter(AtomicUsize);

impl Counter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

impl InternalMetrics {
    pub fn sample(&self) -> impl Iterator<Item = Metric> + 'static {
        let InternalMetrics {
            event_unencoded,
            http_conn_established,
            http_conn_failed,
            http_conn_tls_handshake,
            http_conn_tls_failed,
            http_request_sent,
            http_request_failed,
            udp_datagram_sent,
            udp_datagram_failed,
        } = self;

        [
            Metric::new(stringify!(event_unencoded), event_unencoded.sample()),
            Metric::new(stringify!(http_conn_established), http_conn_established.sample()),
            Metric::new(stringify!(http_conn_failed), http_conn_failed.sample()),
            Metric::new(stringify!(http_conn_tls_handshake), http_conn_tls_handshake.sample()),
            Metric::new(stringify!(http_conn_tls_failed), http_conn_tls_failed.sample()),
            Metric::new(stringify!(http_request_sent), http_request_sent.sample()),
            Metric::new(stringify!(http_request_failed), http_request_failed.sample()),
            Metric::new(stringify!(udp_datagram_sent), udp_datagram_sent.sample()),
            Metric::new(stringify!(udp_datagram_failed), udp_datagram_failed.sample()),
        ]
        .into_iter()
    }
}
