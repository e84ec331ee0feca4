/*!
The [`Reporter`] buffers events and sends them as line protocol in the background.
*/

use std::{sync::Arc, time::Duration};

use good_influx_batcher::{BatchError, Metric};
use good_influx_core::{Config, Encoder, Event, Registry};

use crate::{
    internal_metrics::InternalMetrics,
    transport::{Transport, UdpType},
    Error,
};

/**
Start building a [`Reporter`] that sends to `endpoint`.

The scheme of `endpoint` picks the transport: `http` and `https` POST each batch, `udp` sends each batch as a single datagram. HTTP endpoints normally include the write path and database, like `http://localhost:8086/write?db=mydb`.
*/
pub fn reporter(endpoint: impl Into<String>) -> ReporterBuilder {
    ReporterBuilder::new(endpoint)
}

/**
A builder for a [`Reporter`].
*/
#[must_use = "call `.spawn()` to start the reporter"]
pub struct ReporterBuilder {
    endpoint: String,
    threshold: usize,
    max_capacity: usize,
    config: Config,
    schemas: Registry,
    headers: Vec<(String, String)>,
    udp_type: UdpType,
    timeout: Duration,
}

impl ReporterBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        ReporterBuilder {
            endpoint: endpoint.into(),
            threshold: 20,
            max_capacity: 10_000,
            config: Config::default(),
            schemas: Registry::builtin(),
            headers: Vec::new(),
            udp_type: UdpType::default(),
            timeout: Duration::from_secs(60),
        }
    }

    /**
    The number of buffered events that triggers a flush. The default is 20.
    */
    pub fn threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /**
    The number of buffered events after which the buffer is discarded. The default is 10 000.
    */
    pub fn max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /**
    The schemas used to encode events. The default is [`Registry::builtin`].
    */
    pub fn schemas(mut self, schemas: Registry) -> Self {
        self.schemas = schemas;
        self
    }

    /**
    Extra headers sent with each HTTP request.

    A `content-type` header is ignored; payloads are always sent as `text/plain`.
    */
    pub fn headers<K: Into<String>, V: Into<String>>(
        mut self,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /**
    The IP family used for `udp` endpoints. The default is [`UdpType::Udp4`].
    */
    pub fn udp_type(mut self, udp_type: UdpType) -> Self {
        self.udp_type = udp_type;
        self
    }

    /**
    How long to wait for an HTTP endpoint to accept a batch. The default is 60 seconds.

    A batch that times out is counted as failed and dropped.
    */
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /**
    Start the reporter.

    If called from a `tokio` runtime the background worker runs on it; otherwise it gets a dedicated thread.
    */
    pub fn spawn(self) -> Result<Reporter, Error> {
        let metrics = Arc::new(InternalMetrics::default());

        let transport = Arc::new(Transport::new(
            metrics.clone(),
            &self.endpoint,
            self.headers,
            self.udp_type,
            self.timeout,
        )?);

        let config = if self.config.has_host() {
            self.config
        } else {
            match default_host() {
                Some(host) => self.config.with_host(host),
                None => self.config,
            }
        };

        let encoder = Arc::new(Encoder::with_schemas(config, self.schemas));

        let (sender, receiver) =
            good_influx_batcher::bounded::<Vec<Event>>(self.max_capacity, self.threshold);

        good_influx_batcher::tokio::spawn(receiver, {
            let metrics = metrics.clone();

            move |batch: Vec<Event>| {
                let encoder = encoder.clone();
                let transport = transport.clone();
                let metrics = metrics.clone();

                async move {
                    let batch_size = batch.len();

                    let payload = encode_batch(&encoder, &metrics, &batch);

                    if payload.is_empty() {
                        return Ok(());
                    }

                    match transport.send(payload).await {
                        Ok(()) => {
                            emit::debug!(
                                rt: emit::runtime::internal(),
                                "sent a batch of {batch_size} events",
                                batch_size,
                            );

                            Ok(())
                        }
                        Err(err) => {
                            emit::warn!(
                                rt: emit::runtime::internal(),
                                "failed to send a batch of {batch_size} events: {err}",
                                batch_size,
                                err,
                            );

                            Err(BatchError::new(err))
                        }
                    }
                }
            }
        })
        .map_err(|e| Error::new("failed to spawn the background worker", e))?;

        Ok(Reporter { sender, metrics })
    }
}

fn default_host() -> Option<String> {
    match hostname::get() {
        Ok(host) => match host.into_string() {
            Ok(host) => Some(host),
            Err(host) => {
                emit::warn!(
                    rt: emit::runtime::internal(),
                    "the hostname {host} is not valid UTF-8",
                    #[emit::as_debug]
                    host,
                );

                None
            }
        },
        Err(err) => {
            emit::warn!(
                rt: emit::runtime::internal(),
                "failed to get the hostname: {err}",
                err,
            );

            None
        }
    }
}

/**
Encode a batch of events into a single payload, one line per line of each event, joined by newlines.
*/
fn encode_batch(encoder: &Encoder, metrics: &InternalMetrics, batch: &[Event]) -> String {
    let mut lines = Vec::with_capacity(batch.len());

    for event in batch {
        let encoded = encoder.encode(event);

        if encoded.is_empty() {
            metrics.event_unencoded.increment();
        }

        lines.extend(encoded);
    }

    lines.join("\n")
}

/**
A running reporter.

Dropping the reporter closes its channel; events still buffered are sent as a final batch.
*/
pub struct Reporter {
    sender: good_influx_batcher::Sender<Vec<Event>>,
    metrics: Arc<InternalMetrics>,
}

impl Reporter {
    /**
    Queue an event to be sent.
    */
    pub fn send(&self, event: impl Into<Event>) {
        self.sender.send(event.into());
    }

    /**
    Wait for the events queued at this point to be sent, returning `false` if `timeout` elapses first.

    On a `tokio` thread this requires a multi-threaded runtime.
    */
    pub fn blocking_flush(&self, timeout: Duration) -> bool {
        good_influx_batcher::tokio::blocking_flush(&self.sender, timeout)
    }

    /**
    Wait for the events queued at this point to be sent, returning `false` if `timeout` elapses first.
    */
    pub async fn flush(&self, timeout: Duration) -> bool {
        good_influx_batcher::tokio::flush(&self.sender, timeout).await
    }

    /**
    Sample the reporter's internal counters.
    */
    pub fn sample_metrics(&self) -> impl Iterator<Item = Metric> + 'static {
        self.sender.sample_metrics().chain(self.metrics.sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use good_influx_core::Object;
    use tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
        net::{TcpListener, UdpSocket},
        sync::mpsc,
    };

    struct Request {
        head: String,
        body: String,
    }

    // Answers every request on a keep-alive connection with `status`
    async fn serve(status: &'static str) -> (String, mpsc::UnboundedReceiver<Request>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let tx = tx.clone();

                tokio::spawn(async move {
                    let mut stream = BufReader::new(stream);

                    loop {
                        let mut head = String::new();

                        loop {
                            let mut line = String::new();

                            if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
                                return;
                            }

                            if line == "\r\n" {
                                break;
                            }

                            head.push_str(&line.to_lowercase());
                        }

                        let len = head
                            .lines()
                            .find_map(|line| line.strip_prefix("content-length:"))
                            .and_then(|len| len.trim().parse().ok())
                            .unwrap_or(0);

                        let mut body = vec![0; len];
                        stream.read_exact(&mut body).await.unwrap();

                        let response = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\n\r\n");

                        stream.get_mut().write_all(response.as_bytes()).await.unwrap();

                        let _ = tx.send(Request {
                            head,
                            body: String::from_utf8(body).unwrap(),
                        });
                    }
                });
            }
        });

        (format!("http://{addr}/write?db=test"), rx)
    }

    fn log_event(i: usize) -> Event {
        Event::new(
            Object::new()
                .with("event", "log")
                .with("timestamp", 1485996802647u64 + i as u64)
                .with("data", format!("message {i}")),
        )
    }

    fn metric(reporter: &Reporter, name: &str) -> usize {
        reporter
            .sample_metrics()
            .find(|metric| metric.name() == name)
            .map(|metric| metric.value())
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_sends_batches() {
        let (endpoint, mut requests) = serve("204 No Content").await;

        let reporter = reporter(endpoint)
            .threshold(5)
            .config(Config::new().with_host("testhost"))
            .headers([("Content-Type", "application/json"), ("x-custom", "yes")])
            .spawn()
            .unwrap();

        for batch in 0..2 {
            for i in 0..5 {
                reporter.send(log_event(batch * 5 + i));
            }

            assert!(reporter.flush(Duration::from_secs(5)).await);
        }

        for batch in 0..2 {
            let request = requests.recv().await.unwrap();

            assert!(request.head.starts_with("post /write?db=test http/1.1"));
            assert!(request.head.contains("content-type: text/plain\r\n"));
            assert!(!request.head.contains("application/json"));
            assert!(request.head.contains("x-custom: yes\r\n"));

            let lines: Vec<&str> = request.body.split('\n').collect();
            assert_eq!(5, lines.len());

            for (i, line) in lines.into_iter().enumerate() {
                let n = batch * 5 + i;

                assert_eq!(
                    format!(
                        "log,host=testhost data=\"message {n}\" {}",
                        (1485996802647u64 + n as u64) as u128 * 1_000_000
                    ),
                    line
                );
            }
        }

        assert_eq!(2, metric(&reporter, "batch_processed"));
        assert_eq!(2, metric(&reporter, "http_request_sent"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_error_status_fails_batch() {
        let (endpoint, mut requests) = serve("500 Internal Server Error").await;

        let reporter = reporter(endpoint).threshold(1).spawn().unwrap();

        reporter.send(log_event(0));
        assert!(reporter.flush(Duration::from_secs(5)).await);

        assert!(requests.recv().await.is_some());
        assert_eq!(1, metric(&reporter, "batch_failed"));
        assert_eq!(1, metric(&reporter, "http_request_failed"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn http_unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept connections and hold them open without ever answering
        tokio::spawn(async move {
            let mut held = Vec::new();

            loop {
                let (stream, _) = listener.accept().await.unwrap();
                held.push(stream);
            }
        });

        let reporter = reporter(format!("http://{addr}/write?db=test"))
            .threshold(1)
            .timeout(Duration::from_millis(200))
            .spawn()
            .unwrap();

        reporter.send(log_event(0));
        assert!(reporter.flush(Duration::from_secs(5)).await);

        assert_eq!(1, metric(&reporter, "batch_failed"));
        assert_eq!(1, metric(&reporter, "http_request_failed"));

        // The stalled connection isn't reused, and later batches still go out
        reporter.send(log_event(1));
        assert!(reporter.flush(Duration::from_secs(5)).await);

        assert_eq!(2, metric(&reporter, "batch_failed"));
        assert_eq!(2, metric(&reporter, "http_request_failed"));
        assert_eq!(2, metric(&reporter, "http_conn_established"));
        assert_eq!(0, metric(&reporter, "batch_processed"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn udp_sends_datagrams() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        let reporter = reporter(format!("udp://{addr}"))
            .threshold(2)
            .udp_type(UdpType::Udp4)
            .config(Config::new().with_host("testhost"))
            .spawn()
            .unwrap();

        for batch in 0..2 {
            for i in 0..2 {
                reporter.send(log_event(batch * 2 + i));
            }

            assert!(reporter.flush(Duration::from_secs(5)).await);
        }

        let mut buf = vec![0; 1024];

        for _ in 0..2 {
            let (len, _) = socket.recv_from(&mut buf).await.unwrap();
            let datagram = std::str::from_utf8(&buf[..len]).unwrap();

            assert_eq!(2, datagram.split('\n').count());
            assert!(datagram
                .split('\n')
                .all(|line| line.starts_with("log,host=testhost data=\"message ")));
        }

        assert_eq!(2, metric(&reporter, "udp_datagram_sent"));
    }

    #[test]
    fn spawn_rejects_unsupported_protocol() {
        let err = reporter("tcp://localhost:8086").spawn().err().unwrap();

        assert!(err
            .to_string()
            .contains("supported protocols are udp, http or https"));
    }

    #[test]
    fn encode_batch_joins_lines() {
        let encoder = Encoder::new(Config::new().with_host("h"));
        let metrics = InternalMetrics::default();

        let unknown = Event::new(Object::new().with("event", "unknown").with("timestamp", 1u64));

        let payload = encode_batch(&encoder, &metrics, &[log_event(0), unknown, log_event(1)]);

        assert_eq!(
            "log,host=h data=\"message 0\" 1485996802647000000\nlog,host=h data=\"message 1\" 1485996802648000000",
            payload
        );
        assert_eq!(1, metrics.event_unencoded.sample());
    }
}
