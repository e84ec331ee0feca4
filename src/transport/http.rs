use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use hyper::{
    body::{self, Body, Frame, SizeHint},
    client::conn::http1,
    Method, Request, Uri,
};

use crate::{internal_metrics::InternalMetrics, Error};

async fn connect(metrics: &InternalMetrics, uri: &HttpUri) -> Result<HttpSender, Error> {
    let io = tokio::net::TcpStream::connect((uri.host(), uri.port()))
        .await
        .map_err(|e| {
            metrics.http_conn_failed.increment();

            Error::new(format_args!("failed to connect to {uri}"), e)
        })?;

    metrics.http_conn_established.increment();

    if uri.is_https() {
        #[cfg(feature = "tls")]
        {
            let io = tls_handshake(metrics, io, uri).await?;

            http_handshake(metrics, io).await
        }
        #[cfg(not(feature = "tls"))]
        {
            let _ = io;

            Err(Error::msg("https support requires the `tls` Cargo feature"))
        }
    } else {
        http_handshake(metrics, io).await
    }
}

#[cfg(feature = "tls")]
async fn tls_handshake(
    metrics: &InternalMetrics,
    io: tokio::net::TcpStream,
    uri: &HttpUri,
) -> Result<tokio_rustls::client::TlsStream<tokio::net::TcpStream>, Error> {
    use tokio_rustls::{rustls, TlsConnector};

    let domain = uri.host().to_owned().try_into().map_err(|e| {
        metrics.http_conn_tls_failed.increment();

        Error::new(format_args!("could not extract a DNS name from {uri}"), e)
    })?;

    let tls = {
        let mut root_store = rustls::RootCertStore::empty();

        for cert in rustls_native_certs::load_native_certs().map_err(|e| {
            metrics.http_conn_tls_failed.increment();

            Error::new("failed to load native certificates", e)
        })? {
            let _ = root_store.add(cert);
        }

        Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        )
    };

    let conn = TlsConnector::from(tls);

    let io = conn.connect(domain, io).await.map_err(|e| {
        metrics.http_conn_tls_failed.increment();

        Error::new("failed to connect TLS stream", e)
    })?;

    metrics.http_conn_tls_handshake.increment();

    Ok(io)
}

async fn http_handshake(
    metrics: &InternalMetrics,
    io: impl tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
) -> Result<HttpSender, Error> {
    let (sender, conn) = http1::handshake(HttpIo(io)).await.map_err(|e| {
        metrics.http_conn_failed.increment();

        Error::new("failed to perform HTTP1 handshake", e)
    })?;

    tokio::task::spawn(async move {
        let _ = conn.await;
    });

    Ok(sender)
}

type HttpSender = http1::SendRequest<HttpBody>;

/**
A keep-alive HTTP/1.1 connection that POSTs line protocol payloads.

The connection is established lazily and re-established after any failure. Each send, including connecting, is bounded by a timeout.
*/
pub(crate) struct HttpConnection {
    uri: HttpUri,
    headers: Vec<(String, String)>,
    timeout: Duration,
    sender: Mutex<Option<HttpSender>>,
    metrics: Arc<InternalMetrics>,
}

impl HttpConnection {
    pub fn new(
        metrics: Arc<InternalMetrics>,
        uri: Uri,
        headers: impl Into<Vec<(String, String)>>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        if uri.host().is_none() {
            return Err(Error::msg(format_args!("{uri} is missing a host")));
        }

        #[cfg(not(feature = "tls"))]
        {
            if uri.scheme() == Some(&hyper::http::uri::Scheme::HTTPS) {
                return Err(Error::msg("https support requires the `tls` Cargo feature"));
            }
        }

        Ok(HttpConnection {
            uri: HttpUri(uri),
            headers: headers.into(),
            timeout,
            sender: Mutex::new(None),
            metrics,
        })
    }

    fn poison(&self) -> Option<HttpSender> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn unpoison(&self, sender: HttpSender) {
        *self.sender.lock().unwrap_or_else(PoisonError::into_inner) = Some(sender);
    }

    pub async fn send(&self, payload: String) -> Result<(), Error> {
        match tokio::time::timeout(self.timeout, self.exchange(payload)).await {
            Ok(sent) => sent,
            Err(elapsed) => {
                // The cancelled exchange dropped the pooled sender
                self.metrics.http_request_failed.increment();

                Err(Error::new(
                    format_args!("{} didn't respond within {:?}", self.uri, self.timeout),
                    elapsed,
                ))
            }
        }
    }

    async fn exchange(&self, payload: String) -> Result<(), Error> {
        let mut sender = match self.poison() {
            Some(sender) if !sender.is_closed() => sender,
            _ => connect(&self.metrics, &self.uri).await?,
        };

        sender.ready().await.map_err(|e| {
            self.metrics.http_request_failed.increment();

            Error::new("the HTTP connection is unavailable", e)
        })?;

        let req = self.request(HttpBody::new(payload))?;

        let mut res = sender.send_request(req).await.map_err(|e| {
            self.metrics.http_request_failed.increment();

            Error::new("failed to send HTTP request", e)
        })?;

        let status = res.status();

        // The body is drained so the connection can be reused
        drain(res.body_mut()).await?;

        self.unpoison(sender);

        if !status.is_success() {
            self.metrics.http_request_failed.increment();

            return Err(Error::msg(format_args!(
                "{} responded with {status}",
                self.uri
            )));
        }

        self.metrics.http_request_sent.increment();

        Ok(())
    }

    fn request(&self, body: HttpBody) -> Result<Request<HttpBody>, Error> {
        let mut req = Request::builder()
            .uri(self.uri.path_and_query())
            .method(Method::POST)
            .header("host", self.uri.authority())
            .header("content-length", body.content_length);

        for (k, v) in &self.headers {
            if k.eq_ignore_ascii_case("content-type") || k.eq_ignore_ascii_case("content-length") {
                continue;
            }

            req = req.header(k, v);
        }

        req.header("content-type", "text/plain")
            .body(body)
            .map_err(|e| {
                self.metrics.http_request_failed.increment();

                Error::new("failed to build HTTP request", e)
            })
    }
}

async fn drain(body: &mut body::Incoming) -> Result<(), Error> {
    struct NextFrame<'a>(&'a mut body::Incoming);

    impl<'a> Future for NextFrame<'a> {
        type Output = Result<bool, Error>;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
            match Pin::new(&mut *self.0).poll_frame(cx) {
                Poll::Ready(Some(Ok(_))) => Poll::Ready(Ok(true)),
                Poll::Ready(None) => Poll::Ready(Ok(false)),
                Poll::Ready(Some(Err(e))) => {
                    Poll::Ready(Err(Error::new("failed to read HTTP response body", e)))
                }
                Poll::Pending => Poll::Pending,
            }
        }
    }

    while NextFrame(body).await? {}

    Ok(())
}

struct HttpUri(Uri);

impl fmt::Display for HttpUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl HttpUri {
    fn is_https(&self) -> bool {
        self.0.scheme() == Some(&hyper::http::uri::Scheme::HTTPS)
    }

    fn host(&self) -> &str {
        self.0.host().unwrap_or("localhost")
    }

    fn authority(&self) -> &str {
        self.0
            .authority()
            .map(|authority| authority.as_str())
            .unwrap_or_else(|| self.host())
    }

    fn path_and_query(&self) -> &str {
        self.0
            .path_and_query()
            .map(|path_and_query| path_and_query.as_str())
            .unwrap_or("/")
    }

    fn port(&self) -> u16 {
        self.0
            .port_u16()
            .unwrap_or(if self.is_https() { 443 } else { 80 })
    }
}

pub(crate) struct HttpBody {
    payload: Option<Bytes>,
    content_length: usize,
}

impl HttpBody {
    fn new(payload: String) -> Self {
        let payload = Bytes::from(payload);

        HttpBody {
            content_length: payload.len(),
            payload: Some(payload),
        }
    }
}

impl Body for HttpBody {
    type Data = Bytes;

    type Error = std::convert::Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut().payload.take() {
            Some(buf) => Poll::Ready(Some(Ok(Frame::data(buf)))),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.payload.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.payload.as_ref().map(|buf| buf.len()).unwrap_or(0) as u64)
    }
}

struct HttpIo<T>(T);

impl<T: tokio::io::AsyncRead> hyper::rt::Read for HttpIo<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        mut buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        // SAFETY: `HttpIo` uses structural pinning
        let io = unsafe { self.map_unchecked_mut(|io| &mut io.0) };

        // SAFETY: tokio's `ReadBuf` only writes initialized bytes into the cursor
        let mut read_buf = tokio::io::ReadBuf::uninit(unsafe { buf.as_mut() });

        match tokio::io::AsyncRead::poll_read(io, cx, &mut read_buf) {
            Poll::Ready(Ok(())) => {
                let read = read_buf.filled().len();

                // SAFETY: `read` bytes were just filled
                unsafe { buf.advance(read) };

                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: tokio::io::AsyncWrite> hyper::rt::Write for HttpIo<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        // SAFETY: `HttpIo` uses structural pinning
        let io = unsafe { self.map_unchecked_mut(|io| &mut io.0) };

        tokio::io::AsyncWrite::poll_write(io, cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        // SAFETY: `HttpIo` uses structural pinning
        let io = unsafe { self.map_unchecked_mut(|io| &mut io.0) };

        tokio::io::AsyncWrite::poll_flush(io, cx)
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        // SAFETY: `HttpIo` uses structural pinning
        let io = unsafe { self.map_unchecked_mut(|io| &mut io.0) };

        tokio::io::AsyncWrite::poll_shutdown(io, cx)
    }
}
