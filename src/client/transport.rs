//! Connection handling for the node RPC client.
//!
//! The node API address is a multiaddr. TCP and DNS addresses dial a
//! `TcpStream` (DNS components are resolved at dial time); unix-domain
//! addresses dial a `UnixStream` and use a fixed placeholder authority in
//! request URLs, since the socket path itself is not expressible in HTTP.

use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use multiaddr::{Multiaddr, Protocol};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::error::{Error, Kind, Result};

/// Authority used in request URLs when the transport is a unix socket.
pub const UNIX_AUTHORITY: &str = "unix";

/// Default timeout for establishing a connection (covers DNS).
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// A dialable node API endpoint, reduced from a multiaddr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix { path: String },
}

impl Endpoint {
    /// Parses the textual multiaddr form of a node API address.
    ///
    /// `/unix/<socket path>` is handled here rather than through the
    /// multiaddr crate: the unix protocol value is the whole path remainder,
    /// which string-level handling preserves exactly.
    pub fn parse(text: &str) -> Result<Self> {
        if let Some(socket) = text.strip_prefix("/unix") {
            if socket.is_empty() || !socket.starts_with('/') {
                return Err(Error::new("dial", text, Kind::InvalidItem));
            }
            return Ok(Endpoint::Unix { path: socket.to_string() });
        }
        let maddr: Multiaddr = text
            .parse()
            .map_err(|e| Error::with_source("dial", text, Kind::InvalidItem, e))?;
        Self::from_multiaddr(&maddr)
    }

    /// Reduces a multiaddr to a dialable endpoint.
    ///
    /// Accepted shapes: `/ip4/../tcp/..`, `/ip6/../tcp/..`,
    /// `/dns*/../tcp/..`, and `/unix/..`.
    pub fn from_multiaddr(maddr: &Multiaddr) -> Result<Self> {
        let text = maddr.to_string();
        let mut host: Option<String> = None;
        let mut port: Option<u16> = None;
        for protocol in maddr.iter() {
            match protocol {
                Protocol::Ip4(addr) => host = Some(addr.to_string()),
                Protocol::Ip6(addr) => host = Some(addr.to_string()),
                Protocol::Dns(name) | Protocol::Dns4(name) | Protocol::Dns6(name) => {
                    host = Some(name.to_string())
                }
                Protocol::Tcp(p) => port = Some(p),
                Protocol::Unix(path) => {
                    return Ok(Endpoint::Unix { path: format!("/{path}") })
                }
                _ => {}
            }
        }
        match (host, port) {
            (Some(host), Some(port)) => Ok(Endpoint::Tcp { host, port }),
            _ => Err(Error::new("dial", text, Kind::InvalidItem)),
        }
    }

    /// Authority component for request URLs against this endpoint.
    pub fn authority(&self) -> String {
        match self {
            Endpoint::Tcp { host, port } => format!("{host}:{port}"),
            Endpoint::Unix { .. } => UNIX_AUTHORITY.to_string(),
        }
    }

    /// Dials the endpoint and performs one HTTP/1 exchange.
    pub async fn send(
        &self,
        request: Request<Full<Bytes>>,
        dial_timeout: Duration,
    ) -> Result<Response<Incoming>> {
        let path = request.uri().to_string();
        match self {
            Endpoint::Tcp { host, port } => {
                let stream = timeout(dial_timeout, TcpStream::connect((host.as_str(), *port)))
                    .await
                    .map_err(|e| Error::with_source("dial", &path, Kind::Io, e))?
                    .map_err(|e| Error::with_source("dial", &path, Kind::Io, e))?;
                exchange(stream, request).await
            }
            #[cfg(unix)]
            Endpoint::Unix { path: socket } => {
                let stream = timeout(dial_timeout, UnixStream::connect(socket))
                    .await
                    .map_err(|e| Error::with_source("dial", &path, Kind::Io, e))?
                    .map_err(|e| Error::with_source("dial", &path, Kind::Io, e))?;
                exchange(stream, request).await
            }
            #[cfg(not(unix))]
            Endpoint::Unix { .. } => Err(Error::new("dial", path, Kind::InvalidOperation)),
        }
    }
}

async fn exchange<S>(stream: S, request: Request<Full<Bytes>>) -> Result<Response<Incoming>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let path = request.uri().to_string();
    let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| Error::with_source("request", &path, Kind::Io, e))?;
    // The connection future owns the socket; it finishes once the response
    // body has been fully read or dropped.
    tokio::spawn(async move {
        if let Err(error) = connection.await {
            tracing::debug!(%error, "api connection ended");
        }
    });
    sender
        .send_request(request)
        .await
        .map_err(|e| Error::with_source("request", &path, Kind::Io, e))
}
