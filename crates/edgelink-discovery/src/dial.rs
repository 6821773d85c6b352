//! TCP+TLS dialing to an edge endpoint.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DialError;

/// Object-safe byte stream to the edge. In-memory pipes satisfy this in
/// tests; production dials produce TLS streams.
pub trait EdgeStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> EdgeStream for T {}

/// Dials the TCP+TLS leg of an edge connection.
///
/// The seam the connection slots consume; the production implementation is
/// [`TlsEdgeDialer`].
#[async_trait]
pub trait EdgeDialer: Send + Sync {
    /// Makes a TLS connection to an edge endpoint.
    ///
    /// The timeout bounds the TCP connect and the TLS handshake separately;
    /// the established stream carries no deadline. `bind` optionally pins the
    /// local source address. Cancelling the token aborts an in-flight dial.
    async fn dial_edge(
        &self,
        timeout: Duration,
        addr: SocketAddr,
        bind: Option<IpAddr>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn EdgeStream>, DialError>;
}

/// Production edge dialer: bounded TCP connect followed by a rustls client
/// handshake against a fixed server name.
pub struct TlsEdgeDialer {
    connector: TlsConnector,
    server_name: String,
}

impl std::fmt::Debug for TlsEdgeDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsEdgeDialer")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl TlsEdgeDialer {
    /// Creates a dialer from a prepared TLS client configuration and the
    /// server name presented by the edge certificates.
    pub fn new(tls_config: Arc<rustls::ClientConfig>, server_name: impl Into<String>) -> Self {
        Self {
            connector: TlsConnector::from(tls_config),
            server_name: server_name.into(),
        }
    }

    fn server_name(&self) -> Result<ServerName<'static>, DialError> {
        if let Ok(ip) = self.server_name.parse::<IpAddr>() {
            return Ok(ServerName::IpAddress(ip.into()));
        }
        ServerName::try_from(self.server_name.clone()).map_err(|e| {
            DialError::new(
                "invalid TLS server name",
                io::Error::new(io::ErrorKind::InvalidInput, e),
            )
        })
    }
}

async fn connect_tcp(addr: SocketAddr, bind: Option<IpAddr>) -> io::Result<TcpStream> {
    let stream = match bind {
        Some(ip) => {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.bind(SocketAddr::new(ip, 0))?;
            socket.connect(addr).await?
        }
        None => TcpStream::connect(addr).await?,
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[async_trait]
impl EdgeDialer for TlsEdgeDialer {
    async fn dial_edge(
        &self,
        timeout: Duration,
        addr: SocketAddr,
        bind: Option<IpAddr>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn EdgeStream>, DialError> {
        let stream = tokio::select! {
            result = tokio::time::timeout(timeout, connect_tcp(addr, bind)) => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => return Err(DialError::new("TCP connect to edge failed", source)),
                Err(_) => {
                    return Err(DialError::new(
                        "TCP connect to edge timed out",
                        io::ErrorKind::TimedOut.into(),
                    ))
                }
            },
            _ = cancel.cancelled() => {
                return Err(DialError::new("dial cancelled", io::ErrorKind::Interrupted.into()))
            }
        };

        // The deadline covers the handshake only; once established, the
        // stream is governed by protocol-level timeouts upstream.
        let server_name = self.server_name()?;
        match tokio::time::timeout(timeout, self.connector.connect(server_name, stream)).await {
            Ok(Ok(tls)) => {
                debug!(%addr, "connected to the edge");
                Ok(Box::new(tls))
            }
            Ok(Err(source)) => Err(DialError::new("TLS handshake with edge failed", source)),
            Err(_) => Err(DialError::new(
                "TLS handshake with edge timed out",
                io::ErrorKind::TimedOut.into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::TlsAcceptor;

    fn test_tls_pair() -> (Arc<rustls::ServerConfig>, Arc<rustls::ClientConfig>) {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let signed = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = signed.cert.der().clone();
        let key = rustls::pki_types::PrivateKeyDer::Pkcs8(
            rustls::pki_types::PrivatePkcs8KeyDer::from(signed.key_pair.serialize_der()),
        );

        let server = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.clone()], key)
            .unwrap();

        let mut roots = rustls::RootCertStore::empty();
        roots.add(cert).unwrap();
        let client = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        (Arc::new(server), Arc::new(client))
    }

    #[tokio::test]
    async fn test_dial_edge_success() {
        let (server_config, client_config) = test_tls_pair();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = TlsAcceptor::from(server_config);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut tls = acceptor.accept(stream).await.unwrap();
            let mut buf = [0u8; 4];
            tls.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            tls.write_all(b"pong").await.unwrap();
        });

        let dialer = TlsEdgeDialer::new(client_config, "localhost");
        let cancel = CancellationToken::new();
        let mut stream = dialer
            .dial_edge(Duration::from_secs(5), addr, None, &cancel)
            .await
            .unwrap();

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_edge_refused() {
        let (_, client_config) = test_tls_pair();

        // Bind a port and release it so the connect is refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dialer = TlsEdgeDialer::new(client_config, "localhost");
        let cancel = CancellationToken::new();
        let result = dialer
            .dial_edge(Duration::from_secs(1), addr, None, &cancel)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dial_edge_unreachable_bounded_by_timeout() {
        let (_, client_config) = test_tls_pair();

        let dialer = TlsEdgeDialer::new(client_config, "localhost");
        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();
        let result = dialer
            .dial_edge(
                Duration::from_millis(200),
                "192.0.2.1:7844".parse().unwrap(),
                None,
                &cancel,
            )
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_dial_edge_cancelled() {
        let (_, client_config) = test_tls_pair();

        let dialer = TlsEdgeDialer::new(client_config, "localhost");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = dialer
            .dial_edge(
                Duration::from_secs(30),
                "192.0.2.1:7844".parse().unwrap(),
                None,
                &cancel,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tls_handshake_failure_is_dial_error() {
        let (_, client_config) = test_tls_pair();

        // Plain TCP listener that never speaks TLS and closes immediately.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let dialer = TlsEdgeDialer::new(client_config, "localhost");
        let cancel = CancellationToken::new();
        let result = dialer
            .dial_edge(Duration::from_secs(2), addr, None, &cancel)
            .await;
        assert!(result.is_err());

        server.await.unwrap();
    }
}
