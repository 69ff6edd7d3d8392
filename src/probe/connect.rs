//! Establishing the byte stream a probe talks HTTP over.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::trace;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_socks::tcp::Socks5Stream;
use tokio_socks::TargetAddr;

use super::timing::{bounded, timed};
use crate::error::{Phase, ProbeError};
use crate::proxy::{Credentials, ProxyScheme, ProxyUrl};

/// Upper bound on the size of a CONNECT response head.
const MAX_TUNNEL_HEAD: usize = 8 * 1024;

/// Any stream a probe can run HTTP over.
pub(crate) trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

pub(crate) type BoxedIo = Box<dyn Io>;

/// `Basic` credentials for the `Proxy-Authorization` header.
pub(crate) fn basic_auth(credentials: &Credentials) -> String {
    let token = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
    format!("Basic {token}")
}

/// Resolve `host` and return every address it maps to.
pub(crate) async fn resolve(host: &str, port: u16, limit: Duration) -> Result<Vec<SocketAddr>, ProbeError> {
    let addrs: Vec<SocketAddr> = bounded(limit, Phase::Dns, async {
        lookup_host((host, port))
            .await
            .map(Iterator::collect)
            .map_err(|e| ProbeError::Dns(format!("{host}: {e}")))
    })
    .await?;

    if addrs.is_empty() {
        return Err(ProbeError::Dns(format!("{host}: no addresses found")));
    }
    Ok(addrs)
}

/// Resolve the proxy and open a TCP connection to it.
///
/// Returns the stream and the connect time in milliseconds. DNS time is
/// not part of the connect time.
pub(crate) async fn connect_tcp(host: &str, port: u16, limit: Duration) -> Result<(TcpStream, u64), ProbeError> {
    let addrs = resolve(host, port, limit).await?;

    timed(limit, Phase::Connect, async {
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        trace!("set_nodelay on {} failed: {}", addr, e);
                    }
                    return Ok(stream);
                }
                Err(e) => {
                    trace!("connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(ProbeError::Connect(match last_error {
            Some(e) => format!("{host}:{port}: {e}"),
            None => format!("{host}:{port}: no address to connect to"),
        }))
    })
    .await
}

/// TLS handshake with `server` over `stream`.
pub(crate) async fn tls_handshake<S>(
    connector: &TlsConnector,
    server: &str,
    stream: S,
    limit: Duration,
) -> Result<(TlsStream<S>, u64), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let server_name =
        ServerName::try_from(server.to_string()).map_err(|e| ProbeError::Tls(format!("{server}: {e}")))?;

    timed(limit, Phase::TlsHandshake, async {
        connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ProbeError::Tls(format!("{server}: {e}")))
    })
    .await
}

/// Ask an HTTP proxy to open a tunnel to `authority` ("host:port").
pub(crate) async fn http_tunnel<S>(
    stream: &mut S,
    authority: &str,
    credentials: Option<&Credentials>,
) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(credentials) = credentials {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", basic_auth(credentials)));
    }
    request.push_str("\r\n");

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ProbeError::Tunnel(e.to_string()))?;

    let head = read_head(stream).await?;
    let status_line = head.lines().next().unwrap_or_default().trim().to_string();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| ProbeError::Tunnel(format!("malformed proxy response '{status_line}'")))?;

    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(ProbeError::Tunnel(format!("proxy answered CONNECT with '{status_line}'")))
    }
}

/// Read a response head byte by byte so nothing past it is consumed.
async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String, ProbeError> {
    let mut head = Vec::with_capacity(256);
    loop {
        let byte = stream.read_u8().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ProbeError::Tunnel("proxy closed the connection".into()),
            _ => ProbeError::Tunnel(e.to_string()),
        })?;
        head.push(byte);
        if head.ends_with(b"\r\n\r\n") {
            return Ok(String::from_utf8_lossy(&head).into_owned());
        }
        if head.len() > MAX_TUNNEL_HEAD {
            return Err(ProbeError::Tunnel("proxy response head too large".into()));
        }
    }
}

/// Negotiate a SOCKS5 connection to `host:port` over an open proxy stream.
///
/// `socks5` resolves `host` locally and hands the proxy an address;
/// `socks5h` passes the hostname through for the proxy to resolve.
pub(crate) async fn socks_handshake(
    stream: TcpStream,
    proxy: &ProxyUrl,
    host: &str,
    port: u16,
    limit: Duration,
) -> Result<Socks5Stream<TcpStream>, ProbeError> {
    let target = match host.parse::<IpAddr>() {
        Ok(ip) => TargetAddr::Ip(SocketAddr::new(ip, port)),
        Err(_) if proxy.scheme == ProxyScheme::Socks5h => TargetAddr::Domain(host.to_string().into(), port),
        Err(_) => TargetAddr::Ip(resolve(host, port, limit).await?[0]),
    };

    bounded(limit, Phase::ProxyHandshake, async {
        let negotiated = match &proxy.credentials {
            Some(credentials) => {
                Socks5Stream::connect_with_password_and_socket(
                    stream,
                    target,
                    &credentials.username,
                    &credentials.password,
                )
                .await
            }
            None => Socks5Stream::connect_with_socket(stream, target).await,
        };
        negotiated.map_err(|e| ProbeError::Socks(e.to_string()))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let credentials = Credentials { username: "proxyuser".into(), password: "proxypass".into() };
        assert_eq!(basic_auth(&credentials), "Basic cHJveHl1c2VyOnByb3h5cGFzcw==");
    }

    #[tokio::test]
    async fn test_connect_tcp_disables_nagle() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (stream, _) = connect_tcp("127.0.0.1", port, Duration::from_secs(1)).await.unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_tunnel_accepts_2xx() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let proxy = tokio::spawn(async move {
            let request = read_head(&mut server).await.unwrap();
            server.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n").await.unwrap();
            request
        });

        http_tunnel(&mut client, "example.com:443", None).await.unwrap();
        let request = proxy.await.unwrap();
        assert!(request.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(!request.contains("Proxy-Authorization"));
    }

    #[tokio::test]
    async fn test_tunnel_rejects_auth_required() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let _ = read_head(&mut server).await;
            let _ = server.write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;
        });

        let credentials = Credentials { username: "u".into(), password: "p".into() };
        let err = http_tunnel(&mut client, "example.com:443", Some(&credentials)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Tunnel(ref msg) if msg.contains("407")));
    }

    #[tokio::test]
    async fn test_tunnel_reports_closed_connection() {
        let (mut client, server) = tokio::io::duplex(1024);
        drop(server);
        let err = http_tunnel(&mut client, "example.com:443", None).await.unwrap_err();
        assert!(matches!(err, ProbeError::Tunnel(_)));
    }
}
