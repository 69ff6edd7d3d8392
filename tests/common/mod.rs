//! Local stand-ins for proxies.

#![allow(dead_code)]

use parking_lot::Mutex;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// A listener that answers every request itself.
pub struct StubProxy {
    pub addr: SocketAddr,
    /// Request heads received, in arrival order.
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl StubProxy {
    pub fn url(&self, scheme: &str) -> String {
        format!("{scheme}://{}", self.addr)
    }
}

pub async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<String> {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(stream.read_u8().await?);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

async fn respond<S: AsyncWrite + Unpin>(stream: &mut S, status: u16, body: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// An HTTP "proxy" that replies `status` with `body` after `delay`.
pub async fn http_stub(delay: Duration, status: u16, body: &'static str) -> StubProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                let Ok(head) = read_head(&mut stream).await else { return };
                seen.lock().push(head);
                tokio::time::sleep(delay).await;
                let _ = respond(&mut stream, status, body).await;
            });
        }
    });

    StubProxy { addr, requests }
}

/// An HTTP "proxy" that writes `response` verbatim and closes.
pub async fn raw_stub(response: &'static str) -> StubProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                let Ok(head) = read_head(&mut stream).await else { return };
                seen.lock().push(head);
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    StubProxy { addr, requests }
}

/// A listener that accepts connections and never says anything.
pub async fn silent_stub() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    addr
}

/// One CONNECT request seen by [`socks5_stub`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    /// Address type: 1 IPv4, 3 domain, 4 IPv6.
    pub atyp: u8,
    pub host: String,
    /// Username and password, when the client authenticated.
    pub credentials: Option<(String, String)>,
}

/// A SOCKS5 proxy that answers the tunnelled request itself.
///
/// Username/password auth is accepted (and recorded) when offered.
pub async fn socks5_stub() -> (SocketAddr, Arc<Mutex<Vec<SocksRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                if let Ok(request) = socks5_accept(&mut stream).await {
                    seen.lock().push(request);
                    if read_head(&mut stream).await.is_ok() {
                        let _ = respond(&mut stream, 200, "via socks").await;
                    }
                }
            });
        }
    });

    (addr, requests)
}

async fn read_string(stream: &mut TcpStream) -> std::io::Result<String> {
    let len = stream.read_u8().await?;
    let mut bytes = vec![0u8; len as usize];
    stream.read_exact(&mut bytes).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn socks5_accept(stream: &mut TcpStream) -> std::io::Result<SocksRequest> {
    let _version = stream.read_u8().await?;
    let count = stream.read_u8().await?;
    let mut methods = vec![0u8; count as usize];
    stream.read_exact(&mut methods).await?;

    let credentials = if methods.contains(&2) {
        stream.write_all(&[5, 2]).await?;
        let _auth_version = stream.read_u8().await?;
        let username = read_string(stream).await?;
        let password = read_string(stream).await?;
        stream.write_all(&[1, 0]).await?;
        Some((username, password))
    } else {
        stream.write_all(&[5, 0]).await?;
        None
    };

    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    let atyp = request[3];
    let host = match atyp {
        1 => {
            let mut ip = [0u8; 4];
            stream.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        3 => read_string(stream).await?,
        _ => {
            let mut ip = [0u8; 16];
            stream.read_exact(&mut ip).await?;
            std::net::Ipv6Addr::from(ip).to_string()
        }
    };
    let _port = stream.read_u16().await?;

    stream.write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 80]).await?;
    Ok(SocksRequest { atyp, host, credentials })
}

/// An address with nothing listening on it.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A self-signed certificate for `localhost`, plus a root store trusting it.
pub struct TestCert {
    pub acceptor: TlsAcceptor,
    pub roots: RootCertStore,
}

pub fn localhost_cert() -> TestCert {
    let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der: CertificateDer<'static> = cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der)
        .unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(cert_der).unwrap();

    TestCert { acceptor: TlsAcceptor::from(Arc::new(config)), roots }
}

/// An HTTP proxy that honours CONNECT and then plays the TLS origin itself.
///
/// The server side of the handshake starts `handshake_delay` after the
/// tunnel is up, which puts a floor under the measured handshake time.
pub async fn connect_tls_stub(acceptor: TlsAcceptor, handshake_delay: Duration, body: &'static str) -> StubProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let seen = Arc::clone(&seen);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(connect) = read_head(&mut stream).await else { return };
                seen.lock().push(connect);
                if stream.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n").await.is_err() {
                    return;
                }
                tokio::time::sleep(handshake_delay).await;
                let Ok(mut tls) = acceptor.accept(stream).await else { return };
                let Ok(request) = read_head(&mut tls).await else { return };
                seen.lock().push(request);
                let _ = respond(&mut tls, 200, body).await;
            });
        }
    });

    StubProxy { addr, requests }
}

/// An HTTPS proxy: TLS to the proxy, then a forwarded plain-HTTP request.
pub async fn tls_proxy_stub(acceptor: TlsAcceptor, handshake_delay: Duration, body: &'static str) -> StubProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen = Arc::clone(&seen);
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                tokio::time::sleep(handshake_delay).await;
                let Ok(mut tls) = acceptor.accept(stream).await else { return };
                let Ok(request) = read_head(&mut tls).await else { return };
                seen.lock().push(request);
                let _ = respond(&mut tls, 200, body).await;
            });
        }
    });

    StubProxy { addr, requests }
}
