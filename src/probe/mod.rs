//! Probing a single proxy.
//!
//! [`HttpProber`] fetches the endpoint through one proxy over a fresh
//! connection and records how long the TCP connect, the TLS handshake and
//! the first response byte took. Failures are returned as data in the
//! [`ProbeResult`], never as an error.

mod connect;
mod timing;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::header::{CONNECTION, HOST, PROXY_AUTHORIZATION, USER_AGENT};
use http::{Method, Request};
use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper_util::rt::TokioIo;
use log::{debug, warn};
use rustls::RootCertStore;
use tokio_rustls::TlsConnector;
use url::{Host, Position, Url};

use self::connect::BoxedIo;
use self::timing::{bounded, millis_since, FirstByte};
use crate::config::{ProbeConfig, ProbeTarget};
use crate::error::{Error, Phase, ProbeError, Result};
use crate::proxy::{ProxyScheme, ProxyUrl};
use crate::result::{Latency, ProbeResult, BODY_READ_ERROR};

const USER_AGENT_VALUE: &str = concat!("proxy-sampler/", env!("CARGO_PKG_VERSION"));

/// Something that can probe one target.
///
/// Implementations must not panic and must always return a result, even
/// when the network fails.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &ProbeTarget) -> ProbeResult;
}

/// Probes proxies with a real HTTP/1.1 GET.
#[derive(Clone)]
pub struct HttpProber {
    timeout: Duration,
    include_body: bool,
    tls: TlsConnector,
}

impl HttpProber {
    /// Create a prober with the given per-phase timeout.
    ///
    /// Server certificates are checked against the webpki root set.
    pub fn new(timeout: Duration, include_body: bool) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_root_certificates(timeout, include_body, roots)
    }

    /// Create a prober that trusts only the given roots.
    pub fn with_root_certificates(timeout: Duration, include_body: bool, roots: RootCertStore) -> Result<Self> {
        let config = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            timeout,
            include_body,
            tls: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Create a prober matching a run configuration.
    pub fn from_config(config: &ProbeConfig) -> Result<Self> {
        Self::new(config.timeout, config.include_body)
    }

    async fn exchange(
        &self,
        target: &ProbeTarget,
        start: Instant,
        latency: &mut Latency,
    ) -> std::result::Result<(u16, Option<String>), ProbeError> {
        let proxy = ProxyUrl::parse(&target.proxy)?;
        let endpoint = Endpoint::parse(&target.endpoint)?;

        let (tcp, connect_ms) = connect::connect_tcp(&proxy.host, proxy.port, self.timeout).await?;
        latency.connect = connect_ms;

        let mut proxy_authorization = None;
        let mut uri = endpoint.origin_form.clone();

        let stream: BoxedIo = match proxy.scheme {
            ProxyScheme::Http | ProxyScheme::Https => {
                let mut stream: BoxedIo = Box::new(tcp);
                if proxy.scheme == ProxyScheme::Https {
                    let (tls, ms) = connect::tls_handshake(&self.tls, &proxy.host, stream, self.timeout).await?;
                    latency.tls_handshake = ms;
                    stream = Box::new(tls);
                }

                if endpoint.secure {
                    bounded(
                        self.timeout,
                        Phase::ProxyHandshake,
                        connect::http_tunnel(&mut stream, &endpoint.authority, proxy.credentials.as_ref()),
                    )
                    .await?;
                } else {
                    // Plain HTTP is forwarded, not tunnelled.
                    uri = endpoint.absolute_form.clone();
                    proxy_authorization = proxy.credentials.as_ref().map(connect::basic_auth);
                }
                stream
            }
            ProxyScheme::Socks5 | ProxyScheme::Socks5h => {
                let socks = connect::socks_handshake(tcp, &proxy, &endpoint.host, endpoint.port, self.timeout).await?;
                Box::new(socks)
            }
        };

        let stream: BoxedIo = if endpoint.secure {
            let (tls, ms) = connect::tls_handshake(&self.tls, &endpoint.host, stream, self.timeout).await?;
            latency.tls_handshake = ms;
            Box::new(tls)
        } else {
            stream
        };

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(HOST, &endpoint.host_header)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(CONNECTION, "close");
        if let Some(value) = proxy_authorization {
            request = request.header(PROXY_AUTHORIZATION, value);
        }
        let request = request
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::Http(e.to_string()))?;

        let (stream, first_byte) = FirstByte::new(stream);
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ProbeError::Http(e.to_string()))?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("probe connection closed with error: {}", e);
            }
        });

        let response = bounded(self.timeout, Phase::ResponseHeaders, async {
            sender
                .send_request(request)
                .await
                .map_err(|e| ProbeError::Http(e.to_string()))
        })
        .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                driver.abort();
                return Err(e);
            }
        };

        latency.ttfb = match first_byte.get() {
            Some(at) => u64::try_from(at.saturating_duration_since(start).as_millis()).unwrap_or(u64::MAX),
            None => millis_since(start),
        };

        let status = response.status().as_u16();
        let body = if self.include_body {
            Some(self.read_body(response.into_body()).await)
        } else {
            None
        };

        driver.abort();
        Ok((status, body))
    }

    async fn read_body(&self, body: Incoming) -> String {
        match tokio::time::timeout(self.timeout, body.collect()).await {
            Ok(Ok(collected)) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            Ok(Err(e)) => {
                warn!("Failed to read response body: {}", e);
                BODY_READ_ERROR.to_string()
            }
            Err(_) => {
                warn!("Timed out reading response body");
                BODY_READ_ERROR.to_string()
            }
        }
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeResult {
        let start = Instant::now();
        let mut latency = Latency::default();

        match self.exchange(target, start, &mut latency).await {
            Ok((status, body)) => {
                debug!(
                    "Probe via {} answered {} (connect {}ms, tls {}ms, ttfb {}ms)",
                    target.proxy, status, latency.connect, latency.tls_handshake, latency.ttfb
                );
                let result = ProbeResult::response(target, status, latency);
                match body {
                    Some(body) => result.with_body(body),
                    None => result,
                }
            }
            Err(error) => {
                warn!("Probe via {} failed: {}", target.proxy, error);
                ProbeResult::failure(target, error, latency)
            }
        }
    }
}

/// The parts of the endpoint URL a probe needs.
#[derive(Debug)]
struct Endpoint {
    /// Host without IPv6 brackets, for DNS, SNI and SOCKS.
    host: String,
    port: u16,
    /// Always "host:port", for CONNECT.
    authority: String,
    /// Value of the Host header.
    host_header: String,
    secure: bool,
    absolute_form: String,
    origin_form: String,
}

impl Endpoint {
    fn parse(raw: &str) -> std::result::Result<Self, ProbeError> {
        let url = Url::parse(raw).map_err(|e| ProbeError::InvalidEndpoint(e.to_string()))?;

        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(ProbeError::InvalidEndpoint(format!("unsupported scheme '{other}'"))),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(ProbeError::InvalidEndpoint(format!("missing host in '{raw}'"))),
        };
        let host_str = url.host_str().unwrap_or_default().to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::InvalidEndpoint(format!("missing port in '{raw}'")))?;

        let host_header = match url.port() {
            Some(port) => format!("{host_str}:{port}"),
            None => host_str.clone(),
        };

        Ok(Self {
            host,
            port,
            authority: format!("{host_str}:{port}"),
            host_header,
            secure,
            absolute_form: url[..Position::AfterQuery].to_string(),
            origin_form: url[Position::BeforePath..Position::AfterQuery].to_string(),
        })
    }
}
