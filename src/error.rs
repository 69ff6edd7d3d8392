//! Error types for the proxy-sampler crate.
//!
//! [`Error`] covers everything that aborts a run before probing starts.
//! [`ProbeError`] is what a single probe records in its result; it never
//! escapes the worker pool.

use std::fmt;
use thiserror::Error;

/// Fatal, process-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The requested output format is not one of plaintext, json or yaml.
    #[error("invalid output format '{0}', supported formats are 'plaintext', 'json' and 'yaml'")]
    InvalidOutputFormat(String),

    /// A proxy URL from the input list cannot be parsed.
    #[error("invalid proxy url '{url}': {reason}")]
    InvalidProxyUrl { url: String, reason: String },

    /// The target endpoint is not an absolute http(s) URL.
    #[error("invalid endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// The TLS client could not be set up.
    #[error("tls setup failed: {0}")]
    Tls(String),

    /// The proxy list could not be loaded.
    #[error("failed to load proxies from {location}: {reason}")]
    ProxySource { location: String, reason: String },

    /// The report could not be serialized.
    #[error("failed to render report: {0}")]
    Serialize(String),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The network phase a probe was in when it ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Dns,
    Connect,
    ProxyHandshake,
    TlsHandshake,
    ResponseHeaders,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Dns => "dns lookup",
            Phase::Connect => "connect",
            Phase::ProxyHandshake => "proxy handshake",
            Phase::TlsHandshake => "tls handshake",
            Phase::ResponseHeaders => "response headers",
        };
        f.write_str(name)
    }
}

/// Why a probe failed to obtain an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("invalid proxy url: {0}")]
    InvalidProxyUrl(String),

    #[error("unsupported proxy scheme: {0}")]
    UnsupportedProxyScheme(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("dns lookup failed: {0}")]
    Dns(String),

    #[error("connect failed: {0}")]
    Connect(String),

    /// The HTTP proxy refused or failed the CONNECT tunnel.
    #[error("proxy tunnel failed: {0}")]
    Tunnel(String),

    #[error("socks5 negotiation failed: {0}")]
    Socks(String),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("http exchange failed: {0}")]
    Http(String),

    #[error("timed out during {0}")]
    Timeout(Phase),
}

impl ProbeError {
    /// True when the proxy URL was rejected before any network activity.
    pub fn is_unsupported_scheme(&self) -> bool {
        matches!(self, ProbeError::UnsupportedProxyScheme(_))
    }
}

impl serde::Serialize for ProbeError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
