//! Per-probe results.

use crate::config::ProbeTarget;
use crate::error::ProbeError;
use serde::Serialize;

/// Status code recorded when no HTTP response was obtained.
pub const TRANSPORT_FAILURE: i32 = -1;

/// Placeholder body recorded when the response body could not be read.
pub const BODY_READ_ERROR: &str = "ERROR PARSING RESPONSE";

/// Connection-level timings of a probe, in milliseconds.
///
/// A phase that never happened (no TLS for a plain-HTTP target, for
/// instance) stays at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Latency {
    /// Time from request start to the first response byte.
    pub ttfb: u64,
    /// TCP connect to the proxy.
    pub connect: u64,
    /// Duration of the last TLS handshake on the path.
    pub tls_handshake: u64,
}

/// Outcome of probing one proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub proxy: String,
    pub endpoint: String,
    /// HTTP status, or [`TRANSPORT_FAILURE`].
    pub status_code: i32,
    pub latency: Latency,
    /// Only populated when body inclusion is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    /// A result that got an HTTP response with the given status.
    pub fn response(target: &ProbeTarget, status_code: u16, latency: Latency) -> Self {
        Self {
            proxy: target.proxy.clone(),
            endpoint: target.endpoint.clone(),
            status_code: i32::from(status_code),
            latency,
            response_body: None,
            error: None,
        }
    }

    /// A transport-level failure.
    pub fn failure(target: &ProbeTarget, error: ProbeError, latency: Latency) -> Self {
        Self {
            proxy: target.proxy.clone(),
            endpoint: target.endpoint.clone(),
            status_code: TRANSPORT_FAILURE,
            latency,
            response_body: None,
            error: Some(error),
        }
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.response_body = Some(body);
        self
    }

    /// Any HTTP response counts as success, including 4xx and 5xx.
    pub fn is_success(&self) -> bool {
        self.status_code != TRANSPORT_FAILURE
    }
}
