//! Configuration for a probing run.

use crate::error::{Error, ProbeError, Result};
use crate::proxy::ProxyUrl;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_ENDPOINT: &str = "https://example.com";
const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the final report is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Success ratio and average TTFB on two lines.
    #[default]
    Plaintext,
    /// The full report as JSON.
    Json,
    /// The full report as YAML.
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plaintext" => Ok(OutputFormat::Plaintext),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            other => Err(Error::InvalidOutputFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plaintext => write!(f, "plaintext"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// One unit of work: fetch `endpoint` through `proxy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    /// Absolute http(s) URL to fetch.
    pub endpoint: String,
    /// Proxy URL, as given in the input.
    pub proxy: String,
}

impl ProbeTarget {
    pub fn new(endpoint: impl Into<String>, proxy: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), proxy: proxy.into() }
    }
}

/// Validated configuration for a probing run.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Endpoint fetched through every proxy.
    pub endpoint: String,
    /// Proxy URLs, in input order.
    pub proxies: Vec<String>,
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Minimum spacing between the starts of one worker's probes.
    pub delay: Duration,
    /// Bound applied to each network phase of a probe.
    pub timeout: Duration,
    /// Report format.
    pub output: OutputFormat,
    /// Keep response bodies in the results.
    pub include_body: bool,
}

impl ProbeConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::new()
    }

    /// One target per proxy, in input order.
    pub fn targets(&self) -> Vec<ProbeTarget> {
        self.proxies
            .iter()
            .map(|proxy| ProbeTarget::new(self.endpoint.clone(), proxy.clone()))
            .collect()
    }
}

/// Builder for `ProbeConfig`.
pub struct ProbeConfigBuilder {
    endpoint: Option<String>,
    proxies: Vec<String>,
    concurrency: Option<usize>,
    delay: Option<Duration>,
    timeout: Option<Duration>,
    output: Option<OutputFormat>,
    include_body: bool,
}

impl ProbeConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            proxies: Vec::new(),
            concurrency: None,
            delay: None,
            timeout: None,
            output: None,
            include_body: false,
        }
    }

    /// Set the endpoint to fetch through every proxy.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the proxy URLs to probe.
    pub fn proxies(mut self, proxies: Vec<impl Into<String>>) -> Self {
        self.proxies = proxies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of concurrent workers.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Set the per-worker delay between probes.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the per-phase network timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the report format.
    pub fn output(mut self, output: OutputFormat) -> Self {
        self.output = Some(output);
        self
    }

    /// Keep response bodies in the results.
    pub fn include_body(mut self, include: bool) -> Self {
        self.include_body = include;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<ProbeConfig> {
        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency < 1 {
            return Err(Error::InvalidConfiguration("concurrency must be at least 1".into()));
        }

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(Error::InvalidConfiguration("timeout must be greater than zero".into()));
        }

        let endpoint = self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_endpoint(&endpoint)?;

        for proxy in &self.proxies {
            validate_proxy(proxy)?;
        }

        Ok(ProbeConfig {
            endpoint,
            proxies: self.proxies,
            concurrency,
            delay: self.delay.unwrap_or(DEFAULT_DELAY),
            timeout,
            output: self.output.unwrap_or_default(),
            include_body: self.include_body,
        })
    }
}

impl Default for ProbeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidEndpoint { url: endpoint.to_string(), reason };

    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("scheme must be http or https, got '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(())
}

/// Only syntax is checked here; an unknown scheme is reported per probe.
fn validate_proxy(proxy: &str) -> Result<()> {
    match ProxyUrl::parse(proxy) {
        Ok(_) | Err(ProbeError::UnsupportedProxyScheme(_)) => Ok(()),
        Err(e) => Err(Error::InvalidProxyUrl { url: proxy.to_string(), reason: e.to_string() }),
    }
}
