//! # proxy-sampler
//!
//! Probe a list of forward proxies (HTTP, HTTPS, SOCKS5) and report on
//! their health and latency.
//!
//! Every proxy is used once to GET a target endpoint over a fresh
//! connection. The TCP connect, TLS handshake and time to first byte are
//! measured per probe. A bounded pool of workers runs the probes, a single
//! aggregator folds the results into a [`Report`], and [`render`] turns the
//! report into plaintext, JSON or YAML.
//!
//! ```no_run
//! use proxy_sampler::{render, HttpProber, ProbeConfig, WorkerPool};
//!
//! # async fn example() -> proxy_sampler::Result<()> {
//! let config = ProbeConfig::builder()
//!     .endpoint("https://example.com")
//!     .proxies(vec!["http://127.0.0.1:3128", "socks5h://127.0.0.1:1080"])
//!     .build()?;
//! let pool = WorkerPool::from_config(HttpProber::from_config(&config)?, &config)?;
//! let report = pool.run_report(config.targets(), |_, _| {}).await;
//! print!("{}", render(&report, config.output)?);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod error;
pub mod pool;
pub mod probe;
pub mod proxy;
pub mod report;
pub mod result;
pub mod utils;

pub use aggregator::{Aggregator, Tally};
pub use config::{OutputFormat, ProbeConfig, ProbeConfigBuilder, ProbeTarget};
pub use error::{Error, Phase, ProbeError, Result};
pub use pool::WorkerPool;
pub use probe::{HttpProber, Probe};
pub use proxy::{ProxyScheme, ProxyUrl};
pub use report::{render, Report};
pub use result::{Latency, ProbeResult, TRANSPORT_FAILURE};
