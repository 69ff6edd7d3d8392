//! The final report and its rendering.

use crate::aggregator::Aggregator;
use crate::config::OutputFormat;
use crate::error::{Error, Result};
use crate::result::ProbeResult;
use serde::Serialize;

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub success: usize,
    pub fail: usize,
    /// Mean TTFB of successful probes, in milliseconds.
    pub average_ttfb: u64,
    /// Every result, in the order it arrived.
    pub results: Vec<ProbeResult>,
}

impl Report {
    /// Build a report from an already collected result set.
    pub fn from_results(results: Vec<ProbeResult>) -> Self {
        let mut aggregator = Aggregator::new();
        aggregator.extend(results);
        aggregator.finish()
    }

    pub fn total(&self) -> usize {
        self.success + self.fail
    }
}

/// Render a report in the chosen format.
pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Plaintext => Ok(format!(
            "Success rate:      {}/{}\nAverage TTFB:      {}ms\n",
            report.success,
            report.total(),
            report.average_ttfb
        )),
        OutputFormat::Json => serde_json::to_string(report).map_err(|e| Error::Serialize(e.to_string())),
        OutputFormat::Yaml => serde_yaml::to_string(report).map_err(|e| Error::Serialize(e.to_string())),
    }
}
