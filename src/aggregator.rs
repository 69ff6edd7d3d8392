//! Folding probe results into running totals.

use crate::report::Report;
use crate::result::ProbeResult;
use log::debug;

/// Running counts over the results seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub success: usize,
    pub fail: usize,
    /// Sum of TTFB over successful probes, in milliseconds.
    pub ttfb_sum: u64,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.success + self.fail
    }

    /// Integer mean TTFB over successes; zero when there are none.
    pub fn average_ttfb(&self) -> u64 {
        match self.success {
            0 => 0,
            n => self.ttfb_sum / n as u64,
        }
    }
}

/// Owns the counters and the collected results of one run.
///
/// A single aggregator consumes the pool's result stream, so each result
/// is folded in exactly once and no counter is shared between tasks.
#[derive(Debug, Default)]
pub struct Aggregator {
    tally: Tally,
    results: Vec<ProbeResult>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one result into the totals.
    pub fn record(&mut self, result: ProbeResult) {
        if result.is_success() {
            self.tally.success += 1;
            self.tally.ttfb_sum += result.latency.ttfb;
        } else {
            self.tally.fail += 1;
        }
        debug!(
            "Recorded result for {} ({} done, {} ok)",
            result.proxy,
            self.tally.total(),
            self.tally.success
        );
        self.results.push(result);
    }

    /// The most recently recorded result.
    pub fn last(&self) -> Option<&ProbeResult> {
        self.results.last()
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    /// Close the run and produce the final report.
    pub fn finish(self) -> Report {
        Report {
            success: self.tally.success,
            fail: self.tally.fail,
            average_ttfb: self.tally.average_ttfb(),
            results: self.results,
        }
    }
}

impl Extend<ProbeResult> for Aggregator {
    fn extend<I: IntoIterator<Item = ProbeResult>>(&mut self, iter: I) {
        for result in iter {
            self.record(result);
        }
    }
}
