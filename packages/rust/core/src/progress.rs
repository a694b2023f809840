//! Progress callbacks for interactive front ends.

use crate::cycle::FetchCycleReport;

/// Progress reporter trait for UI integration.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each search query.
    fn query_started(&self, query: &str, current: usize, total: usize);
    /// Called when the cycle reaches a terminal state.
    fn done(&self, report: &FetchCycleReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn query_started(&self, _query: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &FetchCycleReport) {}
}
