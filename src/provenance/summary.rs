//! Run summary - what an invocation actually did

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::RunMode;
use crate::scheduler::ScheduleReport;
use crate::storage;
use crate::Result;

/// Written at the end of every invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    mode: RunMode,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    schedule: Option<ScheduleReport>,
    failed_samples: usize,
    feature_rows: usize,
    samples_with_results: usize,
}

impl RunSummary {
    /// Start a summary now.
    #[must_use]
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            started_at: Utc::now(),
            finished_at: None,
            schedule: None,
            failed_samples: 0,
            feature_rows: 0,
            samples_with_results: 0,
        }
    }

    /// Attach the scheduler's report.
    pub fn record_schedule(&mut self, report: ScheduleReport) {
        self.schedule = Some(report);
    }

    /// Record the size of the failure log after the invocation.
    pub fn record_failures(&mut self, failed_samples: usize) {
        self.failed_samples = failed_samples;
    }

    /// Record feature table coverage.
    pub fn record_features(&mut self, feature_rows: usize, samples_with_results: usize) {
        self.feature_rows = feature_rows;
        self.samples_with_results = samples_with_results;
    }

    /// Stamp the end time.
    pub fn complete(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Entry point.
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    /// End time, once [`RunSummary::complete`] was called.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Scheduler report, for `run` invocations.
    #[must_use]
    pub const fn schedule(&self) -> Option<&ScheduleReport> {
        self.schedule.as_ref()
    }

    /// Failure log size.
    #[must_use]
    pub const fn failed_samples(&self) -> usize {
        self.failed_samples
    }

    /// Feature table rows.
    #[must_use]
    pub const fn feature_rows(&self) -> usize {
        self.feature_rows
    }

    /// Samples with at least one interval.
    #[must_use]
    pub const fn samples_with_results(&self) -> usize {
        self.samples_with_results
    }

    /// Write as pretty JSON, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ArtifactWrite`] on IO failure.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        storage::write_json(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lifecycle() {
        let mut summary = RunSummary::new(RunMode::Run);
        assert!(summary.finished_at().is_none());

        summary.record_schedule(ScheduleReport {
            chunks_total: 3,
            chunks_processed: 1,
            chunks_skipped: 2,
            ..ScheduleReport::default()
        });
        summary.record_failures(1);
        summary.record_features(5, 4);
        summary.complete();

        assert_eq!(summary.schedule().unwrap().chunks_skipped, 2);
        assert_eq!(summary.failed_samples(), 1);
        assert_eq!(summary.feature_rows(), 5);
        assert!(summary.finished_at().unwrap() >= summary.started_at);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["mode"], "run");
        assert_eq!(json["schedule"]["chunks_total"], 3);
    }
}
