//! Harvest statistics types.

use std::time::{Duration, Instant};

use crate::reconcile::VisitOutcome;

/// Statistics for an entire harvest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    /// Number of courses found on the home page.
    pub courses: usize,
    /// Number of folder visits, including replays.
    pub folders_visited: usize,
    /// Folder visits whose page or listing could not be reached.
    pub folders_unreachable: usize,
    /// Number of files moved into the run directory.
    pub files_relocated: usize,
    /// Files that appeared but could not be moved.
    pub files_failed: usize,
    /// Total bytes moved into the run directory.
    pub bytes_relocated: u64,
    /// Number of deferred subfolder visits replayed.
    pub deferred_replayed: usize,
    /// Stray downloads removed at the end of the run.
    pub strays_removed: usize,
    /// Total elapsed time for the run.
    pub elapsed: Duration,
}

impl HarvestStats {
    /// Creates a new empty stats value.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            courses: 0,
            folders_visited: 0,
            folders_unreachable: 0,
            files_relocated: 0,
            files_failed: 0,
            bytes_relocated: 0,
            deferred_replayed: 0,
            strays_removed: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Builder for accumulating statistics during a run.
pub struct HarvestStatsBuilder {
    stats: HarvestStats,
    start_time: Instant,
}

impl Default for HarvestStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HarvestStatsBuilder {
    /// Creates a new builder; the clock starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stats: HarvestStats::new(),
            start_time: Instant::now(),
        }
    }

    /// Sets the number of courses found.
    pub const fn set_courses(&mut self, count: usize) {
        self.stats.courses = count;
    }

    /// Records the outcome of a folder visit.
    pub fn add_visit(&mut self, outcome: &VisitOutcome) {
        self.stats.folders_visited += 1;
        self.add_files(outcome);
        if matches!(outcome, VisitOutcome::Unreachable | VisitOutcome::SnapshotFailed) {
            self.stats.folders_unreachable += 1;
        }
    }

    /// Records the files of an outcome without counting a visit.
    pub fn add_files(&mut self, outcome: &VisitOutcome) {
        if let VisitOutcome::Relocated {
            moved,
            bytes,
            failed,
        } = outcome
        {
            self.stats.files_relocated += moved.len();
            self.stats.bytes_relocated += bytes;
            self.stats.files_failed += failed;
        }
    }

    /// Records a replayed deferred visit and its outcome.
    pub fn add_replay(&mut self, outcome: &VisitOutcome) {
        self.stats.deferred_replayed += 1;
        self.add_visit(outcome);
    }

    /// Sets the number of stray downloads removed.
    pub const fn set_strays_removed(&mut self, count: usize) {
        self.stats.strays_removed = count;
    }

    /// Builds the final statistics.
    #[must_use]
    pub fn build(self) -> HarvestStats {
        HarvestStats {
            elapsed: self.start_time.elapsed(),
            ..self.stats
        }
    }
}
