//! Subfolder visits postponed to a second pass.
//!
//! While a folder page is being processed, a link that lands on another
//! portal page is a nested subfolder. Descending into it right away would
//! recurse against a site of unknown depth and invalidate the outer page's
//! element handles, so it is queued here instead and replayed once the
//! main walk has finished. Replays are never queued again.

use std::collections::VecDeque;
use std::path::PathBuf;

/// Deepest level at which a nested subfolder is still queued. Folder visits
/// of the main walk run at depth 0, replays at depth 1.
pub const MAX_DEFERRAL_DEPTH: usize = 1;

/// A nested subfolder to visit in the replay pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredVisit {
    /// Page the subfolder link led to.
    pub target_url: String,
    /// Destination relative to the course directory, e.g. `Lectures/Week 1`.
    pub destination: PathBuf,
    pub course_name: String,
}

/// FIFO queue of deferred visits.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    items: VecDeque<DeferredVisit>,
}

impl DeferredQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, visit: DeferredVisit) {
        log::info!(
            "Deferring {} ({}) for the second pass",
            visit.destination.display(),
            visit.target_url
        );
        self.items.push_back(visit);
    }

    /// Takes every queued visit in insertion order, leaving the queue empty.
    pub fn drain_all(&mut self) -> Vec<DeferredVisit> {
        self.items.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
