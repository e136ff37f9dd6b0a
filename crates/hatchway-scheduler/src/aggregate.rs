//! Status roll-up from children to their parent run.

use hatchway_core::Status;
use hatchway_core::status::ParseStatusError;
use serde::{Deserialize, Serialize};

/// Tally of child statuses, built in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounter {
    pub success: u32,
    pub building: u32,
    pub failed: u32,
    pub stopped: u32,
    pub skipped: u32,
    pub disabled: u32,
}

impl StatusCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every status of an iterator.
    pub fn from_statuses(statuses: impl IntoIterator<Item = Status>) -> Self {
        let mut counter = Self::new();
        for status in statuses {
            counter.record(status);
        }
        counter
    }

    /// Classify one child status.
    ///
    /// A waiting child counts as building: its parent is not done yet.
    /// Queued jobs must keep a run out of every terminal status, so Waiting
    /// is tallied with Building on purpose rather than ignored; see
    /// `test_record_str_classifies`, where a Waiting entry brings `building`
    /// to 2. `NeverBuilt` children are not counted.
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Success => self.success += 1,
            Status::Building | Status::Waiting => self.building += 1,
            Status::Failed => self.failed += 1,
            Status::Stopped => self.stopped += 1,
            Status::Skipped => self.skipped += 1,
            Status::Disabled => self.disabled += 1,
            Status::NeverBuilt => {}
        }
    }

    /// Classify a status received as its wire string.
    ///
    /// An unrecognised string leaves the counter untouched.
    pub fn record_str(&mut self, status: &str) -> Result<(), ParseStatusError> {
        self.record(status.parse()?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The parent status implied by a tally.
pub fn aggregate(counter: &StatusCounter) -> Status {
    if counter.building > 0 {
        Status::Building
    } else if counter.failed > 0 {
        Status::Failed
    } else if counter.stopped > 0 {
        Status::Stopped
    } else if counter.skipped > 0 {
        Status::Skipped
    } else if counter.disabled > 0 {
        Status::Disabled
    } else if counter.success > 0 {
        Status::Success
    } else {
        Status::NeverBuilt
    }
}
