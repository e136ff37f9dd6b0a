//! Run and job statuses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status shared by jobs, node runs and workflow runs.
///
/// The string forms are exchanged verbatim between the store, the API and
/// the aggregator; they are case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    NeverBuilt,
    Waiting,
    Building,
    Success,
    Failed,
    Stopped,
    Skipped,
    Disabled,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::NeverBuilt,
        Status::Waiting,
        Status::Building,
        Status::Success,
        Status::Failed,
        Status::Stopped,
        Status::Skipped,
        Status::Disabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NeverBuilt => "NeverBuilt",
            Status::Waiting => "Waiting",
            Status::Building => "Building",
            Status::Success => "Success",
            Status::Failed => "Failed",
            Status::Stopped => "Stopped",
            Status::Skipped => "Skipped",
            Status::Disabled => "Disabled",
        }
    }

    /// Waiting and Building are the only statuses that can still change.
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Waiting | Status::Building)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Whether a job may finish with this status.
    pub fn is_completion(&self) -> bool {
        self.is_terminal() && *self != Status::NeverBuilt
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status: {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// Parse a comma-separated status list such as `Waiting,Building`.
pub fn parse_status_list(input: &str) -> Result<Vec<Status>, ParseStatusError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Status::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_every_status() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("waiting".parse::<Status>().is_err());
        assert!("Fail".parse::<Status>().is_err());
    }

    #[test]
    fn test_completion_statuses() {
        assert!(Status::Failed.is_completion());
        assert!(Status::Stopped.is_completion());
        assert!(!Status::NeverBuilt.is_completion());
        assert!(!Status::Building.is_completion());
    }

    #[test]
    fn test_parse_status_list() {
        assert_eq!(
            parse_status_list("Waiting, Building").unwrap(),
            vec![Status::Waiting, Status::Building]
        );
        assert_eq!(parse_status_list("").unwrap(), vec![]);
        assert!(parse_status_list("Waiting,Bogus").is_err());
    }
}
