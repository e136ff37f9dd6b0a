//! Resource identifiers.
//!
//! Every persisted entity is keyed by a store-assigned integer. Each gets its
//! own newtype so a job id can never be passed where a run id is expected.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            Display, From,
        )]
        #[serde(transparent)]
        #[display("{_0}")]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

int_id!(
    /// Identifier of a queued job.
    JobId
);
int_id!(
    /// Identifier of a node run (one pipeline execution inside a workflow run).
    NodeRunId
);
int_id!(
    /// Identifier of a workflow run.
    WorkflowRunId
);
int_id!(
    /// Identifier of a registered hatchery.
    HatcheryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = JobId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<JobId>().unwrap(), id);
        assert!("forty-two".parse::<JobId>().is_err());
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&NodeRunId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
