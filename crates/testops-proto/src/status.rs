use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution status of a result or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Blocked,
    Invalid,
    /// Only steps start out untested; it never takes part in status mapping.
    Untested,
}

/// Returned when a string does not name a known status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

impl Status {
    /// Statuses that may appear on either side of a status mapping.
    pub const MAPPABLE: [Status; 5] = [
        Status::Passed,
        Status::Failed,
        Status::Skipped,
        Status::Blocked,
        Status::Invalid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Skipped => "skipped",
            Status::Blocked => "blocked",
            Status::Invalid => "invalid",
            Status::Untested => "untested",
        }
    }

    pub fn is_mappable(self) -> bool {
        Self::MAPPABLE.contains(&self)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    /// Parsing is case sensitive, matching how statuses are written in config.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(Status::Passed),
            "failed" => Ok(Status::Failed),
            "skipped" => Ok(Status::Skipped),
            "blocked" => Ok(Status::Blocked),
            "invalid" => Ok(Status::Invalid),
            "untested" => Ok(Status::Untested),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}
