//! Step status flags.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four step status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// The step was selected to run for the row.
    Started,
    /// The step will not run for the row.
    Skipped,
    /// The step failed for the row.
    Errored,
    /// The step finished for the row.
    Completed,
}

impl StatusKind {
    /// Returns the flag name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Skipped => "skipped",
            Self::Errored => "errored",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status flags of a step for one row.
///
/// `completed` and `skipped` are never both set: raising one lowers the
/// other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct StepStatus {
    /// Selected to run.
    pub started: bool,
    /// Will not run.
    pub skipped: bool,
    /// Failed.
    pub errored: bool,
    /// Finished.
    pub completed: bool,
}

impl StepStatus {
    /// Reads one flag.
    #[must_use]
    pub const fn get(&self, kind: StatusKind) -> bool {
        match kind {
            StatusKind::Started => self.started,
            StatusKind::Skipped => self.skipped,
            StatusKind::Errored => self.errored,
            StatusKind::Completed => self.completed,
        }
    }

    /// Writes one flag.
    pub fn set(&mut self, kind: StatusKind, value: bool) {
        match kind {
            StatusKind::Started => self.started = value,
            StatusKind::Skipped => {
                self.skipped = value;
                if value {
                    self.completed = false;
                }
            }
            StatusKind::Errored => self.errored = value,
            StatusKind::Completed => {
                self.completed = value;
                if value {
                    self.skipped = false;
                }
            }
        }
    }

    /// Returns the flags as a map value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::map_from([
            (StatusKind::Started.as_str(), Value::Bool(self.started)),
            (StatusKind::Skipped.as_str(), Value::Bool(self.skipped)),
            (StatusKind::Errored.as_str(), Value::Bool(self.errored)),
            (StatusKind::Completed.as_str(), Value::Bool(self.completed)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_and_skipped_are_exclusive() {
        let mut status = StepStatus::default();
        status.set(StatusKind::Skipped, true);
        status.set(StatusKind::Completed, true);
        assert!(status.completed);
        assert!(!status.skipped);

        status.set(StatusKind::Skipped, true);
        assert!(status.skipped);
        assert!(!status.get(StatusKind::Completed));
    }

    #[test]
    fn test_to_value() {
        let mut status = StepStatus::default();
        status.set(StatusKind::Errored, true);
        assert_eq!(status.to_value().get("errored"), Some(&Value::Bool(true)));
        assert_eq!(status.to_value().get("started"), Some(&Value::Bool(false)));
    }
}
