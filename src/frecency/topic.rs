//! Observer notifications handled by the recalculator

use std::fmt;
use std::str::FromStr;

use crate::utils::{PlacesError, SchedulerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverTopic {
    /// The user went idle
    Idle,
    /// The user came back
    Active,
    /// Once-a-day idle maintenance
    IdleDaily,
    /// Someone knows of stale rows
    RecalculationNeeded,
    /// Run the deferred task body once and wait for it
    TestExecuteTask,
}

impl ObserverTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::IdleDaily => "idle-daily",
            Self::RecalculationNeeded => "frecency-recalculation-needed",
            Self::TestExecuteTask => "test-execute-taskFn",
        }
    }
}

impl FromStr for ObserverTopic {
    type Err = PlacesError;

    fn from_str(topic: &str) -> Result<Self, Self::Err> {
        match topic {
            "idle" => Ok(Self::Idle),
            "active" => Ok(Self::Active),
            "idle-daily" => Ok(Self::IdleDaily),
            "frecency-recalculation-needed" => Ok(Self::RecalculationNeeded),
            "test-execute-taskFn" => Ok(Self::TestExecuteTask),
            other => Err(SchedulerError::UnknownTopic(other.to_string()).into()),
        }
    }
}

impl fmt::Display for ObserverTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
