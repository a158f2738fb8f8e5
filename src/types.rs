//! Shared value types.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::AntidoteError;

/// Action applied to a job whose display class matched a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Treatment {
    /// Drop the job before execution.
    Skip,
    /// Move the job to the permanent-failure set.
    Kill,
    /// Hold the job in the rule's suspension queue.
    Suspend,
}

impl Treatment {
    pub const ALL: [Treatment; 3] = [Treatment::Skip, Treatment::Kill, Treatment::Suspend];

    pub fn as_str(&self) -> &'static str {
        match self {
            Treatment::Skip => "skip",
            Treatment::Kill => "kill",
            Treatment::Suspend => "suspend",
        }
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Treatment {
    type Err = AntidoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Treatment::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AntidoteError::Validation(format!("invalid treatment: {:?}", s)))
    }
}

/// Milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
