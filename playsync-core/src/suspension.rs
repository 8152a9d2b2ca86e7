//! Suspension classification
//!
//! Decides per tick whether an endpoint can take part in synchronization.
//! Status-derived reasons are checked before staleness so a paused endpoint
//! that stopped reporting is diagnosed as paused, not stalled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::protocol::PlayerStatus;
use crate::tracker::TrackedState;

/// Why an endpoint is excluded from leader candidacy and drift comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuspensionReason {
    NoState,
    Buffering,
    Paused,
    Ad,
    Stalled,
    NoTime,
}

impl SuspensionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspensionReason::NoState => "no-state",
            SuspensionReason::Buffering => "buffering",
            SuspensionReason::Paused => "paused",
            SuspensionReason::Ad => "ad",
            SuspensionReason::Stalled => "stalled",
            SuspensionReason::NoTime => "no-time",
        }
    }
}

impl fmt::Display for SuspensionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An endpoint's current suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspensionRecord {
    pub reason: SuspensionReason,
    /// When this reason was first observed
    pub since: Instant,
}

/// Classify a tracked record at `now`; `None` means usable
pub fn classify(
    record: Option<&TrackedState>,
    now: Instant,
    stall_threshold: Duration,
) -> Option<SuspensionReason> {
    let Some(record) = record else {
        return Some(SuspensionReason::NoState);
    };

    match record.status {
        Some(PlayerStatus::Buffering) => return Some(SuspensionReason::Buffering),
        Some(PlayerStatus::Paused) => return Some(SuspensionReason::Paused),
        Some(PlayerStatus::Ad(_)) => return Some(SuspensionReason::Ad),
        _ => {}
    }

    if record.age(now) > stall_threshold {
        return Some(SuspensionReason::Stalled);
    }
    if record.position.is_none() {
        return Some(SuspensionReason::NoTime);
    }
    None
}
