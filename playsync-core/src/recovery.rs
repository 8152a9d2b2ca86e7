//! Recovery strategy for suspended endpoints
//!
//! Maps a suspension reason to corrective actions. Pure: the reconciler
//! executes the returned actions through the dispatcher.

use crate::config::{FallbackMode, SyncSettings};
use crate::protocol::Command;
use crate::suspension::SuspensionReason;
use crate::tracker::TrackedState;

/// One corrective step for a suspended endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryAction {
    Send(Command),
    /// Ask the endpoint to push a fresh status snapshot
    RequestSnapshot,
}

/// Actions to take for `reason`, given the group leader's state if there is one
pub fn plan_recovery(
    reason: SuspensionReason,
    leader: Option<&TrackedState>,
    settings: &SyncSettings,
) -> Vec<RecoveryAction> {
    if !settings.auto_recovery {
        return Vec::new();
    }

    match reason {
        SuspensionReason::Buffering | SuspensionReason::Stalled => match settings.fallback_mode {
            FallbackMode::MuteAndContinue => vec![
                RecoveryAction::Send(Command::Mute),
                RecoveryAction::Send(Command::Play),
            ],
            FallbackMode::PauseAndWait => vec![RecoveryAction::Send(Command::Pause)],
            FallbackMode::None => Vec::new(),
        },
        SuspensionReason::Paused => {
            if leader.is_some_and(TrackedState::is_playing) {
                vec![RecoveryAction::Send(Command::Play)]
            } else {
                Vec::new()
            }
        }
        SuspensionReason::Ad => match settings.fallback_mode {
            FallbackMode::MuteAndContinue => vec![RecoveryAction::Send(Command::Mute)],
            _ => Vec::new(),
        },
        SuspensionReason::NoState | SuspensionReason::NoTime => {
            vec![RecoveryAction::RequestSnapshot]
        }
    }
}
