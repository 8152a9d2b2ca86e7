//! Leader selection
//!
//! Picks the timing reference of a group from its usable members. Only a
//! member that is playing and has a known position qualifies; every policy
//! falls back to first-playing when it yields nothing.

use std::time::Instant;

use crate::config::{LeaderEligibility, LeaderPolicy, SyncSettings};
use crate::tracker::TrackedState;

/// A usable group member offered for leadership
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub id: &'a str,
    pub state: &'a TrackedState,
    /// Last seek or recovery command issued to this member, if any
    pub last_correction: Option<Instant>,
}

impl Candidate<'_> {
    fn qualifies(&self) -> bool {
        self.state.is_playing() && self.state.position.is_some()
    }
}

/// Index of the selected leader within `candidates`, which are in registration order
pub fn select_leader(candidates: &[Candidate<'_>], settings: &SyncSettings) -> Option<usize> {
    let by_policy = match settings.leader_policy {
        LeaderPolicy::Manual => settings
            .pinned_leader
            .as_deref()
            .and_then(|pinned| {
                candidates
                    .iter()
                    .position(|c| c.id == pinned && c.qualifies())
            }),
        LeaderPolicy::LongestPlaying => longest_playing(candidates),
        LeaderPolicy::LeastRecentlyBuffered => least_recently_buffered(candidates),
        LeaderPolicy::FirstPlaying => None,
    };

    by_policy
        .or_else(|| candidates.iter().position(Candidate::qualifies))
        .or_else(|| match settings.leader_eligibility {
            LeaderEligibility::Strict => None,
            LeaderEligibility::AllowPausedFallback => candidates
                .iter()
                .position(|c| c.state.position.is_some()),
        })
}

fn longest_playing(candidates: &[Candidate<'_>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        if !candidate.qualifies() {
            continue;
        }
        let Some(position) = candidate.state.position else {
            continue;
        };
        if best.map_or(true, |(_, max)| position > max) {
            best = Some((index, position));
        }
    }
    best.map(|(index, _)| index)
}

fn least_recently_buffered(candidates: &[Candidate<'_>]) -> Option<usize> {
    // `None` orders before any instant: never corrected is the most stable
    let mut best: Option<(usize, Option<Instant>)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        if !candidate.qualifies() {
            continue;
        }
        if best.map_or(true, |(_, oldest)| candidate.last_correction < oldest) {
            best = Some((index, candidate.last_correction));
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PlayerStatus;
    use chrono::Utc;
    use std::time::Duration;

    fn state(position: Option<f64>, status: PlayerStatus) -> TrackedState {
        TrackedState {
            position,
            status: Some(status),
            updated_at: Instant::now(),
            updated_wall: Utc::now(),
        }
    }

    fn settings(policy: LeaderPolicy) -> SyncSettings {
        SyncSettings {
            leader_policy: policy,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_playing_skips_non_playing() {
        let ended = state(Some(10.0), PlayerStatus::Ended);
        let playing = state(Some(5.0), PlayerStatus::Playing);
        let candidates = [
            Candidate { id: "a", state: &ended, last_correction: None },
            Candidate { id: "b", state: &playing, last_correction: None },
        ];
        assert_eq!(select_leader(&candidates, &settings(LeaderPolicy::FirstPlaying)), Some(1));
    }

    #[test]
    fn test_requires_known_position() {
        let no_position = state(None, PlayerStatus::Playing);
        let candidates = [Candidate { id: "a", state: &no_position, last_correction: None }];
        assert_eq!(select_leader(&candidates, &SyncSettings::default()), None);
    }

    #[test]
    fn test_manual_pin() {
        let a = state(Some(1.0), PlayerStatus::Playing);
        let b = state(Some(2.0), PlayerStatus::Playing);
        let candidates = [
            Candidate { id: "a", state: &a, last_correction: None },
            Candidate { id: "b", state: &b, last_correction: None },
        ];
        let mut pinned = settings(LeaderPolicy::Manual);
        pinned.pinned_leader = Some("b".to_string());
        assert_eq!(select_leader(&candidates, &pinned), Some(1));

        pinned.pinned_leader = Some("missing".to_string());
        assert_eq!(select_leader(&candidates, &pinned), Some(0));
    }

    #[test]
    fn test_manual_pin_not_playing_falls_back() {
        let a = state(Some(1.0), PlayerStatus::Playing);
        let b = state(Some(2.0), PlayerStatus::Cued);
        let candidates = [
            Candidate { id: "a", state: &a, last_correction: None },
            Candidate { id: "b", state: &b, last_correction: None },
        ];
        let mut pinned = settings(LeaderPolicy::Manual);
        pinned.pinned_leader = Some("b".to_string());
        assert_eq!(select_leader(&candidates, &pinned), Some(0));
    }

    #[test]
    fn test_longest_playing() {
        let a = state(Some(3.0), PlayerStatus::Playing);
        let b = state(Some(30.0), PlayerStatus::Playing);
        let c = state(Some(300.0), PlayerStatus::Ended);
        let candidates = [
            Candidate { id: "a", state: &a, last_correction: None },
            Candidate { id: "b", state: &b, last_correction: None },
            Candidate { id: "c", state: &c, last_correction: None },
        ];
        assert_eq!(select_leader(&candidates, &settings(LeaderPolicy::LongestPlaying)), Some(1));
    }

    #[test]
    fn test_least_recently_buffered() {
        let now = Instant::now();
        let a = state(Some(1.0), PlayerStatus::Playing);
        let b = state(Some(1.0), PlayerStatus::Playing);
        let c = state(Some(1.0), PlayerStatus::Playing);
        let candidates = [
            Candidate { id: "a", state: &a, last_correction: Some(now) },
            Candidate { id: "b", state: &b, last_correction: Some(now - Duration::from_secs(5)) },
            Candidate { id: "c", state: &c, last_correction: Some(now - Duration::from_secs(1)) },
        ];
        let lrb = settings(LeaderPolicy::LeastRecentlyBuffered);
        assert_eq!(select_leader(&candidates, &lrb), Some(1));

        let never = state(Some(1.0), PlayerStatus::Playing);
        let mut with_never = candidates.to_vec();
        with_never.push(Candidate { id: "d", state: &never, last_correction: None });
        assert_eq!(select_leader(&with_never, &lrb), Some(3));
    }

    #[test]
    fn test_paused_fallback_eligibility() {
        let cued = state(Some(8.0), PlayerStatus::Cued);
        let candidates = [Candidate { id: "a", state: &cued, last_correction: None }];

        assert_eq!(select_leader(&candidates, &SyncSettings::default()), None);

        let loose = SyncSettings {
            leader_eligibility: LeaderEligibility::AllowPausedFallback,
            ..Default::default()
        };
        assert_eq!(select_leader(&candidates, &loose), Some(0));
    }
}
