//! Read-only diagnostic view of synchronization state
//!
//! Nothing here mutates loop state. "Still out of sync" is reported through
//! these values rather than through errors.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::config::SyncSettings;
use crate::dispatch::DispatchStats;
use crate::leader::{select_leader, Candidate};
use crate::reconcile::{Reconciler, TickReport};
use crate::registry::{partition_groups, Endpoint};
use crate::suspension::{classify, SuspensionReason};
use crate::tracker::StateTracker;

/// Coarse drift classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthLevel {
    /// Within tolerance
    Good,
    /// Within twice the tolerance
    Adjusting,
    OutOfSync,
}

impl HealthLevel {
    pub fn from_drift(abs_drift_secs: f64, tolerance_secs: f64) -> Self {
        if abs_drift_secs <= tolerance_secs {
            HealthLevel::Good
        } else if abs_drift_secs <= tolerance_secs * 2.0 {
            HealthLevel::Adjusting
        } else {
            HealthLevel::OutOfSync
        }
    }
}

/// Drift summary of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupHealth {
    pub group: String,
    pub leader: Option<String>,
    pub level: HealthLevel,
    /// Mean absolute follower drift in milliseconds
    pub avg_drift_ms: f64,
    pub max_drift_ms: f64,
    pub active: usize,
    pub suspended: usize,
}

/// One row per registered endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointDiagnostics {
    pub id: String,
    pub group: Option<String>,
    pub offset_ms: i64,
    pub connected: bool,
    pub position: Option<f64>,
    pub status: Option<String>,
    pub is_leader: bool,
    /// Signed drift against the offset-adjusted leader position, seconds
    pub drift: Option<f64>,
    pub health: Option<HealthLevel>,
    pub suspension: Option<SuspensionReason>,
    pub suspended_for_ms: Option<u64>,
    pub last_update: Option<DateTime<Utc>>,
    pub last_correction_ms_ago: Option<u64>,
}

/// Full diagnostic snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub groups: Vec<GroupHealth>,
    pub endpoints: Vec<EndpointDiagnostics>,
    pub last_tick: Option<TickReport>,
    pub dispatch: DispatchStats,
    pub ticks: u64,
    pub audio_focus: Option<String>,
}

/// Compute group health and per-endpoint rows at `now`
///
/// Leader choice mirrors the loop: same classifier, same policy, same
/// last-correction input.
pub fn build(
    endpoints: &[Endpoint],
    tracker: &StateTracker,
    settings: &SyncSettings,
    reconciler: &Reconciler,
    now: Instant,
) -> (Vec<GroupHealth>, Vec<EndpointDiagnostics>) {
    let tolerance = settings.tolerance_secs();

    let mut rows: Vec<EndpointDiagnostics> = endpoints
        .iter()
        .map(|endpoint| {
            let state = tracker.get(&endpoint.id);
            let suspension = reconciler.suspension(&endpoint.id);
            EndpointDiagnostics {
                id: endpoint.id.clone(),
                group: endpoint.group.clone(),
                offset_ms: endpoint.offset_ms,
                connected: endpoint.is_available(),
                position: state.as_ref().and_then(|s| s.position),
                status: state.as_ref().and_then(|s| s.status).map(|s| s.label()),
                is_leader: false,
                drift: None,
                health: None,
                suspension: endpoint
                    .group
                    .as_ref()
                    .and_then(|_| classify(state.as_ref(), now, settings.stall_threshold())),
                suspended_for_ms: suspension
                    .map(|r| now.saturating_duration_since(r.since).as_millis() as u64),
                last_update: state.as_ref().map(|s| s.updated_wall),
                last_correction_ms_ago: reconciler
                    .last_correction(&endpoint.id)
                    .map(|t| now.saturating_duration_since(t).as_millis() as u64),
            }
        })
        .collect();

    let mut groups = Vec::new();
    for (group, members) in partition_groups(endpoints) {
        let mut usable = Vec::new();
        let mut suspended = 0;
        for endpoint in members {
            let state = tracker.get(&endpoint.id);
            match (classify(state.as_ref(), now, settings.stall_threshold()), state) {
                (None, Some(state)) => usable.push((endpoint, state)),
                _ => suspended += 1,
            }
        }

        let candidates: Vec<Candidate<'_>> = usable
            .iter()
            .map(|(endpoint, state)| Candidate {
                id: &endpoint.id,
                state,
                last_correction: reconciler.last_correction(&endpoint.id),
            })
            .collect();
        let leader_index = select_leader(&candidates, settings);

        let mut drifts = Vec::new();
        if let Some(leader_index) = leader_index {
            let (leader, leader_state) = &usable[leader_index];
            let leader_position = leader_state.position.unwrap_or_default();
            if let Some(row) = rows.iter_mut().find(|r| r.id == leader.id) {
                row.is_leader = true;
                row.drift = Some(0.0);
                row.health = Some(HealthLevel::Good);
            }

            for (index, (endpoint, state)) in usable.iter().enumerate() {
                if index == leader_index {
                    continue;
                }
                let Some(position) = state.position else {
                    continue;
                };
                let drift = position - (leader_position + endpoint.offset_secs());
                if !drift.is_finite() {
                    continue;
                }
                drifts.push(drift.abs());
                if let Some(row) = rows.iter_mut().find(|r| r.id == endpoint.id) {
                    row.drift = Some(drift);
                    row.health = Some(HealthLevel::from_drift(drift.abs(), tolerance));
                }
            }
        }

        let max_drift = drifts.iter().copied().fold(0.0_f64, f64::max);
        let avg_drift = if drifts.is_empty() {
            0.0
        } else {
            drifts.iter().sum::<f64>() / drifts.len() as f64
        };
        let level = if leader_index.is_none() {
            HealthLevel::OutOfSync
        } else {
            HealthLevel::from_drift(max_drift, tolerance)
        };

        groups.push(GroupHealth {
            group,
            leader: leader_index.map(|i| usable[i].0.id.clone()),
            level,
            avg_drift_ms: avg_drift * 1000.0,
            max_drift_ms: max_drift * 1000.0,
            active: usable.len(),
            suspended,
        });
    }

    (groups, rows)
}
