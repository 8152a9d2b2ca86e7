//! Reconciliation loop body
//!
//! One call to [`Reconciler::tick`] runs a full pass over every
//! synchronization group:
//!
//! 1. classify members into usable and suspended; members whose suspension
//!    just cleared form the rejoin set
//! 2. select a leader from the usable members
//! 3. correct drift and play state of usable followers
//! 4. run recovery for suspended members
//! 5. correct rejoiners with the widened tolerance, then re-run recovery
//!    with the reason they were suspended for
//!
//! Groups are independent. A fault in one group is logged and skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::config::SyncSettings;
use crate::dispatch::{sanitize_args, CommandDispatcher};
use crate::leader::{select_leader, Candidate};
use crate::protocol::{Command, CommandKind};
use crate::recovery::{plan_recovery, RecoveryAction};
use crate::registry::{partition_groups, Endpoint};
use crate::suspension::{classify, SuspensionReason, SuspensionRecord};
use crate::tracker::{StateTracker, TrackedState};
use crate::{Error, Result};

/// Everything a tick reads
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    /// All registered endpoints in registration order
    pub endpoints: &'a [Endpoint],
    pub tracker: &'a StateTracker,
    pub settings: &'a SyncSettings,
    pub dispatcher: &'a CommandDispatcher,
}

/// A command issued by the loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedCommand {
    pub endpoint_id: String,
    pub command: CommandKind,
    /// Sanitized arguments as sent
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuspendedMember {
    pub endpoint_id: String,
    pub reason: SuspensionReason,
}

/// Outcome of one group in one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupReport {
    pub group: String,
    pub leader: Option<String>,
    /// Usable members, rejoiners included
    pub active: usize,
    pub suspended: Vec<SuspendedMember>,
    pub rejoined: Vec<String>,
    pub commands: Vec<IssuedCommand>,
    pub snapshot_requests: Vec<String>,
}

impl GroupReport {
    /// Commands issued to one endpoint, in order
    pub fn commands_for(&self, endpoint_id: &str) -> Vec<&IssuedCommand> {
        self.commands
            .iter()
            .filter(|c| c.endpoint_id == endpoint_id)
            .collect()
    }
}

/// A group whose processing failed this tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupFault {
    pub group: String,
    pub message: String,
}

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub groups: Vec<GroupReport>,
    pub faults: Vec<GroupFault>,
}

impl TickReport {
    pub fn group(&self, group: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.group == group)
    }

    /// Total number of commands issued
    pub fn command_count(&self) -> usize {
        self.groups.iter().map(|g| g.commands.len()).sum()
    }
}

/// Loop-owned bookkeeping: suspensions and last corrections
///
/// Only the tick mutates this state.
#[derive(Debug, Default)]
pub struct Reconciler {
    suspensions: HashMap<String, SuspensionRecord>,
    last_correction: HashMap<String, Instant>,
}

/// Per-tick view of one usable member
struct Member<'a> {
    endpoint: &'a Endpoint,
    state: TrackedState,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current suspension of an endpoint
    pub fn suspension(&self, endpoint_id: &str) -> Option<SuspensionRecord> {
        self.suspensions.get(endpoint_id).copied()
    }

    /// Last seek or recovery command issued to an endpoint
    pub fn last_correction(&self, endpoint_id: &str) -> Option<Instant> {
        self.last_correction.get(endpoint_id).copied()
    }

    /// Drop all bookkeeping for an endpoint
    pub fn forget(&mut self, endpoint_id: &str) {
        self.suspensions.remove(endpoint_id);
        self.last_correction.remove(endpoint_id);
    }

    /// Run one reconciliation pass at `now`
    pub fn tick(&mut self, ctx: &TickContext<'_>, now: Instant) -> TickReport {
        self.prune(ctx.endpoints);

        let mut report = TickReport {
            at: Utc::now(),
            groups: Vec::new(),
            faults: Vec::new(),
        };

        for (group, members) in partition_groups(ctx.endpoints) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.reconcile_group(&group, &members, ctx, now)
            }));

            let message = match outcome {
                Ok(Ok(group_report)) => {
                    report.groups.push(group_report);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            tracing::warn!(group = %group, error = %message, "Group reconciliation failed, skipping");
            report.faults.push(GroupFault { group, message });
        }

        tracing::trace!(
            groups = report.groups.len(),
            commands = report.command_count(),
            faults = report.faults.len(),
            "Tick complete"
        );
        report
    }

    /// One-shot manual sync of every group
    ///
    /// The leader is chosen among usable members as in a tick; every other
    /// group member, suspended or not, is sought onto `leader + offset`
    /// regardless of tolerance and told to play when the leader plays.
    /// Suspension bookkeeping is left untouched.
    pub fn force_sync(&mut self, ctx: &TickContext<'_>, now: Instant) -> Vec<GroupReport> {
        let mut reports = Vec::new();
        for (group, members) in partition_groups(ctx.endpoints) {
            match self.sync_group(&group, &members, ctx, now) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!(group = %group, error = %e, "Manual sync failed, skipping group");
                }
            }
        }
        reports
    }

    fn sync_group(
        &mut self,
        group: &str,
        members: &[&Endpoint],
        ctx: &TickContext<'_>,
        now: Instant,
    ) -> Result<GroupReport> {
        let mut report = GroupReport {
            group: group.to_string(),
            ..Default::default()
        };
        let usable: Vec<Member<'_>> = members
            .iter()
            .filter_map(|&endpoint| {
                let state = ctx.tracker.get(&endpoint.id)?;
                classify(Some(&state), now, ctx.settings.stall_threshold())
                    .is_none()
                    .then_some(Member { endpoint, state })
            })
            .collect();
        report.active = usable.len();

        let candidates: Vec<Candidate<'_>> = usable
            .iter()
            .map(|m| Candidate {
                id: &m.endpoint.id,
                state: &m.state,
                last_correction: self.last_correction.get(&m.endpoint.id).copied(),
            })
            .collect();
        let Some(leader_index) = select_leader(&candidates, ctx.settings) else {
            return Ok(report);
        };
        let leader = &usable[leader_index];
        report.leader = Some(leader.endpoint.id.clone());
        let leader_position = leader.state.position.ok_or_else(|| {
            Error::InvalidState(format!("leader {} has no position", leader.endpoint.id))
        })?;
        let leader_playing = leader.state.is_playing();

        // Suspended members are pulled in too; their tracked status is not consulted
        for &endpoint in members {
            if endpoint.id == leader.endpoint.id {
                continue;
            }
            let expected = leader_position + endpoint.offset_secs();
            if !expected.is_finite() {
                tracing::debug!(endpoint_id = %endpoint.id, "Skipping non-finite sync target");
                continue;
            }
            self.issue(endpoint, Command::Seek(expected), ctx, &mut report);
            self.last_correction.insert(endpoint.id.clone(), now);
            if leader_playing {
                self.issue(endpoint, Command::Play, ctx, &mut report);
            }
        }
        Ok(report)
    }

    /// Discard records of endpoints that left the registry or their group
    fn prune(&mut self, endpoints: &[Endpoint]) {
        let registered: HashSet<&str> = endpoints.iter().map(|e| e.id.as_str()).collect();
        let grouped: HashSet<&str> = endpoints
            .iter()
            .filter(|e| e.group.is_some())
            .map(|e| e.id.as_str())
            .collect();
        self.suspensions.retain(|id, _| grouped.contains(id.as_str()));
        self.last_correction
            .retain(|id, _| registered.contains(id.as_str()));
    }

    fn reconcile_group(
        &mut self,
        group: &str,
        members: &[&Endpoint],
        ctx: &TickContext<'_>,
        now: Instant,
    ) -> Result<GroupReport> {
        let settings = ctx.settings;
        let mut report = GroupReport {
            group: group.to_string(),
            ..Default::default()
        };

        // 1. classify
        let mut usable: Vec<Member<'_>> = Vec::new();
        let mut suspended: Vec<(&Endpoint, SuspensionReason)> = Vec::new();
        let mut rejoin: Vec<(usize, SuspensionReason)> = Vec::new();

        for &endpoint in members {
            let state = ctx.tracker.get(&endpoint.id);
            match classify(state.as_ref(), now, settings.stall_threshold()) {
                Some(reason) => {
                    self.suspend(&endpoint.id, reason, now);
                    suspended.push((endpoint, reason));
                }
                None => {
                    let state = state.ok_or_else(|| {
                        Error::InvalidState(format!("usable endpoint {} has no record", endpoint.id))
                    })?;
                    if let Some(previous) = self.suspensions.remove(&endpoint.id) {
                        tracing::debug!(
                            group = %group,
                            endpoint_id = %endpoint.id,
                            reason = %previous.reason,
                            "Endpoint rejoined"
                        );
                        rejoin.push((usable.len(), previous.reason));
                    }
                    usable.push(Member { endpoint, state });
                }
            }
        }

        report.active = usable.len();
        report.suspended = suspended
            .iter()
            .map(|(e, reason)| SuspendedMember {
                endpoint_id: e.id.clone(),
                reason: *reason,
            })
            .collect();
        report.rejoined = rejoin
            .iter()
            .map(|(i, _)| usable[*i].endpoint.id.clone())
            .collect();

        // 2. leader
        let candidates: Vec<Candidate<'_>> = usable
            .iter()
            .map(|m| Candidate {
                id: &m.endpoint.id,
                state: &m.state,
                last_correction: self.last_correction.get(&m.endpoint.id).copied(),
            })
            .collect();
        let leader_index = select_leader(&candidates, settings);
        let leader = leader_index.map(|i| &usable[i]);
        report.leader = leader.map(|m| m.endpoint.id.clone());

        if leader.is_none() {
            tracing::trace!(group = %group, "No leader this tick");
        }

        // 3. followers
        if let Some(leader) = leader {
            let rejoining: HashSet<usize> = rejoin.iter().map(|(i, _)| *i).collect();
            for (index, member) in usable.iter().enumerate() {
                if Some(index) == leader_index || rejoining.contains(&index) {
                    continue;
                }
                self.correct(member, leader, settings.tolerance_secs(), ctx, now, &mut report)?;
            }
        }

        // 4. suspended members
        let leader_state = leader.map(|m| &m.state);
        for (endpoint, reason) in &suspended {
            self.recover(endpoint, *reason, leader_state, ctx, now, &mut report);
        }

        // 5. rejoiners
        for (index, reason) in &rejoin {
            let member = &usable[*index];
            if let Some(leader) = leader {
                if Some(*index) != leader_index {
                    self.correct(
                        member,
                        leader,
                        settings.rejoin_tolerance_secs(),
                        ctx,
                        now,
                        &mut report,
                    )?;
                }
            }
            self.recover(member.endpoint, *reason, leader_state, ctx, now, &mut report);
        }

        Ok(report)
    }

    fn suspend(&mut self, endpoint_id: &str, reason: SuspensionReason, now: Instant) {
        match self.suspensions.get_mut(endpoint_id) {
            Some(record) if record.reason == reason => {}
            Some(record) => {
                record.reason = reason;
                record.since = now;
            }
            None => {
                tracing::debug!(endpoint_id = %endpoint_id, reason = %reason, "Endpoint suspended");
                self.suspensions
                    .insert(endpoint_id.to_string(), SuspensionRecord { reason, since: now });
            }
        }
    }

    /// Drift and play-state correction of one follower
    fn correct(
        &mut self,
        member: &Member<'_>,
        leader: &Member<'_>,
        tolerance_secs: f64,
        ctx: &TickContext<'_>,
        now: Instant,
        report: &mut GroupReport,
    ) -> Result<()> {
        let leader_position = leader.state.position.ok_or_else(|| {
            Error::InvalidState(format!("leader {} has no position", leader.endpoint.id))
        })?;
        let position = member.state.position.ok_or_else(|| {
            Error::InvalidState(format!("member {} has no position", member.endpoint.id))
        })?;

        // The member's own offset; the leader's is never applied
        let expected = leader_position + member.endpoint.offset_secs();
        if !expected.is_finite() {
            return Err(Error::InvalidState(format!(
                "non-finite target for {}",
                member.endpoint.id
            )));
        }

        if (position - expected).abs() > tolerance_secs {
            self.issue(member.endpoint, Command::Seek(expected), ctx, report);
            self.last_correction.insert(member.endpoint.id.clone(), now);
        }

        let leader_playing = leader.state.is_playing();
        let member_playing = member.state.is_playing();
        if leader_playing && !member_playing {
            self.issue(member.endpoint, Command::Play, ctx, report);
        } else if !leader_playing && member_playing {
            self.issue(member.endpoint, Command::Pause, ctx, report);
        }
        Ok(())
    }

    fn recover(
        &mut self,
        endpoint: &Endpoint,
        reason: SuspensionReason,
        leader: Option<&TrackedState>,
        ctx: &TickContext<'_>,
        now: Instant,
        report: &mut GroupReport,
    ) {
        let actions = plan_recovery(reason, leader, ctx.settings);
        for action in actions {
            match action {
                RecoveryAction::Send(command) => {
                    self.issue(endpoint, command, ctx, report);
                    self.last_correction.insert(endpoint.id.clone(), now);
                }
                RecoveryAction::RequestSnapshot => {
                    ctx.dispatcher.request_snapshot(endpoint);
                    report.snapshot_requests.push(endpoint.id.clone());
                }
            }
        }
    }

    fn issue(
        &self,
        endpoint: &Endpoint,
        command: Command,
        ctx: &TickContext<'_>,
        report: &mut GroupReport,
    ) {
        ctx.dispatcher.send_command(endpoint, &command);
        let kind = command.kind();
        report.commands.push(IssuedCommand {
            endpoint_id: endpoint.id.clone(),
            command: kind,
            args: sanitize_args(kind, &command.args()),
        });
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic during group reconciliation".to_string()
    }
}
