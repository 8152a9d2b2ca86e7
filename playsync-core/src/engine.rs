//! Engine facade
//!
//! [`SyncEngine`] owns the registry, tracked state, settings and loop
//! bookkeeping, and drives the reconciliation tick on a tokio interval.
//! Hosts share it as `Arc<SyncEngine>`: transports call [`SyncEngine::ingest_raw`],
//! the control surface calls the registry, bulk and settings operations.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Interval, MissedTickBehavior};

use crate::channel::EndpointChannel;
use crate::config::{SettingsPatch, SyncSettings};
use crate::diagnostics::{self, Diagnostics};
use crate::dispatch::CommandDispatcher;
use crate::protocol::{Command, StatusSnapshot};
use crate::reconcile::{GroupReport, Reconciler, TickContext, TickReport};
use crate::registry::{Endpoint, EndpointEntry, EndpointRegistry};
use crate::tracker::{StateTracker, TrackedState};
use crate::{Error, Result};

/// In-memory state a persistence collaborator snapshots and restores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub endpoints: Vec<EndpointEntry>,
    #[serde(default)]
    pub settings: SyncSettings,
}

/// Synchronization engine
pub struct SyncEngine {
    registry: EndpointRegistry,
    tracker: StateTracker,
    settings: RwLock<SyncSettings>,
    dispatcher: CommandDispatcher,
    reconciler: Mutex<Reconciler>,
    last_report: RwLock<Option<TickReport>>,
    audio_focus: RwLock<Option<String>>,
    ticks: AtomicU64,
    interval_tx: watch::Sender<Duration>,
    shutdown_tx: watch::Sender<bool>,
}

impl SyncEngine {
    /// Create an engine with validated settings
    pub fn new(settings: SyncSettings) -> Result<Self> {
        settings.validate()?;
        let (interval_tx, _) = watch::channel(settings.tick_interval());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            registry: EndpointRegistry::new(),
            tracker: StateTracker::new(),
            settings: RwLock::new(settings),
            dispatcher: CommandDispatcher::new(),
            reconciler: Mutex::new(Reconciler::new()),
            last_report: RwLock::new(None),
            audio_focus: RwLock::new(None),
            ticks: AtomicU64::new(0),
            interval_tx,
            shutdown_tx,
        })
    }

    // ---- registry -------------------------------------------------------

    /// Register an endpoint and ask it for a first snapshot
    pub fn add_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        let id = endpoint.id.clone();
        let group = endpoint.group.clone();
        self.registry.add(endpoint.clone())?;
        self.dispatcher.request_snapshot(&endpoint);
        tracing::info!(endpoint_id = %id, group = ?group, "Endpoint added");
        Ok(())
    }

    /// Remove an endpoint and discard everything tracked about it
    pub fn remove_endpoint(&self, id: &str) -> Result<Endpoint> {
        let endpoint = self.registry.remove(id)?;
        self.tracker.remove(id);
        self.reconciler.lock().forget(id);
        {
            let mut focus = self.audio_focus.write();
            if focus.as_deref() == Some(id) {
                *focus = None;
            }
        }
        tracing::info!(endpoint_id = %id, "Endpoint removed");
        Ok(endpoint)
    }

    pub fn set_group(&self, id: &str, group: Option<String>) -> Result<()> {
        self.registry.set_group(id, group.clone())?;
        tracing::info!(endpoint_id = %id, group = ?group, "Endpoint group changed");
        Ok(())
    }

    pub fn set_offset(&self, id: &str, offset_ms: i64) -> Result<()> {
        self.registry.set_offset(id, offset_ms)?;
        tracing::debug!(endpoint_id = %id, offset_ms, "Endpoint offset changed");
        Ok(())
    }

    pub fn endpoint(&self, id: &str) -> Option<Endpoint> {
        self.registry.get(id)
    }

    /// All endpoints in registration order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.registry.snapshot()
    }

    pub fn endpoint_count(&self) -> usize {
        self.registry.len()
    }

    // ---- persistence boundary ------------------------------------------

    pub fn export(&self) -> PersistedState {
        PersistedState {
            endpoints: self.registry.export(),
            settings: self.settings(),
        }
    }

    /// Re-add persisted endpoints and apply persisted settings
    ///
    /// `channel_for` supplies each endpoint's channel, typically detached
    /// until its transport connects. Entries whose id is already registered
    /// are skipped. Returns the number of endpoints added.
    pub fn restore<F>(&self, state: PersistedState, channel_for: F) -> Result<usize>
    where
        F: Fn(&EndpointEntry) -> Arc<dyn EndpointChannel>,
    {
        self.replace_settings(state.settings)?;

        let mut added = 0;
        for entry in state.endpoints {
            let endpoint = Endpoint::new(entry.id.clone(), channel_for(&entry))
                .with_group(entry.group.clone())
                .with_offset_ms(entry.offset_ms)
                .with_metadata(entry.metadata.clone());
            match self.registry.add(endpoint) {
                Ok(()) => added += 1,
                Err(e) if e.is_conflict() => {
                    tracing::warn!(endpoint_id = %entry.id, "Skipping already registered endpoint");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(endpoints = added, "State restored");
        Ok(added)
    }

    // ---- ingestion ------------------------------------------------------

    /// Merge a snapshot for a registered endpoint; unknown ids are ignored
    pub fn ingest(&self, endpoint_id: &str, snapshot: &StatusSnapshot) -> bool {
        self.ingest_registered(endpoint_id, |tracker| tracker.ingest(endpoint_id, snapshot))
    }

    /// Ingest a raw text message from an endpoint's transport
    pub fn ingest_raw(&self, endpoint_id: &str, raw: &str) -> bool {
        self.ingest_registered(endpoint_id, |tracker| tracker.ingest_raw(endpoint_id, raw))
    }

    fn ingest_registered(
        &self,
        endpoint_id: &str,
        ingest: impl FnOnce(&StateTracker) -> bool,
    ) -> bool {
        if !self.registry.contains(endpoint_id) {
            tracing::trace!(endpoint_id = %endpoint_id, "Ignoring snapshot for unregistered endpoint");
            return false;
        }
        let accepted = ingest(&self.tracker);
        // Removed while ingesting: do not leave an orphan record behind
        if accepted && !self.registry.contains(endpoint_id) {
            self.tracker.remove(endpoint_id);
            return false;
        }
        accepted
    }

    /// Latest tracked state, for display
    pub fn state(&self, endpoint_id: &str) -> Option<TrackedState> {
        self.tracker.get(endpoint_id)
    }

    // ---- settings -------------------------------------------------------

    pub fn settings(&self) -> SyncSettings {
        self.settings.read().clone()
    }

    /// Apply a partial settings update
    ///
    /// A frequency change restarts the tick timer before the next tick.
    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<SyncSettings> {
        let (updated, interval_changed) = {
            let mut settings = self.settings.write();
            let changed = settings.apply(patch)?;
            (settings.clone(), changed)
        };
        if interval_changed {
            self.notify_interval(&updated);
        }
        Ok(updated)
    }

    /// Replace all settings at once
    pub fn replace_settings(&self, settings: SyncSettings) -> Result<()> {
        settings.validate()?;
        let interval_changed = {
            let mut current = self.settings.write();
            let changed = current.sync_frequency_hz != settings.sync_frequency_hz;
            *current = settings.clone();
            changed
        };
        if interval_changed {
            self.notify_interval(&settings);
        }
        Ok(())
    }

    fn notify_interval(&self, settings: &SyncSettings) {
        let interval = settings.tick_interval();
        self.interval_tx.send_replace(interval);
        tracing::info!(
            sync_frequency_hz = settings.sync_frequency_hz,
            interval_ms = interval.as_millis() as u64,
            "Tick frequency changed"
        );
    }

    // ---- reconciliation -------------------------------------------------

    /// Run one reconciliation pass now
    pub fn tick(&self) -> TickReport {
        self.tick_at(Instant::now())
    }

    /// Run one reconciliation pass as of `now`
    pub fn tick_at(&self, now: Instant) -> TickReport {
        let endpoints = self.registry.snapshot();
        let settings = self.settings();
        let report = {
            let mut reconciler = self.reconciler.lock();
            reconciler.tick(&self.context(&endpoints, &settings), now)
        };
        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_report.write() = Some(report.clone());
        report
    }

    /// Number of ticks run so far
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn last_report(&self) -> Option<TickReport> {
        self.last_report.read().clone()
    }

    fn context<'a>(
        &'a self,
        endpoints: &'a [Endpoint],
        settings: &'a SyncSettings,
    ) -> TickContext<'a> {
        TickContext {
            endpoints,
            tracker: &self.tracker,
            settings,
            dispatcher: &self.dispatcher,
        }
    }

    // ---- bulk controls --------------------------------------------------
    //
    // These bypass reconciliation and dispatch directly.

    fn broadcast(&self, command: Command) -> usize {
        self.registry
            .snapshot()
            .iter()
            .filter(|endpoint| self.dispatcher.send_command(endpoint, &command))
            .count()
    }

    /// Mute every endpoint, then play every endpoint
    pub fn play_all(&self) -> usize {
        self.broadcast(Command::Mute);
        let sent = self.broadcast(Command::Play);
        tracing::info!(endpoints = sent, "Play all");
        sent
    }

    pub fn pause_all(&self) -> usize {
        let sent = self.broadcast(Command::Pause);
        tracing::info!(endpoints = sent, "Pause all");
        sent
    }

    pub fn mute_all(&self) -> usize {
        self.broadcast(Command::Mute)
    }

    pub fn unmute_all(&self) -> usize {
        self.broadcast(Command::Unmute)
    }

    pub fn set_volume_all(&self, volume: i64) -> usize {
        self.broadcast(Command::SetVolume(volume))
    }

    pub fn set_rate_all(&self, rate: f64) -> usize {
        self.broadcast(Command::SetPlaybackRate(rate))
    }

    /// Pause everything if anything is playing, otherwise play everything
    ///
    /// Returns true if play was issued.
    pub fn toggle_play_pause(&self) -> bool {
        let any_playing = self
            .registry
            .snapshot()
            .iter()
            .any(|e| self.tracker.get(&e.id).is_some_and(|s| s.is_playing()));
        if any_playing {
            self.pause_all();
            false
        } else {
            self.play_all();
            true
        }
    }

    /// One-shot manual sync of every group onto its leader
    pub fn sync_all(&self) -> Vec<GroupReport> {
        let endpoints = self.registry.snapshot();
        let settings = self.settings();
        let reports = self
            .reconciler
            .lock()
            .force_sync(&self.context(&endpoints, &settings), Instant::now());
        tracing::info!(groups = reports.len(), "Manual sync");
        reports
    }

    /// Unmute `id` and mute everyone else; `None` unmutes all
    pub fn set_audio_focus(&self, id: Option<&str>) -> Result<()> {
        let endpoints = self.registry.snapshot();
        if let Some(id) = id {
            if !endpoints.iter().any(|e| e.id == id) {
                return Err(Error::EndpointNotFound(id.to_string()));
            }
        }

        for endpoint in &endpoints {
            let command = match id {
                Some(focused) if endpoint.id != focused => Command::Mute,
                _ => Command::Unmute,
            };
            self.dispatcher.send_command(endpoint, &command);
        }
        *self.audio_focus.write() = id.map(str::to_string);
        tracing::info!(focus = ?id, "Audio focus changed");
        Ok(())
    }

    pub fn audio_focus(&self) -> Option<String> {
        self.audio_focus.read().clone()
    }

    // ---- diagnostics ----------------------------------------------------

    pub fn diagnostics(&self) -> Diagnostics {
        let endpoints = self.registry.snapshot();
        let settings = self.settings();
        let (groups, rows) = {
            let reconciler = self.reconciler.lock();
            diagnostics::build(
                &endpoints,
                &self.tracker,
                &settings,
                &reconciler,
                Instant::now(),
            )
        };
        Diagnostics {
            groups,
            endpoints: rows,
            last_tick: self.last_report(),
            dispatch: self.dispatcher.stats(),
            ticks: self.tick_count(),
            audio_focus: self.audio_focus(),
        }
    }

    // ---- loop -----------------------------------------------------------

    /// Drive ticks until [`SyncEngine::shutdown`] is called
    pub async fn run(self: Arc<Self>) {
        let mut interval_rx = self.interval_tx.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return;
        }

        let period = *interval_rx.borrow_and_update();
        let mut ticker = tick_timer(period);
        tracing::info!(interval_ms = period.as_millis() as u64, "Reconciliation loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let period = *interval_rx.borrow_and_update();
                    ticker = tick_timer(period);
                    tracing::debug!(interval_ms = period.as_millis() as u64, "Tick timer restarted");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Reconciliation loop stopped");
    }

    /// Spawn [`SyncEngine::run`] on the current runtime
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Stop the loop after the current tick
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("endpoints", &self.registry.len())
            .field("tracked", &self.tracker.len())
            .field("ticks", &self.tick_count())
            .finish()
    }
}

/// Interval whose first tick is one period from now
fn tick_timer(period: Duration) -> Interval {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
