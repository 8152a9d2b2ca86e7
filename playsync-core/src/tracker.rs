//! Latest known playback state per endpoint
//!
//! Snapshots arrive asynchronously from endpoint transports while the
//! reconciliation tick reads. Records are keyed by endpoint id in a
//! `DashMap`; each ingest replaces one record under its shard lock, so a
//! reader never sees a half-applied snapshot and keys never contend with
//! each other.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Instant;

use crate::protocol::{PlayerStatus, StatusSnapshot};

/// Last known state of one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedState {
    /// Playback position in seconds, if ever reported
    pub position: Option<f64>,
    /// Player status, if ever reported
    pub status: Option<PlayerStatus>,
    /// Monotonic time of the last accepted snapshot (staleness)
    pub updated_at: Instant,
    /// Wall-clock time of the last accepted snapshot (display)
    pub updated_wall: DateTime<Utc>,
}

impl TrackedState {
    pub fn is_playing(&self) -> bool {
        self.status.is_some_and(|s| s.is_playing())
    }

    /// Age of the record at `now`
    pub fn age(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.updated_at)
    }
}

/// Concurrent store of [`TrackedState`] records
#[derive(Debug, Default)]
pub struct StateTracker {
    records: DashMap<String, TrackedState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a snapshot into the endpoint's record, stamped with the current time
    pub fn ingest(&self, endpoint_id: &str, snapshot: &StatusSnapshot) -> bool {
        self.ingest_at(endpoint_id, snapshot, Instant::now())
    }

    /// Merge a snapshot observed at `now`
    ///
    /// Present fields overwrite; absent fields are kept. A snapshot with no
    /// recognized field changes nothing, not even the timestamp.
    pub fn ingest_at(&self, endpoint_id: &str, snapshot: &StatusSnapshot, now: Instant) -> bool {
        if snapshot.is_empty() {
            return false;
        }
        let wall = Utc::now();

        self.records
            .entry(endpoint_id.to_string())
            .and_modify(|record| {
                if let Some(time) = snapshot.current_time {
                    record.position = Some(time);
                }
                if let Some(status) = snapshot.status {
                    record.status = Some(status);
                }
                record.updated_at = now;
                record.updated_wall = wall;
            })
            .or_insert_with(|| TrackedState {
                position: snapshot.current_time,
                status: snapshot.status,
                updated_at: now,
                updated_wall: wall,
            });

        tracing::trace!(
            endpoint_id = %endpoint_id,
            current_time = ?snapshot.current_time,
            status = ?snapshot.status,
            "Snapshot ingested"
        );
        true
    }

    /// Parse a raw inbound message and ingest it; unrecognized messages are ignored
    pub fn ingest_raw(&self, endpoint_id: &str, raw: &str) -> bool {
        match StatusSnapshot::parse(raw) {
            Some(snapshot) => self.ingest(endpoint_id, &snapshot),
            None => {
                tracing::trace!(endpoint_id = %endpoint_id, "Ignoring unrecognized message");
                false
            }
        }
    }

    /// Copy of the endpoint's record
    pub fn get(&self, endpoint_id: &str) -> Option<TrackedState> {
        self.records.get(endpoint_id).map(|r| r.value().clone())
    }

    /// Discard the endpoint's record
    pub fn remove(&self, endpoint_id: &str) -> Option<TrackedState> {
        self.records.remove(endpoint_id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_ingest_creates_record() {
        let tracker = StateTracker::new();
        let now = Instant::now();
        assert!(tracker.ingest_at("a", &StatusSnapshot::new(4.0, PlayerStatus::Playing), now));

        let record = tracker.get("a").unwrap();
        assert_eq!(record.position, Some(4.0));
        assert_eq!(record.status, Some(PlayerStatus::Playing));
        assert_eq!(record.updated_at, now);
        assert!(record.is_playing());
    }

    #[test]
    fn test_missing_fields_are_kept() {
        let tracker = StateTracker::new();
        let t0 = Instant::now();
        tracker.ingest_at("a", &StatusSnapshot::new(4.0, PlayerStatus::Playing), t0);

        let t1 = t0 + Duration::from_millis(250);
        tracker.ingest_at("a", &StatusSnapshot::status(PlayerStatus::Paused), t1);

        let record = tracker.get("a").unwrap();
        assert_eq!(record.position, Some(4.0));
        assert_eq!(record.status, Some(PlayerStatus::Paused));
        assert_eq!(record.updated_at, t1);

        let t2 = t1 + Duration::from_millis(250);
        tracker.ingest_at("a", &StatusSnapshot::position(4.5), t2);
        let record = tracker.get("a").unwrap();
        assert_eq!(record.position, Some(4.5));
        assert_eq!(record.status, Some(PlayerStatus::Paused));
    }

    #[test]
    fn test_empty_snapshot_is_full_noop() {
        let tracker = StateTracker::new();
        let t0 = Instant::now();
        tracker.ingest_at("a", &StatusSnapshot::new(1.0, PlayerStatus::Playing), t0);

        let later = t0 + Duration::from_secs(5);
        assert!(!tracker.ingest_at("a", &StatusSnapshot::default(), later));
        assert_eq!(tracker.get("a").unwrap().updated_at, t0);

        assert!(!tracker.ingest_at("b", &StatusSnapshot::default(), later));
        assert!(tracker.get("b").is_none());
    }

    #[test]
    fn test_malformed_raw_message_is_ignored() {
        let tracker = StateTracker::new();
        tracker.ingest_raw("a", r#"{"event":"status","currentTime":2.0,"playerState":1}"#);
        let before = tracker.get("a").unwrap();

        assert!(!tracker.ingest_raw("a", "{garbage"));
        assert!(!tracker.ingest_raw("a", r#"{"event":"status","currentTime":"soon"}"#));
        assert_eq!(tracker.get("a").unwrap(), before);
    }

    #[test]
    fn test_remove() {
        let tracker = StateTracker::new();
        tracker.ingest("a", &StatusSnapshot::position(1.0));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.remove("a").is_some());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_concurrent_ingest_last_write_wins_per_key() {
        let tracker = Arc::new(StateTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let id = format!("endpoint-{}", worker);
                    for i in 0..200 {
                        tracker.ingest(&id, &StatusSnapshot::position(i as f64));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for worker in 0..4 {
            let record = tracker.get(&format!("endpoint-{}", worker)).unwrap();
            assert_eq!(record.position, Some(199.0));
        }
    }
}
