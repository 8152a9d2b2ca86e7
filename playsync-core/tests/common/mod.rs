//! Recording channel for tests
//!
//! Captures every outbound message so tests can assert on exactly what an
//! endpoint would have received, without a real transport.

use parking_lot::Mutex;
use playsync_core::{
    Endpoint, EndpointChannel, OutboundMessage, PlayerStatus, StatusSnapshot, SyncEngine,
    SyncSettings,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Channel that records deliveries
pub struct RecordingChannel {
    sent: Mutex<Vec<OutboundMessage>>,
    available: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        })
    }

    /// Simulate the transport going away or coming back
    #[allow(dead_code)]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Drain recorded `(func, args)` pairs of command messages
    pub fn take_commands(&self) -> Vec<(String, Vec<Value>)> {
        self.sent
            .lock()
            .drain(..)
            .filter_map(|message| match message {
                OutboundMessage::Command { func, args } => Some((func, args)),
                OutboundMessage::Listening => None,
            })
            .collect()
    }

    /// Drain and return only the function names
    #[allow(dead_code)]
    pub fn take_funcs(&self) -> Vec<String> {
        self.take_commands().into_iter().map(|(func, _)| func).collect()
    }

    #[allow(dead_code)]
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl EndpointChannel for RecordingChannel {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn deliver(&self, message: OutboundMessage) -> bool {
        if !self.is_available() {
            return false;
        }
        self.sent.lock().push(message);
        true
    }
}

/// Engine plus the recording channel of every endpoint added through it
pub struct Harness {
    pub engine: SyncEngine,
    channels: Vec<(String, Arc<RecordingChannel>)>,
}

impl Harness {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            engine: SyncEngine::new(settings).expect("valid settings"),
            channels: Vec::new(),
        }
    }

    /// Register an endpoint and discard its initial snapshot request
    pub fn add(&mut self, id: &str, group: Option<&str>, offset_ms: i64) -> Arc<RecordingChannel> {
        let channel = RecordingChannel::new();
        let endpoint = Endpoint::new(id, channel.clone())
            .with_group(group)
            .with_offset_ms(offset_ms);
        self.engine.add_endpoint(endpoint).expect("add endpoint");
        channel.clear();
        self.channels.push((id.to_string(), channel.clone()));
        channel
    }

    pub fn report(&self, id: &str, time: f64, status: PlayerStatus) {
        self.engine.ingest(id, &StatusSnapshot::new(time, status));
    }

    #[allow(dead_code)]
    pub fn channel(&self, id: &str) -> Arc<RecordingChannel> {
        self.channels
            .iter()
            .find(|(channel_id, _)| channel_id == id)
            .map(|(_, channel)| channel.clone())
            .expect("known endpoint")
    }

    #[allow(dead_code)]
    pub fn clear_all(&self) {
        for (_, channel) in &self.channels {
            channel.clear();
        }
    }

    #[allow(dead_code)]
    pub fn tick(&self) {
        self.engine.tick_at(Instant::now());
    }
}
