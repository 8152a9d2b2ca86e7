//! Channel hub
//!
//! One [`PlayerChannel`] per endpoint id, shared between the engine's
//! registry record and whichever WebSocket connection is currently attached.
//! Channels outlive connections so an endpoint keeps its registry record
//! while its player reconnects.

use dashmap::DashMap;
use playsync_core::PlayerChannel;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ChannelHub {
    channels: DashMap<String, Arc<PlayerChannel>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel for `id`, created detached on first use
    pub fn channel_for(&self, id: &str) -> Arc<PlayerChannel> {
        self.channels
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(PlayerChannel::detached()))
            .clone()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<PlayerChannel>> {
        self.channels.remove(id).map(|(_, channel)| channel)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
