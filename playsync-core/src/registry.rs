//! Endpoint registry
//!
//! An arena of endpoint records in registration order. Registration order
//! matters: it breaks ties in leader selection. The registry is read once
//! per tick (a cheap snapshot of `Arc` handles) and mutated by the host.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::channel::EndpointChannel;
use crate::{Error, Result};

/// Saved tile placement for the host UI; never used by synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileMetadata {
    #[serde(default)]
    pub cell_col: Option<u32>,
    #[serde(default)]
    pub cell_row: Option<u32>,
    #[serde(default)]
    pub tile_width: Option<u32>,
    #[serde(default)]
    pub tile_height: Option<u32>,
}

/// One managed player
#[derive(Clone)]
pub struct Endpoint {
    /// Stable identifier
    pub id: String,
    /// Synchronization group; ungrouped endpoints are never reconciled
    pub group: Option<String>,
    /// Added to the leader position when computing this endpoint's target
    pub offset_ms: i64,
    pub metadata: Option<TileMetadata>,
    channel: Arc<dyn EndpointChannel>,
}

impl Endpoint {
    /// Create an ungrouped endpoint with zero offset
    pub fn new(id: impl Into<String>, channel: Arc<dyn EndpointChannel>) -> Self {
        Self {
            id: id.into(),
            group: None,
            offset_ms: 0,
            metadata: None,
            channel,
        }
    }

    /// Set the synchronization group
    pub fn with_group(mut self, group: Option<impl Into<String>>) -> Self {
        self.group = normalize_group(group.map(Into::into));
        self
    }

    /// Set the offset in milliseconds
    pub fn with_offset_ms(mut self, offset_ms: i64) -> Self {
        self.offset_ms = offset_ms;
        self
    }

    /// Set restored tile metadata
    pub fn with_metadata(mut self, metadata: Option<TileMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn channel(&self) -> &Arc<dyn EndpointChannel> {
        &self.channel
    }

    pub fn is_available(&self) -> bool {
        self.channel.is_available()
    }

    /// Offset in seconds
    pub fn offset_secs(&self) -> f64 {
        self.offset_ms as f64 / 1000.0
    }

    /// Serializable view for persistence
    pub fn entry(&self) -> EndpointEntry {
        EndpointEntry {
            id: self.id.clone(),
            group: self.group.clone(),
            offset_ms: self.offset_ms,
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("offset_ms", &self.offset_ms)
            .field("available", &self.channel.is_available())
            .finish()
    }
}

/// Persisted form of an endpoint, without its transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointEntry {
    pub id: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub offset_ms: i64,
    #[serde(default)]
    pub metadata: Option<TileMetadata>,
}

fn normalize_group(group: Option<String>) -> Option<String> {
    group.filter(|g| !g.trim().is_empty())
}

/// Registry of endpoints in registration order
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<Vec<Endpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the id is empty or already registered.
    pub fn add(&self, endpoint: Endpoint) -> Result<()> {
        if endpoint.id.trim().is_empty() {
            return Err(Error::InvalidConfig("endpoint id must not be empty".to_string()));
        }
        let mut endpoints = self.endpoints.write();
        if endpoints.iter().any(|e| e.id == endpoint.id) {
            return Err(Error::DuplicateEndpoint(endpoint.id));
        }
        endpoints.push(endpoint);
        Ok(())
    }

    /// Remove an endpoint, returning its record
    pub fn remove(&self, id: &str) -> Result<Endpoint> {
        let mut endpoints = self.endpoints.write();
        let index = endpoints
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::EndpointNotFound(id.to_string()))?;
        Ok(endpoints.remove(index))
    }

    /// Move an endpoint to another group; `None` or an empty name ungroups it
    pub fn set_group(&self, id: &str, group: Option<String>) -> Result<()> {
        self.update(id, |endpoint| endpoint.group = normalize_group(group))
    }

    pub fn set_offset(&self, id: &str, offset_ms: i64) -> Result<()> {
        self.update(id, |endpoint| endpoint.offset_ms = offset_ms)
    }

    fn update(&self, id: &str, f: impl FnOnce(&mut Endpoint)) -> Result<()> {
        let mut endpoints = self.endpoints.write();
        let endpoint = endpoints
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::EndpointNotFound(id.to_string()))?;
        f(endpoint);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Endpoint> {
        self.endpoints.read().iter().find(|e| e.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.endpoints.read().iter().any(|e| e.id == id)
    }

    /// All endpoints in registration order
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.endpoints.read().clone()
    }

    /// Persistable entries in registration order
    pub fn export(&self) -> Vec<EndpointEntry> {
        self.endpoints.read().iter().map(Endpoint::entry).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }
}

/// Members of each group, in order of first appearance
///
/// Ungrouped endpoints are left out.
pub fn partition_groups(endpoints: &[Endpoint]) -> Vec<(String, Vec<&Endpoint>)> {
    let mut groups: Vec<(String, Vec<&Endpoint>)> = Vec::new();
    for endpoint in endpoints {
        let Some(group) = endpoint.group.as_deref() else {
            continue;
        };
        match groups.iter_mut().find(|(id, _)| id == group) {
            Some((_, members)) => members.push(endpoint),
            None => groups.push((group.to_string(), vec![endpoint])),
        }
    }
    groups
}
