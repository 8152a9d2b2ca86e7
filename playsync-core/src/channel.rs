//! Outbound channel handles for endpoints
//!
//! The registry owns endpoint records; the transport behind them may come
//! and go. A channel that is not available swallows messages instead of
//! failing, so a dead transport leaves an inert endpoint rather than an error.

use parking_lot::RwLock;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::OutboundMessage;

/// Fire-and-forget delivery to one endpoint
pub trait EndpointChannel: Send + Sync {
    /// Whether a transport is currently attached and open
    fn is_available(&self) -> bool;

    /// Queue a message without waiting; returns false if it was dropped
    fn deliver(&self, message: OutboundMessage) -> bool;

    /// Ask the endpoint to push a fresh status snapshot
    fn request_snapshot(&self) -> bool {
        OutboundMessage::snapshot_request()
            .into_iter()
            .fold(true, |ok, message| self.deliver(message) && ok)
    }
}

/// Channel backed by a bounded tokio mpsc sender that can be attached and detached
///
/// Each attach bumps a generation counter so that a stale connection
/// detaching late cannot tear down its replacement.
pub struct PlayerChannel {
    inner: RwLock<Attachment>,
}

struct Attachment {
    sender: Option<mpsc::Sender<OutboundMessage>>,
    generation: u64,
}

impl PlayerChannel {
    /// Channel with no transport attached
    pub fn detached() -> Self {
        Self {
            inner: RwLock::new(Attachment {
                sender: None,
                generation: 0,
            }),
        }
    }

    /// Channel attached to `sender`
    pub fn connected(sender: mpsc::Sender<OutboundMessage>) -> Self {
        let channel = Self::detached();
        channel.attach(sender);
        channel
    }

    /// Attach a transport, replacing any previous one; returns its generation
    pub fn attach(&self, sender: mpsc::Sender<OutboundMessage>) -> u64 {
        let mut inner = self.inner.write();
        inner.generation += 1;
        inner.sender = Some(sender);
        inner.generation
    }

    /// Detach the transport if it is still the one from `generation`
    pub fn detach(&self, generation: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.generation == generation && inner.sender.is_some() {
            inner.sender = None;
            true
        } else {
            false
        }
    }

    /// Drop whatever transport is attached, regardless of generation
    ///
    /// The connection that owned it sees its outbound queue end.
    pub fn close(&self) -> bool {
        self.inner.write().sender.take().is_some()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }
}

impl EndpointChannel for PlayerChannel {
    fn is_available(&self) -> bool {
        self.inner
            .read()
            .sender
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    fn deliver(&self, message: OutboundMessage) -> bool {
        let inner = self.inner.read();
        let Some(sender) = inner.sender.as_ref() else {
            return false;
        };
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

impl fmt::Debug for PlayerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PlayerChannel")
            .field("attached", &inner.sender.is_some())
            .field("generation", &inner.generation)
            .finish()
    }
}
