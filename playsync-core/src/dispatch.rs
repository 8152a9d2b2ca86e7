//! Command dispatch
//!
//! The only path by which commands reach an endpoint. Names outside the
//! allow-list are dropped, arguments are coerced to safe values, and an
//! unavailable channel turns every call into a silent no-op.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::protocol::{Command, CommandKind, OutboundMessage};
use crate::registry::Endpoint;

const DEFAULT_VOLUME: i64 = 50;
const MIN_RATE: f64 = 0.25;
const MAX_RATE: f64 = 2.0;
const DEFAULT_RATE: f64 = 1.0;

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Commands handed to a channel
    pub sent: u64,
    /// Commands for an unavailable or full channel
    pub dropped: u64,
    /// Commands not in the allow-list
    pub rejected: u64,
}

/// Fire-and-forget command sender
#[derive(Debug, Default)]
pub struct CommandDispatcher {
    sent: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a command by name with raw arguments
    ///
    /// Returns true only if the message was queued on the endpoint's channel.
    pub fn send(&self, endpoint: &Endpoint, func: &str, args: &[Value]) -> bool {
        let Some(kind) = CommandKind::from_name(func) else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(endpoint_id = %endpoint.id, func = %func, "Rejected command outside allow-list");
            return false;
        };
        self.dispatch(endpoint, kind, sanitize_args(kind, args))
    }

    /// Send a typed command
    pub fn send_command(&self, endpoint: &Endpoint, command: &Command) -> bool {
        let kind = command.kind();
        self.dispatch(endpoint, kind, sanitize_args(kind, &command.args()))
    }

    /// Ask the endpoint to push a fresh snapshot
    pub fn request_snapshot(&self, endpoint: &Endpoint) -> bool {
        if !endpoint.is_available() {
            return false;
        }
        tracing::debug!(endpoint_id = %endpoint.id, "Requesting snapshot");
        endpoint.channel().request_snapshot()
    }

    fn dispatch(&self, endpoint: &Endpoint, kind: CommandKind, args: Vec<Value>) -> bool {
        if !endpoint.is_available() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(endpoint_id = %endpoint.id, command = kind.name(), "Channel unavailable");
            return false;
        }

        tracing::debug!(
            endpoint_id = %endpoint.id,
            command = kind.name(),
            args = ?args,
            "Dispatching command"
        );
        if endpoint.channel().deliver(OutboundMessage::command(kind, args)) {
            self.sent.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Coerce raw arguments into the shape the command accepts
pub fn sanitize_args(kind: CommandKind, args: &[Value]) -> Vec<Value> {
    let first = args.first();
    match kind {
        CommandKind::SetVolume => {
            let volume = first
                .and_then(leading_integer)
                .map(|v| v.clamp(0, 100))
                .unwrap_or(DEFAULT_VOLUME);
            vec![Value::from(volume)]
        }
        CommandKind::Seek => {
            let position = first.and_then(finite_number).map(|p| p.max(0.0)).unwrap_or(0.0);
            vec![Value::from(position), Value::Bool(true)]
        }
        CommandKind::SetPlaybackRate => {
            let rate = first
                .and_then(finite_number)
                .filter(|r| (MIN_RATE..=MAX_RATE).contains(r))
                .unwrap_or(DEFAULT_RATE);
            vec![Value::from(rate)]
        }
        CommandKind::Play | CommandKind::Pause | CommandKind::Mute | CommandKind::Unmute => {
            Vec::new()
        }
    }
}

fn finite_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Integer part of a number, or the leading integer of a string ("42px" -> 42)
fn leading_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(i);
            }
            let f = n.as_f64()?;
            // Saturating cast keeps huge values clampable
            f.is_finite().then(|| f.trunc() as i64)
        }
        Value::String(s) => {
            let s = s.trim_start();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            if end == 0 {
                return None;
            }
            let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
            Some(sign * magnitude)
        }
        _ => None,
    }
}
