//! Wire protocol between the core and player endpoints
//!
//! Endpoints push status snapshots; the core pushes commands back. Both
//! directions are JSON text messages and neither side waits for a reply.
//!
//! Inbound shapes accepted:
//!
//! ```text
//! { "event": "status", "currentTime": 12.5, "playerState": 1 }
//! { "event": "infoDelivery", "info": { "currentTime": 12.5, "playerState": 1 } }
//! ```
//!
//! Outbound shapes:
//!
//! ```text
//! { "event": "command", "func": "seekTo", "args": [12.5, true] }
//! { "event": "listening" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status codes at or above this value are ad interstitials
pub const AD_STATUS_THRESHOLD: i64 = 100;

/// Playback status reported by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum PlayerStatus {
    /// -1
    NotStarted,
    /// 0
    Ended,
    /// 1
    Playing,
    /// 2
    Paused,
    /// 3
    Buffering,
    /// 5
    Cued,
    /// Any code >= [`AD_STATUS_THRESHOLD`]
    Ad(i64),
    /// Codes the player API does not define
    Unknown(i64),
}

impl PlayerStatus {
    /// Numeric code as sent by the player
    pub fn code(&self) -> i64 {
        match self {
            PlayerStatus::NotStarted => -1,
            PlayerStatus::Ended => 0,
            PlayerStatus::Playing => 1,
            PlayerStatus::Paused => 2,
            PlayerStatus::Buffering => 3,
            PlayerStatus::Cued => 5,
            PlayerStatus::Ad(code) | PlayerStatus::Unknown(code) => *code,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerStatus::Playing)
    }

    /// Human-readable label for diagnostics
    pub fn label(&self) -> String {
        match self {
            PlayerStatus::NotStarted => "not-started".to_string(),
            PlayerStatus::Ended => "ended".to_string(),
            PlayerStatus::Playing => "playing".to_string(),
            PlayerStatus::Paused => "paused".to_string(),
            PlayerStatus::Buffering => "buffering".to_string(),
            PlayerStatus::Cued => "cued".to_string(),
            PlayerStatus::Ad(_) => "ad".to_string(),
            PlayerStatus::Unknown(code) => format!("unknown({})", code),
        }
    }
}

impl From<i64> for PlayerStatus {
    fn from(code: i64) -> Self {
        match code {
            -1 => PlayerStatus::NotStarted,
            0 => PlayerStatus::Ended,
            1 => PlayerStatus::Playing,
            2 => PlayerStatus::Paused,
            3 => PlayerStatus::Buffering,
            5 => PlayerStatus::Cued,
            c if c >= AD_STATUS_THRESHOLD => PlayerStatus::Ad(c),
            c => PlayerStatus::Unknown(c),
        }
    }
}

impl From<PlayerStatus> for i64 {
    fn from(status: PlayerStatus) -> Self {
        status.code()
    }
}

/// Fields extracted from one inbound status event
///
/// Absent fields mean "not reported in this event", not "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusSnapshot {
    /// Reported playback position in seconds
    pub current_time: Option<f64>,
    /// Reported status code
    pub status: Option<PlayerStatus>,
}

impl StatusSnapshot {
    /// Snapshot carrying both fields
    pub fn new(current_time: f64, status: PlayerStatus) -> Self {
        Self {
            current_time: Some(current_time),
            status: Some(status),
        }
    }

    /// Snapshot carrying only a position
    pub fn position(current_time: f64) -> Self {
        Self {
            current_time: Some(current_time),
            status: None,
        }
    }

    /// Snapshot carrying only a status
    pub fn status(status: PlayerStatus) -> Self {
        Self {
            current_time: None,
            status: Some(status),
        }
    }

    /// True when the event carried no recognized field
    pub fn is_empty(&self) -> bool {
        self.current_time.is_none() && self.status.is_none()
    }

    /// Parse a raw JSON text message
    ///
    /// Returns `None` for anything that is not a recognized status event.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&value)
    }

    /// Extract a snapshot from an already-decoded JSON value
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let fields = match object.get("event").and_then(Value::as_str)? {
            "status" => object,
            "infoDelivery" => object.get("info")?.as_object()?,
            _ => return None,
        };

        let current_time = fields
            .get("currentTime")
            .and_then(Value::as_f64)
            .filter(|t| t.is_finite());
        let status = fields
            .get("playerState")
            .and_then(integral_code)
            .map(PlayerStatus::from);

        Some(Self {
            current_time,
            status,
        })
    }
}

fn integral_code(value: &Value) -> Option<i64> {
    if let Some(code) = value.as_i64() {
        return Some(code);
    }
    let float = value.as_f64()?;
    if float.is_finite() && float.fract() == 0.0 {
        Some(float as i64)
    } else {
        None
    }
}

/// The fixed vocabulary of commands an endpoint may receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    Play,
    Pause,
    Mute,
    Unmute,
    SetVolume,
    Seek,
    SetPlaybackRate,
}

impl CommandKind {
    /// All allow-listed commands
    pub const ALL: [CommandKind; 7] = [
        CommandKind::Play,
        CommandKind::Pause,
        CommandKind::Mute,
        CommandKind::Unmute,
        CommandKind::SetVolume,
        CommandKind::Seek,
        CommandKind::SetPlaybackRate,
    ];

    /// Resolve a command name, accepting both the abstract and the player-native spelling
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "play" | "playVideo" => Some(CommandKind::Play),
            "pause" | "pauseVideo" => Some(CommandKind::Pause),
            "mute" => Some(CommandKind::Mute),
            "unmute" | "unMute" => Some(CommandKind::Unmute),
            "set-volume" | "setVolume" => Some(CommandKind::SetVolume),
            "seek" | "seekTo" => Some(CommandKind::Seek),
            "set-playback-rate" | "setPlaybackRate" => Some(CommandKind::SetPlaybackRate),
            _ => None,
        }
    }

    /// Abstract name
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Play => "play",
            CommandKind::Pause => "pause",
            CommandKind::Mute => "mute",
            CommandKind::Unmute => "unmute",
            CommandKind::SetVolume => "set-volume",
            CommandKind::Seek => "seek",
            CommandKind::SetPlaybackRate => "set-playback-rate",
        }
    }

    /// Name the player API expects in the `func` field
    pub fn wire_name(&self) -> &'static str {
        match self {
            CommandKind::Play => "playVideo",
            CommandKind::Pause => "pauseVideo",
            CommandKind::Mute => "mute",
            CommandKind::Unmute => "unMute",
            CommandKind::SetVolume => "setVolume",
            CommandKind::Seek => "seekTo",
            CommandKind::SetPlaybackRate => "setPlaybackRate",
        }
    }
}

/// A typed command with its (not yet sanitized) argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Mute,
    Unmute,
    /// Volume 0..=100
    SetVolume(i64),
    /// Target position in seconds; always sent with fast-seek enabled
    Seek(f64),
    /// Rate 0.25..=2.0
    SetPlaybackRate(f64),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Play => CommandKind::Play,
            Command::Pause => CommandKind::Pause,
            Command::Mute => CommandKind::Mute,
            Command::Unmute => CommandKind::Unmute,
            Command::SetVolume(_) => CommandKind::SetVolume,
            Command::Seek(_) => CommandKind::Seek,
            Command::SetPlaybackRate(_) => CommandKind::SetPlaybackRate,
        }
    }

    /// Raw argument list, before sanitization
    pub fn args(&self) -> Vec<Value> {
        match self {
            Command::SetVolume(volume) => vec![Value::from(*volume)],
            Command::Seek(position) => vec![Value::from(*position), Value::Bool(true)],
            Command::SetPlaybackRate(rate) => vec![Value::from(*rate)],
            _ => Vec::new(),
        }
    }
}

/// Messages sent from the core to an endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    /// Player API call
    Command { func: String, args: Vec<Value> },
    /// Subscribe to status pushes
    Listening,
}

impl OutboundMessage {
    /// Build a command message from an already-sanitized argument list
    pub fn command(kind: CommandKind, args: Vec<Value>) -> Self {
        OutboundMessage::Command {
            func: kind.wire_name().to_string(),
            args,
        }
    }

    /// Messages that ask the player to push a fresh status snapshot
    pub fn snapshot_request() -> [OutboundMessage; 3] {
        [
            OutboundMessage::Listening,
            OutboundMessage::Command {
                func: "getPlayerState".to_string(),
                args: Vec::new(),
            },
            OutboundMessage::Command {
                func: "getCurrentTime".to_string(),
                args: Vec::new(),
            },
        ]
    }

    /// Function name if this is a command message
    pub fn func(&self) -> Option<&str> {
        match self {
            OutboundMessage::Command { func, .. } => Some(func),
            OutboundMessage::Listening => None,
        }
    }

    /// Serialize to the JSON text sent on the wire
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
