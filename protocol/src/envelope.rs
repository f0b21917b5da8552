use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::Serializable;

/// Kinds of messages that travel between the game engine, the messenger and
/// the clients. The set is closed: anything else on the wire is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Hello,
    Page,
    Info,
    PlayerMessage,
    GamesInfo,
    GameCreated,
    GameEnded,
    Wall,
    Shutdown,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Hello => "hello",
            EventKind::Page => "page",
            EventKind::Info => "info",
            EventKind::PlayerMessage => "player_message",
            EventKind::GamesInfo => "games_info",
            EventKind::GameCreated => "game_created",
            EventKind::GameEnded => "game_ended",
            EventKind::Wall => "wall",
            EventKind::Shutdown => "shutdown",
        }
    }

    pub fn from_str(kind: &str) -> Result<Self, ProtocolError> {
        match kind {
            "hello" => Ok(EventKind::Hello),
            "page" => Ok(EventKind::Page),
            "info" => Ok(EventKind::Info),
            "player_message" => Ok(EventKind::PlayerMessage),
            "games_info" => Ok(EventKind::GamesInfo),
            "game_created" => Ok(EventKind::GameCreated),
            "game_ended" => Ok(EventKind::GameEnded),
            "wall" => Ok(EventKind::Wall),
            "shutdown" => Ok(EventKind::Shutdown),
            _ => Err(ProtocolError::UnknownKind(kind.to_string())),
        }
    }
}

/// One wire message: a kind, an optional shared-secret key, and a free-form
/// JSON payload. On the wire it is a single JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: EventKind, data: Value) -> Self {
        Envelope {
            kind,
            key: None,
            data,
        }
    }

    pub fn with_key(kind: EventKind, key: &str, data: Value) -> Self {
        Envelope {
            kind,
            key: Some(key.to_string()),
            data,
        }
    }

    /// True when the envelope carries exactly the expected shared key.
    pub fn authenticates(&self, key: &str) -> bool {
        self.key.as_deref() == Some(key)
    }
}

impl Serializable for Envelope {
    fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice::<Envelope>(bytes).map_err(|e| {
            // Distinguish an unknown "type" from plain garbage so callers can
            // log something useful.
            if let Ok(value) = serde_json::from_slice::<Value>(bytes) {
                if let Some(kind) = value.get("type").and_then(Value::as_str) {
                    if EventKind::from_str(kind).is_err() {
                        return ProtocolError::UnknownKind(kind.to_string());
                    }
                }
            }
            ProtocolError::Malformed(e.to_string())
        })
    }
}
