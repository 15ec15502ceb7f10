//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Inbound message-bus events
//!
//! Every delivery is a JSON envelope:
//!
//! ```json
//! {"kind": "player_connect", "timestamp": "2025-01-01T00:00:00Z", "payload": {...}}
//! ```
//!
//! The envelope is decoded first so that an unrecognised `kind` can be
//! reported and skipped without failing the whole delivery.

use crate::player::PlayerSkin;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while decoding a delivery
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The delivery is not a JSON envelope at all.
    #[error("Malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The envelope names an event kind this service does not handle.
    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    /// The payload does not match the schema of its kind.
    #[error("Malformed {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    /// The payload parsed but carries values that cannot be applied.
    #[error("Invalid {kind} payload: {reason}")]
    Invalid { kind: EventKind, reason: String },
}

/// Discriminant of the inbound event union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PlayerConnect,
    PlayerDisconnect,
    PlayerServerSwitch,
    PlayerRoleChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PlayerConnect => "player_connect",
            EventKind::PlayerDisconnect => "player_disconnect",
            EventKind::PlayerServerSwitch => "player_server_switch",
            EventKind::PlayerRoleChanged => "player_role_changed",
        }
    }
}

impl FromStr for EventKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player_connect" => Ok(EventKind::PlayerConnect),
            "player_disconnect" => Ok(EventKind::PlayerDisconnect),
            "player_server_switch" => Ok(EventKind::PlayerServerSwitch),
            "player_role_changed" => Ok(EventKind::PlayerRoleChanged),
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw envelope as it arrives from the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub kind: String,

    /// Producer timestamp. Falls back to the receive time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap an event for publishing
    pub fn new(event: &InboundEvent, timestamp: Option<DateTime<Utc>>) -> serde_json::Result<Self> {
        let payload = match event {
            InboundEvent::PlayerConnect(e) => serde_json::to_value(e),
            InboundEvent::PlayerDisconnect(e) => serde_json::to_value(e),
            InboundEvent::PlayerServerSwitch(e) => serde_json::to_value(e),
            InboundEvent::PlayerRoleChanged(e) => serde_json::to_value(e),
        }?;

        Ok(Self {
            kind: event.kind().as_str().to_string(),
            timestamp,
            payload,
        })
    }

    /// Decode a raw delivery body into a timestamped event
    pub fn decode(body: &[u8], received_at: DateTime<Utc>) -> Result<TimedEvent, DecodeError> {
        let envelope: EventEnvelope =
            serde_json::from_slice(body).map_err(DecodeError::Envelope)?;
        envelope.into_event(received_at)
    }

    pub fn into_event(self, received_at: DateTime<Utc>) -> Result<TimedEvent, DecodeError> {
        let kind = EventKind::from_str(&self.kind)?;
        let payload = self.payload;

        fn parse<T: serde::de::DeserializeOwned>(
            kind: EventKind,
            payload: serde_json::Value,
        ) -> Result<T, DecodeError> {
            serde_json::from_value(payload).map_err(|source| DecodeError::Payload { kind, source })
        }

        let event = match kind {
            EventKind::PlayerConnect => InboundEvent::PlayerConnect(parse(kind, payload)?),
            EventKind::PlayerDisconnect => InboundEvent::PlayerDisconnect(parse(kind, payload)?),
            EventKind::PlayerServerSwitch => {
                InboundEvent::PlayerServerSwitch(parse(kind, payload)?)
            }
            EventKind::PlayerRoleChanged => InboundEvent::PlayerRoleChanged(parse(kind, payload)?),
        };
        event.validate()?;

        Ok(TimedEvent {
            timestamp: self.timestamp.unwrap_or(received_at),
            event,
        })
    }
}

/// An event together with the time it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub timestamp: DateTime<Utc>,
    pub event: InboundEvent,
}

/// Tagged union over every event kind this service consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    PlayerConnect(PlayerConnect),
    PlayerDisconnect(PlayerDisconnect),
    PlayerServerSwitch(PlayerServerSwitch),
    PlayerRoleChanged(PlayerRoleChanged),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::PlayerConnect(_) => EventKind::PlayerConnect,
            InboundEvent::PlayerDisconnect(_) => EventKind::PlayerDisconnect,
            InboundEvent::PlayerServerSwitch(_) => EventKind::PlayerServerSwitch,
            InboundEvent::PlayerRoleChanged(_) => EventKind::PlayerRoleChanged,
        }
    }

    /// Player the event is about; used to partition work
    pub fn player_id(&self) -> Uuid {
        match self {
            InboundEvent::PlayerConnect(e) => e.player_id,
            InboundEvent::PlayerDisconnect(e) => e.player_id,
            InboundEvent::PlayerServerSwitch(e) => e.player_id,
            InboundEvent::PlayerRoleChanged(e) => e.player_id,
        }
    }

    fn validate(&self) -> Result<(), DecodeError> {
        let kind = self.kind();
        let invalid = |reason: &str| DecodeError::Invalid {
            kind,
            reason: reason.to_string(),
        };
        match self {
            InboundEvent::PlayerConnect(e) => {
                if e.username.trim().is_empty() {
                    return Err(invalid("username is empty"));
                }
                if e.server_id.trim().is_empty() {
                    return Err(invalid("server_id is empty"));
                }
            }
            InboundEvent::PlayerDisconnect(_) => {}
            InboundEvent::PlayerServerSwitch(e) => {
                if e.new_server_id.trim().is_empty() {
                    return Err(invalid("new_server_id is empty"));
                }
            }
            InboundEvent::PlayerRoleChanged(e) => {
                if e.role_id.trim().is_empty() {
                    return Err(invalid("role_id is empty"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConnect {
    pub player_id: Uuid,
    pub username: String,
    pub server_id: String,
    /// Proxy the player joined through; defaults to `server_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin: Option<PlayerSkin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDisconnect {
    pub player_id: Uuid,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerServerSwitch {
    pub player_id: Uuid,
    #[serde(alias = "server_id")]
    pub new_server_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRoleChanged {
    pub player_id: Uuid,
    pub role_id: String,
    pub change_type: RoleChangeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleChangeType {
    Add,
    Remove,
}
