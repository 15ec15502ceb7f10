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

//! Player record types

use crate::fleet::parse_fleet;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authoritative record of a single player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable player identifier
    pub id: Uuid,

    /// Most recently observed username
    pub current_username: String,

    /// Most recently observed skin
    pub current_skin: Option<PlayerSkin>,

    /// Timestamp of the first observed connect
    pub first_seen: DateTime<Utc>,

    /// Timestamp of the last disconnect. Only meaningful while offline.
    pub last_seen: DateTime<Utc>,

    /// Sum of all closed session durations
    #[serde(with = "duration_millis")]
    pub total_playtime: Duration,

    /// Owned badge identifiers, unique
    pub badges: Vec<String>,

    /// Displayed badge, always a member of `badges` when present
    pub active_badge: Option<String>,

    /// Current placement, present iff the player is online
    pub placement: Option<Placement>,
}

impl Player {
    /// Create the record for a player seen for the first time
    pub fn first_connect(
        id: Uuid,
        username: impl Into<String>,
        skin: Option<PlayerSkin>,
        at: DateTime<Utc>,
        placement: Placement,
    ) -> Self {
        Self {
            id,
            current_username: username.into(),
            current_skin: skin,
            first_seen: at,
            last_seen: at,
            total_playtime: Duration::zero(),
            badges: Vec::new(),
            active_badge: None,
            placement: Some(placement),
        }
    }

    pub fn is_online(&self) -> bool {
        self.placement.is_some()
    }

    pub fn owns_badge(&self, badge_id: &str) -> bool {
        self.badges.iter().any(|b| b == badge_id)
    }

    pub fn to_online_player(&self) -> Option<OnlinePlayer> {
        self.placement.as_ref().map(|placement| OnlinePlayer {
            player_id: self.id,
            username: self.current_username.clone(),
            placement: placement.clone(),
        })
    }
}

/// Where an online player currently is
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    /// Game server instance
    pub server_id: String,

    /// Gateway / proxy the player is connected through
    pub proxy_id: String,

    /// Fleet derived from `server_id`
    pub fleet_name: String,
}

impl Placement {
    /// Build a placement, deriving the fleet name from the server identifier
    pub fn new(server_id: impl Into<String>, proxy_id: impl Into<String>) -> Self {
        let server_id = server_id.into();
        let fleet_name = parse_fleet(&server_id).to_string();
        Self {
            server_id,
            proxy_id: proxy_id.into(),
            fleet_name,
        }
    }

    /// Move to another server behind the same proxy
    pub fn switch_server(&self, server_id: impl Into<String>) -> Self {
        Self::new(server_id, self.proxy_id.clone())
    }
}

/// Player skin as reported by the proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSkin {
    pub texture: String,
    pub signature: String,
}

/// Append-only record of an observed username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameHistory {
    pub id: Uuid,
    pub player_id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl UsernameHistory {
    pub fn new(player_id: Uuid, username: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            player_id,
            username: username.into(),
            created_at,
        }
    }
}

/// Projection of an online player used by tracker queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlinePlayer {
    pub player_id: Uuid,
    pub username: String,
    pub placement: Placement,
}

/// Serialize `chrono::Duration` as whole milliseconds
pub mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        Ok(Duration::milliseconds(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_connect_defaults() {
        let at = Utc::now();
        let player = Player::first_connect(
            Uuid::new_v4(),
            "Alice",
            None,
            at,
            Placement::new("lobby-7f9c-a1b2", "proxy-1a2b-3c4d"),
        );
        assert!(player.is_online());
        assert_eq!(player.first_seen, at);
        assert_eq!(player.total_playtime, Duration::zero());
        assert!(player.badges.is_empty());
        assert!(player.active_badge.is_none());
    }

    #[test]
    fn test_placement_derives_fleet() {
        let placement = Placement::new("mini-games-lobby-7f9c-a1b2", "proxy-0-0");
        assert_eq!(placement.fleet_name, "mini-games-lobby");

        let switched = placement.switch_server("bedwars-5d6e-7f80");
        assert_eq!(switched.fleet_name, "bedwars");
        assert_eq!(switched.proxy_id, "proxy-0-0");
    }

    #[test]
    fn test_playtime_serializes_as_millis() {
        let mut player = Player::first_connect(
            Uuid::new_v4(),
            "Bob",
            None,
            Utc::now(),
            Placement::new("lobby-a-b", "proxy-a-b"),
        );
        player.total_playtime = Duration::seconds(90);
        let json = serde_json::to_value(&player).unwrap();
        assert_eq!(json["total_playtime"], 90_000);

        let back: Player = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_playtime, Duration::seconds(90));
    }
}
