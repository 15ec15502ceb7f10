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

//! Query API request and response views

use crate::page::{PageData, Pageable};
use crate::player::{OnlinePlayer, Placement, Player, PlayerSkin};
use crate::session::LoginSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Player as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: Uuid,
    pub username: String,
    pub skin: Option<PlayerSkin>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_playtime_ms: i64,
    pub online: bool,
    pub placement: Option<Placement>,
    /// Open session, present while online
    pub current_session: Option<LoginSessionView>,
    pub badges: Vec<String>,
    pub active_badge: Option<String>,
}

impl PlayerView {
    pub fn new(player: Player, current_session: Option<LoginSession>) -> Self {
        Self {
            id: player.id,
            online: player.is_online(),
            username: player.current_username,
            skin: player.current_skin,
            first_seen: player.first_seen,
            last_seen: player.last_seen,
            total_playtime_ms: player.total_playtime.num_milliseconds(),
            placement: player.placement,
            current_session: current_session.map(LoginSessionView::from),
            badges: player.badges,
            active_badge: player.active_badge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginSessionView {
    pub session_id: Uuid,
    pub login_time: DateTime<Utc>,
    pub logout_time: Option<DateTime<Utc>>,
    pub duration_ms: i64,
}

impl From<LoginSession> for LoginSessionView {
    fn from(session: LoginSession) -> Self {
        Self {
            duration_ms: session.duration().num_milliseconds(),
            session_id: session.id,
            login_time: session.login_time,
            logout_time: session.logout_time,
        }
    }
}

/// Badge definition as shown to players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeView {
    pub id: String,
    pub priority: i64,
    pub required: bool,
    pub friendly_name: String,
    pub chat_string: String,
    /// Hover text lines joined with newlines
    pub hover_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gui_item: Option<BadgeGuiItem>,
}

/// Menu item used to display a badge in the selection GUI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeGuiItem {
    /// Show the item even when the badge is not unlocked
    #[serde(default)]
    pub display: bool,
    pub material: String,
    pub display_name: String,
    #[serde(default)]
    pub lore: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerIdsRequest {
    /// Player IDs as strings; malformed IDs are rejected as a whole
    pub player_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayersResponse {
    pub players: Vec<PlayerView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchPlayersRequest {
    /// Case-insensitive username prefix
    pub prefix: String,
    #[serde(default)]
    pub pageable: Option<Pageable>,
    #[serde(default)]
    pub online_only: bool,
    #[serde(default)]
    pub exclude_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPlayersResponse {
    pub players: Vec<PlayerView>,
    pub page: PageData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginSessionsResponse {
    pub sessions: Vec<LoginSessionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeRequest {
    pub badge_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerBadgesResponse {
    pub badges: Vec<BadgeView>,
    pub active_badge_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveBadgeResponse {
    pub badge: BadgeView,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BadgesResponse {
    pub badges: Vec<BadgeView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerServersResponse {
    /// Placement per requested player; offline and unknown players are absent
    pub servers: HashMap<Uuid, Placement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnlinePlayersResponse {
    pub players: Vec<OnlinePlayer>,
}

/// Presence scope selector: server wins over fleets, neither means global
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeRequest {
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub fleet_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSummaryRequest {
    #[serde(flatten)]
    pub scope: ScopeRequest,
    #[serde(default)]
    pub pageable: Option<Pageable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSummaryResponse {
    pub players: Vec<OnlinePlayer>,
    pub page: PageData,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetCountsRequest {
    pub fleet_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetCountsResponse {
    pub counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlaytimeResponse {
    pub playtime_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub serving: bool,
    pub store: String,
}

/// Body returned with every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
}
