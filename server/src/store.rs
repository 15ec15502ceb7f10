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

//! Player record store
//!
//! [`PlayerStore`] is the seam between the domain logic and persistence. Every
//! mutation it exposes is a single-row atomic operation; callers never hold a
//! lock across two calls.
//!
//! Two implementations are provided:
//! - [`PostgresPlayerStore`] for production
//! - [`MemoryPlayerStore`] for tests and local development

pub mod memory;
pub mod postgres;

pub use memory::MemoryPlayerStore;
pub use postgres::PostgresPlayerStore;

use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use presence_common::page::Pageable;
use presence_common::{LoginSession, OnlinePlayer, Placement, Player, PlayerSkin, UsernameHistory};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Which online players a presence query covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PresenceScope {
    Global,
    Server(String),
    Fleets(Vec<String>),
}

impl PresenceScope {
    /// Build a scope from optional selectors. A server wins over fleets and
    /// an empty fleet list means global.
    pub fn from_selectors(server_id: Option<String>, fleet_names: Option<Vec<String>>) -> Self {
        match (server_id, fleet_names) {
            (Some(server_id), _) if !server_id.is_empty() => PresenceScope::Server(server_id),
            (_, Some(fleets)) if !fleets.is_empty() => {
                let mut fleets = fleets;
                fleets.sort();
                fleets.dedup();
                PresenceScope::Fleets(fleets)
            }
            _ => PresenceScope::Global,
        }
    }

    pub fn matches(&self, placement: &Placement) -> bool {
        match self {
            PresenceScope::Global => true,
            PresenceScope::Server(server_id) => &placement.server_id == server_id,
            PresenceScope::Fleets(fleets) => fleets.iter().any(|f| f == &placement.fleet_name),
        }
    }
}

/// Resolved page window handed to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.max(1),
        }
    }

    pub fn resolve(pageable: Option<Pageable>, default_size: u32) -> Self {
        let pageable = pageable.unwrap_or(Pageable {
            page: 0,
            size: None,
        });
        Self::new(pageable.page, pageable.size_or(default_size))
    }

    pub fn offset(&self) -> u64 {
        self.page as u64 * self.size as u64
    }
}

/// Outcome of an atomic set-membership update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetUpdate {
    /// The player row exists
    pub matched: bool,
    /// The row was changed
    pub modified: bool,
}

impl SetUpdate {
    pub const MISSING: SetUpdate = SetUpdate {
        matched: false,
        modified: false,
    };
    pub const UNCHANGED: SetUpdate = SetUpdate {
        matched: true,
        modified: false,
    };
    pub const MODIFIED: SetUpdate = SetUpdate {
        matched: true,
        modified: true,
    };
}

#[async_trait]
pub trait PlayerStore: Send + Sync + 'static {
    /// Short backend name for health reporting
    fn name(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;

    // Players

    async fn get_player(&self, player_id: Uuid) -> StoreResult<Option<Player>>;

    /// Known players among `player_ids`; unknown IDs are omitted
    async fn get_players(&self, player_ids: &[Uuid]) -> StoreResult<Vec<Player>>;

    async fn get_player_by_username(
        &self,
        username: &str,
        ignore_case: bool,
    ) -> StoreResult<Option<Player>>;

    /// Case-insensitive prefix search ordered by username. Returns the page and
    /// the total number of matches.
    async fn search_players_by_username(
        &self,
        prefix: &str,
        page: PageRequest,
        online_only: bool,
        exclude_ids: &[Uuid],
    ) -> StoreResult<(Vec<Player>, u64)>;

    /// Insert or fully replace a player record
    async fn upsert_player(&self, player: &Player) -> StoreResult<()>;

    /// Insert a new player record. Returns false, leaving the stored record
    /// untouched, when the id is already taken.
    async fn insert_player(&self, player: &Player) -> StoreResult<bool>;

    /// Apply a connect to an existing player: username, skin (kept when
    /// `None`) and placement. Badges and playtime are left untouched.
    /// Returns false when the player is unknown.
    async fn record_connect(
        &self,
        player_id: Uuid,
        username: &str,
        skin: Option<&PlayerSkin>,
        placement: &Placement,
    ) -> StoreResult<bool>;

    /// Replace the placement of an online player. Returns false when the
    /// player is unknown or offline.
    async fn update_placement(&self, player_id: Uuid, placement: &Placement) -> StoreResult<bool>;

    /// Clear placement, set last-seen and add to playtime in one update
    async fn record_logout(
        &self,
        player_id: Uuid,
        last_seen: DateTime<Utc>,
        added_playtime: Duration,
    ) -> StoreResult<bool>;

    // Badges

    /// Atomic set-insert into the owned badge set
    async fn add_badge(&self, player_id: Uuid, badge_id: &str) -> StoreResult<SetUpdate>;

    /// Atomic set-remove from the owned badge set
    async fn remove_badge(&self, player_id: Uuid, badge_id: &str) -> StoreResult<SetUpdate>;

    /// Write the active badge only if the owned set still equals `expected`
    async fn compare_and_set_active_badge(
        &self,
        player_id: Uuid,
        expected: &[String],
        active: Option<&str>,
    ) -> StoreResult<bool>;

    /// Set the active badge only if it is owned
    async fn set_active_badge_if_owned(
        &self,
        player_id: Uuid,
        badge_id: &str,
    ) -> StoreResult<SetUpdate>;

    // Sessions

    /// Insert an open session. Fails with
    /// [`StoreError::DuplicateOpenSession`](crate::error::StoreError::DuplicateOpenSession)
    /// when one is already open.
    async fn open_session(&self, session: &LoginSession) -> StoreResult<()>;

    /// Close the open session, returning it in its closed form
    async fn close_open_session(
        &self,
        player_id: Uuid,
        logout_time: DateTime<Utc>,
    ) -> StoreResult<Option<LoginSession>>;

    async fn current_session(&self, player_id: Uuid) -> StoreResult<Option<LoginSession>>;

    /// Sessions newest first, with the total count
    async fn list_sessions(
        &self,
        player_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<(Vec<LoginSession>, u64)>;

    async fn record_username(&self, entry: &UsernameHistory) -> StoreResult<()>;

    // Presence aggregation

    async fn count_online(&self, scope: &PresenceScope) -> StoreResult<u64>;

    /// Online players ordered by username, with the total count
    async fn list_online(
        &self,
        scope: &PresenceScope,
        page: PageRequest,
    ) -> StoreResult<(Vec<OnlinePlayer>, u64)>;

    /// Online counts for the requested fleets; fleets with nobody online are
    /// present with zero
    async fn count_by_fleet(&self, fleets: &[String]) -> StoreResult<BTreeMap<String, u64>>;

    /// Placement of each online player among `player_ids`
    async fn player_servers(&self, player_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Placement>>;

    async fn server_players(&self, server_id: &str) -> StoreResult<Vec<OnlinePlayer>>;

    async fn total_unique_players(&self) -> StoreResult<u64>;

    async fn total_playtime(&self) -> StoreResult<Duration>;
}
