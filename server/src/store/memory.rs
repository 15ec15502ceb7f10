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

//! In-memory player store
//!
//! Every operation takes the single write (or read) lock for its whole
//! duration, which gives the same single-row atomicity the PostgreSQL store
//! gets from its statements.

use super::{PageRequest, PlayerStore, PresenceScope, SetUpdate};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use presence_common::{LoginSession, OnlinePlayer, Placement, Player, PlayerSkin, UsernameHistory};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    players: HashMap<Uuid, Player>,
    sessions: HashMap<Uuid, Vec<LoginSession>>,
    usernames: Vec<UsernameHistory>,
}

impl State {
    fn online(&self, scope: &PresenceScope) -> Vec<OnlinePlayer> {
        let mut online: Vec<OnlinePlayer> = self
            .players
            .values()
            .filter_map(Player::to_online_player)
            .filter(|p| scope.matches(&p.placement))
            .collect();
        online.sort_by(|a, b| {
            a.username
                .to_lowercase()
                .cmp(&b.username.to_lowercase())
                .then(a.player_id.cmp(&b.player_id))
        });
        online
    }
}

fn window<T>(items: Vec<T>, page: PageRequest) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.size as usize)
        .collect()
}

/// Player store held entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryPlayerStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryPlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`StoreError::Unavailable`] until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before it touches the store
    pub fn set_latency(&self, latency: std::time::Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Username history entries for one player, oldest first
    pub async fn username_history(&self, player_id: Uuid) -> Vec<UsernameHistory> {
        let state = self.state.read().await;
        state
            .usernames
            .iter()
            .filter(|entry| entry.player_id == player_id)
            .cloned()
            .collect()
    }

    /// Every session recorded for one player, oldest first
    pub async fn sessions(&self, player_id: Uuid) -> Vec<LoginSession> {
        let state = self.state.read().await;
        state.sessions.get(&player_id).cloned().unwrap_or_default()
    }

    async fn check(&self) -> StoreResult<()> {
        let latency_ms = self.latency_ms.load(Ordering::SeqCst);
        if latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency_ms)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlayerStore for MemoryPlayerStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check().await
    }

    async fn get_player(&self, player_id: Uuid) -> StoreResult<Option<Player>> {
        self.check().await?;
        Ok(self.state.read().await.players.get(&player_id).cloned())
    }

    async fn get_players(&self, player_ids: &[Uuid]) -> StoreResult<Vec<Player>> {
        self.check().await?;
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        Ok(player_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| state.players.get(id).cloned())
            .collect())
    }

    async fn get_player_by_username(
        &self,
        username: &str,
        ignore_case: bool,
    ) -> StoreResult<Option<Player>> {
        self.check().await?;
        let state = self.state.read().await;
        let needle = username.to_lowercase();
        let mut matches: Vec<&Player> = state
            .players
            .values()
            .filter(|p| {
                if ignore_case {
                    p.current_username.to_lowercase() == needle
                } else {
                    p.current_username == username
                }
            })
            .collect();
        // Most recently seen wins when a name was reused
        matches.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(matches.first().map(|p| (*p).clone()))
    }

    async fn search_players_by_username(
        &self,
        prefix: &str,
        page: PageRequest,
        online_only: bool,
        exclude_ids: &[Uuid],
    ) -> StoreResult<(Vec<Player>, u64)> {
        self.check().await?;
        let state = self.state.read().await;
        let prefix = prefix.to_lowercase();
        let mut found: Vec<Player> = state
            .players
            .values()
            .filter(|p| p.current_username.to_lowercase().starts_with(&prefix))
            .filter(|p| !online_only || p.is_online())
            .filter(|p| !exclude_ids.contains(&p.id))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.current_username
                .to_lowercase()
                .cmp(&b.current_username.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        let total = found.len() as u64;
        Ok((window(found, page), total))
    }

    async fn upsert_player(&self, player: &Player) -> StoreResult<()> {
        self.check().await?;
        self.state
            .write()
            .await
            .players
            .insert(player.id, player.clone());
        Ok(())
    }

    async fn insert_player(&self, player: &Player) -> StoreResult<bool> {
        self.check().await?;
        let mut state = self.state.write().await;
        match state.players.entry(player.id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(player.clone());
                Ok(true)
            }
        }
    }

    async fn record_connect(
        &self,
        player_id: Uuid,
        username: &str,
        skin: Option<&PlayerSkin>,
        placement: &Placement,
    ) -> StoreResult<bool> {
        self.check().await?;
        let mut state = self.state.write().await;
        let Some(player) = state.players.get_mut(&player_id) else {
            return Ok(false);
        };
        player.current_username = username.to_string();
        if let Some(skin) = skin {
            player.current_skin = Some(skin.clone());
        }
        player.placement = Some(placement.clone());
        Ok(true)
    }

    async fn update_placement(&self, player_id: Uuid, placement: &Placement) -> StoreResult<bool> {
        self.check().await?;
        let mut state = self.state.write().await;
        match state.players.get_mut(&player_id) {
            Some(player) if player.placement.is_some() => {
                player.placement = Some(placement.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_logout(
        &self,
        player_id: Uuid,
        last_seen: DateTime<Utc>,
        added_playtime: Duration,
    ) -> StoreResult<bool> {
        self.check().await?;
        let mut state = self.state.write().await;
        let Some(player) = state.players.get_mut(&player_id) else {
            return Ok(false);
        };
        player.placement = None;
        player.last_seen = last_seen;
        player.total_playtime += added_playtime;
        Ok(true)
    }

    async fn add_badge(&self, player_id: Uuid, badge_id: &str) -> StoreResult<SetUpdate> {
        self.check().await?;
        let mut state = self.state.write().await;
        let Some(player) = state.players.get_mut(&player_id) else {
            return Ok(SetUpdate::MISSING);
        };
        if player.owns_badge(badge_id) {
            return Ok(SetUpdate::UNCHANGED);
        }
        player.badges.push(badge_id.to_string());
        Ok(SetUpdate::MODIFIED)
    }

    async fn remove_badge(&self, player_id: Uuid, badge_id: &str) -> StoreResult<SetUpdate> {
        self.check().await?;
        let mut state = self.state.write().await;
        let Some(player) = state.players.get_mut(&player_id) else {
            return Ok(SetUpdate::MISSING);
        };
        let before = player.badges.len();
        player.badges.retain(|b| b != badge_id);
        if player.badges.len() == before {
            return Ok(SetUpdate::UNCHANGED);
        }
        Ok(SetUpdate::MODIFIED)
    }

    async fn compare_and_set_active_badge(
        &self,
        player_id: Uuid,
        expected: &[String],
        active: Option<&str>,
    ) -> StoreResult<bool> {
        self.check().await?;
        let mut state = self.state.write().await;
        match state.players.get_mut(&player_id) {
            Some(player) if player.badges == expected => {
                player.active_badge = active.map(str::to_string);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_active_badge_if_owned(
        &self,
        player_id: Uuid,
        badge_id: &str,
    ) -> StoreResult<SetUpdate> {
        self.check().await?;
        let mut state = self.state.write().await;
        let Some(player) = state.players.get_mut(&player_id) else {
            return Ok(SetUpdate::MISSING);
        };
        if !player.owns_badge(badge_id) {
            return Ok(SetUpdate::UNCHANGED);
        }
        player.active_badge = Some(badge_id.to_string());
        Ok(SetUpdate::MODIFIED)
    }

    async fn open_session(&self, session: &LoginSession) -> StoreResult<()> {
        self.check().await?;
        let mut state = self.state.write().await;
        let sessions = state.sessions.entry(session.player_id).or_default();
        if sessions.iter().any(LoginSession::is_open) {
            return Err(StoreError::DuplicateOpenSession(session.player_id));
        }
        sessions.push(session.clone());
        Ok(())
    }

    async fn close_open_session(
        &self,
        player_id: Uuid,
        logout_time: DateTime<Utc>,
    ) -> StoreResult<Option<LoginSession>> {
        self.check().await?;
        let mut state = self.state.write().await;
        let open = state
            .sessions
            .get_mut(&player_id)
            .and_then(|sessions| sessions.iter_mut().find(|s| s.is_open()));
        Ok(open.map(|session| {
            session.logout_time = Some(logout_time);
            session.clone()
        }))
    }

    async fn current_session(&self, player_id: Uuid) -> StoreResult<Option<LoginSession>> {
        self.check().await?;
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(&player_id)
            .and_then(|sessions| sessions.iter().find(|s| s.is_open()).cloned()))
    }

    async fn list_sessions(
        &self,
        player_id: Uuid,
        page: PageRequest,
    ) -> StoreResult<(Vec<LoginSession>, u64)> {
        self.check().await?;
        let state = self.state.read().await;
        let mut sessions = state.sessions.get(&player_id).cloned().unwrap_or_default();
        sessions.sort_by(|a, b| b.login_time.cmp(&a.login_time).then(b.id.cmp(&a.id)));
        let total = sessions.len() as u64;
        Ok((window(sessions, page), total))
    }

    async fn record_username(&self, entry: &UsernameHistory) -> StoreResult<()> {
        self.check().await?;
        self.state.write().await.usernames.push(entry.clone());
        Ok(())
    }

    async fn count_online(&self, scope: &PresenceScope) -> StoreResult<u64> {
        self.check().await?;
        let state = self.state.read().await;
        Ok(state
            .players
            .values()
            .filter_map(|p| p.placement.as_ref())
            .filter(|placement| scope.matches(placement))
            .count() as u64)
    }

    async fn list_online(
        &self,
        scope: &PresenceScope,
        page: PageRequest,
    ) -> StoreResult<(Vec<OnlinePlayer>, u64)> {
        self.check().await?;
        let online = self.state.read().await.online(scope);
        let total = online.len() as u64;
        Ok((window(online, page), total))
    }

    async fn count_by_fleet(&self, fleets: &[String]) -> StoreResult<BTreeMap<String, u64>> {
        self.check().await?;
        let state = self.state.read().await;
        let mut counts: BTreeMap<String, u64> = fleets.iter().map(|f| (f.clone(), 0)).collect();
        for placement in state.players.values().filter_map(|p| p.placement.as_ref()) {
            if let Some(count) = counts.get_mut(&placement.fleet_name) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    async fn player_servers(&self, player_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Placement>> {
        self.check().await?;
        let state = self.state.read().await;
        Ok(player_ids
            .iter()
            .filter_map(|id| {
                state
                    .players
                    .get(id)
                    .and_then(|p| p.placement.clone())
                    .map(|placement| (*id, placement))
            })
            .collect())
    }

    async fn server_players(&self, server_id: &str) -> StoreResult<Vec<OnlinePlayer>> {
        self.check().await?;
        let state = self.state.read().await;
        Ok(state.online(&PresenceScope::Server(server_id.to_string())))
    }

    async fn total_unique_players(&self) -> StoreResult<u64> {
        self.check().await?;
        Ok(self.state.read().await.players.len() as u64)
    }

    async fn total_playtime(&self) -> StoreResult<Duration> {
        self.check().await?;
        let state = self.state.read().await;
        Ok(state
            .players
            .values()
            .fold(Duration::zero(), |total, p| total + p.total_playtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str, server: Option<&str>) -> Player {
        let mut player = Player::first_connect(
            Uuid::new_v4(),
            name,
            None,
            Utc::now(),
            Placement::new(server.unwrap_or("lobby-1-1"), "proxy-1-1"),
        );
        if server.is_none() {
            player.placement = None;
        }
        player
    }

    #[tokio::test]
    async fn test_insert_player_keeps_existing_record() {
        let store = MemoryPlayerStore::new();
        let first = player("Alice", Some("lobby-1-1"));
        assert!(store.insert_player(&first).await.unwrap());
        store.add_badge(first.id, "vip").await.unwrap();

        let mut second = player("Alicia", Some("lobby-2-2"));
        second.id = first.id;
        assert!(!store.insert_player(&second).await.unwrap());

        let stored = store.get_player(first.id).await.unwrap().unwrap();
        assert_eq!(stored.current_username, "Alice");
        assert_eq!(stored.badges, vec!["vip".to_string()]);
    }

    #[tokio::test]
    async fn test_add_badge_is_set_insert() {
        let store = MemoryPlayerStore::new();
        let p = player("Alice", None);
        store.upsert_player(&p).await.unwrap();

        assert_eq!(store.add_badge(p.id, "vip").await.unwrap(), SetUpdate::MODIFIED);
        assert_eq!(store.add_badge(p.id, "vip").await.unwrap(), SetUpdate::UNCHANGED);
        assert_eq!(
            store.add_badge(Uuid::new_v4(), "vip").await.unwrap(),
            SetUpdate::MISSING
        );
        let stored = store.get_player(p.id).await.unwrap().unwrap();
        assert_eq!(stored.badges, vec!["vip".to_string()]);
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_set() {
        let store = MemoryPlayerStore::new();
        let p = player("Alice", None);
        store.upsert_player(&p).await.unwrap();
        store.add_badge(p.id, "a").await.unwrap();

        let stale: Vec<String> = vec![];
        assert!(
            !store
                .compare_and_set_active_badge(p.id, &stale, Some("a"))
                .await
                .unwrap()
        );
        assert!(
            store
                .compare_and_set_active_badge(p.id, &["a".to_string()], Some("a"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_single_open_session() {
        let store = MemoryPlayerStore::new();
        let id = Uuid::new_v4();
        store.open_session(&LoginSession::open(id, Utc::now())).await.unwrap();
        let second = store.open_session(&LoginSession::open(id, Utc::now())).await;
        assert!(matches!(second, Err(StoreError::DuplicateOpenSession(p)) if p == id));

        let closed = store.close_open_session(id, Utc::now()).await.unwrap();
        assert!(closed.is_some_and(|s| !s.is_open()));
        assert!(store.close_open_session(id, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_prefix() {
        let store = MemoryPlayerStore::new();
        let alice = player("Alice", Some("lobby-1-1"));
        let alfred = player("alfred", None);
        let bob = player("Bob", Some("lobby-1-1"));
        for p in [&alice, &alfred, &bob] {
            store.upsert_player(p).await.unwrap();
        }

        let (found, total) = store
            .search_players_by_username("AL", PageRequest::new(0, 10), false, &[])
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(found[0].current_username, "alfred");

        let (found, total) = store
            .search_players_by_username("al", PageRequest::new(0, 10), true, &[])
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].id, alice.id);

        let (_, total) = store
            .search_players_by_username("al", PageRequest::new(0, 10), false, &[alice.id])
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_count_by_fleet_zero_fills() {
        let store = MemoryPlayerStore::new();
        store
            .upsert_player(&player("Alice", Some("lobby-1-1")))
            .await
            .unwrap();
        store
            .upsert_player(&player("Bob", Some("lobby-2-2")))
            .await
            .unwrap();

        let counts = store
            .count_by_fleet(&["lobby".to_string(), "bedwars".to_string()])
            .await
            .unwrap();
        assert_eq!(counts["lobby"], 2);
        assert_eq!(counts["bedwars"], 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_calls() {
        let store = MemoryPlayerStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get_player(Uuid::new_v4()).await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}
