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

//! Query service
//!
//! Validates requests, bounds every store round trip with the configured
//! timeout and turns records into response views. Transport agnostic; the HTTP
//! router in [`crate::http`] is a thin layer over it.

use crate::aggregator::PresenceAggregator;
use crate::badges::BadgeResolver;
use crate::config::QueryConfig;
use crate::error::{PresenceError, PresenceResult};
use crate::ledger::SessionLedger;
use crate::store::{PageRequest, PlayerStore, PresenceScope};
use presence_common::api::{
    ActiveBadgeResponse, BadgesResponse, CountResponse, FleetCountsRequest, FleetCountsResponse,
    GlobalSummaryRequest, GlobalSummaryResponse, LoginSessionView, LoginSessionsResponse,
    OnlinePlayersResponse, PlayerBadgesResponse, PlayerIdsRequest, PlayerServersResponse,
    PlayerView, PlayersResponse, PlaytimeResponse, ScopeRequest, SearchPlayersRequest,
    SearchPlayersResponse,
};
use presence_common::{PageData, Pageable, Player};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Parse a caller supplied player ID
pub fn parse_player_id(raw: &str) -> PresenceResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| PresenceError::Validation(format!("invalid player id {raw}")))
}

fn parse_player_ids(raw: &[String]) -> PresenceResult<Vec<Uuid>> {
    raw.iter().map(|id| parse_player_id(id)).collect()
}

fn require_non_empty(value: &str, what: &str) -> PresenceResult<()> {
    if value.trim().is_empty() {
        return Err(PresenceError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn PlayerStore>,
    ledger: SessionLedger,
    badges: BadgeResolver,
    aggregator: PresenceAggregator,
    timeout: Duration,
    default_page_size: u32,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn PlayerStore>,
        badges: BadgeResolver,
        aggregator: PresenceAggregator,
        config: &QueryConfig,
    ) -> Self {
        Self {
            ledger: SessionLedger::new(store.clone()),
            store,
            badges,
            aggregator,
            timeout: config.timeout(),
            default_page_size: config.default_page_size,
        }
    }

    /// Run a store-bound operation under the per-call timeout
    async fn bounded<T>(&self, operation: impl Future<Output = PresenceResult<T>>) -> PresenceResult<T> {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Store call timed out");
                Err(PresenceError::Timeout(self.timeout))
            }
        }
    }

    fn page(&self, pageable: Option<Pageable>) -> PageRequest {
        PageRequest::resolve(pageable, self.default_page_size)
    }

    async fn view(&self, player: Player) -> PresenceResult<PlayerView> {
        let session = if player.is_online() {
            self.ledger.current(player.id).await?
        } else {
            None
        };
        Ok(PlayerView::new(player, session))
    }

    // Players

    pub async fn get_player(&self, player_id: &str) -> PresenceResult<PlayerView> {
        let player_id = parse_player_id(player_id)?;
        self.bounded(async {
            let player = self
                .store
                .get_player(player_id)
                .await?
                .ok_or(PresenceError::PlayerNotFound(player_id))?;
            self.view(player).await
        })
        .await
    }

    /// Known players among the requested IDs; unknown IDs are omitted
    pub async fn get_players(&self, request: PlayerIdsRequest) -> PresenceResult<PlayersResponse> {
        let player_ids = parse_player_ids(&request.player_ids)?;
        self.bounded(async {
            let players = self.store.get_players(&player_ids).await?;
            let mut views = Vec::with_capacity(players.len());
            for player in players {
                views.push(self.view(player).await?);
            }
            Ok(PlayersResponse { players: views })
        })
        .await
    }

    pub async fn get_player_by_username(
        &self,
        username: &str,
        ignore_case: bool,
    ) -> PresenceResult<PlayerView> {
        require_non_empty(username, "username")?;
        self.bounded(async {
            let player = self
                .store
                .get_player_by_username(username, ignore_case)
                .await?
                .ok_or_else(|| PresenceError::UsernameNotFound(username.to_string()))?;
            self.view(player).await
        })
        .await
    }

    pub async fn search_players_by_username(
        &self,
        request: SearchPlayersRequest,
    ) -> PresenceResult<SearchPlayersResponse> {
        require_non_empty(&request.prefix, "prefix")?;
        let exclude_ids = parse_player_ids(&request.exclude_ids)?;
        let page = self.page(request.pageable);
        self.bounded(async {
            let (players, total) = self
                .store
                .search_players_by_username(&request.prefix, page, request.online_only, &exclude_ids)
                .await?;
            let returned = players.len();
            let mut views = Vec::with_capacity(returned);
            for player in players {
                views.push(self.view(player).await?);
            }
            Ok(SearchPlayersResponse {
                players: views,
                page: PageData::new(page.page, returned, total, page.size),
            })
        })
        .await
    }

    pub async fn get_login_sessions(
        &self,
        player_id: &str,
        pageable: Option<Pageable>,
    ) -> PresenceResult<LoginSessionsResponse> {
        let player_id = parse_player_id(player_id)?;
        let page = self.page(pageable);
        self.bounded(async {
            let (sessions, _) = self.ledger.list(player_id, page).await?;
            Ok(LoginSessionsResponse {
                sessions: sessions.into_iter().map(LoginSessionView::from).collect(),
            })
        })
        .await
    }

    // Badges

    pub async fn get_player_badges(&self, player_id: &str) -> PresenceResult<PlayerBadgesResponse> {
        let player_id = parse_player_id(player_id)?;
        self.bounded(async {
            let (badges, active_badge_id) = self.badges.player_badges(player_id).await?;
            Ok(PlayerBadgesResponse {
                badges: badges.iter().map(|b| b.to_view()).collect(),
                active_badge_id,
            })
        })
        .await
    }

    pub async fn get_active_player_badge(&self, player_id: &str) -> PresenceResult<ActiveBadgeResponse> {
        let player_id = parse_player_id(player_id)?;
        self.bounded(async {
            let badge = self.badges.active_badge(player_id).await?;
            Ok(ActiveBadgeResponse {
                badge: badge.to_view(),
            })
        })
        .await
    }

    pub async fn add_badge_to_player(&self, player_id: &str, badge_id: &str) -> PresenceResult<()> {
        let player_id = parse_player_id(player_id)?;
        require_non_empty(badge_id, "badge_id")?;
        self.bounded(self.badges.add_badge(player_id, badge_id)).await
    }

    pub async fn remove_badge_from_player(&self, player_id: &str, badge_id: &str) -> PresenceResult<()> {
        let player_id = parse_player_id(player_id)?;
        require_non_empty(badge_id, "badge_id")?;
        self.bounded(self.badges.remove_badge(player_id, badge_id)).await
    }

    pub async fn set_active_player_badge(&self, player_id: &str, badge_id: &str) -> PresenceResult<()> {
        let player_id = parse_player_id(player_id)?;
        require_non_empty(badge_id, "badge_id")?;
        self.bounded(self.badges.set_active(player_id, badge_id)).await
    }

    pub fn get_badges(&self) -> BadgesResponse {
        BadgesResponse {
            badges: self.badges.list_badges().iter().map(|b| b.to_view()).collect(),
        }
    }

    // Tracker

    pub async fn get_player_servers(&self, request: PlayerIdsRequest) -> PresenceResult<PlayerServersResponse> {
        let player_ids = parse_player_ids(&request.player_ids)?;
        self.bounded(async {
            Ok(PlayerServersResponse {
                servers: self.aggregator.player_servers(&player_ids).await?,
            })
        })
        .await
    }

    pub async fn get_server_players(&self, server_id: &str) -> PresenceResult<OnlinePlayersResponse> {
        require_non_empty(server_id, "server_id")?;
        self.bounded(async {
            Ok(OnlinePlayersResponse {
                players: self.aggregator.server_players(server_id).await?,
            })
        })
        .await
    }

    pub async fn get_player_count(&self, request: ScopeRequest) -> PresenceResult<CountResponse> {
        let scope = PresenceScope::from_selectors(request.server_id, request.fleet_names);
        self.bounded(async {
            Ok(CountResponse {
                count: self.aggregator.count_online(&scope).await?,
            })
        })
        .await
    }

    pub async fn get_fleet_player_counts(
        &self,
        request: FleetCountsRequest,
    ) -> PresenceResult<FleetCountsResponse> {
        if request.fleet_names.iter().any(|f| f.trim().is_empty()) {
            return Err(PresenceError::Validation(
                "fleet names must not be empty".to_string(),
            ));
        }
        self.bounded(async {
            Ok(FleetCountsResponse {
                counts: self.aggregator.count_by_fleet(&request.fleet_names).await?,
            })
        })
        .await
    }

    pub async fn get_global_players_summary(
        &self,
        request: GlobalSummaryRequest,
    ) -> PresenceResult<GlobalSummaryResponse> {
        let scope = PresenceScope::from_selectors(request.scope.server_id, request.scope.fleet_names);
        let page = self.page(request.pageable);
        self.bounded(async {
            let (players, page) = self.aggregator.list_online(&scope, page).await?;
            Ok(GlobalSummaryResponse { players, page })
        })
        .await
    }

    // Stats

    pub async fn get_stat_total_unique_players(&self) -> PresenceResult<CountResponse> {
        self.bounded(async {
            Ok(CountResponse {
                count: self.aggregator.total_unique_players().await?,
            })
        })
        .await
    }

    pub async fn get_stat_total_playtime(&self) -> PresenceResult<PlaytimeResponse> {
        self.bounded(async {
            Ok(PlaytimeResponse {
                playtime_hours: self.aggregator.total_playtime_hours().await?,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BadgeCatalog, CatalogHandle};
    use crate::error::ErrorKind;
    use crate::store::MemoryPlayerStore;
    use chrono::Utc;
    use presence_common::Placement;

    fn service(store: Arc<MemoryPlayerStore>, timeout_ms: u64) -> QueryService {
        let badges = BadgeResolver::new(store.clone(), CatalogHandle::new(BadgeCatalog::default()));
        let aggregator = PresenceAggregator::new(store.clone(), None);
        let config = QueryConfig {
            timeout_ms,
            ..QueryConfig::default()
        };
        QueryService::new(store, badges, aggregator, &config)
    }

    #[test]
    fn test_parse_player_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_player_id(&format!(" {id} ")).unwrap(), id);
        assert!(matches!(
            parse_player_id("not-a-uuid"),
            Err(PresenceError::Validation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_call_times_out() {
        let store = Arc::new(MemoryPlayerStore::new());
        let player = Player::first_connect(
            Uuid::new_v4(),
            "Alice",
            None,
            Utc::now(),
            Placement::new("lobby-1-1", "proxy-1-1"),
        );
        store.upsert_player(&player).await.unwrap();
        let service = service(store.clone(), 50);

        store.set_latency(Duration::from_secs(30));
        let error = service.get_player(&player.id.to_string()).await.unwrap_err();
        assert!(matches!(error, PresenceError::Timeout(t) if t == Duration::from_millis(50)));
        assert_eq!(error.kind(), ErrorKind::Unavailable);

        store.set_latency(Duration::ZERO);
        let view = service.get_player(&player.id.to_string()).await.unwrap();
        assert_eq!(view.username, "Alice");
    }
}
