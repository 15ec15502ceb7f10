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

//! Presence aggregation queries

use crate::error::PresenceResult;
use crate::store::{PageRequest, PlayerStore, PresenceScope};
use metrics::counter;
use moka::future::Cache;
use presence_common::{OnlinePlayer, PageData, Placement};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Scoped online counts and listings over the player store.
///
/// Online counts are cached per scope for a short TTL since they are polled
/// frequently by lobby servers.
#[derive(Clone)]
pub struct PresenceAggregator {
    store: Arc<dyn PlayerStore>,
    counts: Option<Cache<PresenceScope, u64>>,
}

impl PresenceAggregator {
    /// `count_ttl` of `None` disables count caching
    pub fn new(store: Arc<dyn PlayerStore>, count_ttl: Option<Duration>) -> Self {
        let counts = count_ttl.map(|ttl| {
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build()
        });
        Self { store, counts }
    }

    pub async fn count_online(&self, scope: &PresenceScope) -> PresenceResult<u64> {
        let Some(cache) = &self.counts else {
            return Ok(self.store.count_online(scope).await?);
        };

        if let Some(count) = cache.get(scope).await {
            counter!("presence_count_cache_hits_total").increment(1);
            return Ok(count);
        }
        counter!("presence_count_cache_misses_total").increment(1);

        let count = self.store.count_online(scope).await?;
        cache.insert(scope.clone(), count).await;
        Ok(count)
    }

    /// One page of online players in scope, ordered by username
    pub async fn list_online(
        &self,
        scope: &PresenceScope,
        page: PageRequest,
    ) -> PresenceResult<(Vec<OnlinePlayer>, PageData)> {
        let (players, total) = self.store.list_online(scope, page).await?;
        let data = PageData::new(page.page, players.len(), total, page.size);
        Ok((players, data))
    }

    /// Online count per requested fleet, zero for fleets with nobody online
    pub async fn count_by_fleet(&self, fleets: &[String]) -> PresenceResult<BTreeMap<String, u64>> {
        Ok(self.store.count_by_fleet(fleets).await?)
    }

    pub async fn player_servers(&self, player_ids: &[Uuid]) -> PresenceResult<HashMap<Uuid, Placement>> {
        Ok(self.store.player_servers(player_ids).await?)
    }

    pub async fn server_players(&self, server_id: &str) -> PresenceResult<Vec<OnlinePlayer>> {
        Ok(self.store.server_players(server_id).await?)
    }

    pub async fn total_unique_players(&self) -> PresenceResult<u64> {
        Ok(self.store.total_unique_players().await?)
    }

    /// Total playtime across all players in whole hours, rounded down
    pub async fn total_playtime_hours(&self) -> PresenceResult<u64> {
        let total = self.store.total_playtime().await?;
        Ok((total.num_milliseconds() / MILLIS_PER_HOUR).max(0) as u64)
    }
}
