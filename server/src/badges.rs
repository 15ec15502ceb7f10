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

//! Badge resolver
//!
//! Membership changes go through the store's atomic set primitives. The active
//! badge is the only read-modify-write: it is recomputed from a snapshot of the
//! owned set and written back with a compare-and-set against that snapshot.

use crate::catalog::{BadgeDefinition, CatalogHandle};
use crate::error::{PresenceError, PresenceResult, StoreError};
use crate::store::{PlayerStore, SetUpdate};
use presence_common::RoleChangeType;
use presence_common::event::PlayerRoleChanged;
use std::sync::Arc;
use uuid::Uuid;

/// Attempts made to write a recomputed active badge before giving up
const CAS_ATTEMPTS: usize = 3;

/// What a role change did to the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChangeOutcome {
    Granted(String),
    Revoked(String),
    /// The badge was already in the requested state
    Unchanged(String),
    /// The role grants no badge
    NoBadge,
}

#[derive(Clone)]
pub struct BadgeResolver {
    store: Arc<dyn PlayerStore>,
    catalog: CatalogHandle,
}

impl BadgeResolver {
    pub fn new(store: Arc<dyn PlayerStore>, catalog: CatalogHandle) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &CatalogHandle {
        &self.catalog
    }

    /// Grant a badge. Required badges trigger active badge recomputation.
    #[tracing::instrument(skip(self))]
    pub async fn add_badge(&self, player_id: Uuid, badge_id: &str) -> PresenceResult<()> {
        let catalog = self.catalog.snapshot();
        let badge = catalog
            .get(badge_id)
            .ok_or_else(|| PresenceError::UnknownBadge(badge_id.to_string()))?;

        match self.store.add_badge(player_id, badge_id).await? {
            SetUpdate { matched: false, .. } => return Err(PresenceError::PlayerNotFound(player_id)),
            SetUpdate { modified: false, .. } => {
                return Err(PresenceError::AlreadyOwned {
                    player_id,
                    badge_id: badge_id.to_string(),
                });
            }
            _ => {}
        }
        tracing::info!("Badge granted");

        if badge.required {
            self.recompute_active(player_id).await?;
        }
        Ok(())
    }

    /// Revoke a badge, reassigning the active badge if it was the one removed
    #[tracing::instrument(skip(self))]
    pub async fn remove_badge(&self, player_id: Uuid, badge_id: &str) -> PresenceResult<()> {
        match self.store.remove_badge(player_id, badge_id).await? {
            SetUpdate { matched: false, .. } => return Err(PresenceError::PlayerNotFound(player_id)),
            SetUpdate { modified: false, .. } => {
                return Err(PresenceError::NotOwned {
                    player_id,
                    badge_id: badge_id.to_string(),
                });
            }
            _ => {}
        }
        tracing::info!("Badge revoked");

        let player = self
            .store
            .get_player(player_id)
            .await?
            .ok_or(PresenceError::PlayerNotFound(player_id))?;
        if player.active_badge.as_deref() == Some(badge_id) {
            self.recompute_active(player_id).await?;
        }
        Ok(())
    }

    /// Recompute and store the active badge from the owned set.
    ///
    /// Returns the badge now active, if any.
    pub async fn recompute_active(&self, player_id: Uuid) -> PresenceResult<Option<String>> {
        for attempt in 1..=CAS_ATTEMPTS {
            let player = self
                .store
                .get_player(player_id)
                .await?
                .ok_or(PresenceError::PlayerNotFound(player_id))?;

            let catalog = self.catalog.snapshot();
            let active = catalog
                .resolve_active(&player.badges)
                .map(|badge| badge.id.clone());
            if active == player.active_badge {
                return Ok(active);
            }

            if self
                .store
                .compare_and_set_active_badge(player_id, &player.badges, active.as_deref())
                .await?
            {
                tracing::debug!(%player_id, ?active, "Active badge updated");
                return Ok(active);
            }
            tracing::debug!(%player_id, attempt, "Owned badges changed during recompute, retrying");
        }

        tracing::warn!(%player_id, "Gave up recomputing active badge after {} attempts", CAS_ATTEMPTS);
        Err(PresenceError::Store(StoreError::Unavailable(format!(
            "active badge for {player_id} kept changing"
        ))))
    }

    /// Display a specific owned badge
    #[tracing::instrument(skip(self))]
    pub async fn set_active(&self, player_id: Uuid, badge_id: &str) -> PresenceResult<()> {
        if !self.catalog.snapshot().contains(badge_id) {
            return Err(PresenceError::UnknownBadge(badge_id.to_string()));
        }
        match self.store.set_active_badge_if_owned(player_id, badge_id).await? {
            SetUpdate { matched: false, .. } => Err(PresenceError::PlayerNotFound(player_id)),
            SetUpdate { modified: false, .. } => Err(PresenceError::NotOwned {
                player_id,
                badge_id: badge_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Grant or revoke the badge tied to a permission role
    #[tracing::instrument(skip(self, event), fields(player_id = %event.player_id, role_id = %event.role_id))]
    pub async fn apply_role_change(&self, event: &PlayerRoleChanged) -> PresenceResult<RoleChangeOutcome> {
        let Some(badge_id) = self
            .catalog
            .snapshot()
            .badge_for_role(&event.role_id)
            .map(|badge| badge.id.clone())
        else {
            tracing::debug!("Role grants no badge");
            return Ok(RoleChangeOutcome::NoBadge);
        };

        let result = match event.change_type {
            RoleChangeType::Add => self
                .add_badge(event.player_id, &badge_id)
                .await
                .map(|_| RoleChangeOutcome::Granted(badge_id.clone())),
            RoleChangeType::Remove => self
                .remove_badge(event.player_id, &badge_id)
                .await
                .map(|_| RoleChangeOutcome::Revoked(badge_id.clone())),
        };

        // Redelivered role changes are expected
        match result {
            Err(PresenceError::AlreadyOwned { .. }) | Err(PresenceError::NotOwned { .. }) => {
                tracing::debug!(badge_id = %badge_id, "Badge already in requested state");
                Ok(RoleChangeOutcome::Unchanged(badge_id))
            }
            other => other,
        }
    }

    /// Owned badges known to the catalog, plus the active badge ID
    pub async fn player_badges(
        &self,
        player_id: Uuid,
    ) -> PresenceResult<(Vec<BadgeDefinition>, Option<String>)> {
        let player = self
            .store
            .get_player(player_id)
            .await?
            .ok_or(PresenceError::PlayerNotFound(player_id))?;
        let catalog = self.catalog.snapshot();
        let badges = player
            .badges
            .iter()
            .filter_map(|badge_id| catalog.get(badge_id).cloned())
            .collect();
        Ok((badges, player.active_badge))
    }

    pub async fn active_badge(&self, player_id: Uuid) -> PresenceResult<BadgeDefinition> {
        let player = self
            .store
            .get_player(player_id)
            .await?
            .ok_or(PresenceError::PlayerNotFound(player_id))?;
        let active = player
            .active_badge
            .ok_or(PresenceError::NoActiveBadge(player_id))?;
        self.catalog
            .snapshot()
            .get(&active)
            .cloned()
            .ok_or(PresenceError::UnknownBadge(active))
    }

    pub fn list_badges(&self) -> Vec<BadgeDefinition> {
        self.catalog.snapshot().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BadgeCatalog;
    use crate::store::MemoryPlayerStore;
    use chrono::Utc;
    use presence_common::{Placement, Player};

    async fn setup(definitions: Vec<BadgeDefinition>) -> (Arc<MemoryPlayerStore>, BadgeResolver, Uuid) {
        let store = Arc::new(MemoryPlayerStore::new());
        let catalog = CatalogHandle::new(BadgeCatalog::from_definitions(definitions).unwrap());
        let player = Player::first_connect(
            Uuid::new_v4(),
            "Alice",
            None,
            Utc::now(),
            Placement::new("lobby-1-1", "proxy-1-1"),
        );
        store.upsert_player(&player).await.unwrap();
        (store.clone(), BadgeResolver::new(store, catalog), player.id)
    }

    async fn active(store: &MemoryPlayerStore, id: Uuid) -> Option<String> {
        store.get_player(id).await.unwrap().unwrap().active_badge
    }

    #[tokio::test]
    async fn test_required_badge_becomes_active() {
        let (store, resolver, id) = setup(vec![BadgeDefinition::new("vip", 10, true)]).await;
        resolver.add_badge(id, "vip").await.unwrap();
        assert_eq!(active(&store, id).await.as_deref(), Some("vip"));

        resolver.remove_badge(id, "vip").await.unwrap();
        assert_eq!(active(&store, id).await, None);
    }

    #[tokio::test]
    async fn test_optional_badge_does_not_recompute() {
        let (store, resolver, id) = setup(vec![BadgeDefinition::new("beta", 1, false)]).await;
        resolver.add_badge(id, "beta").await.unwrap();
        assert_eq!(active(&store, id).await, None);
    }

    #[tokio::test]
    async fn test_unknown_badge_rejected() {
        let (_, resolver, id) = setup(vec![]).await;
        let result = resolver.add_badge(id, "ghost").await;
        assert!(matches!(result, Err(PresenceError::UnknownBadge(_))));
    }

    #[tokio::test]
    async fn test_add_for_missing_player() {
        let (_, resolver, _) = setup(vec![BadgeDefinition::new("vip", 10, true)]).await;
        let result = resolver.add_badge(Uuid::new_v4(), "vip").await;
        assert!(matches!(result, Err(PresenceError::PlayerNotFound(_))));
    }

    #[tokio::test]
    async fn test_second_add_conflicts_without_changes() {
        let (store, resolver, id) = setup(vec![BadgeDefinition::new("vip", 10, true)]).await;
        resolver.add_badge(id, "vip").await.unwrap();
        let before = store.get_player(id).await.unwrap().unwrap();

        let result = resolver.add_badge(id, "vip").await;
        assert!(matches!(result, Err(PresenceError::AlreadyOwned { .. })));
        let after = store.get_player(id).await.unwrap().unwrap();
        assert_eq!(before.badges, after.badges);
        assert_eq!(before.active_badge, after.active_badge);
    }

    #[tokio::test]
    async fn test_remove_active_falls_back_to_next_priority() {
        let (store, resolver, id) = setup(vec![
            BadgeDefinition::new("staff", 20, true),
            BadgeDefinition::new("vip", 10, true),
        ])
        .await;
        resolver.add_badge(id, "vip").await.unwrap();
        resolver.add_badge(id, "staff").await.unwrap();
        assert_eq!(active(&store, id).await.as_deref(), Some("staff"));

        resolver.remove_badge(id, "staff").await.unwrap();
        assert_eq!(active(&store, id).await.as_deref(), Some("vip"));
    }

    #[tokio::test]
    async fn test_remove_not_owned() {
        let (_, resolver, id) = setup(vec![BadgeDefinition::new("vip", 10, true)]).await;
        let result = resolver.remove_badge(id, "vip").await;
        assert!(matches!(result, Err(PresenceError::NotOwned { .. })));
    }

    #[tokio::test]
    async fn test_set_active_requires_ownership() {
        let (store, resolver, id) = setup(vec![
            BadgeDefinition::new("vip", 10, true),
            BadgeDefinition::new("beta", 1, false),
        ])
        .await;
        let result = resolver.set_active(id, "beta").await;
        assert!(matches!(result, Err(PresenceError::NotOwned { .. })));

        resolver.add_badge(id, "vip").await.unwrap();
        resolver.add_badge(id, "beta").await.unwrap();
        resolver.set_active(id, "beta").await.unwrap();
        assert_eq!(active(&store, id).await.as_deref(), Some("beta"));
        assert_eq!(resolver.active_badge(id).await.unwrap().id, "beta");
    }

    #[tokio::test]
    async fn test_recompute_tie_break() {
        let (store, resolver, id) = setup(vec![
            BadgeDefinition::new("A", 3, false),
            BadgeDefinition::new("B", 5, false),
            BadgeDefinition::new("C", 5, false),
        ])
        .await;
        for badge in ["C", "A", "B"] {
            resolver.add_badge(id, badge).await.unwrap();
        }
        for _ in 0..5 {
            assert_eq!(resolver.recompute_active(id).await.unwrap().as_deref(), Some("B"));
        }
        assert_eq!(active(&store, id).await.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_role_change_grants_and_revokes() {
        let (store, resolver, id) =
            setup(vec![BadgeDefinition::new("supporter", 5, true).with_role("donor")]).await;

        let add = PlayerRoleChanged {
            player_id: id,
            role_id: "donor".to_string(),
            change_type: RoleChangeType::Add,
        };
        assert_eq!(
            resolver.apply_role_change(&add).await.unwrap(),
            RoleChangeOutcome::Granted("supporter".to_string())
        );
        assert!(store.get_player(id).await.unwrap().unwrap().owns_badge("supporter"));
        assert_eq!(
            resolver.apply_role_change(&add).await.unwrap(),
            RoleChangeOutcome::Unchanged("supporter".to_string())
        );

        let remove = PlayerRoleChanged {
            change_type: RoleChangeType::Remove,
            ..add.clone()
        };
        assert_eq!(
            resolver.apply_role_change(&remove).await.unwrap(),
            RoleChangeOutcome::Revoked("supporter".to_string())
        );

        let unrelated = PlayerRoleChanged {
            role_id: "builder".to_string(),
            ..add
        };
        assert_eq!(
            resolver.apply_role_change(&unrelated).await.unwrap(),
            RoleChangeOutcome::NoBadge
        );
    }
}
