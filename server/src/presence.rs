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

//! Presence state machine
//!
//! Applies connection lifecycle events to player records:
//!
//! ```text
//! Unknown --connect--> Online <--connect/disconnect--> Offline
//!                      Online --server switch--> Online
//! ```
//!
//! Placement is present exactly while the player has an open session.

use crate::error::{PresenceError, PresenceResult};
use crate::ledger::{ClosedSession, SessionLedger};
use crate::store::PlayerStore;
use chrono::{DateTime, Duration, Utc};
use presence_common::event::{PlayerConnect, PlayerDisconnect, PlayerServerSwitch};
use presence_common::{Placement, Player, UsernameHistory};
use std::sync::Arc;
use uuid::Uuid;

/// What a connect did to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// First connect ever; the player record was created
    Created,
    /// Offline player came online with a new session
    Reconnected,
    /// Player was already online; placement was refreshed without a new session
    Refreshed,
}

/// What a server switch did to the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    Moved,
    /// Player is offline or unknown; nothing changed
    Ignored,
}

#[derive(Clone)]
pub struct PresenceStateMachine {
    store: Arc<dyn PlayerStore>,
    ledger: SessionLedger,
}

impl PresenceStateMachine {
    pub fn new(store: Arc<dyn PlayerStore>) -> Self {
        Self {
            ledger: SessionLedger::new(store.clone()),
            store,
        }
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    #[tracing::instrument(skip(self, event), fields(player_id = %event.player_id, server_id = %event.server_id))]
    pub async fn connect(&self, event: &PlayerConnect, at: DateTime<Utc>) -> PresenceResult<ConnectOutcome> {
        let proxy_id = event
            .proxy_id
            .as_deref()
            .filter(|proxy| !proxy.is_empty())
            .unwrap_or(event.server_id.as_str());
        let placement = Placement::new(event.server_id.clone(), proxy_id);

        let existing = match self.store.get_player(event.player_id).await? {
            Some(existing) => existing,
            None => {
                if self.create(event, placement.clone(), at).await? {
                    return Ok(ConnectOutcome::Created);
                }
                // Another writer created the record first, apply on top of it
                self.store
                    .get_player(event.player_id)
                    .await?
                    .ok_or(PresenceError::PlayerNotFound(event.player_id))?
            }
        };

        let outcome = if existing.is_online() {
            // Placement and session already exist, heal a missing session only
            if self.ledger.current(event.player_id).await?.is_none() {
                self.open_session(event.player_id, at).await?;
            }
            ConnectOutcome::Refreshed
        } else if self.open_session(event.player_id, at).await? {
            ConnectOutcome::Reconnected
        } else {
            ConnectOutcome::Refreshed
        };

        if !self
            .store
            .record_connect(event.player_id, &event.username, event.skin.as_ref(), &placement)
            .await?
        {
            return Err(PresenceError::PlayerNotFound(event.player_id));
        }

        if existing.current_username != event.username {
            tracing::info!(
                old = %existing.current_username,
                new = %event.username,
                "Player changed username"
            );
            self.record_username(event.player_id, &event.username, at).await?;
        }

        tracing::debug!(?outcome, fleet = %placement.fleet_name, "Player connected");
        Ok(outcome)
    }

    /// Create the player record on first connect. Returns false without
    /// touching the stored record when the player already exists.
    async fn create(&self, event: &PlayerConnect, placement: Placement, at: DateTime<Utc>) -> PresenceResult<bool> {
        self.open_session(event.player_id, at).await?;
        let player = Player::first_connect(
            event.player_id,
            event.username.clone(),
            event.skin.clone(),
            at,
            placement,
        );
        if !self.store.insert_player(&player).await? {
            tracing::debug!("Player record created concurrently");
            return Ok(false);
        }
        self.record_username(event.player_id, &event.username, at).await?;
        tracing::info!(username = %event.username, "First connect, created player");
        Ok(true)
    }

    /// Open a session, returning false if a concurrent writer already opened one
    async fn open_session(&self, player_id: Uuid, at: DateTime<Utc>) -> PresenceResult<bool> {
        match self.ledger.open(player_id, at).await {
            Ok(_) => Ok(true),
            Err(PresenceError::DuplicateSession(_)) => {
                tracing::warn!(%player_id, "Session already open, treating connect as a refresh");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn record_username(&self, player_id: Uuid, username: &str, at: DateTime<Utc>) -> PresenceResult<()> {
        let entry = UsernameHistory::new(player_id, username, at);
        self.store.record_username(&entry).await?;
        Ok(())
    }

    /// Close the open session and credit its playtime.
    ///
    /// Without an open session no playtime is credited and
    /// [`PresenceError::NoOpenSession`] is returned. A placement left behind
    /// by an earlier half-applied disconnect is cleared.
    #[tracing::instrument(skip(self, event), fields(player_id = %event.player_id))]
    pub async fn disconnect(&self, event: &PlayerDisconnect, at: DateTime<Utc>) -> PresenceResult<ClosedSession> {
        let closed = match self.ledger.close(event.player_id, at).await {
            Ok(closed) => closed,
            Err(PresenceError::NoOpenSession(player_id)) => {
                self.clear_stale_placement(player_id, at).await?;
                tracing::warn!(%player_id, "Disconnect without an open session, ignoring");
                return Err(PresenceError::NoOpenSession(player_id));
            }
            Err(e) => return Err(e),
        };

        if !self
            .store
            .record_logout(event.player_id, at, closed.duration)
            .await?
        {
            tracing::warn!("Closed a session for a player with no record");
            return Err(PresenceError::PlayerNotFound(event.player_id));
        }

        tracing::debug!(
            duration_ms = closed.duration.num_milliseconds(),
            "Player disconnected"
        );
        Ok(closed)
    }

    async fn clear_stale_placement(&self, player_id: Uuid, at: DateTime<Utc>) -> PresenceResult<()> {
        let stale = self
            .store
            .get_player(player_id)
            .await?
            .is_some_and(|player| player.is_online());
        if stale {
            tracing::warn!(%player_id, "Clearing placement left without an open session");
            self.store.record_logout(player_id, at, Duration::zero()).await?;
        }
        Ok(())
    }

    /// Move an online player to another server behind the same proxy
    #[tracing::instrument(skip(self, event), fields(player_id = %event.player_id, server_id = %event.new_server_id))]
    pub async fn switch_server(&self, event: &PlayerServerSwitch) -> PresenceResult<SwitchOutcome> {
        let Some(player) = self.store.get_player(event.player_id).await? else {
            tracing::debug!("Server switch for unknown player, ignoring");
            return Ok(SwitchOutcome::Ignored);
        };
        let Some(current) = player.placement else {
            tracing::debug!("Server switch for offline player, ignoring");
            return Ok(SwitchOutcome::Ignored);
        };

        let placement = current.switch_server(event.new_server_id.clone());
        if self.store.update_placement(event.player_id, &placement).await? {
            tracing::debug!(fleet = %placement.fleet_name, "Player switched server");
            Ok(SwitchOutcome::Moved)
        } else {
            Ok(SwitchOutcome::Ignored)
        }
    }
}
