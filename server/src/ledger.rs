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

//! Session ledger
//!
//! Tracks login sessions and keeps at most one open session per player. The
//! single-open invariant itself is enforced by the store (a partial unique
//! index in PostgreSQL); the ledger turns its violation into a typed error.

use crate::error::{PresenceError, PresenceResult};
use crate::store::{PageRequest, PlayerStore};
use chrono::{DateTime, Duration, Utc};
use presence_common::LoginSession;
use std::sync::Arc;
use uuid::Uuid;

/// A session that was just closed together with the playtime it contributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSession {
    pub session: LoginSession,
    /// Non-negative playtime credited for this session
    pub duration: Duration,
}

#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<dyn PlayerStore>,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn PlayerStore>) -> Self {
        Self { store }
    }

    /// Open a session at `login_time`.
    ///
    /// Returns [`PresenceError::DuplicateSession`] if the player already has one.
    pub async fn open(&self, player_id: Uuid, login_time: DateTime<Utc>) -> PresenceResult<LoginSession> {
        let session = LoginSession::open(player_id, login_time);
        self.store.open_session(&session).await?;
        tracing::debug!(%player_id, session_id = %session.id, "Opened session");
        Ok(session)
    }

    /// Close the open session at `logout_time`.
    ///
    /// A logout earlier than the login (events delivered out of order) is
    /// credited as zero playtime.
    pub async fn close(&self, player_id: Uuid, logout_time: DateTime<Utc>) -> PresenceResult<ClosedSession> {
        let session = self
            .store
            .close_open_session(player_id, logout_time)
            .await?
            .ok_or(PresenceError::NoOpenSession(player_id))?;

        let mut duration = session.duration_at(logout_time);
        if duration < Duration::zero() {
            tracing::warn!(
                %player_id,
                session_id = %session.id,
                login_time = %session.login_time,
                %logout_time,
                "Logout precedes login, crediting zero playtime"
            );
            duration = Duration::zero();
        }
        tracing::debug!(%player_id, session_id = %session.id, duration_ms = duration.num_milliseconds(), "Closed session");
        Ok(ClosedSession { session, duration })
    }

    pub async fn current(&self, player_id: Uuid) -> PresenceResult<Option<LoginSession>> {
        Ok(self.store.current_session(player_id).await?)
    }

    /// Sessions newest first, with the total count
    pub async fn list(&self, player_id: Uuid, page: PageRequest) -> PresenceResult<(Vec<LoginSession>, u64)> {
        Ok(self.store.list_sessions(player_id, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPlayerStore;
    use tokio_test::assert_ok;
    use tracing_test::traced_test;

    fn ledger() -> SessionLedger {
        SessionLedger::new(Arc::new(MemoryPlayerStore::new()))
    }

    #[tokio::test]
    async fn test_open_close_duration() {
        let ledger = ledger();
        let player_id = Uuid::new_v4();
        let login = Utc::now();
        ledger.open(player_id, login).await.unwrap();

        let closed = ledger
            .close(player_id, login + Duration::seconds(100))
            .await
            .unwrap();
        assert_eq!(closed.duration, Duration::seconds(100));
        assert!(!closed.session.is_open());
        assert!(ledger.current(player_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_open_is_rejected() {
        let ledger = ledger();
        let player_id = Uuid::new_v4();
        ledger.open(player_id, Utc::now()).await.unwrap();
        let result = ledger.open(player_id, Utc::now()).await;
        assert!(matches!(result, Err(PresenceError::DuplicateSession(_))));
    }

    #[tokio::test]
    async fn test_close_without_open_session() {
        let ledger = ledger();
        let result = ledger.close(Uuid::new_v4(), Utc::now()).await;
        assert!(matches!(result, Err(PresenceError::NoOpenSession(_))));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_negative_duration_is_clamped() {
        let ledger = ledger();
        let player_id = Uuid::new_v4();
        let login = Utc::now();
        assert_ok!(ledger.open(player_id, login).await);
        let closed = assert_ok!(ledger.close(player_id, login - Duration::seconds(5)).await);
        assert_eq!(closed.duration, Duration::zero());
        assert!(logs_contain("Logout precedes login"));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let ledger = ledger();
        let player_id = Uuid::new_v4();
        let start = Utc::now();
        for i in 0..3 {
            let login = start + Duration::minutes(i * 10);
            ledger.open(player_id, login).await.unwrap();
            ledger
                .close(player_id, login + Duration::minutes(5))
                .await
                .unwrap();
        }

        let (sessions, total) = ledger.list(player_id, PageRequest::new(0, 2)).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].login_time, start + Duration::minutes(20));
    }
}
