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

//! Login session data types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single login of a player, open until a logout time is recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSession {
    /// Time-ordered session identifier
    pub id: Uuid,

    /// Owning player
    pub player_id: Uuid,

    /// Session creation timestamp
    pub login_time: DateTime<Utc>,

    /// Logout timestamp, absent while the session is open
    pub logout_time: Option<DateTime<Utc>>,
}

impl LoginSession {
    /// Create a new open session
    pub fn open(player_id: Uuid, login_time: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            player_id,
            login_time,
            logout_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.logout_time.is_none()
    }

    /// Session duration.
    ///
    /// Closed sessions measure login to logout. Open sessions measure up to
    /// now, which is advisory only.
    pub fn duration(&self) -> Duration {
        self.duration_at(Utc::now())
    }

    /// Session duration with an explicit notion of "now" for open sessions
    pub fn duration_at(&self, now: DateTime<Utc>) -> Duration {
        let end = self.logout_time.unwrap_or(now);
        end.signed_duration_since(self.login_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let player_id = Uuid::new_v4();
        let session = LoginSession::open(player_id, Utc::now());
        assert!(session.is_open());
        assert_eq!(session.player_id, player_id);
    }

    #[test]
    fn test_closed_session_duration() {
        let login = Utc::now();
        let mut session = LoginSession::open(Uuid::new_v4(), login);
        session.logout_time = Some(login + Duration::seconds(100));
        assert!(!session.is_open());
        assert_eq!(session.duration(), Duration::seconds(100));
    }

    #[test]
    fn test_open_session_duration_uses_now() {
        let login = Utc::now();
        let session = LoginSession::open(Uuid::new_v4(), login);
        assert_eq!(
            session.duration_at(login + Duration::minutes(5)),
            Duration::minutes(5)
        );
    }

    #[test]
    fn test_session_ids_are_time_ordered() {
        let player_id = Uuid::new_v4();
        let first = LoginSession::open(player_id, Utc::now());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = LoginSession::open(player_id, Utc::now());
        assert!(first.id < second.id);
    }
}
