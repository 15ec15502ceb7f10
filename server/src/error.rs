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

//! Error types shared by the store, domain and query layers

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a [`PlayerStore`](crate::store::PlayerStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at start-up.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A second open session was rejected for this player.
    #[error("Player {0} already has an open session")]
    DuplicateOpenSession(Uuid),

    /// The backing store cannot serve requests right now.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be turned back into a record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse classification used for acknowledgement logging and HTTP status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while applying events or serving queries.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// Request or event carries values that cannot be applied.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Player not found: {0}")]
    PlayerNotFound(Uuid),

    #[error("No player with username {0}")]
    UsernameNotFound(String),

    /// Disconnect arrived for a player with no open session.
    #[error("No open session for player {0}")]
    NoOpenSession(Uuid),

    #[error("Unknown badge: {0}")]
    UnknownBadge(String),

    #[error("Player {0} has no active badge")]
    NoActiveBadge(Uuid),

    #[error("Player {player_id} already owns badge {badge_id}")]
    AlreadyOwned { player_id: Uuid, badge_id: String },

    #[error("Player {player_id} does not own badge {badge_id}")]
    NotOwned { player_id: Uuid, badge_id: String },

    #[error("Player {0} already has an open session")]
    DuplicateSession(Uuid),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(StoreError),
}

impl PresenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PresenceError::Validation(_) => ErrorKind::Validation,
            PresenceError::PlayerNotFound(_)
            | PresenceError::UsernameNotFound(_)
            | PresenceError::NoOpenSession(_)
            | PresenceError::UnknownBadge(_)
            | PresenceError::NoActiveBadge(_) => ErrorKind::NotFound,
            PresenceError::AlreadyOwned { .. }
            | PresenceError::NotOwned { .. }
            | PresenceError::DuplicateSession(_) => ErrorKind::Conflict,
            PresenceError::Timeout(_) | PresenceError::Store(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<StoreError> for PresenceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::DuplicateOpenSession(player_id) => PresenceError::DuplicateSession(player_id),
            other => PresenceError::Store(other),
        }
    }
}

pub type PresenceResult<T> = Result<T, PresenceError>;
