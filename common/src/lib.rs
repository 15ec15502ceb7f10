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

//! Presence Common Types and Protocols
//!
//! This crate defines shared types used by the presence service and its callers:
//! - Player records, placements and login sessions
//! - Inbound message-bus event envelopes
//! - Fleet naming conventions
//! - Paging and query request/response views

pub mod api;
pub mod event;
pub mod fleet;
pub mod page;
pub mod player;
pub mod session;

pub use event::{EventEnvelope, EventKind, InboundEvent, RoleChangeType};
pub use fleet::parse_fleet;
pub use page::{PageData, Pageable};
pub use player::{OnlinePlayer, Placement, Player, PlayerSkin, UsernameHistory};
pub use session::LoginSession;
