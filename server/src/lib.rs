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

//! Presence Server
//!
//! Consumes player lifecycle and permission events, keeps the authoritative
//! presence, playtime and badge record for every player and serves it through
//! a JSON query API.

pub mod aggregator;
pub mod badges;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod http;
pub mod intake;
pub mod ledger;
pub mod presence;
pub mod service;
pub mod store;
