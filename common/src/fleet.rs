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

//! Fleet naming

/// Derive the fleet name from a server identifier.
///
/// Server instances are named `<fleet>-<replica>-<instance>` where the fleet
/// name itself may contain hyphens. The last two segments are stripped.
/// Identifiers with fewer than three segments do not follow the convention
/// and are returned unchanged.
pub fn parse_fleet(server_id: &str) -> &str {
    let mut cut = server_id.len();
    for _ in 0..2 {
        match server_id[..cut].rfind('-') {
            Some(idx) => cut = idx,
            None => return server_id,
        }
    }
    if cut == 0 {
        return server_id;
    }
    &server_id[..cut]
}
