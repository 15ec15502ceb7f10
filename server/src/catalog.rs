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

//! Badge catalog
//!
//! The catalog is loaded from a YAML file into an immutable [`BadgeCatalog`].
//! Readers take a cheap [`Arc`] snapshot from a [`CatalogHandle`]; a reload
//! builds a complete new catalog and swaps it in, so a reader never observes a
//! partially loaded catalog.
//!
//! ```yaml
//! badges:
//!   vip:
//!     priority: 10
//!     required: true
//!     friendly_name: VIP
//!     chat_string: "<gold>VIP</gold>"
//!     hover_text: ["VIP member"]
//!     automatic_grants:
//!       permission_role: vip
//! ```

use presence_common::api::{BadgeGuiItem, BadgeView};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Names that collide with fixed segments of the badge routes
const RESERVED_IDS: &[&str] = &["active"];

/// Errors raised while loading a badge catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read badge catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse badge catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Badge identifier must not be empty")]
    EmptyId,

    #[error("Badge identifier {0} is reserved")]
    ReservedId(String),

    /// Role grants must be unambiguous: one role maps to at most one badge.
    #[error("Role {role} is granted by both {first} and {second}")]
    DuplicateRole {
        role: String,
        first: String,
        second: String,
    },
}

/// Rule that grants a badge automatically
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomaticGrants {
    /// External permission role whose assignment grants the badge
    #[serde(default)]
    pub permission_role: Option<String>,
}

/// A single badge definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    /// Filled in from the catalog key
    #[serde(default, skip_serializing)]
    pub id: String,

    /// Higher priority wins active badge selection
    #[serde(default)]
    pub priority: i64,

    /// Owners always display their highest priority required badge
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub friendly_name: String,

    #[serde(default)]
    pub chat_string: String,

    #[serde(default)]
    pub hover_text: Vec<String>,

    #[serde(default)]
    pub gui_item: Option<BadgeGuiItem>,

    #[serde(default)]
    pub automatic_grants: Option<AutomaticGrants>,
}

impl BadgeDefinition {
    pub fn new(id: impl Into<String>, priority: i64, required: bool) -> Self {
        Self {
            id: id.into(),
            priority,
            required,
            friendly_name: String::new(),
            chat_string: String::new(),
            hover_text: Vec::new(),
            gui_item: None,
            automatic_grants: None,
        }
    }

    /// Builder helper attaching a permission role grant
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.automatic_grants = Some(AutomaticGrants {
            permission_role: Some(role.into()),
        });
        self
    }

    pub fn permission_role(&self) -> Option<&str> {
        self.automatic_grants
            .as_ref()
            .and_then(|grants| grants.permission_role.as_deref())
    }

    pub fn to_view(&self) -> BadgeView {
        BadgeView {
            id: self.id.clone(),
            priority: self.priority,
            required: self.required,
            friendly_name: self.friendly_name.clone(),
            chat_string: self.chat_string.clone(),
            hover_text: self.hover_text.join("\n"),
            gui_item: self.gui_item.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    badges: BTreeMap<String, BadgeDefinition>,
}

/// Immutable mapping of badge ID to definition
#[derive(Debug, Clone, Default)]
pub struct BadgeCatalog {
    badges: BTreeMap<String, BadgeDefinition>,
    by_role: HashMap<String, String>,
}

impl BadgeCatalog {
    /// Build a catalog, rejecting ambiguous role grants
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = BadgeDefinition>,
    ) -> Result<Self, CatalogError> {
        let mut badges = BTreeMap::new();
        let mut by_role: HashMap<String, String> = HashMap::new();

        for definition in definitions {
            if definition.id.trim().is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if RESERVED_IDS.contains(&definition.id.as_str()) {
                return Err(CatalogError::ReservedId(definition.id));
            }
            if let Some(role) = definition.permission_role() {
                if let Some(first) = by_role.get(role) {
                    return Err(CatalogError::DuplicateRole {
                        role: role.to_string(),
                        first: first.clone(),
                        second: definition.id.clone(),
                    });
                }
                by_role.insert(role.to_string(), definition.id.clone());
            }
            badges.insert(definition.id.clone(), definition);
        }

        Ok(Self { badges, by_role })
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(source)?;
        Self::from_definitions(file.badges.into_iter().map(|(id, mut definition)| {
            definition.id = id;
            definition
        }))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        tracing::debug!("Loading badge catalog from {}", path.display());
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&source)
    }

    pub fn get(&self, badge_id: &str) -> Option<&BadgeDefinition> {
        self.badges.get(badge_id)
    }

    pub fn contains(&self, badge_id: &str) -> bool {
        self.badges.contains_key(badge_id)
    }

    /// Badge automatically granted by a permission role
    pub fn badge_for_role(&self, role_id: &str) -> Option<&BadgeDefinition> {
        self.by_role
            .get(role_id)
            .and_then(|badge_id| self.badges.get(badge_id))
    }

    /// Definitions ordered by badge ID
    pub fn iter(&self) -> impl Iterator<Item = &BadgeDefinition> {
        self.badges.values()
    }

    pub fn len(&self) -> usize {
        self.badges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }

    /// Choose the badge to display from an owned set.
    ///
    /// Highest priority wins; equal priorities resolve to the lexicographically
    /// lowest badge ID. Owned IDs missing from the catalog are skipped.
    pub fn resolve_active<'a>(&'a self, owned: &[String]) -> Option<&'a BadgeDefinition> {
        let mut best: Option<&BadgeDefinition> = None;
        for badge_id in owned {
            let Some(candidate) = self.badges.get(badge_id) else {
                tracing::warn!(badge_id = %badge_id, "Player owns a badge missing from the catalog");
                continue;
            };
            best = match best {
                None => Some(candidate),
                Some(current)
                    if candidate.priority > current.priority
                        || (candidate.priority == current.priority
                            && candidate.id < current.id) =>
                {
                    Some(candidate)
                }
                keep => keep,
            };
        }
        best
    }
}

/// Shared, swappable reference to the current catalog
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<BadgeCatalog>>>,
    path: Option<PathBuf>,
}

impl CatalogHandle {
    pub fn new(catalog: BadgeCatalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
            path: None,
        }
    }

    /// Load from disk, remembering the path for later reloads
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let catalog = BadgeCatalog::load(&path)?;
        tracing::info!("Loaded {} badges from {}", catalog.len(), path.display());
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
            path: Some(path),
        })
    }

    pub fn snapshot(&self) -> Arc<BadgeCatalog> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, catalog: BadgeCatalog) {
        let catalog = Arc::new(catalog);
        match self.current.write() {
            Ok(mut guard) => *guard = catalog,
            Err(poisoned) => *poisoned.into_inner() = catalog,
        }
    }

    /// Re-read the catalog file. On failure the current catalog stays in place.
    pub fn reload(&self) -> Result<usize, CatalogError> {
        let Some(path) = &self.path else {
            tracing::debug!("Badge catalog was not loaded from a file, nothing to reload");
            return Ok(self.snapshot().len());
        };
        let catalog = BadgeCatalog::load(path)?;
        let count = catalog.len();
        self.replace(catalog);
        tracing::info!("Reloaded {} badges from {}", count, path.display());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn owned(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_yaml_catalog() {
        let catalog = BadgeCatalog::from_yaml_str(
            r#"
badges:
  vip:
    priority: 10
    required: true
    friendly_name: VIP
    chat_string: "<gold>VIP"
    hover_text: ["VIP member", "Thanks!"]
    automatic_grants:
      permission_role: vip_role
  beta:
    priority: 1
"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        let vip = catalog.get("vip").unwrap();
        assert_eq!(vip.id, "vip");
        assert!(vip.required);
        assert_eq!(vip.to_view().hover_text, "VIP member\nThanks!");
        assert_eq!(catalog.badge_for_role("vip_role").unwrap().id, "vip");
        assert!(catalog.badge_for_role("nobody").is_none());
        assert!(!catalog.get("beta").unwrap().required);
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let result = BadgeCatalog::from_definitions(vec![
            BadgeDefinition::new("supporter", 5, false).with_role("donor"),
            BadgeDefinition::new("patron", 6, false).with_role("donor"),
        ]);
        assert!(matches!(
            result,
            Err(CatalogError::DuplicateRole { role, .. }) if role == "donor"
        ));
    }

    #[test]
    fn test_reserved_id_rejected() {
        let result = BadgeCatalog::from_yaml_str("badges:\n  active:\n    priority: 1\n");
        assert!(matches!(result, Err(CatalogError::ReservedId(id)) if id == "active"));
    }

    #[test]
    fn test_resolve_active_priority_and_tie_break() {
        let catalog = BadgeCatalog::from_definitions(vec![
            BadgeDefinition::new("A", 3, true),
            BadgeDefinition::new("C", 5, true),
            BadgeDefinition::new("B", 5, true),
        ])
        .unwrap();

        for _ in 0..10 {
            let active = catalog.resolve_active(&owned(&["C", "A", "B"]));
            assert_eq!(active.map(|b| b.id.as_str()), Some("B"));
        }
        assert_eq!(
            catalog.resolve_active(&owned(&["A"])).map(|b| b.id.as_str()),
            Some("A")
        );
        assert!(catalog.resolve_active(&[]).is_none());
    }

    #[test]
    fn test_resolve_active_skips_unknown() {
        let catalog =
            BadgeCatalog::from_definitions(vec![BadgeDefinition::new("A", 1, false)]).unwrap();
        assert_eq!(
            catalog
                .resolve_active(&owned(&["ghost", "A"]))
                .map(|b| b.id.as_str()),
            Some("A")
        );
        assert!(catalog.resolve_active(&owned(&["ghost"])).is_none());
    }

    #[test]
    fn test_handle_reload_swaps_catalog() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "badges:\n  a:\n    priority: 1").unwrap();
        let handle = CatalogHandle::open(file.path()).unwrap();
        let before = handle.snapshot();
        assert_eq!(before.len(), 1);

        let mut writer = file.reopen().unwrap();
        writer.set_len(0).unwrap();
        writeln!(writer, "badges:\n  a:\n    priority: 1\n  b:\n    priority: 2").unwrap();
        assert_eq!(handle.reload().unwrap(), 2);

        // Old snapshots stay intact
        assert_eq!(before.len(), 1);
        assert_eq!(handle.snapshot().len(), 2);
    }

    #[test]
    fn test_failed_reload_keeps_current() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "badges:\n  a:\n    priority: 1").unwrap();
        let handle = CatalogHandle::open(file.path()).unwrap();

        let mut writer = file.reopen().unwrap();
        writer.set_len(0).unwrap();
        writeln!(writer, "badges: [not, a, map").unwrap();

        assert!(handle.reload().is_err());
        assert!(handle.snapshot().contains("a"));
    }
}
