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

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_env_field::EnvField;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Arguments {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to configuration file",
        default_value = "server/config.yaml"
    )]
    pub config_file: String,

    #[arg(
        short = 'e',
        long = "env",
        help = "Path to environment file",
        default_value = "server/.env"
    )]
    pub env_file: Option<String>,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            config_file: "config.yaml".to_string(),
            env_file: Some(".env".to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open config file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub intake: IntakeConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub badges: BadgeCatalogConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

impl Configuration {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        tracing::debug!("Loading configuration from file: {}", path);
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Open {
            path: path.to_string(),
            source,
        })?;

        serde_yaml::from_reader(file).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Empty selects the in-memory store.
    #[serde(default)]
    pub url: EnvField<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: Default::default(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default)]
    pub addr: EnvField<IntakeBinding>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntakeBinding(SocketAddr);

impl IntakeBinding {
    pub fn to_addr(&self) -> SocketAddr {
        self.0
    }
    pub fn to_ip(&self) -> IpAddr {
        self.0.ip()
    }
    pub fn to_port(&self) -> u16 {
        self.0.port()
    }
}

impl FromStr for IntakeBinding {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(SocketAddr::from_str(s)?))
    }
}

impl Default for IntakeBinding {
    fn default() -> Self {
        Self(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(0, 0, 0, 0),
            7100,
        )))
    }
}

impl std::fmt::Display for IntakeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub addr: EnvField<ApiBinding>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiBinding(SocketAddr);

impl ApiBinding {
    pub fn to_addr(&self) -> SocketAddr {
        self.0
    }
    pub fn to_ip(&self) -> IpAddr {
        self.0.ip()
    }
    pub fn to_port(&self) -> u16 {
        self.0.port()
    }
}

impl FromStr for ApiBinding {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(SocketAddr::from_str(s)?))
    }
}

impl Default for ApiBinding {
    fn default() -> Self {
        Self(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(0, 0, 0, 0),
            7200,
        )))
    }
}

impl std::fmt::Display for ApiBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog location used when the configuration does not name one
pub const DEFAULT_BADGE_PATH: &str = "server/badges.yaml";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BadgeCatalogConfig {
    /// Path to the badge catalog YAML file
    #[serde(default)]
    pub path: Option<EnvField<String>>,
}

impl BadgeCatalogConfig {
    pub fn path(&self) -> &str {
        self.path
            .as_ref()
            .map(|path| path.as_str())
            .unwrap_or(DEFAULT_BADGE_PATH)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of event worker tasks (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded queue depth per worker (default: 1024)
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    1024
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Per-call store timeout in milliseconds (default: 5000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Lifetime of cached online counts in milliseconds, 0 disables (default: 1000)
    #[serde(default = "default_count_cache_ttl_ms")]
    pub count_cache_ttl_ms: u64,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_count_cache_ttl_ms() -> u64 {
    1000
}

fn default_page_size() -> u32 {
    presence_common::page::DEFAULT_PAGE_SIZE
}

impl QueryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn count_cache_ttl(&self) -> Option<Duration> {
        (self.count_cache_ttl_ms > 0).then(|| Duration::from_millis(self.count_cache_ttl_ms))
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            count_cache_ttl_ms: default_count_cache_ttl_ms(),
            default_page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Store ping interval in seconds (default: 5)
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
}

fn default_health_interval() -> u64 {
    5
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_arguments_default() {
        let args = Arguments::default();
        assert_eq!(args.config_file, "config.yaml");
        assert_eq!(args.env_file, Some(".env".to_string()));
    }

    #[test]
    fn test_configuration_default() {
        let config = Configuration::default();
        assert_eq!(config.database.url.as_str(), "");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.intake.addr.to_port(), 7100);
        assert_eq!(config.api.addr.to_port(), 7200);
        assert_eq!(config.api.addr.to_ip(), IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        assert_eq!(config.badges.path(), DEFAULT_BADGE_PATH);
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.query.timeout(), Duration::from_secs(5));
        assert_eq!(config.query.count_cache_ttl(), Some(Duration::from_secs(1)));
        assert_eq!(config.health.interval_secs, 5);
    }

    #[test]
    fn test_configuration_load_missing_file() {
        let result = Configuration::load("non_existent.yaml");
        assert!(matches!(result, Err(ConfigError::Open { .. })));
    }

    #[test]
    fn test_configuration_load_from_file() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            r#"
database:
  url: "postgres://localhost/presence"
  max_connections: 12
intake:
  addr: 127.0.0.1:7101
api:
  addr: 127.0.0.1:7201
badges:
  path: /etc/presence/badges.yaml
dispatcher:
  workers: 2
query:
  timeout_ms: 250
  count_cache_ttl_ms: 0
"#
        )
        .unwrap();

        let config = Configuration::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.database.url.as_str(), "postgres://localhost/presence");
        assert_eq!(config.database.max_connections, 12);
        assert_eq!(
            config.intake.addr.to_addr(),
            SocketAddr::from_str("127.0.0.1:7101").unwrap()
        );
        assert_eq!(config.api.addr.to_port(), 7201);
        assert_eq!(config.badges.path(), "/etc/presence/badges.yaml");
        assert_eq!(config.dispatcher.workers, 2);
        assert_eq!(config.dispatcher.queue_depth, 1024);
        assert_eq!(config.query.timeout(), Duration::from_millis(250));
        assert_eq!(config.query.count_cache_ttl(), None);
        assert_eq!(config.query.default_page_size, 20);
    }

    #[test]
    fn test_configuration_env_override() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        writeln!(
            file,
            r#"
database:
  url: "${{PRESENCE_TEST_DB_URL:-postgres://localhost/fallback}}"
api:
  addr: "${{PRESENCE_TEST_API_ADDR:-127.0.0.1:7200}}"
"#
        )
        .unwrap();

        unsafe {
            std::env::set_var("PRESENCE_TEST_API_ADDR", "127.0.0.1:9000");
            std::env::remove_var("PRESENCE_TEST_DB_URL");
        }

        let config = Configuration::load(file.path().to_str().unwrap()).unwrap();

        unsafe {
            std::env::remove_var("PRESENCE_TEST_API_ADDR");
        }

        assert_eq!(config.api.addr.to_port(), 9000);
        assert_eq!(config.database.url.as_str(), "postgres://localhost/fallback");
    }
}
