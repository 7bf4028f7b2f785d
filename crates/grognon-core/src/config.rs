use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_DB_FILE: &str = "grognon.db";
pub const DEFAULT_CONFIG_FILE: &str = "./grognon.toml";
pub const DEFAULT_TICK_SECS: u64 = 30; // cron sweep cadence
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300; // 0 = unbounded
pub const DEFAULT_REFRESH_SECS: u64 = 5 * 60;
pub const DEFAULT_REFLECT_SECS: u64 = 30 * 60;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Top-level config (grognon.toml + GROGNON_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrognonConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
}

/// Where the metadata store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Data folder, created on startup if missing.
    #[serde(default = "default_data_dir")]
    pub dir: String,
    /// SQLite file name inside `dir`.
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            db_file: default_db_file(),
        }
    }
}

impl DataConfig {
    /// Full path of the metadata store file.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.db_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two cron sweeps. The first sweep runs on startup.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Upper bound for one external query (inference probe or scheduled run).
    /// Zero disables the bound.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn query_timeout(&self) -> Option<std::time::Duration> {
        (self.query_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.query_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    /// Seconds between registry refreshes (ping + reconnect).
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    /// Seconds between two reflection passes over every connection.
    #[serde(default = "default_reflect_secs")]
    pub reflect_secs: u64,
    /// SQLite busy timeout applied to every live handle.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh_secs(),
            reflect_secs: default_reflect_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}
fn default_db_file() -> String {
    DEFAULT_DB_FILE.to_string()
}
fn default_tick_secs() -> u64 {
    DEFAULT_TICK_SECS
}
fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}
fn default_refresh_secs() -> u64 {
    DEFAULT_REFRESH_SECS
}
fn default_reflect_secs() -> u64 {
    DEFAULT_REFLECT_SECS
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl GrognonConfig {
    /// Load config from a TOML file with GROGNON_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `GROGNON_SCHEDULER__TICK_SECS=10`. A missing file is not an error,
    /// the defaults and env overrides still apply.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        let config: GrognonConfig = Figment::from(Serialized::defaults(GrognonConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("GROGNON_").split("__"))
            .extract()
            .map_err(|e| crate::error::GrognonError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_match_constants() {
        let cfg = GrognonConfig::default();
        assert_eq!(cfg.data.dir, "./data");
        assert_eq!(cfg.data.db_path(), PathBuf::from("./data/grognon.db"));
        assert_eq!(cfg.scheduler.tick_secs, 30);
        assert_eq!(cfg.connections.refresh_secs, 300);
        assert_eq!(cfg.connections.reflect_secs, 1800);
    }

    #[test]
    fn zero_timeout_disables_bound() {
        let cfg = SchedulerConfig {
            tick_secs: 1,
            query_timeout_secs: 0,
        };
        assert!(cfg.query_timeout().is_none());
        assert_eq!(
            SchedulerConfig::default().query_timeout(),
            Some(std::time::Duration::from_secs(300))
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = GrognonConfig::load(Some("does-not-exist.toml"))
                .map_err(|e| e.to_string())?;
            assert_eq!(cfg.scheduler.tick_secs, DEFAULT_TICK_SECS);
            assert_eq!(cfg.data.db_file, DEFAULT_DB_FILE);
            Ok(())
        });
    }

    #[test]
    fn file_and_env_overrides_merge() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "grognon.toml",
                r#"
                [data]
                dir = "/var/lib/grognon"

                [scheduler]
                tick_secs = 10
                "#,
            )?;
            jail.set_env("GROGNON_SCHEDULER__QUERY_TIMEOUT_SECS", "42");

            let cfg = GrognonConfig::load(Some("grognon.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.data.dir, "/var/lib/grognon");
            assert_eq!(cfg.data.db_file, DEFAULT_DB_FILE);
            assert_eq!(cfg.scheduler.tick_secs, 10);
            assert_eq!(cfg.scheduler.query_timeout_secs, 42);
            assert_eq!(cfg.connections.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
            Ok(())
        });
    }
}
