//! Engine configuration.

use crate::assets::AssetCacheConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_DATA_DIR: &str = "DUNGEON_DATA_DIR";
pub const ENV_PLAYER_LEVEL: &str = "DUNGEON_PLAYER_LEVEL";
pub const ENV_WEAPON_MODIFIER: &str = "DUNGEON_WEAPON_MODIFIER";
pub const ENV_GENERATION_TIMEOUT_SECS: &str = "DUNGEON_GENERATION_TIMEOUT_SECS";
pub const ENV_CONTENT_TABLES: &str = "DUNGEON_CONTENT_TABLES";

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for a [`GameMaster`](crate::session::GameMaster).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Root for sessions and generated assets.
    pub data_dir: PathBuf,

    /// Party level used for encounter budgets.
    pub player_level: u32,

    /// Bonus added to player attack rolls.
    pub weapon_modifier: i32,

    /// Upper bound on one asset generation.
    pub generation_timeout: Duration,

    /// Optional JSON file replacing the built-in monster and loot tables.
    pub content_tables: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

impl EngineConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            player_level: 1,
            weapon_modifier: 5,
            generation_timeout: Duration::from_secs(60),
            content_tables: None,
        }
    }

    pub fn with_player_level(mut self, level: u32) -> Self {
        self.player_level = level;
        self
    }

    pub fn with_weapon_modifier(mut self, modifier: i32) -> Self {
        self.weapon_modifier = modifier;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_content_tables(mut self, path: impl Into<PathBuf>) -> Self {
        self.content_tables = Some(path.into());
        self
    }

    /// Read settings from `DUNGEON_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(lookup(ENV_DATA_DIR).unwrap_or_else(|| "data".to_string()));

        if let Some(level) = parse_var::<u32>(&lookup, ENV_PLAYER_LEVEL)? {
            if level == 0 {
                return Err(ConfigError::InvalidValue {
                    var: ENV_PLAYER_LEVEL,
                    value: level.to_string(),
                    reason: "level must be at least 1".to_string(),
                });
            }
            config.player_level = level;
        }
        if let Some(modifier) = parse_var::<i32>(&lookup, ENV_WEAPON_MODIFIER)? {
            config.weapon_modifier = modifier;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_GENERATION_TIMEOUT_SECS)? {
            config.generation_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup(ENV_CONTENT_TABLES).filter(|p| !p.trim().is_empty()) {
            config.content_tables = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("game_assets")
    }

    pub fn asset_cache_config(&self) -> AssetCacheConfig {
        AssetCacheConfig::new(self.assets_dir()).with_generation_timeout(self.generation_timeout)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                var,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.player_level, 1);
        assert_eq!(config.weapon_modifier, 5);
        assert_eq!(config.sessions_dir(), PathBuf::from("data/sessions"));
        assert_eq!(config.assets_dir(), PathBuf::from("data/game_assets"));
    }

    #[test]
    fn test_reads_every_variable() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/srv/dungeon"),
            (ENV_PLAYER_LEVEL, "4"),
            (ENV_WEAPON_MODIFIER, "-1"),
            (ENV_GENERATION_TIMEOUT_SECS, " 15 "),
            (ENV_CONTENT_TABLES, "tables.json"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/dungeon"));
        assert_eq!(config.player_level, 4);
        assert_eq!(config.weapon_modifier, -1);
        assert_eq!(config.generation_timeout, Duration::from_secs(15));
        assert_eq!(config.content_tables, Some(PathBuf::from("tables.json")));
        assert_eq!(
            config.asset_cache_config().generation_timeout,
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_bad_values_are_errors() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_PLAYER_LEVEL, "three")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == ENV_PLAYER_LEVEL));

        assert!(EngineConfig::from_lookup(lookup(&[(ENV_PLAYER_LEVEL, "0")])).is_err());
        assert!(
            EngineConfig::from_lookup(lookup(&[(ENV_GENERATION_TIMEOUT_SECS, "-5")])).is_err()
        );
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new("/tmp/x")
            .with_player_level(3)
            .with_weapon_modifier(2)
            .with_generation_timeout(Duration::from_millis(500))
            .with_content_tables("monsters.json");
        assert_eq!(config.player_level, 3);
        assert_eq!(config.weapon_modifier, 2);
        assert_eq!(config.content_tables, Some(PathBuf::from("monsters.json")));
    }
}
