// src/config.rs
// Process-wide configuration: loaded once at startup, read-only thereafter
// except for `table_ttl_overrides`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::Deserialize;

/// TTL category defaults, in seconds.
pub const TTL_LONG: i64 = 24 * 3600;
pub const TTL_MEDIUM: i64 = 3600;
pub const TTL_SHORT: i64 = 300;
pub const TTL_VERY_SHORT: i64 = 30;

/// Recognised configuration options.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "Config::default_ttl_seconds")]
    pub default_ttl_seconds: i64,

    #[serde(default)]
    table_ttl_overrides: HashMap<String, i64>,

    #[serde(default = "Config::default_cache_path")]
    pub cache_path: PathBuf,

    #[serde(default = "Config::default_timezone")]
    pub timezone: String,

    #[serde(default = "Config::default_max_fuzzy_edits_short")]
    pub max_fuzzy_edits_short: u32,

    #[serde(default = "Config::default_max_fuzzy_edits_long")]
    pub max_fuzzy_edits_long: u32,

    #[serde(default)]
    pub strict_filter_validation: bool,
}

impl Config {
    fn default_ttl_seconds() -> i64 {
        TTL_MEDIUM
    }

    fn default_cache_path() -> PathBuf {
        PathBuf::from("gridcache.sqlite3")
    }

    fn default_timezone() -> String {
        "UTC".to_string()
    }

    fn default_max_fuzzy_edits_short() -> u32 {
        1
    }

    fn default_max_fuzzy_edits_long() -> u32 {
        2
    }

    /// Load from a TOML file, falling back to defaults for anything absent.
    /// Environment variables of the form `GRIDCACHE_<FIELD>` override the
    /// file.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut cfg: Config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw)?
            }
            _ => toml::from_str("")?,
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GRIDCACHE_DEFAULT_TTL_SECONDS")
            && let Ok(parsed) = v.parse()
        {
            self.default_ttl_seconds = parsed;
        }
        if let Ok(v) = std::env::var("GRIDCACHE_CACHE_PATH") {
            self.cache_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("GRIDCACHE_TIMEZONE") {
            self.timezone = v;
        }
        if let Ok(v) = std::env::var("GRIDCACHE_STRICT_FILTER_VALIDATION") {
            self.strict_filter_validation = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    pub fn ttl_for_table(&self, table_id: &str) -> i64 {
        self.table_ttl_overrides
            .get(table_id)
            .copied()
            .unwrap_or(self.default_ttl_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_ttl_seconds: Self::default_ttl_seconds(),
            table_ttl_overrides: HashMap::new(),
            cache_path: Self::default_cache_path(),
            timezone: Self::default_timezone(),
            max_fuzzy_edits_short: Self::default_max_fuzzy_edits_short(),
            max_fuzzy_edits_long: Self::default_max_fuzzy_edits_long(),
            strict_filter_validation: false,
        }
    }
}

/// Mutable view over per-table TTL overrides. A control operation may
/// update this at runtime; changes take effect on the next cache write for
/// that table.
#[derive(Default)]
pub struct TableTtlOverrides(RwLock<HashMap<String, i64>>);

impl TableTtlOverrides {
    pub fn set(&self, table_id: impl Into<String>, ttl_seconds: i64) {
        self.0
            .write()
            .expect("table ttl override lock poisoned")
            .insert(table_id.into(), ttl_seconds);
    }

    pub fn get(&self, table_id: &str) -> Option<i64> {
        self.0
            .read()
            .expect("table ttl override lock poisoned")
            .get(table_id)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.default_ttl_seconds, TTL_MEDIUM);
        assert!(!cfg.strict_filter_validation);
    }

    #[test]
    fn ttl_override_falls_back_to_default() {
        let cfg = Config::default();
        assert_eq!(cfg.ttl_for_table("unknown_table"), cfg.default_ttl_seconds);
    }

    #[test]
    fn runtime_overrides_take_effect() {
        let overrides = TableTtlOverrides::default();
        assert_eq!(overrides.get("t1"), None);
        overrides.set("t1", 42);
        assert_eq!(overrides.get("t1"), Some(42));
    }
}
