//! Settings loading with deep merge and environment variable overrides.
//!
//! 1. Start with compiled [`BoxesSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `BOXES_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::BoxesSettings;

/// Base directory for settings and data: `$BOXES_HOME`, else `~/.boxes`.
pub fn boxes_home() -> PathBuf {
    if let Some(dir) = std::env::var_os("BOXES_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".boxes")
}

pub fn settings_path() -> PathBuf {
    boxes_home().join("settings.json")
}

/// Load from the default path with env overrides.
pub fn load_settings() -> Result<BoxesSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` with env overrides. A missing file yields defaults;
/// invalid JSON or out-of-range values are errors.
pub fn load_settings_from_path(path: &Path) -> Result<BoxesSettings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

fn load_file(path: &Path) -> Result<BoxesSettings> {
    let defaults = serde_json::to_value(BoxesSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_owned(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, arrays and primitives are replaced, and nulls in
/// `source` are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `BOXES_*` overrides read through `lookup`. Invalid values are
/// logged and ignored.
pub fn apply_env_overrides<F>(settings: &mut BoxesSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("BOXES_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("BOXES_PORT", parse_port) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("BOXES_DATABASE") {
        settings.database.path = PathBuf::from(v);
    }
    if let Some(v) = env.string("BOXES_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("BOXES_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
    if let Some(v) = env.parsed("BOXES_AVERAGE_AREA_LIMIT", parse_limit) {
        settings.rules.average_area_limit = v;
    }
    if let Some(v) = env.parsed("BOXES_WEEKLY_TOTAL_LIMIT", parse_count) {
        settings.rules.weekly_total_limit = v;
    }
    if let Some(v) = env.parsed("BOXES_WEEKLY_PER_USER_LIMIT", parse_count) {
        settings.rules.weekly_per_user_limit = v;
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, key: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.string(key)?;
        let parsed = parse(raw.trim());
        if parsed.is_none() {
            tracing::warn!(key, value = %raw, "invalid env override, ignoring");
        }
        parsed
    }
}

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_port(val: &str) -> Option<u16> {
    val.parse::<u16>().ok().filter(|p| *p >= 1)
}

pub fn parse_count(val: &str) -> Option<u32> {
    val.parse().ok()
}

pub fn parse_limit(val: &str) -> Option<f64> {
    val.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
