//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If `~/.parley/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{BackendPreference, ParleySettings};

/// Root directory for parley state (`~/.parley`).
pub fn parley_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley")
}

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    parley_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error. The merged result is validated.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ParleySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PARLEY_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_overrides_from<F>(settings: &mut ParleySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_DATA_DIR") {
        settings.storage.data_dir = PathBuf::from(v);
    }
    if let Some(v) = env.parsed("PARLEY_BACKEND", |v| v.parse::<BackendPreference>().ok()) {
        settings.storage.backend = v;
    }
    if let Some(v) = env.string("PARLEY_DATABASE_NAME") {
        settings.storage.database_name = v;
    }

    // ── Context ─────────────────────────────────────────────────────
    if let Some(v) = env.parsed("PARLEY_MAX_TOKENS", |v| parse_u64_range(v, 1, 10_000_000)) {
        settings.context.max_tokens = v;
    }
    if let Some(v) = env.parsed("PARLEY_RESERVE_TOKENS", |v| parse_u64_range(v, 0, 10_000_000)) {
        settings.context.reserve_tokens = v;
    }
    if let Some(v) = env.parsed("PARLEY_MAX_MESSAGE_TOKENS", |v| {
        parse_u64_range(v, 1, u64::from(u32::MAX)).map(|n| n as u32)
    }) {
        settings.context.max_message_tokens = v;
    }
    if let Some(v) = env.parsed("PARLEY_MAX_CONVERSATION_LENGTH", |v| {
        parse_usize_range(v, 1, 100_000)
    }) {
        settings.context.max_conversation_length = v;
    }
    if let Some(v) = env.string("PARLEY_TIMEZONE") {
        settings.context.timezone = v;
    }

    // ── Location ────────────────────────────────────────────────────
    if let Some(v) = env.parsed("PARLEY_LOCATION_ENABLED", parse_bool) {
        settings.location.enabled = v;
    }
    if let Some(v) = env.parsed("PARLEY_LATITUDE", |v| parse_f64_range(v, -90.0, 90.0)) {
        settings.location.latitude = Some(v);
    }
    if let Some(v) = env.parsed("PARLEY_LONGITUDE", |v| parse_f64_range(v, -180.0, 180.0)) {
        settings.location.longitude = Some(v);
    }
    if let Some(v) = env.string("PARLEY_GEOCODER_URL") {
        settings.location.geocoder_url = v;
    }
    if let Some(v) = env.parsed("PARLEY_GEOCODER_TIMEOUT_MS", |v| {
        parse_u64_range(v, 100, 60_000)
    }) {
        settings.location.timeout_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("PARLEY_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a finite `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ── Variable reader ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}
