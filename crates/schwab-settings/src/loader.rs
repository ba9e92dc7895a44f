//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SchwabSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `SCHWAB_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{AuthMode, SchwabSettings};

/// Resolve the path to the settings file (`~/.schwab/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".schwab").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SchwabSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SchwabSettings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings, &|name| std::env::var(name).ok());
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn load_file(path: &Path) -> Result<SchwabSettings> {
    let defaults = serde_json::to_value(SchwabSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
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
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply environment overrides read through `env`.
///
/// Empty values are ignored. Values that fail to parse or fall outside their
/// range are logged and ignored.
pub fn apply_env_overrides(settings: &mut SchwabSettings, env: &dyn Fn(&str) -> Option<String>) {
    let read = |name: &str| env(name).filter(|v| !v.is_empty());

    // ── Auth mode ───────────────────────────────────────────────────
    if let Some(v) = read("SCHWAB_AUTH_MODE") {
        match parse_auth_mode(&v) {
            Some(mode) => settings.auth.mode = mode,
            None => tracing::warn!(key = "SCHWAB_AUTH_MODE", value = %v, "invalid auth mode, ignoring"),
        }
    }

    // ── API settings ────────────────────────────────────────────────
    if let Some(v) = read("SCHWAB_BASE_URL") {
        settings.api.base_url = v;
    }
    if let Some(v) = read("SCHWAB_CLIENT_ID") {
        settings.api.client_id = v;
    }
    if let Some(v) = read("SCHWAB_CLIENT_SECRET") {
        settings.api.client_secret = v;
    }
    if let Some(v) = read("SCHWAB_REDIRECT_URI") {
        settings.api.redirect_uri = v;
    }
    if let Some(v) = read("SCHWAB_AUTHORIZATION_CODE") {
        settings.api.authorization_code = Some(v);
    }
    if let Some(v) = read("SCHWAB_REFRESH_TOKEN") {
        settings.api.refresh_token = Some(v);
    }

    // ── Delegated settings ──────────────────────────────────────────
    if let Some(v) = read("SCHWAB_API_URL") {
        settings.delegated.get_or_insert_with(Default::default).api_url = v;
    }
    if let Some(v) = read("SCHWAB_DEPLOY_ID") {
        settings.delegated.get_or_insert_with(Default::default).deploy_id = v;
    }
    if let Some(v) = read("SCHWAB_PROJECT_ID") {
        match parse_i64_range(&v, 0, i64::MAX) {
            Some(id) => settings.delegated.get_or_insert_with(Default::default).project_id = id,
            None => tracing::warn!(key = "SCHWAB_PROJECT_ID", value = %v, "invalid i64 env var, ignoring"),
        }
    }
    if let Some(v) = read("SCHWAB_ACCOUNT_NUMBER") {
        settings.delegated.get_or_insert_with(Default::default).account_number = v;
    }

    // ── Retry settings ──────────────────────────────────────────────
    if let Some(v) = read("SCHWAB_MAX_ATTEMPTS") {
        match parse_u64_range(&v, 1, 10).and_then(|n| u32::try_from(n).ok()) {
            Some(n) => settings.retry.max_attempts = n,
            None => tracing::warn!(key = "SCHWAB_MAX_ATTEMPTS", value = %v, "invalid u32 env var, ignoring"),
        }
    }
    if let Some(v) = read("SCHWAB_BACKOFF_MS") {
        match parse_u64_range(&v, 0, 60_000) {
            Some(n) => settings.retry.backoff_ms = n,
            None => tracing::warn!(key = "SCHWAB_BACKOFF_MS", value = %v, "invalid u64 env var, ignoring"),
        }
    }

    // ── Logging settings ────────────────────────────────────────────
    if let Some(v) = read("SCHWAB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("SCHWAB_LOG_JSON") {
        match parse_bool(&v) {
            Some(b) => settings.logging.json = b,
            None => tracing::warn!(key = "SCHWAB_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a string as an `i64` within a range.
pub fn parse_i64_range(val: &str, min: i64, max: i64) -> Option<i64> {
    let n: i64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse an auth mode name (case-insensitive).
pub fn parse_auth_mode(val: &str) -> Option<AuthMode> {
    match val.to_lowercase().as_str() {
        "oauth" => Some(AuthMode::OAuth),
        "delegated" => Some(AuthMode::Delegated),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
