//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GqlWsSettings::default()`]
//! 2. If a settings file is given and exists, deep-merge it over defaults
//! 3. Apply `GQLWS_*` environment overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{GqlWsSettings, LogFormat};

/// Load settings from an optional file with env var overrides.
pub fn load_settings(path: Option<&Path>) -> Result<GqlWsSettings> {
    match path {
        Some(path) => load_settings_from_path(path),
        None => {
            let mut settings = GqlWsSettings::default();
            apply_env_overrides(&mut settings);
            settings.validate()?;
            Ok(settings)
        }
    }
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<GqlWsSettings> {
    let defaults = serde_json::to_value(GqlWsSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: GqlWsSettings = serde_json::from_value(merged)?;
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

/// Apply `GQLWS_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut GqlWsSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` to read variables.
///
/// Invalid values are ignored with a warning and leave the current value.
pub fn apply_overrides_from<F>(settings: &mut GqlWsSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("GQLWS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.ranged("GQLWS_PORT", 1_u16, 65_535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("GQLWS_PATH") {
        settings.server.path = v;
    }
    if let Some(v) = env.string("GQLWS_SUBPROTOCOL") {
        settings.server.subprotocol = v;
    }
    if let Some(v) = env.string("GQLWS_ALLOWED_ORIGINS") {
        match parse_origin_list(&v) {
            Some(origins) => settings.server.allowed_origins = origins,
            None => warn!(
                key = "GQLWS_ALLOWED_ORIGINS",
                value = %v,
                "origin list names no origin, ignoring"
            ),
        }
    }
    if let Some(v) = env.ranged("GQLWS_KEEP_ALIVE_MS", 0_u64, 600_000) {
        settings.server.keep_alive_interval_ms = v;
    }
    if let Some(v) = env.ranged("GQLWS_SEND_QUEUE", 1_usize, 65_536) {
        settings.server.send_queue_size = v;
    }
    if let Some(v) = env.ranged("GQLWS_MAX_MESSAGE_SIZE", 1024_usize, 16 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("GQLWS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("GQLWS_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(
                key = "GQLWS_LOG_FORMAT",
                value = %v,
                "invalid log format env var, ignoring"
            ),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a comma-separated origin list. `*` yields `Some(None)`, meaning
/// "accept every origin".
///
/// Returns `None` when the list names no origin at all.
pub fn parse_origin_list(val: &str) -> Option<Option<Vec<String>>> {
    if val.trim() == "*" {
        return Some(None);
    }
    let origins: Vec<String> = val
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    (!origins.is_empty()).then_some(Some(origins))
}

/// Parse a value as a number within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

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

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = (self.lookup)(name)?;
        let result = parse_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_skips_null() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_replaces_arrays() {
        let target = serde_json::json!({"origins": ["a", "b"]});
        let source = serde_json::json!({"origins": ["c"]});
        assert_eq!(deep_merge(target, source)["origins"], serde_json::json!(["c"]));
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server":{{"port":9100,"path":"/graphql","keepAliveIntervalMs":15000}}}}"#
        )
        .unwrap();
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.path, "/graphql");
        assert_eq!(settings.server.keep_alive_interval_ms, 15_000);
        assert_eq!(settings.server.subprotocol, "graphql-ws");
    }

    #[test]
    fn invalid_json_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert_matches!(err, SettingsError::Json(_));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server":{{"path":"nope"}}}}"#).unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert_matches!(err, SettingsError::InvalidValue(_));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = GqlWsSettings::default();
        apply_overrides_from(
            &mut settings,
            env_of(&[
                ("GQLWS_HOST", "0.0.0.0"),
                ("GQLWS_PORT", "4000"),
                ("GQLWS_ALLOWED_ORIGINS", "https://a.test, https://b.test"),
                ("GQLWS_KEEP_ALIVE_MS", "10000"),
                ("GQLWS_LOG_FORMAT", "json"),
            ]),
        );
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 4000);
        assert_eq!(
            settings.server.allowed_origins,
            Some(vec!["https://a.test".into(), "https://b.test".into()])
        );
        assert_eq!(settings.server.keep_alive_interval_ms, 10_000);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = GqlWsSettings::default();
        apply_overrides_from(
            &mut settings,
            env_of(&[
                ("GQLWS_PORT", "99999"),
                ("GQLWS_SEND_QUEUE", "0"),
                ("GQLWS_LOG_FORMAT", "xml"),
                ("GQLWS_HOST", ""),
            ]),
        );
        assert_eq!(settings, GqlWsSettings::default());
    }

    #[test]
    fn star_resets_origin_list() {
        let mut settings = GqlWsSettings::default();
        settings.server.allowed_origins = Some(vec!["https://a.test".into()]);
        apply_overrides_from(&mut settings, env_of(&[("GQLWS_ALLOWED_ORIGINS", "*")]));
        assert!(settings.server.allowed_origins.is_none());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_range_bounds() {
        assert_eq!(parse_range("10", 1_u16, 10), Some(10));
        assert_eq!(parse_range("0", 1_u16, 10), None);
        assert_eq!(parse_range("abc", 1_u16, 10), None);
        assert_eq!(parse_range(" 5 ", 1_usize, 10), Some(5));
    }

    #[test]
    fn parse_origin_list_skips_blanks() {
        assert_eq!(
            parse_origin_list("a, ,b,"),
            Some(Some(vec!["a".to_owned(), "b".to_owned()]))
        );
        assert_eq!(parse_origin_list(" * "), Some(None));
    }

    #[test]
    fn parse_origin_list_rejects_empty_list() {
        assert_eq!(parse_origin_list(" , "), None);
        assert_eq!(parse_origin_list(","), None);
    }

    #[test]
    fn blank_origin_env_keeps_current_policy() {
        let mut settings = GqlWsSettings::default();
        settings.server.allowed_origins = Some(vec!["https://a.test".into()]);
        apply_overrides_from(&mut settings, env_of(&[("GQLWS_ALLOWED_ORIGINS", " , ")]));
        assert_eq!(
            settings.server.allowed_origins,
            Some(vec!["https://a.test".to_owned()])
        );
    }

    #[test]
    fn parse_log_format_names() {
        assert_eq!(parse_log_format("JSON"), Some(LogFormat::Json));
        assert_eq!(parse_log_format("text"), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("yaml"), None);
    }
}
