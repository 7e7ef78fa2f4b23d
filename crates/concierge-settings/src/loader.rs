//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ConciergeSettings::default()`]
//! 2. If `~/.concierge/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `CONCIERGE_*` environment variable overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ConciergeSettings;

pub(crate) fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// Resolve the path to the settings file (`~/.concierge/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join(".concierge").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ConciergeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ConciergeSettings> {
    let defaults = serde_json::to_value(ConciergeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ConciergeSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `lookup`.
///
/// Out-of-range or unparseable values are ignored with a warning, leaving
/// the file/default value in place.
pub fn apply_env_overrides<F>(settings: &mut ConciergeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Search ──────────────────────────────────────────────────────
    if let Some(v) = env.u64("CONCIERGE_SEARCH_TIMEOUT_MS", 100, 600_000) {
        settings.search.timeout_ms = v;
    }
    if let Some(v) = env.score("CONCIERGE_RESOLUTION_MIN_SCORE") {
        settings.search.resolution_min_score = v;
    }
    if let Some(v) = env.usize("CONCIERGE_SUBJECT_TOP_K", 1, 50) {
        settings.search.subject_top_k = v;
    }
    if let Some(v) = env.usize("CONCIERGE_RECOMMENDATION_LIMIT", 1, 200) {
        settings.search.recommendation_limit = v;
    }
    if let Some(v) = env.score("CONCIERGE_RECOMMENDATION_MIN_SCORE") {
        settings.search.recommendation_min_score = v;
    }

    // ── Assessment ──────────────────────────────────────────────────
    if let Some(v) = env.score("CONCIERGE_ASSESSMENT_MIN_SCORE") {
        settings.assessment.min_score = v;
    }

    // ── Orchestrator ────────────────────────────────────────────────
    if let Some(v) = env.u64("CONCIERGE_MAX_DEPTH", 1, 32) {
        settings.orchestrator.max_depth = v as u32;
    }
    if let Some(v) = env.u64("CONCIERGE_MODEL_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.orchestrator.model_timeout_ms = v;
    }
    if let Some(v) = env.u64("CONCIERGE_TOOL_TIMEOUT_MS", 100, 3_600_000) {
        settings.orchestrator.tool_timeout_ms = v;
    }
    if let Some(v) = env.usize("CONCIERGE_MAX_TOOL_OUTPUT_CHARS", 256, 10_000_000) {
        settings.orchestrator.max_tool_output_chars = v;
    }

    // ── Conversation / store ────────────────────────────────────────
    if let Some(v) = env.usize("CONCIERGE_TRANSCRIPT_TURNS", 0, 1_000) {
        settings.conversation.transcript_turns = v;
    }
    if let Some(v) = env.string("CONCIERGE_DATABASE_PATH") {
        settings.store.database_path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CONCIERGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("CONCIERGE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// A relevance score in `0.0..=1.0`.
pub fn parse_score(val: &str) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (0.0..=1.0).contains(&n).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid {kind} env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "boolean", parse_bool)
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }

    fn score(&self, name: &str) -> Option<f64> {
        self.parsed(name, "score", parse_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"search": {"timeoutMs": 5000, "subjectTopK": 3}});
        let source = serde_json::json!({"search": {"timeoutMs": 2000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["search"]["timeoutMs"], 2000);
        assert_eq!(merged["search"]["subjectTopK"], 3);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"questions": ["a", "b", "c"]});
        let source = serde_json::json!({"questions": ["x"]});
        assert_eq!(deep_merge(target, source)["questions"], serde_json::json!(["x"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.search, ConciergeSettings::default().search);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"assessment": {"questions": ["Only one?"]}, "orchestrator": {"maxDepth": 2}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.assessment.questions, vec!["Only one?".to_string()]);
        assert_eq!(settings.assessment.min_score, 0.25);
        assert_eq!(settings.orchestrator.max_depth, 2);
        assert_eq!(settings.orchestrator.model_timeout_ms, 60_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_rejects_unusable_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"assessment": {"questions": []}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = ConciergeSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("CONCIERGE_MAX_DEPTH", "6"),
                ("CONCIERGE_RESOLUTION_MIN_SCORE", "0.5"),
                ("CONCIERGE_LOG_JSON", "off"),
                ("CONCIERGE_DATABASE_PATH", "/tmp/c.db"),
            ]),
        );
        assert_eq!(settings.orchestrator.max_depth, 6);
        assert_eq!(settings.search.resolution_min_score, 0.5);
        assert!(!settings.logging.json);
        assert_eq!(settings.store.database_path, "/tmp/c.db");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = ConciergeSettings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("CONCIERGE_MAX_DEPTH", "0"),
                ("CONCIERGE_RESOLUTION_MIN_SCORE", "2.0"),
                ("CONCIERGE_LOG_JSON", "maybe"),
                ("CONCIERGE_LOG_LEVEL", ""),
            ]),
        );
        assert_eq!(settings, ConciergeSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "ON"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_usize_range("-1", 0, 10), None);
        assert_eq!(parse_score("0.3"), Some(0.3));
        assert_eq!(parse_score("NaN"), None);
    }
}
