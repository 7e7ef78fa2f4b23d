//! Tracing setup: one `EnvFilter` (reloadable at runtime) in front of a JSON
//! or human-readable fmt layer.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "concierge_search" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines when true, pretty output otherwise.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: true,
        }
    }
}

impl TelemetryConfig {
    /// Build from a textual level such as `"debug"`. Unknown levels fall
    /// back to INFO.
    pub fn from_level(level: &str, json: bool) -> Self {
        Self {
            log_level: Level::from_str(level).unwrap_or(Level::INFO),
            module_levels: Vec::new(),
            json,
        }
    }

    pub fn with_module_level(mut self, module: impl Into<String>, level: Level) -> Self {
        self.module_levels.push((module.into(), level));
        self
    }
}

/// Render the filter directive string for a base level plus overrides.
pub fn filter_directives(base: Level, module_levels: &[(String, Level)]) -> String {
    let mut directives = base.to_string().to_lowercase();
    for (module, level) in module_levels {
        directives.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    directives
}

/// Handle returned by [`init_telemetry`]. Keeps the filter reloadable.
pub struct TelemetryGuard {
    base_level: Level,
    module_levels: Arc<RwLock<Vec<(String, Level)>>>,
    reload: Option<reload::Handle<EnvFilter, Registry>>,
}

impl TelemetryGuard {
    /// Change the log level for a specific module at runtime.
    pub fn set_module_level(&self, module: &str, level: Level) {
        let directives = {
            let mut levels = self.module_levels.write();
            if let Some(entry) = levels.iter_mut().find(|(m, _)| m == module) {
                entry.1 = level;
            } else {
                levels.push((module.to_string(), level));
            }
            filter_directives(self.base_level, &levels)
        };
        if let Some(handle) = &self.reload {
            if let Err(e) = handle.reload(EnvFilter::new(&directives)) {
                tracing::warn!(error = %e, "failed to reload log filter");
            }
        }
    }

    /// Current per-module log level overrides.
    pub fn module_levels(&self) -> Vec<(String, Level)> {
        self.module_levels.read().clone()
    }
}

/// Initialize tracing. Call once at startup.
///
/// If a global subscriber is already installed (e.g. by a test harness) the
/// existing one is kept and the returned guard cannot reload it.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let directives = filter_directives(config.log_level, &config.module_levels);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    let (json_layer, pretty_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true);
        (Some(layer), None)
    } else {
        let layer = tracing_subscriber::fmt::layer().with_target(true).compact();
        (None, Some(layer))
    };

    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .is_ok();

    TelemetryGuard {
        base_level: config.log_level,
        module_levels: Arc::new(RwLock::new(config.module_levels)),
        reload: installed.then_some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_module_overrides() {
        let levels = vec![("concierge_search".to_string(), Level::DEBUG)];
        assert_eq!(filter_directives(Level::WARN, &levels), "warn,concierge_search=debug");
        assert_eq!(filter_directives(Level::INFO, &[]), "info");
    }

    #[test]
    fn config_from_level_string() {
        let config = TelemetryConfig::from_level("debug", false);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(!config.json);
        assert_eq!(TelemetryConfig::from_level("loud", true).log_level, Level::INFO);
    }

    #[test]
    fn guard_tracks_module_levels() {
        let guard = init_telemetry(
            TelemetryConfig::default().with_module_level("concierge_engine", Level::DEBUG),
        );
        guard.set_module_level("concierge_engine", Level::TRACE);
        guard.set_module_level("concierge_store", Level::WARN);
        let levels = guard.module_levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], ("concierge_engine".to_string(), Level::TRACE));
    }
}
