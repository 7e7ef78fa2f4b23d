//! Settings type definitions.
//!
//! Field names are camelCase in JSON. Every section is `#[serde(default)]`,
//! so a partial file only overrides what it names.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConciergeSettings {
    pub search: SearchSettings,
    pub assessment: AssessmentSettings,
    pub orchestrator: OrchestratorSettings,
    pub conversation: ConversationSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

impl ConciergeSettings {
    /// Reject values that parse but cannot drive the engine.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_depth == 0 {
            return Err(SettingsError::InvalidValue(
                "orchestrator.maxDepth must be at least 1".into(),
            ));
        }
        if self.assessment.questions.is_empty() {
            return Err(SettingsError::InvalidValue(
                "assessment.questions must not be empty".into(),
            ));
        }
        for (name, score) in [
            ("search.resolutionMinScore", self.search.resolution_min_score),
            ("search.recommendationMinScore", self.search.recommendation_min_score),
            ("assessment.minScore", self.assessment.min_score),
        ] {
            if !(0.0..=1.0).contains(&score) {
                return Err(SettingsError::InvalidValue(format!(
                    "{name} must be within 0.0..=1.0, got {score}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSettings {
    /// Deadline for a single backend search call.
    pub timeout_ms: u64,
    /// Floor for the single-result lookup used by entity resolution.
    pub resolution_min_score: f64,
    /// How many articles a subject lookup keeps.
    pub subject_top_k: usize,
    /// Per-fragment cap for recommendation searches.
    pub recommendation_limit: usize,
    pub recommendation_min_score: f64,
}

impl SearchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            resolution_min_score: 0.35,
            subject_top_k: 3,
            recommendation_limit: 8,
            recommendation_min_score: 0.3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentSettings {
    /// The intake questions, asked in order.
    pub questions: Vec<String>,
    /// Relevance floor for assessment searches. No top-k cut is applied.
    pub min_score: f64,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            questions: vec![
                "What brings you here today, and what would you most like to feel better about?".into(),
                "How have you been sleeping, and how are your energy levels during the day?".into(),
                "How would you describe your stress levels lately?".into(),
                "What kinds of movement or activity do you enjoy, if any?".into(),
                "Is there anything you have tried before that helped, or that did not?".into(),
            ],
            min_score: 0.25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorSettings {
    /// Maximum model rounds with tools enabled.
    pub max_depth: u32,
    pub model_timeout_ms: u64,
    pub tool_timeout_ms: u64,
    /// Tool output longer than this is truncated before it is fed back.
    pub max_tool_output_chars: usize,
}

impl OrchestratorSettings {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_depth: 4,
            model_timeout_ms: 60_000,
            tool_timeout_ms: 20_000,
            max_tool_output_chars: 16_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationSettings {
    /// Past exchanges kept in the conversation state.
    pub transcript_turns: usize,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self { transcript_turns: 12 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// `~` expands to `$HOME`.
    pub database_path: String,
}

impl StoreSettings {
    pub fn resolved_database_path(&self) -> PathBuf {
        match self.database_path.strip_prefix("~/") {
            Some(rest) => crate::loader::home_dir().join(rest),
            None => PathBuf::from(&self.database_path),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: "~/.concierge/conversations.db".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// JSON lines when true, human-readable output otherwise.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ConciergeSettings::default();
        assert_eq!(s.search.timeout(), Duration::from_secs(5));
        assert_eq!(s.search.subject_top_k, 3);
        assert_eq!(s.assessment.questions.len(), 5);
        assert_eq!(s.orchestrator.max_depth, 4);
        assert_eq!(s.orchestrator.model_timeout(), Duration::from_secs(60));
        assert_eq!(s.conversation.transcript_turns, 12);
        assert!(s.logging.json);
        s.validate().unwrap();
    }

    #[test]
    fn camel_case_wire_names() {
        let json = serde_json::to_value(ConciergeSettings::default()).unwrap();
        assert!(json["search"].get("resolutionMinScore").is_some());
        assert!(json["orchestrator"].get("maxToolOutputChars").is_some());
        assert!(json["store"].get("databasePath").is_some());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let s: ConciergeSettings =
            serde_json::from_str(r#"{"orchestrator": {"maxDepth": 2}}"#).unwrap();
        assert_eq!(s.orchestrator.max_depth, 2);
        assert_eq!(s.orchestrator.tool_timeout_ms, 20_000);
    }

    #[test]
    fn validate_rejects_zero_depth_and_bad_scores() {
        let mut s = ConciergeSettings::default();
        s.orchestrator.max_depth = 0;
        assert!(s.validate().is_err());

        let mut s = ConciergeSettings::default();
        s.assessment.min_score = 1.5;
        assert!(s.validate().is_err());

        let mut s = ConciergeSettings::default();
        s.assessment.questions.clear();
        assert!(s.validate().is_err());
    }

    #[test]
    fn absolute_database_path_is_kept() {
        let store = StoreSettings {
            database_path: "/var/lib/concierge.db".into(),
        };
        assert_eq!(store.resolved_database_path(), PathBuf::from("/var/lib/concierge.db"));
    }
}
