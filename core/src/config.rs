use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{Nutrient, ParticipantId, default_nutrients};

/// Rows between the header and the first reading in a Dexcom export
/// (device, patient and alert metadata).
///
/// Verified only against the study's own exports; other CGM exports may differ.
pub const SENSOR_PREAMBLE_ROWS: usize = 12;

/// Fraction of the daily value at which a nutrient counts as present in a meal.
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 0.05;

pub const DEFAULT_WINDOW_MINUTES: i64 = 120;

/// Upper bound on the post-meal window: one week.
pub const MAX_WINDOW_MINUTES: i64 = 7 * 24 * 60;

/// Ranking limit used when ranking is requested without an explicit K.
pub const DEFAULT_TOP_K: usize = 20;

/// Participants with incomplete recordings in the original study. Kept for
/// reference only; nothing is excluded unless configured.
pub const HISTORICAL_EXCLUSIONS: [ParticipantId; 5] = [3, 7, 13, 15, 16];

const ID_PLACEHOLDER: &str = "{id}";

/// Every setting has a default, so an empty TOML document is a valid
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub nutrients: NutrientConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory holding every input file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_participants")]
    pub participants: Vec<ParticipantId>,
    /// Participants skipped entirely: no files are read and no rows are written.
    #[serde(default)]
    pub exclude: Vec<ParticipantId>,
    /// Zero-padding applied to IDs in file names (`7` -> `007`).
    #[serde(default = "default_id_width")]
    pub id_width: usize,
    #[serde(default = "default_sensor_file")]
    pub sensor_file: String,
    #[serde(default = "default_meal_file")]
    pub meal_file: String,
    #[serde(default = "default_demographics_file")]
    pub demographics_file: String,
    #[serde(default = "default_preamble_rows")]
    pub sensor_preamble_rows: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            participants: default_participants(),
            exclude: Vec::new(),
            id_width: default_id_width(),
            sensor_file: default_sensor_file(),
            meal_file: default_meal_file(),
            demographics_file: default_demographics_file(),
            sensor_preamble_rows: default_preamble_rows(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_participants() -> Vec<ParticipantId> {
    (1..=16).collect()
}

fn default_id_width() -> usize {
    3
}

fn default_sensor_file() -> String {
    "Dexcom_{id}.csv".to_string()
}

fn default_meal_file() -> String {
    "Food_Log_{id}.csv".to_string()
}

fn default_demographics_file() -> String {
    "Demographics.csv".to_string()
}

fn default_preamble_rows() -> usize {
    SENSOR_PREAMBLE_ROWS
}

impl InputConfig {
    fn file_for(&self, pattern: &str, id: ParticipantId) -> PathBuf {
        let padded = format!("{id:0width$}", width = self.id_width);
        self.data_dir.join(pattern.replace(ID_PLACEHOLDER, &padded))
    }

    #[must_use]
    pub fn sensor_path(&self, id: ParticipantId) -> PathBuf {
        self.file_for(&self.sensor_file, id)
    }

    #[must_use]
    pub fn meal_path(&self, id: ParticipantId) -> PathBuf {
        self.file_for(&self.meal_file, id)
    }

    #[must_use]
    pub fn demographics_path(&self) -> PathBuf {
        self.data_dir.join(&self.demographics_file)
    }

    #[must_use]
    pub fn is_excluded(&self, id: ParticipantId) -> bool {
        self.exclude.contains(&id)
    }

    /// Configured participants minus exclusions, deduplicated, in configured order.
    #[must_use]
    pub fn active_participants(&self) -> Vec<ParticipantId> {
        let mut seen = HashSet::new();
        self.participants
            .iter()
            .copied()
            .filter(|id| !self.is_excluded(*id) && seen.insert(*id))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Order here is the column order of the output.
    #[serde(default = "default_nutrients")]
    pub tracked: Vec<Nutrient>,
}

impl Default for NutrientConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            tracked: default_nutrients(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_SIGNIFICANCE_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
        }
    }
}

fn default_window_minutes() -> i64 {
    DEFAULT_WINDOW_MINUTES
}

impl MatchingConfig {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::try_minutes(self.window_minutes).unwrap_or(Duration::MAX)
    }
}

/// Which aggregation policy produces the output rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// One row per matched meal.
    #[default]
    PerMeal,
    /// One row per (participant, nutrient) with the mean peak.
    PerNutrient,
}

impl PolicyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::PerMeal => "per-meal",
            PolicyKind::PerNutrient => "per-nutrient",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub policy: PolicyKind,
    /// Per-meal only: keep the K highest-peak meals per participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Per-meal only: add the `logged_food` column.
    #[serde(default)]
    pub include_food: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            policy: PolicyKind::default(),
            top_k: None,
            include_food: false,
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("glucose_peaks_by_nutrient.csv")
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|source| PipelineError::MissingInput {
                participant: None,
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    /// Reject settings that would make every run meaningless.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        let threshold = self.nutrients.threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return invalid(format!("threshold must be in (0, 1], got {threshold}"));
        }
        if self.nutrients.tracked.is_empty() {
            return invalid("at least one nutrient must be tracked".to_string());
        }
        let mut names = HashSet::new();
        for n in &self.nutrients.tracked {
            if n.name.trim().is_empty() {
                return invalid("nutrient name must not be empty".to_string());
            }
            if !(n.daily_value.is_finite() && n.daily_value > 0.0) {
                return invalid(format!(
                    "daily value for '{}' must be positive, got {}",
                    n.name, n.daily_value
                ));
            }
            if !names.insert(n.name.as_str()) {
                return invalid(format!("nutrient '{}' is listed twice", n.name));
            }
        }
        let window = self.matching.window_minutes;
        if !(1..=MAX_WINDOW_MINUTES).contains(&window)
            || Duration::try_minutes(window).is_none()
        {
            return invalid(format!(
                "window_minutes must be between 1 and {MAX_WINDOW_MINUTES}, got {window}"
            ));
        }
        if self.output.top_k == Some(0) {
            return invalid("top_k must be at least 1".to_string());
        }
        for (key, pattern) in [
            ("sensor_file", &self.input.sensor_file),
            ("meal_file", &self.input.meal_file),
        ] {
            if !pattern.contains(ID_PLACEHOLDER) {
                return invalid(format!("{key} must contain {ID_PLACEHOLDER}, got '{pattern}'"));
            }
        }
        if self.input.active_participants().is_empty() {
            return invalid("no participants left after exclusions".to_string());
        }
        Ok(())
    }

    /// The default configuration rendered as TOML.
    #[must_use]
    pub fn default_toml() -> String {
        let body = toml::to_string_pretty(&Self::default()).unwrap_or_default();
        format!(
            "# glucopeak configuration\n\
             # Historical exclusion list for the original study: {HISTORICAL_EXCLUSIONS:?}\n\
             # Set output.top_k to rank per-meal rows by peak and keep the K highest.\n\n{body}"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.input.participants.len(), 16);
        assert_eq!(config.input.sensor_preamble_rows, 12);
        assert_eq!(config.matching.window(), Duration::hours(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = PipelineConfig::from_toml_str(
            r#"
[input]
data_dir = "data"
participants = [1, 2, 3]
exclude = [3]

[output]
policy = "per-nutrient"
path = "out.csv"
"#,
        )
        .unwrap();
        assert_eq!(config.input.data_dir, PathBuf::from("data"));
        assert_eq!(config.input.active_participants(), vec![1, 2]);
        assert_eq!(config.output.policy, PolicyKind::PerNutrient);
        assert_eq!(config.output.top_k, None);
        assert!((config.nutrients.threshold - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_custom_nutrients() {
        let config = PipelineConfig::from_toml_str(
            r#"
[nutrients]
threshold = 0.1

[[nutrients.tracked]]
name = "protein"
label = "Protein"
daily_value = 50
"#,
        )
        .unwrap();
        assert_eq!(config.nutrients.tracked.len(), 1);
        assert_eq!(config.nutrients.tracked[0].label, "Protein");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = PipelineConfig::from_toml_str("[output]\npolicy = \"per-week\"\n");
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_file_paths_are_zero_padded() {
        let input = InputConfig {
            data_dir: PathBuf::from("/data"),
            ..InputConfig::default()
        };
        assert_eq!(input.sensor_path(7), PathBuf::from("/data/Dexcom_007.csv"));
        assert_eq!(input.meal_path(12), PathBuf::from("/data/Food_Log_012.csv"));
        assert_eq!(
            input.demographics_path(),
            PathBuf::from("/data/Demographics.csv")
        );
    }

    #[test]
    fn test_active_participants_dedup_and_exclude() {
        let input = InputConfig {
            participants: vec![4, 2, 4, 9, 2],
            exclude: vec![9],
            ..InputConfig::default()
        };
        assert_eq!(input.active_participants(), vec![4, 2]);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = PipelineConfig::default();
        config.nutrients.threshold = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.nutrients.tracked[1].daily_value = -1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.nutrients.tracked.push(Nutrient::new("sugar", "Sugar", 50.0));
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.matching.window_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.matching.window_minutes = -30;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.output.top_k = Some(0);
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.input.sensor_file = "Dexcom.csv".to_string();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.input.participants = vec![3];
        config.input.exclude = vec![3];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_huge_window() {
        let mut config = PipelineConfig::default();
        config.matching.window_minutes = 1_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("window_minutes"));
        // the accessor itself must not panic on an unvalidated value
        assert_eq!(config.matching.window(), Duration::MAX);

        config.matching.window_minutes = i64::MAX;
        assert!(config.validate().is_err());

        config.matching.window_minutes = MAX_WINDOW_MINUTES;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let text = PipelineConfig::default_toml();
        assert!(text.contains("[input]"));
        assert!(text.contains("[[nutrients.tracked]]"));
        assert!(text.contains("[output]"));
        let parsed = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, PipelineConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let result = PipelineConfig::load(Path::new("/nonexistent/glucopeak.toml"));
        assert!(matches!(result, Err(PipelineError::MissingInput { .. })));
    }
}
