use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use engine::{AppPaths, LoopConfig};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub(crate) const TUNING_ENV_VAR: &str = "SKIRMISH_TUNING";
const DEFAULT_TUNING_FILE: &str = "tuning.json";

/// Numbers the combat systems read every tick. Every field has a default, so an empty
/// object is a valid tuning file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CombatTuning {
    pub(crate) path_recompute_interval_seconds: f32,
    pub(crate) waypoint_tolerance: f32,
    /// Slack added to attack distance before a pursuit counts as arrived.
    pub(crate) arrival_margin: f32,
    pub(crate) return_epsilon: f32,
    pub(crate) death_grace_seconds: f32,
    pub(crate) defend_armor_bonus: i32,
    pub(crate) defend_duration_seconds: f32,
    pub(crate) defend_mana_cost: i32,
    pub(crate) target_tps: u32,
    pub(crate) tick_budget_ms: u64,
}

impl Default for CombatTuning {
    fn default() -> Self {
        Self {
            path_recompute_interval_seconds: 0.5,
            waypoint_tolerance: 0.1,
            arrival_margin: 0.25,
            return_epsilon: 0.2,
            death_grace_seconds: 5.0,
            defend_armor_bonus: 10,
            defend_duration_seconds: 2.0,
            defend_mana_cost: 10,
            target_tps: 60,
            tick_budget_ms: 4,
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum TuningError {
    #[error("read tuning '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse tuning '{path}': {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid tuning value '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

impl CombatTuning {
    pub(crate) fn from_json_str(raw: &str, path: &Path) -> Result<Self, TuningError> {
        let tuning: CombatTuning =
            parse_json_located(raw, "tuning json").map_err(|message| TuningError::Parse {
                path: path.to_path_buf(),
                message,
            })?;
        tuning.validate()?;
        Ok(tuning)
    }

    pub(crate) fn validate(&self) -> Result<(), TuningError> {
        positive("path_recompute_interval_seconds", self.path_recompute_interval_seconds)?;
        positive("waypoint_tolerance", self.waypoint_tolerance)?;
        non_negative("arrival_margin", self.arrival_margin)?;
        positive("return_epsilon", self.return_epsilon)?;
        non_negative("death_grace_seconds", self.death_grace_seconds)?;
        non_negative("defend_duration_seconds", self.defend_duration_seconds)?;
        if self.defend_armor_bonus < 0 {
            return Err(invalid("defend_armor_bonus", self.defend_armor_bonus));
        }
        if self.defend_mana_cost < 0 {
            return Err(invalid("defend_mana_cost", self.defend_mana_cost));
        }
        if self.target_tps == 0 {
            return Err(TuningError::Invalid {
                field: "target_tps",
                message: "expected at least 1 tick per second".to_string(),
            });
        }
        Ok(())
    }

    /// Loop settings derived from the tick rate and budget; everything else stays default.
    pub(crate) fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            target_tps: self.target_tps,
            tick_budget: Duration::from_millis(self.tick_budget_ms),
            ..LoopConfig::default()
        }
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), TuningError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TuningError::Invalid {
            field,
            message: format!("expected a finite number > 0, got {value}"),
        })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), TuningError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TuningError::Invalid {
            field,
            message: format!("expected a finite number >= 0, got {value}"),
        })
    }
}

fn invalid(field: &'static str, value: i32) -> TuningError {
    TuningError::Invalid {
        field,
        message: format!("expected >= 0, got {value}"),
    }
}

/// Deserializes `raw`, naming the JSON path of the first failure in the message.
pub(crate) fn parse_json_located<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
        Ok(value) => Ok(value),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse {what}: {source}"))
            } else {
                Err(format!("parse {what} at {path}: {source}"))
            }
        }
    }
}

/// `SKIRMISH_TUNING` when set (the file must exist), otherwise `assets/base/tuning.json`
/// falling back to defaults when that file is absent.
pub(crate) fn load_tuning(app_paths: &AppPaths) -> Result<CombatTuning, TuningError> {
    match std::env::var_os(TUNING_ENV_VAR) {
        Some(raw) if !raw.is_empty() => load_tuning_file(Path::new(&raw)),
        _ => {
            let default_path = app_paths.base_content_dir.join(DEFAULT_TUNING_FILE);
            if default_path.is_file() {
                load_tuning_file(&default_path)
            } else {
                info!(path = %default_path.display(), "tuning_defaults_used");
                Ok(CombatTuning::default())
            }
        }
    }
}

pub(crate) fn load_tuning_file(path: &Path) -> Result<CombatTuning, TuningError> {
    let raw = fs::read_to_string(path).map_err(|source| TuningError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let tuning = CombatTuning::from_json_str(&raw, path)?;
    info!(path = %path.display(), "tuning_loaded");
    Ok(tuning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_object_takes_defaults() {
        let tuning = CombatTuning::from_json_str("{}", Path::new("t.json")).expect("parse");
        assert_eq!(tuning, CombatTuning::default());
        assert_eq!(tuning.path_recompute_interval_seconds, 0.5);
        assert_eq!(tuning.death_grace_seconds, 5.0);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let tuning = CombatTuning::from_json_str(
            r#"{ "defend_mana_cost": 4, "arrival_margin": 0.5 }"#,
            Path::new("t.json"),
        )
        .expect("parse");
        assert_eq!(tuning.defend_mana_cost, 4);
        assert_eq!(tuning.arrival_margin, 0.5);
        assert_eq!(tuning.defend_armor_bonus, 10);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = CombatTuning::from_json_str(r#"{ "leash": 3 }"#, Path::new("t.json"))
            .expect_err("unknown field");
        assert!(matches!(err, TuningError::Parse { .. }));
        assert!(err.to_string().contains("leash"));
    }

    #[test]
    fn type_errors_name_the_json_path() {
        let err = CombatTuning::from_json_str(
            r#"{ "waypoint_tolerance": "far" }"#,
            Path::new("t.json"),
        )
        .expect_err("type error");
        let TuningError::Parse { message, .. } = err else {
            panic!("expected parse error");
        };
        assert!(message.contains("at waypoint_tolerance"), "{message}");
    }

    #[test]
    fn validation_rejects_non_positive_interval() {
        let err = CombatTuning::from_json_str(
            r#"{ "path_recompute_interval_seconds": 0.0 }"#,
            Path::new("t.json"),
        )
        .expect_err("invalid");
        assert!(matches!(
            err,
            TuningError::Invalid {
                field: "path_recompute_interval_seconds",
                ..
            }
        ));
    }

    #[test]
    fn loads_file_and_builds_loop_config() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("tuning.json");
        fs::write(&path, r#"{ "target_tps": 30, "tick_budget_ms": 8 }"#).expect("write");

        let tuning = load_tuning_file(&path).expect("load");
        let config = tuning.loop_config();
        assert_eq!(config.target_tps, 30);
        assert_eq!(config.tick_budget, Duration::from_millis(8));
        assert_eq!(config.max_ticks, None);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let temp = TempDir::new().expect("temp");
        let err = load_tuning_file(&temp.path().join("absent.json")).expect_err("missing");
        assert!(matches!(err, TuningError::Read { .. }));
    }
}
