use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine::{AppPaths, Tilemap, Vec3};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use super::tuning::parse_json_located;

const SCENARIO_FILE: &str = "skirmish.json";
const FLOOR_TILE_ID: u16 = 0;
const WALL_TILE_ID: u16 = 2;

/// A scripted skirmish: the map, who stands where, and the player inputs fed in over time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    pub(crate) duration_seconds: f32,
    #[serde(default)]
    pub(crate) map: Option<MapSpec>,
    /// Square open-field bounds used when there is no map.
    #[serde(default)]
    pub(crate) arena_half_extent: Option<f32>,
    pub(crate) players: Vec<Placement>,
    #[serde(default)]
    pub(crate) active_player: usize,
    #[serde(default)]
    pub(crate) npcs: Vec<Placement>,
    #[serde(default)]
    pub(crate) spawn_points: Vec<SpawnPointSpec>,
    #[serde(default)]
    pub(crate) script: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MapSpec {
    pub(crate) width: u32,
    pub(crate) height: u32,
    #[serde(default)]
    pub(crate) origin: Vec3,
    /// Wall tiles as `[x, y]` pairs.
    #[serde(default)]
    pub(crate) blocked: Vec<[u32; 2]>,
}

impl MapSpec {
    pub(crate) fn to_tilemap(&self) -> Result<Tilemap, ScenarioError> {
        let mut tilemap = Tilemap::filled(self.width, self.height, self.origin, FLOOR_TILE_ID);
        for [x, y] in &self.blocked {
            if !tilemap.set_tile(*x, *y, WALL_TILE_ID) {
                return Err(ScenarioError::Invalid(format!(
                    "blocked tile ({x}, {y}) is outside the {}x{} map",
                    self.width, self.height
                )));
            }
        }
        Ok(tilemap)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Placement {
    pub(crate) archetype: String,
    pub(crate) position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SpawnPointSpec {
    pub(crate) name: String,
    pub(crate) archetype: String,
    pub(crate) position: Vec3,
    pub(crate) capacity: usize,
    /// How many to spawn on load; defaults to filling the point.
    #[serde(default)]
    pub(crate) initial: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScriptStep {
    pub(crate) at_seconds: f32,
    pub(crate) command: ScriptCommand,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", deny_unknown_fields)]
pub(crate) enum ScriptCommand {
    ToggleCombatMode,
    AttackNearestHostile,
    Defend,
    InteractNearestNpc,
    InspectNearest,
    SetActivePlayer { index: usize },
    MoveTo { position: Vec3 },
    Respawn { point: String },
}

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("read scenario '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse scenario '{path}': {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid scenario: {0}")]
    Invalid(String),
}

impl Scenario {
    pub(crate) fn from_json_str(raw: &str, path: &Path) -> Result<Self, ScenarioError> {
        let mut scenario: Scenario =
            parse_json_located(raw, "scenario json").map_err(|message| ScenarioError::Parse {
                path: path.to_path_buf(),
                message,
            })?;
        scenario.validate()?;
        scenario
            .script
            .sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
        Ok(scenario)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        if !(self.duration_seconds.is_finite() && self.duration_seconds > 0.0) {
            return Err(ScenarioError::Invalid(format!(
                "duration_seconds must be > 0, got {}",
                self.duration_seconds
            )));
        }
        if self.players.is_empty() {
            return Err(ScenarioError::Invalid(
                "at least one player is required".to_string(),
            ));
        }
        if self.active_player >= self.players.len() {
            return Err(ScenarioError::Invalid(format!(
                "active_player {} is out of range (have {})",
                self.active_player,
                self.players.len()
            )));
        }
        for point in &self.spawn_points {
            if point.initial.is_some_and(|initial| initial > point.capacity) {
                return Err(ScenarioError::Invalid(format!(
                    "spawn point '{}' starts with more than its capacity {}",
                    point.name, point.capacity
                )));
            }
        }
        for step in &self.script {
            if !(step.at_seconds.is_finite() && step.at_seconds >= 0.0) {
                return Err(ScenarioError::Invalid(format!(
                    "script step time must be >= 0, got {}",
                    step.at_seconds
                )));
            }
        }
        if let Some(half_extent) = self.arena_half_extent {
            if !(half_extent.is_finite() && half_extent > 0.0) {
                return Err(ScenarioError::Invalid(format!(
                    "arena_half_extent must be > 0, got {half_extent}"
                )));
            }
        }
        if let Some(map) = &self.map {
            map.to_tilemap()?;
        }
        Ok(())
    }
}

pub(crate) fn load_scenario(app_paths: &AppPaths) -> Result<Scenario, ScenarioError> {
    let path = app_paths.base_content_dir.join(SCENARIO_FILE);
    let raw = fs::read_to_string(&path).map_err(|source| ScenarioError::Read {
        path: path.clone(),
        source,
    })?;
    let scenario = Scenario::from_json_str(&raw, &path)?;
    info!(
        path = %path.display(),
        players = scenario.players.len(),
        spawn_points = scenario.spawn_points.len(),
        script_steps = scenario.script.len(),
        "scenario_loaded"
    );
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "duration_seconds": 10.0,
        "players": [{ "archetype": "Knight", "position": { "x": 0.0, "y": 0.0, "z": 0.0 } }]
    }"#;

    #[test]
    fn minimal_scenario_parses_with_defaults() {
        let scenario = Scenario::from_json_str(MINIMAL, Path::new("s.json")).expect("parse");
        assert_eq!(scenario.active_player, 0);
        assert!(scenario.map.is_none());
        assert!(scenario.script.is_empty());
    }

    #[test]
    fn script_commands_use_kind_tag_and_are_sorted() {
        let raw = r#"{
            "duration_seconds": 5.0,
            "players": [{ "archetype": "Knight", "position": { "x": 0.0, "y": 0.0, "z": 0.0 } }],
            "script": [
                { "at_seconds": 2.0, "command": { "kind": "Respawn", "point": "den" } },
                { "at_seconds": 0.5, "command": { "kind": "ToggleCombatMode" } },
                { "at_seconds": 1.0, "command": { "kind": "SetActivePlayer", "index": 0 } }
            ]
        }"#;
        let scenario = Scenario::from_json_str(raw, Path::new("s.json")).expect("parse");
        let commands = scenario
            .script
            .iter()
            .map(|step| step.command.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            commands,
            vec![
                ScriptCommand::ToggleCombatMode,
                ScriptCommand::SetActivePlayer { index: 0 },
                ScriptCommand::Respawn {
                    point: "den".to_string()
                },
            ]
        );
    }

    #[test]
    fn unknown_command_kind_reports_path() {
        let raw = r#"{
            "duration_seconds": 5.0,
            "players": [{ "archetype": "Knight", "position": { "x": 0.0, "y": 0.0, "z": 0.0 } }],
            "script": [{ "at_seconds": 1.0, "command": { "kind": "Dance" } }]
        }"#;
        let err = Scenario::from_json_str(raw, Path::new("s.json")).expect_err("bad kind");
        let ScenarioError::Parse { message, .. } = err else {
            panic!("expected parse error");
        };
        assert!(message.contains("script[0]"), "{message}");
    }

    #[test]
    fn blocked_tile_outside_map_is_invalid() {
        let raw = r#"{
            "duration_seconds": 5.0,
            "map": { "width": 4, "height": 4, "blocked": [[9, 1]] },
            "players": [{ "archetype": "Knight", "position": { "x": 0.5, "y": 0.0, "z": 0.5 } }]
        }"#;
        let err = Scenario::from_json_str(raw, Path::new("s.json")).expect_err("invalid");
        assert!(matches!(err, ScenarioError::Invalid(_)));
    }

    #[test]
    fn map_builds_walls() {
        let map = MapSpec {
            width: 3,
            height: 2,
            origin: Vec3::ZERO,
            blocked: vec![[1, 0]],
        };
        let tilemap = map.to_tilemap().expect("tilemap");
        assert_eq!(tilemap.tile_at(1, 0), Some(WALL_TILE_ID));
        assert_eq!(tilemap.tile_at(0, 0), Some(FLOOR_TILE_ID));
    }

    #[test]
    fn active_player_out_of_range_is_invalid() {
        let raw = MINIMAL.replace("\"duration_seconds\": 10.0,", "\"duration_seconds\": 10.0, \"active_player\": 3,");
        let err = Scenario::from_json_str(&raw, Path::new("s.json")).expect_err("invalid");
        assert!(err.to_string().contains("active_player"));
    }

    #[test]
    fn shipped_scenario_loads() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
        let scenario = load_scenario(&AppPaths::from_root(root)).expect("shipped scenario");
        assert_eq!(scenario.players.len(), 2);
        assert!(scenario.map.is_some());
        assert!(scenario
            .script
            .windows(2)
            .all(|pair| pair[0].at_seconds <= pair[1].at_seconds));
    }
}
