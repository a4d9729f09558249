use engine::{ArchetypeRole, DefDatabase, EntityId, Scene, SceneCommand, SceneWorld};
use tracing::{debug, info, warn};

use crate::app::scenario::{Scenario, ScriptCommand};
use crate::app::tuning::CombatTuning;

use super::commands::PlayerCommand;
use super::nav::{Navigator, OpenFieldNavigator, TilemapNavigator};
use super::sinks::{TracingIndicatorSink, TracingPresentationSink};
use super::types::{AggressionState, GameplayEventCounts};
use super::world::CombatWorld;

/// Headless skirmish: builds the combat world from a scenario and feeds it the
/// scripted player inputs until time runs out or every hostile is gone.
pub(crate) struct SkirmishScene {
    tuning: CombatTuning,
    scenario: Scenario,
    combat: Option<CombatWorld>,
    defs: DefDatabase,
    elapsed_seconds: f32,
    next_script_step: usize,
    totals: GameplayEventCounts,
}

impl SkirmishScene {
    pub(crate) fn new(tuning: CombatTuning, scenario: Scenario) -> Self {
        Self {
            tuning,
            scenario,
            combat: None,
            defs: DefDatabase::default(),
            elapsed_seconds: 0.0,
            next_script_step: 0,
            totals: GameplayEventCounts::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn combat(&self) -> Option<&CombatWorld> {
        self.combat.as_ref()
    }

    fn build_combat_world(&self, world: &mut SceneWorld) -> Result<CombatWorld, String> {
        let navigator: Box<dyn Navigator> = match &self.scenario.map {
            Some(map) => {
                let tilemap = map.to_tilemap().map_err(|err| err.to_string())?;
                let navigator = TilemapNavigator::from_tilemap(&tilemap);
                world.set_tilemap(tilemap);
                Box::new(navigator)
            }
            None => match self.scenario.arena_half_extent {
                Some(half_extent) => Box::new(OpenFieldNavigator::bounded(half_extent)),
                None => Box::new(OpenFieldNavigator::unbounded()),
            },
        };
        let mut combat = CombatWorld::new(
            self.tuning.clone(),
            navigator,
            Box::new(TracingPresentationSink),
        );

        for placement in &self.scenario.players {
            let def = self
                .defs
                .archetype_by_name(&placement.archetype)
                .ok_or_else(|| format!("unknown player archetype '{}'", placement.archetype))?;
            let id = combat.spawn_player(def, placement.position, world);
            combat.attach_indicator(id, Box::new(TracingIndicatorSink::new(id, &def.label)));
        }
        combat
            .set_active_player(self.scenario.active_player)
            .map_err(|err| err.to_string())?;

        for placement in &self.scenario.npcs {
            let def = self
                .defs
                .archetype_by_name(&placement.archetype)
                .ok_or_else(|| format!("unknown npc archetype '{}'", placement.archetype))?;
            combat.spawn_free(def, placement.position, world);
        }

        for point in &self.scenario.spawn_points {
            combat.add_spawn_point(&point.name, point.position, &point.archetype, point.capacity);
            for _ in 0..point.initial.unwrap_or(point.capacity) {
                let id = combat
                    .spawn_at(&point.name, &self.defs, world)
                    .map_err(|err| err.to_string())?;
                attach_tracing_indicator(&mut combat, id);
            }
        }
        Ok(combat)
    }

    fn script_exhausted(&self) -> bool {
        self.next_script_step >= self.scenario.script.len()
    }
}

fn attach_tracing_indicator(combat: &mut CombatWorld, id: EntityId) {
    let label = combat
        .actant(id)
        .map(|actant| actant.name().to_string())
        .unwrap_or_default();
    combat.attach_indicator(id, Box::new(TracingIndicatorSink::new(id, label)));
}

fn fire_script_command(
    combat: &mut CombatWorld,
    defs: &DefDatabase,
    command: &ScriptCommand,
    world: &mut SceneWorld,
) {
    let player_position = combat
        .active_player()
        .and_then(|id| combat.actant(id))
        .map(|actant| actant.position());

    match command {
        ScriptCommand::ToggleCombatMode => combat.queue_command(PlayerCommand::ToggleCombatMode),
        ScriptCommand::Defend => combat.queue_command(PlayerCommand::Defend),
        ScriptCommand::SetActivePlayer { index } => {
            combat.queue_command(PlayerCommand::SetActivePlayer(*index))
        }
        ScriptCommand::MoveTo { position } => combat.queue_command(PlayerCommand::MoveTo(*position)),
        ScriptCommand::AttackNearestHostile => {
            let target = player_position
                .and_then(|from| combat.nearest(from, |actant| actant.is_hostile()));
            match target {
                Some(target) => combat.queue_command(PlayerCommand::Attack(target)),
                None => warn!("script_attack_no_hostile"),
            }
        }
        ScriptCommand::InteractNearestNpc => {
            let target = player_position.and_then(|from| {
                combat.nearest(from, |actant| actant.role() == ArchetypeRole::Npc)
            });
            match target {
                Some(target) => combat.queue_command(PlayerCommand::Interact(target)),
                None => warn!("script_interact_no_npc"),
            }
        }
        ScriptCommand::InspectNearest => {
            let player = combat.active_player();
            let target = player_position.and_then(|from| {
                combat.nearest(from, |actant| Some(actant.id) != player)
            });
            match target {
                Some(target) => combat.queue_command(PlayerCommand::Inspect(target)),
                None => warn!("script_inspect_nothing_near"),
            }
        }
        ScriptCommand::Respawn { point } => match combat.spawn_at(point, defs, world) {
            Ok(id) => attach_tracing_indicator(combat, id),
            Err(err) => warn!(point = point.as_str(), error = %err, "script_respawn_refused"),
        },
    }
}

impl Scene for SkirmishScene {
    fn load(&mut self, world: &mut SceneWorld) -> Result<(), String> {
        self.defs = world
            .def_database()
            .cloned()
            .ok_or_else(|| "definition database not loaded".to_string())?;
        let combat = self.build_combat_world(world)?;
        info!(
            actants = combat.actant_count(),
            players = combat.players().len(),
            hostiles = combat.living_hostiles().count(),
            spawn_points = combat.registry().points().count(),
            "skirmish_loaded"
        );
        self.combat = Some(combat);
        self.elapsed_seconds = 0.0;
        self.next_script_step = 0;
        self.totals = GameplayEventCounts::default();
        Ok(())
    }

    fn update(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand {
        let Some(combat) = self.combat.as_mut() else {
            return SceneCommand::Stop;
        };
        self.elapsed_seconds += fixed_dt_seconds;

        while let Some(step) = self.scenario.script.get(self.next_script_step) {
            if step.at_seconds > self.elapsed_seconds {
                break;
            }
            info!(at_seconds = step.at_seconds, command = ?step.command, "script_step");
            fire_script_command(combat, &self.defs, &step.command, world);
            self.next_script_step += 1;
        }

        let counts = combat.tick(fixed_dt_seconds, world);
        self.totals.accumulate(counts);

        if self.elapsed_seconds >= self.scenario.duration_seconds {
            info!(elapsed_seconds = self.elapsed_seconds, "skirmish_time_up");
            return SceneCommand::Stop;
        }
        let cleared = combat.living_hostiles().next().is_none();
        if cleared && self.script_exhausted() {
            info!(elapsed_seconds = self.elapsed_seconds, "skirmish_cleared");
            return SceneCommand::Stop;
        }
        SceneCommand::None
    }

    fn unload(&mut self, world: &mut SceneWorld) {
        let totals = self.totals;
        info!(
            events = totals.total,
            attacks = totals.attack_resolved,
            damage_events = totals.damage_applied,
            deaths = totals.actant_died,
            rewards = totals.reward_granted,
            aggression_changes = totals.aggression_changed,
            removals = totals.actant_removed,
            "skirmish_summary"
        );
        if let Some(combat) = self.combat.take() {
            for point in combat.registry().points() {
                debug!(
                    point = point.name.as_str(),
                    capacity = point.capacity,
                    live = point.live_count(),
                    members = ?point.members().iter().map(|id| id.0).collect::<Vec<_>>(),
                    "spawn_point_final"
                );
            }
        }
        world.clear();
        world.clear_tilemap();
    }

    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        let combat = self.combat.as_ref()?;
        let hostiles = combat.living_hostiles().collect::<Vec<_>>();
        let aggressive = hostiles
            .iter()
            .filter(|actant| {
                combat
                    .aggression_of(actant.id)
                    .is_some_and(|record| record.state == AggressionState::Aggressive)
            })
            .count();
        Some(format!(
            "skirmish t={:.1}s hostiles={} aggressive={} combat_mode={}",
            combat.clock_seconds(),
            hostiles.len(),
            aggressive,
            combat.combat_mode()
        ))
    }
}
