use std::collections::BTreeMap;

use engine::{ArchetypeDef, ArchetypeRole, DefDatabase, EntityId, SceneWorld, Transform, Vec3};
use tracing::{debug, info, warn};

use crate::app::tuning::CombatTuning;

use super::aggression::AggressionRecord;
use super::capabilities::Actant;
use super::commands::PlayerCommand;
use super::nav::Navigator;
use super::pursuit::{PursuitBoard, PursuitStatus, PursuitView};
use super::registry::SpawnRegistry;
use super::sinks::{IndicatorSink, PresentationSink};
use super::types::{
    AggressionState, CombatError, GameplayEvent, GameplayEventBus, GameplayEventCounts, GameplaySystemId,
    PursuitOutcome, SpawnError, GAMEPLAY_SYSTEM_ORDER,
};
use super::{route_step, MANUAL_MOVE_ARRIVAL_THRESHOLD, ROAM_ARRIVAL_THRESHOLD};

/// Everything the combat core owns: actants, their aggression and pursuits, the spawn
/// registry, and the injected navigation and presentation collaborators.
///
/// Positions live here; `SceneWorld` bodies are only the mirror synced in `Cleanup`.
pub(crate) struct CombatWorld {
    pub(super) tuning: CombatTuning,
    pub(super) clock_seconds: f32,
    pub(super) actants: BTreeMap<EntityId, Actant>,
    pub(super) aggression: BTreeMap<EntityId, AggressionRecord>,
    pub(super) pursuits: PursuitBoard,
    pub(super) registry: SpawnRegistry,
    pub(super) players: Vec<EntityId>,
    pub(super) active_player_index: Option<usize>,
    pub(super) combat_mode: bool,
    /// Dead registry members waiting out the death grace period.
    pub(super) pending_removals: BTreeMap<EntityId, f32>,
    pub(super) manual_moves: BTreeMap<EntityId, Vec3>,
    pub(super) queued_commands: Vec<PlayerCommand>,
    pub(super) navigator: Box<dyn Navigator>,
    pub(super) presentation: Box<dyn PresentationSink>,
    pub(super) events: GameplayEventBus,
    last_tick_order: Vec<GameplaySystemId>,
    ticks: u64,
}

impl CombatWorld {
    pub(crate) fn new(
        tuning: CombatTuning,
        navigator: Box<dyn Navigator>,
        presentation: Box<dyn PresentationSink>,
    ) -> Self {
        Self {
            tuning,
            clock_seconds: 0.0,
            actants: BTreeMap::new(),
            aggression: BTreeMap::new(),
            pursuits: PursuitBoard::default(),
            registry: SpawnRegistry::default(),
            players: Vec::new(),
            active_player_index: None,
            combat_mode: false,
            pending_removals: BTreeMap::new(),
            manual_moves: BTreeMap::new(),
            queued_commands: Vec::new(),
            navigator,
            presentation,
            events: GameplayEventBus::default(),
            last_tick_order: Vec::new(),
            ticks: 0,
        }
    }

    fn insert_actant(&mut self, def: &ArchetypeDef, position: Vec3, world: &mut SceneWorld) -> EntityId {
        let id = world.spawn_actor(Transform::at(position), def.label.clone());
        let actant = Actant::from_archetype(id, def, position);
        if actant.is_hostile() {
            self.aggression.insert(id, AggressionRecord::default());
        }
        debug!(
            actant = id.0,
            archetype = def.def_name.as_str(),
            role = ?def.role,
            max_health = actant.state().max_health(),
            max_mana = actant.state().max_mana(),
            "actant_spawned"
        );
        self.actants.insert(id, actant);
        id
    }

    /// Adds a controllable character. The first one becomes the active player.
    pub(crate) fn spawn_player(
        &mut self,
        def: &ArchetypeDef,
        position: Vec3,
        world: &mut SceneWorld,
    ) -> EntityId {
        let id = self.insert_actant(def, position, world);
        self.players.push(id);
        if self.active_player_index.is_none() {
            self.active_player_index = Some(self.players.len() - 1);
            let combat_mode = self.combat_mode;
            if let Some(actant) = self.actants.get_mut(&id) {
                actant.combat_ready = combat_mode;
            }
        }
        id
    }

    /// Adds an actant outside the spawn registry, e.g. a townsfolk NPC.
    pub(crate) fn spawn_free(
        &mut self,
        def: &ArchetypeDef,
        position: Vec3,
        world: &mut SceneWorld,
    ) -> EntityId {
        self.insert_actant(def, position, world)
    }

    pub(crate) fn add_spawn_point(
        &mut self,
        name: &str,
        position: Vec3,
        archetype: &str,
        capacity: usize,
    ) {
        self.registry.add_point(name, position, archetype, capacity);
    }

    /// Spawns the point's archetype at the point, subject to its capacity.
    pub(crate) fn spawn_at(
        &mut self,
        point: &str,
        defs: &DefDatabase,
        world: &mut SceneWorld,
    ) -> Result<EntityId, SpawnError> {
        let spawn_point = self.registry.check_capacity(point)?;
        let position = spawn_point.position;
        let archetype = spawn_point.archetype.clone();
        let def = defs
            .archetype_by_name(&archetype)
            .ok_or_else(|| SpawnError::UnknownArchetype(archetype.clone()))?;

        let id = self.insert_actant(def, position, world);
        self.registry.register(point, id)?;
        if self.combat_mode && def.role == ArchetypeRole::Hostile {
            self.presentation.set_health_indicator_visible(id, true);
        }
        info!(actant = id.0, point, archetype = archetype.as_str(), "spawned_at_point");
        Ok(id)
    }

    pub(crate) fn attach_indicator(&mut self, id: EntityId, sink: Box<dyn IndicatorSink>) -> bool {
        let Some(actant) = self.actants.get_mut(&id) else {
            return false;
        };
        let Some(damageable) = actant.as_damageable_mut() else {
            debug!(actant = id.0, "indicator_skipped_not_damageable");
            return false;
        };
        damageable.entity_state_mut().attach_indicator(sink);
        true
    }

    pub(crate) fn actant(&self, id: EntityId) -> Option<&Actant> {
        self.actants.get(&id)
    }

    #[cfg(test)]
    pub(crate) fn teleport(&mut self, id: EntityId, position: Vec3) -> bool {
        match self.actants.get_mut(&id) {
            Some(actant) => {
                actant.transform.position = position;
                true
            }
            None => false,
        }
    }

    pub(crate) fn actant_count(&self) -> usize {
        self.actants.len()
    }

    pub(crate) fn players(&self) -> &[EntityId] {
        &self.players
    }

    pub(crate) fn active_player(&self) -> Option<EntityId> {
        self.active_player_index
            .and_then(|index| self.players.get(index))
            .copied()
    }

    pub(super) fn living_active_player(&self) -> Option<(EntityId, Vec3)> {
        let id = self.active_player()?;
        let actant = self.actants.get(&id)?;
        actant.is_alive().then(|| (id, actant.position()))
    }

    pub(crate) fn registry(&self) -> &SpawnRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn pursuits(&self) -> &PursuitBoard {
        &self.pursuits
    }

    pub(crate) fn clock_seconds(&self) -> f32 {
        self.clock_seconds
    }

    #[cfg(test)]
    pub(crate) fn events(&self) -> &GameplayEventBus {
        &self.events
    }

    #[cfg(test)]
    pub(crate) fn last_tick_order(&self) -> &[GameplaySystemId] {
        &self.last_tick_order
    }

    pub(crate) fn living_hostiles(&self) -> impl Iterator<Item = &Actant> + '_ {
        self.actants
            .values()
            .filter(|actant| actant.is_hostile() && actant.is_alive())
    }

    /// Closest living actant matching `filter`, ties broken by id.
    pub(crate) fn nearest(
        &self,
        from: Vec3,
        filter: impl Fn(&Actant) -> bool,
    ) -> Option<EntityId> {
        self.actants
            .values()
            .filter(|actant| actant.is_alive() && filter(actant))
            .map(|actant| (actant.position().distance_sq(from), actant.id))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1 .0.cmp(&b.1 .0)))
            .map(|(_, id)| id)
    }

    /// Runs every gameplay system once in fixed order and returns this tick's event counts.
    pub(crate) fn tick(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld) -> GameplayEventCounts {
        let dt = fixed_dt_seconds.max(0.0);
        self.clock_seconds += dt;
        self.ticks = self.ticks.saturating_add(1);
        self.last_tick_order.clear();

        let mut counts = GameplayEventCounts::default();
        for system_id in GAMEPLAY_SYSTEM_ORDER {
            self.last_tick_order.push(system_id);
            match system_id {
                GameplaySystemId::Commands => self.run_commands_system(),
                GameplaySystemId::Aggression => self.run_aggression_system(dt),
                GameplaySystemId::Pursuit => self.run_pursuit_system(dt),
                GameplaySystemId::Movement => self.run_movement_system(dt),
                GameplaySystemId::Timers => self.run_timers_system(dt),
                GameplaySystemId::Cleanup => counts = self.run_cleanup_system(world),
            }
        }
        counts
    }

    fn run_pursuit_system(&mut self, dt_seconds: f32) {
        for actor in self.pursuits.actors() {
            let Some(mut task) = self.pursuits.take(actor) else {
                continue;
            };

            let target_position = self
                .actants
                .get(&task.target())
                .filter(|target| target.is_alive())
                .map(|target| target.position());
            let strike_ready = match (
                self.aggression.get(&actor),
                self.actants.get(&actor).and_then(|a| a.attack_profile()),
            ) {
                (Some(record), Some(attack)) => {
                    record.strike_ready(self.clock_seconds, attack.delay_seconds)
                }
                _ => true,
            };

            let status = match self.actants.get_mut(&actor) {
                Some(actant) if actant.is_alive() => {
                    let view = PursuitView {
                        target_position,
                        run_speed: actant.movement().run_speed,
                        strike_ready,
                        dt_seconds,
                    };
                    task.advance(
                        &mut actant.transform,
                        view,
                        self.navigator.as_mut(),
                        &self.tuning,
                    )
                }
                _ => PursuitStatus::Finished(PursuitOutcome::Cancelled),
            };

            let outcome = match status {
                PursuitStatus::Running => {
                    self.pursuits.restore(task);
                    continue;
                }
                PursuitStatus::Finished(outcome) => outcome,
            };

            self.events
                .emit(GameplayEvent::PursuitFinished { actor, outcome });
            debug!(actor = actor.0, target = task.target().0, outcome = ?outcome, "pursuit_finished");
            match outcome {
                PursuitOutcome::Completed => {
                    if let Err(err) = self.resolve_strike(actor, task.target()) {
                        debug!(actor = actor.0, error = %err, "pursuit_strike_refused");
                    }
                }
                PursuitOutcome::Unreachable => {
                    if self.aggression.contains_key(&actor) {
                        self.begin_returning(actor);
                    } else {
                        let err = CombatError::PathUnreachable {
                            actor,
                            target: task.target(),
                        };
                        warn!(error = %err, "player_pursuit_unreachable");
                    }
                }
                PursuitOutcome::Cancelled => {}
            }
        }
    }

    /// Manual moves, idle roaming and the walk home all follow navigator routes.
    fn run_movement_system(&mut self, dt_seconds: f32) {
        let manual = self
            .manual_moves
            .iter()
            .map(|(id, destination)| (*id, *destination))
            .collect::<Vec<_>>();
        for (id, destination) in manual {
            let Some(actant) = self.actants.get_mut(&id).filter(|actant| actant.is_alive()) else {
                self.manual_moves.remove(&id);
                continue;
            };
            let step = route_step(
                self.navigator.as_mut(),
                actant.position(),
                destination,
                actant.movement().walk_speed,
                dt_seconds,
                MANUAL_MOVE_ARRIVAL_THRESHOLD,
            );
            match step {
                Ok((next, arrived)) => {
                    actant.transform.face_toward(next);
                    actant.transform.position = next;
                    if arrived {
                        self.manual_moves.remove(&id);
                    }
                }
                Err(err) => {
                    warn!(actant = id.0, error = %err, "manual_move_unreachable");
                    self.manual_moves.remove(&id);
                }
            }
        }

        let hostiles = self.aggression.keys().copied().collect::<Vec<_>>();
        for id in hostiles {
            let Some(record) = self.aggression.get(&id) else {
                continue;
            };
            let (destination, threshold, returning) = match (record.state, record.anchor) {
                (AggressionState::Returning, Some(anchor)) => {
                    (anchor, self.tuning.return_epsilon, true)
                }
                (AggressionState::Returning, None) => {
                    self.finish_returning(id);
                    continue;
                }
                _ => match record.roam_destination() {
                    Some(target) => (target, ROAM_ARRIVAL_THRESHOLD, false),
                    None => continue,
                },
            };
            let Some(actant) = self.actants.get_mut(&id).filter(|actant| actant.is_alive()) else {
                continue;
            };
            let step = route_step(
                self.navigator.as_mut(),
                actant.position(),
                destination,
                actant.movement().walk_speed,
                dt_seconds,
                threshold,
            );
            match step {
                Ok((next, arrived)) => {
                    actant.transform.face_toward(next);
                    actant.transform.position = next;
                    if returning && arrived {
                        self.finish_returning(id);
                    }
                }
                Err(err) if returning => {
                    debug!(actant = id.0, error = %err, "return_route_lost");
                    self.finish_returning(id);
                }
                Err(err) => {
                    debug!(actant = id.0, error = %err, "roam_target_unreachable");
                    if let Some(record) = self.aggression.get_mut(&id) {
                        record.abandon_walk();
                    }
                }
            }
        }
    }

    fn run_timers_system(&mut self, dt_seconds: f32) {
        for actant in self.actants.values_mut() {
            let id = actant.id;
            if let Some(damageable) = actant.as_damageable_mut() {
                let state = damageable.entity_state_mut();
                let expired = state.tick_armor_boosts(dt_seconds);
                if expired > 0 {
                    debug!(
                        actant = id.0,
                        expired,
                        still_active = state.active_armor_boosts(),
                        armor = state.armor(),
                        "armor_boosts_expired"
                    );
                }
            }
        }
        for remaining in self.pending_removals.values_mut() {
            *remaining -= dt_seconds;
        }
    }

    fn run_cleanup_system(&mut self, world: &mut SceneWorld) -> GameplayEventCounts {
        let due = self
            .pending_removals
            .iter()
            .filter(|(_, remaining)| **remaining <= 0.0)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for id in due {
            self.pending_removals.remove(&id);
            let point = self.registry.owner_of(id).map(str::to_string);
            if !self.registry.remove(id) {
                continue;
            }
            self.aggression.remove(&id);
            self.pursuits.take(id);
            self.manual_moves.remove(&id);
            let archetype = self.actants.remove(&id).map(|actant| {
                world.despawn(id);
                actant.archetype
            });
            self.events.emit(GameplayEvent::ActantRemoved { actant: id });
            info!(
                actant = id.0,
                archetype = ?archetype,
                point = point.as_deref().unwrap_or("-"),
                "actant_removed"
            );
        }

        for actant in self.actants.values() {
            if let Some(entity) = world.find_entity_mut(actant.id) {
                entity.transform = actant.transform;
            }
        }

        let counts = self.events.finish_tick_rollover();
        if counts.total > 0 {
            debug!(
                tick = self.ticks,
                total = counts.total,
                damage = counts.damage_applied,
                deaths = counts.actant_died,
                rewards = counts.reward_granted,
                pursuits_finished = counts.pursuit_finished,
                aggression_changes = counts.aggression_changed,
                removals = counts.actant_removed,
                live_pursuits = self.pursuits.len(),
                "gameplay_events"
            );
        }
        counts
    }
}
