use engine::{EntityId, Vec3};
use tracing::{debug, info};

use super::capabilities::AttackProfile;
use super::types::{AggressionState, GameplayEvent};
use super::world::CombatWorld;
use super::{
    LEASH_RANGE_FACTOR, ROAM_ARRIVAL_THRESHOLD, ROAM_OFFSET_UNITS, ROAM_PAUSE_SECONDS,
    ROAM_WALK_SECONDS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoamPhase {
    Walking,
    Pausing,
}

/// Per-hostile aggression state. Lives from spawn until registry removal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AggressionRecord {
    pub(crate) state: AggressionState,
    pub(crate) target: Option<EntityId>,
    /// Captured once on entering `Aggressive`; the leash is measured from here.
    pub(crate) anchor: Option<Vec3>,
    pub(crate) last_attack_time: Option<f32>,
    roam_phase: RoamPhase,
    roam_remaining_seconds: f32,
    wander_target: Option<Vec3>,
}

impl Default for AggressionRecord {
    fn default() -> Self {
        Self {
            state: AggressionState::Idle,
            target: None,
            anchor: None,
            last_attack_time: None,
            roam_phase: RoamPhase::Pausing,
            roam_remaining_seconds: ROAM_PAUSE_SECONDS,
            wander_target: None,
        }
    }
}

impl AggressionRecord {
    pub(crate) fn strike_ready(&self, now_seconds: f32, attack_delay_seconds: f32) -> bool {
        self.last_attack_time
            .map_or(true, |last| now_seconds >= last + attack_delay_seconds)
    }

    /// Where the idle roam wants to walk this tick, if anywhere.
    pub(crate) fn roam_destination(&self) -> Option<Vec3> {
        match (self.state, self.roam_phase) {
            (AggressionState::Idle, RoamPhase::Walking) => self.wander_target,
            _ => None,
        }
    }

    fn advance_roam(&mut self, actant: EntityId, home: Vec3, position: Vec3, dt_seconds: f32) {
        self.roam_remaining_seconds -= dt_seconds;
        match self.roam_phase {
            RoamPhase::Walking => {
                let arrived = self.wander_target.map_or(true, |target| {
                    planar_distance_sq(position, target)
                        <= ROAM_ARRIVAL_THRESHOLD * ROAM_ARRIVAL_THRESHOLD
                });
                if arrived || self.roam_remaining_seconds <= 0.0 {
                    self.roam_phase = RoamPhase::Pausing;
                    self.roam_remaining_seconds = ROAM_PAUSE_SECONDS;
                }
            }
            RoamPhase::Pausing => {
                if self.roam_remaining_seconds <= 0.0 {
                    self.roam_phase = RoamPhase::Walking;
                    self.roam_remaining_seconds = ROAM_WALK_SECONDS;
                    self.wander_target =
                        Some(deterministic_wander_target(home, actant, self.wander_target));
                }
            }
        }
    }

    /// Ends the current walk early; the next walk heads for the other roam point.
    pub(super) fn abandon_walk(&mut self) {
        self.roam_phase = RoamPhase::Pausing;
        self.roam_remaining_seconds = ROAM_PAUSE_SECONDS;
    }

    fn reset_roam(&mut self) {
        self.roam_phase = RoamPhase::Pausing;
        self.roam_remaining_seconds = ROAM_PAUSE_SECONDS;
        self.wander_target = None;
    }
}

fn planar_distance_sq(a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    dx * dx + dz * dz
}

/// Alternates between two points either side of `home` along x. Even ids start east.
fn deterministic_wander_target(home: Vec3, actant: EntityId, current_target: Option<Vec3>) -> Vec3 {
    let direction = if actant.0 % 2 == 0 { 1.0 } else { -1.0 };
    let primary = Vec3::new(home.x + direction * ROAM_OFFSET_UNITS, home.y, home.z);
    let secondary = Vec3::new(home.x - direction * ROAM_OFFSET_UNITS, home.y, home.z);

    match current_target {
        Some(target) if planar_distance_sq(target, primary) <= 0.01 => secondary,
        _ => primary,
    }
}

impl CombatWorld {
    pub(super) fn run_aggression_system(&mut self, dt_seconds: f32) {
        let active_player = self.living_active_player();
        let ids = self.aggression.keys().copied().collect::<Vec<_>>();

        for id in ids {
            let Some(actant) = self.actants.get(&id) else {
                continue;
            };
            if !actant.is_alive() {
                continue;
            }
            let position = actant.position();
            let home = actant.home_position;
            let range = actant.aggression_range().unwrap_or(0.0);
            let attack = actant.attack_profile();
            let Some(state) = self.aggression.get(&id).map(|record| record.state) else {
                continue;
            };

            match state {
                AggressionState::Idle => {
                    let sighted = active_player.filter(|(_, player_position)| {
                        position.distance(*player_position) <= range
                    });
                    if let Some((player, _)) = sighted {
                        self.set_aggressive(id, player, position);
                        continue;
                    }
                    if let Some(record) = self.aggression.get_mut(&id) {
                        record.advance_roam(id, home, position, dt_seconds);
                    }
                }
                AggressionState::Aggressive => {
                    self.run_aggressive(id, position, range, attack);
                }
                // Walked home by the movement system.
                AggressionState::Returning => {}
            }
        }
    }

    fn run_aggressive(
        &mut self,
        id: EntityId,
        position: Vec3,
        range: f32,
        attack: Option<AttackProfile>,
    ) {
        let leash = range * LEASH_RANGE_FACTOR;
        let Some(record) = self.aggression.get(&id) else {
            return;
        };
        let anchor = record.anchor.unwrap_or(position);
        let target = record.target;
        let strike_ready = attack
            .is_some_and(|attack| record.strike_ready(self.clock_seconds, attack.delay_seconds));

        if position.distance(anchor) > leash {
            debug!(
                actant = id.0,
                distance = position.distance(anchor),
                leash,
                "aggression_leash_exceeded"
            );
            self.begin_returning(id);
            return;
        }

        let target_position = target.and_then(|target_id| {
            self.actants
                .get(&target_id)
                .filter(|target| target.is_alive())
                .map(|target| (target_id, target.position()))
        });
        let (Some((target_id, target_position)), Some(attack)) = (target_position, attack) else {
            debug!(actant = id.0, "aggression_target_lost");
            self.begin_returning(id);
            return;
        };

        let distance = position.distance(target_position);
        if distance <= attack.distance + self.tuning.arrival_margin {
            if strike_ready && !self.pursuits.is_live(id) {
                if let Some(actant) = self.actants.get_mut(&id) {
                    actant.transform.face_toward(target_position);
                }
                if let Err(err) = self.resolve_strike(id, target_id) {
                    debug!(actant = id.0, error = %err, "aggression_strike_refused");
                }
            }
            return;
        }

        if distance <= leash {
            if !self.pursuits.is_live(id) {
                self.start_pursuit(id, target_id, attack.distance);
            }
            return;
        }

        debug!(actant = id.0, target = target_id.0, distance, "aggression_target_escaped");
        self.begin_returning(id);
    }

    fn transition(&mut self, id: EntityId, to: AggressionState) -> Option<AggressionState> {
        let record = self.aggression.get_mut(&id)?;
        let from = record.state;
        if from == to {
            return None;
        }
        record.state = to;
        self.events
            .emit(GameplayEvent::AggressionChanged { actant: id, from, to });
        info!(actant = id.0, from = ?from, to = ?to, "aggression_changed");
        Some(from)
    }

    /// Targets `target` and anchors the leash at `anchor`.
    pub(super) fn set_aggressive(&mut self, id: EntityId, target: EntityId, anchor: Vec3) {
        let Some(record) = self.aggression.get_mut(&id) else {
            return;
        };
        record.target = Some(target);
        record.anchor = Some(anchor);
        record.reset_roam();
        self.transition(id, AggressionState::Aggressive);
    }

    pub(super) fn begin_returning(&mut self, id: EntityId) {
        self.pursuits.request_cancel(id);
        self.transition(id, AggressionState::Returning);
    }

    pub(super) fn finish_returning(&mut self, id: EntityId) {
        if let Some(record) = self.aggression.get_mut(&id) {
            record.target = None;
            record.anchor = None;
            record.reset_roam();
        }
        self.transition(id, AggressionState::Idle);
    }

    /// A hit from `attacker` turns a non-aggressive hostile on it, regardless of range.
    pub(super) fn retaliate(&mut self, victim: EntityId, attacker: EntityId) {
        if victim == attacker {
            return;
        }
        let Some(record) = self.aggression.get(&victim) else {
            return;
        };
        if record.state == AggressionState::Aggressive {
            return;
        }
        let attacker_alive = self
            .actants
            .get(&attacker)
            .is_some_and(|actant| actant.is_alive());
        let Some(position) = self.actants.get(&victim).map(|actant| actant.position()) else {
            return;
        };
        if !attacker_alive {
            return;
        }
        debug!(actant = victim.0, attacker = attacker.0, "aggression_retaliation");
        self.set_aggressive(victim, attacker, position);
    }

    /// Aggression record for a hostile, if it has one.
    pub(crate) fn aggression_of(&self, id: EntityId) -> Option<&AggressionRecord> {
        self.aggression.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wander_target_alternates_around_home() {
        let home = Vec3::new(10.0, 0.0, 4.0);
        let first = deterministic_wander_target(home, EntityId(2), None);
        assert_eq!(first, Vec3::new(11.5, 0.0, 4.0));
        let second = deterministic_wander_target(home, EntityId(2), Some(first));
        assert_eq!(second, Vec3::new(8.5, 0.0, 4.0));
        assert_eq!(deterministic_wander_target(home, EntityId(2), Some(second)), first);

        let odd = deterministic_wander_target(home, EntityId(3), None);
        assert_eq!(odd, Vec3::new(8.5, 0.0, 4.0));
    }

    #[test]
    fn roam_alternates_pause_and_walk() {
        let mut record = AggressionRecord::default();
        let home = Vec3::ZERO;
        assert_eq!(record.roam_destination(), None);

        record.advance_roam(EntityId(2), home, home, ROAM_PAUSE_SECONDS);
        assert_eq!(record.roam_destination(), Some(Vec3::new(1.5, 0.0, 0.0)));

        record.advance_roam(EntityId(2), home, Vec3::new(1.5, 0.0, 0.0), 0.1);
        assert_eq!(record.roam_destination(), None);
    }

    #[test]
    fn strike_ready_waits_out_delay() {
        let mut record = AggressionRecord::default();
        assert!(record.strike_ready(0.0, 1.0));
        record.last_attack_time = Some(2.0);
        assert!(!record.strike_ready(2.5, 1.0));
        assert!(record.strike_ready(3.0, 1.0));
    }
}
