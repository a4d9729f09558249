use std::collections::BTreeMap;

use engine::{EntityId, Transform, Vec3};
use tracing::debug;

use crate::app::tuning::CombatTuning;

use super::nav::Navigator;
use super::step_toward;
use super::types::PursuitOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PursuitStatus {
    Running,
    Finished(PursuitOutcome),
}

/// What the pursuing actor can see about the world this tick.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PursuitView {
    /// `None` when the target is gone, dead or otherwise not attackable.
    pub(crate) target_position: Option<Vec3>,
    pub(crate) run_speed: f32,
    /// Whether a strike may land right now (hostiles wait out their attack delay).
    pub(crate) strike_ready: bool,
    pub(crate) dt_seconds: f32,
}

/// Cooperative chase toward one target, advanced once per tick.
///
/// `Completed` means the actor is in reach and facing the target; the caller performs
/// exactly one strike. Holding in reach while a strike is not ready keeps the task running.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PursuitTask {
    actor: EntityId,
    target: EntityId,
    attack_distance: f32,
    cancel_requested: bool,
    path: Vec<Vec3>,
    next_waypoint_index: usize,
    since_recompute_seconds: f32,
}

impl PursuitTask {
    pub(crate) fn new(actor: EntityId, target: EntityId, attack_distance: f32) -> Self {
        Self {
            actor,
            target,
            attack_distance: attack_distance.max(0.0),
            cancel_requested: false,
            path: Vec::new(),
            next_waypoint_index: 0,
            since_recompute_seconds: 0.0,
        }
    }

    pub(crate) fn actor(&self) -> EntityId {
        self.actor
    }

    pub(crate) fn target(&self) -> EntityId {
        self.target
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub(crate) fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    fn in_reach(&self, position: Vec3, target_position: Vec3, tuning: &CombatTuning) -> bool {
        position.distance(target_position) <= self.attack_distance + tuning.arrival_margin
    }

    pub(crate) fn advance(
        &mut self,
        actor: &mut Transform,
        view: PursuitView,
        navigator: &mut dyn Navigator,
        tuning: &CombatTuning,
    ) -> PursuitStatus {
        if self.cancel_requested {
            return PursuitStatus::Finished(PursuitOutcome::Cancelled);
        }
        let Some(target_position) = view.target_position else {
            debug!(
                actor = self.actor.0,
                target = self.target.0,
                "pursuit_target_invalid"
            );
            return PursuitStatus::Finished(PursuitOutcome::Cancelled);
        };

        if self.in_reach(actor.position, target_position, tuning) {
            return self.hold_in_reach(actor, target_position, view.strike_ready);
        }

        self.since_recompute_seconds += view.dt_seconds;
        let stale = self.since_recompute_seconds >= tuning.path_recompute_interval_seconds;
        let exhausted = self.next_waypoint_index >= self.path.len();
        if stale || exhausted {
            match navigator.find_path(actor.position, target_position) {
                Ok(path) => {
                    self.path = path;
                    self.next_waypoint_index = 0;
                    self.since_recompute_seconds = 0.0;
                }
                Err(err) => {
                    debug!(
                        actor = self.actor.0,
                        target = self.target.0,
                        error = %err,
                        "pursuit_unreachable"
                    );
                    return PursuitStatus::Finished(PursuitOutcome::Unreachable);
                }
            }
        }

        let Some(waypoint) = self.path.get(self.next_waypoint_index).copied() else {
            return PursuitStatus::Finished(PursuitOutcome::Unreachable);
        };
        actor.face_toward(waypoint);
        let (next_position, reached) = step_toward(
            actor.position,
            waypoint,
            view.run_speed,
            view.dt_seconds,
            tuning.waypoint_tolerance,
        );
        actor.position = next_position;
        if reached {
            self.next_waypoint_index = self.next_waypoint_index.saturating_add(1);
        }

        if self.in_reach(actor.position, target_position, tuning) {
            return self.hold_in_reach(actor, target_position, view.strike_ready);
        }
        PursuitStatus::Running
    }

    fn hold_in_reach(
        &mut self,
        actor: &mut Transform,
        target_position: Vec3,
        strike_ready: bool,
    ) -> PursuitStatus {
        actor.face_toward(target_position);
        self.path.clear();
        self.next_waypoint_index = 0;
        if strike_ready {
            PursuitStatus::Finished(PursuitOutcome::Completed)
        } else {
            PursuitStatus::Running
        }
    }
}

/// At most one pursuit per actor.
#[derive(Debug, Default)]
pub(crate) struct PursuitBoard {
    tasks: BTreeMap<EntityId, PursuitTask>,
}

impl PursuitBoard {
    /// Installs a new task, returning the task it displaced (already cancelled).
    pub(crate) fn start(&mut self, task: PursuitTask) -> Option<PursuitTask> {
        let displaced = self.tasks.remove(&task.actor()).map(|mut previous| {
            previous.request_cancel();
            previous
        });
        self.tasks.insert(task.actor(), task);
        displaced
    }

    /// Flags the actor's task; the flag is honoured on its next advance.
    pub(crate) fn request_cancel(&mut self, actor: EntityId) -> bool {
        match self.tasks.get_mut(&actor) {
            Some(task) => {
                task.request_cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_live(&self, actor: EntityId) -> bool {
        self.tasks
            .get(&actor)
            .is_some_and(|task| !task.is_cancel_requested())
    }

    #[cfg(test)]
    pub(crate) fn get(&self, actor: EntityId) -> Option<&PursuitTask> {
        self.tasks.get(&actor)
    }

    pub(crate) fn actors(&self) -> Vec<EntityId> {
        self.tasks.keys().copied().collect()
    }

    pub(crate) fn take(&mut self, actor: EntityId) -> Option<PursuitTask> {
        self.tasks.remove(&actor)
    }

    /// Puts a running task back unless a newer one was started meanwhile.
    pub(crate) fn restore(&mut self, task: PursuitTask) {
        self.tasks.entry(task.actor()).or_insert(task);
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}
