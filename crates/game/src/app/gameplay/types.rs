use engine::EntityId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CombatError {
    #[error("target {0:?} is missing, dead or cannot be attacked")]
    InvalidTarget(EntityId),
    #[error("no route from {actor:?} to {target:?}")]
    PathUnreachable { actor: EntityId, target: EntityId },
    #[error("{actant:?} needs {required} mana but has {available}")]
    InsufficientResource {
        actant: EntityId,
        required: i32,
        available: i32,
    },
    #[error("{0:?} is not in combat mode")]
    NotCombatReady(EntityId),
    #[error("{0:?} is in combat mode; interaction needs exploration mode")]
    InCombatMode(EntityId),
    #[error("{0:?} does not answer interactions")]
    NotInteractable(EntityId),
    #[error("no living active player")]
    NoActivePlayer,
    #[error("player index {index} is out of range (have {count})")]
    UnknownPlayer { index: usize, count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum SpawnError {
    #[error("unknown spawn point '{0}'")]
    UnknownSpawnPoint(String),
    #[error("spawn point '{point}' is full ({capacity} live)")]
    CapacityReached { point: String, capacity: usize },
    #[error("unknown archetype '{0}'")]
    UnknownArchetype(String),
}

/// Fire-and-forget cue for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PresentationCue {
    Attack,
    Hit,
    Death,
    Defend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AggressionState {
    Idle,
    Aggressive,
    Returning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PursuitOutcome {
    Completed,
    Cancelled,
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum GameplayEvent {
    AttackResolved {
        attacker: EntityId,
        target: EntityId,
    },
    DamageApplied {
        target: EntityId,
        amount: i32,
    },
    ActantDied {
        actant: EntityId,
    },
    RewardGranted {
        recipient: EntityId,
        experience: i32,
    },
    PursuitFinished {
        actor: EntityId,
        outcome: PursuitOutcome,
    },
    AggressionChanged {
        actant: EntityId,
        from: AggressionState,
        to: AggressionState,
    },
    CombatModeToggled {
        enabled: bool,
    },
    DefendRaised {
        actant: EntityId,
    },
    ActantRemoved {
        actant: EntityId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GameplayEventKind {
    AttackResolved,
    DamageApplied,
    ActantDied,
    RewardGranted,
    PursuitFinished,
    AggressionChanged,
    CombatModeToggled,
    DefendRaised,
    ActantRemoved,
}

impl GameplayEvent {
    pub(crate) fn kind(self) -> GameplayEventKind {
        match self {
            Self::AttackResolved { .. } => GameplayEventKind::AttackResolved,
            Self::DamageApplied { .. } => GameplayEventKind::DamageApplied,
            Self::ActantDied { .. } => GameplayEventKind::ActantDied,
            Self::RewardGranted { .. } => GameplayEventKind::RewardGranted,
            Self::PursuitFinished { .. } => GameplayEventKind::PursuitFinished,
            Self::AggressionChanged { .. } => GameplayEventKind::AggressionChanged,
            Self::CombatModeToggled { .. } => GameplayEventKind::CombatModeToggled,
            Self::DefendRaised { .. } => GameplayEventKind::DefendRaised,
            Self::ActantRemoved { .. } => GameplayEventKind::ActantRemoved,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GameplayEventCounts {
    pub(crate) total: u32,
    pub(crate) attack_resolved: u32,
    pub(crate) damage_applied: u32,
    pub(crate) actant_died: u32,
    pub(crate) reward_granted: u32,
    pub(crate) pursuit_finished: u32,
    pub(crate) aggression_changed: u32,
    pub(crate) combat_mode_toggled: u32,
    pub(crate) defend_raised: u32,
    pub(crate) actant_removed: u32,
}

impl GameplayEventCounts {
    fn record(&mut self, kind: GameplayEventKind) {
        self.total = self.total.saturating_add(1);
        let slot = match kind {
            GameplayEventKind::AttackResolved => &mut self.attack_resolved,
            GameplayEventKind::DamageApplied => &mut self.damage_applied,
            GameplayEventKind::ActantDied => &mut self.actant_died,
            GameplayEventKind::RewardGranted => &mut self.reward_granted,
            GameplayEventKind::PursuitFinished => &mut self.pursuit_finished,
            GameplayEventKind::AggressionChanged => &mut self.aggression_changed,
            GameplayEventKind::CombatModeToggled => &mut self.combat_mode_toggled,
            GameplayEventKind::DefendRaised => &mut self.defend_raised,
            GameplayEventKind::ActantRemoved => &mut self.actant_removed,
        };
        *slot = slot.saturating_add(1);
    }

    pub(crate) fn accumulate(&mut self, other: GameplayEventCounts) {
        self.total = self.total.saturating_add(other.total);
        self.attack_resolved = self.attack_resolved.saturating_add(other.attack_resolved);
        self.damage_applied = self.damage_applied.saturating_add(other.damage_applied);
        self.actant_died = self.actant_died.saturating_add(other.actant_died);
        self.reward_granted = self.reward_granted.saturating_add(other.reward_granted);
        self.pursuit_finished = self.pursuit_finished.saturating_add(other.pursuit_finished);
        self.aggression_changed = self
            .aggression_changed
            .saturating_add(other.aggression_changed);
        self.combat_mode_toggled = self
            .combat_mode_toggled
            .saturating_add(other.combat_mode_toggled);
        self.defend_raised = self.defend_raised.saturating_add(other.defend_raised);
        self.actant_removed = self.actant_removed.saturating_add(other.actant_removed);
    }
}

/// Events emitted during the current tick; rolled into counts at the end of `Cleanup`,
/// when the finished tick's events move aside for inspection.
#[derive(Debug, Default)]
pub(crate) struct GameplayEventBus {
    current_tick_events: Vec<GameplayEvent>,
    last_tick_events: Vec<GameplayEvent>,
}

impl GameplayEventBus {
    pub(crate) fn emit(&mut self, event: GameplayEvent) {
        self.current_tick_events.push(event);
    }

    #[cfg(test)]
    pub(crate) fn iter_emitted_so_far(&self) -> impl Iterator<Item = &GameplayEvent> {
        self.current_tick_events.iter()
    }

    pub(crate) fn finish_tick_rollover(&mut self) -> GameplayEventCounts {
        let mut counts = GameplayEventCounts::default();
        for event in &self.current_tick_events {
            counts.record(event.kind());
        }
        self.last_tick_events.clear();
        std::mem::swap(&mut self.last_tick_events, &mut self.current_tick_events);
        counts
    }

    #[cfg(test)]
    pub(crate) fn last_tick_events(&self) -> &[GameplayEvent] {
        &self.last_tick_events
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GameplaySystemId {
    Commands,
    Aggression,
    Pursuit,
    Movement,
    Timers,
    Cleanup,
}

impl GameplaySystemId {
    #[cfg(test)]
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Commands => "Commands",
            Self::Aggression => "Aggression",
            Self::Pursuit => "Pursuit",
            Self::Movement => "Movement",
            Self::Timers => "Timers",
            Self::Cleanup => "Cleanup",
        }
    }
}

pub(crate) const GAMEPLAY_SYSTEM_ORDER: [GameplaySystemId; 6] = [
    GameplaySystemId::Commands,
    GameplaySystemId::Aggression,
    GameplaySystemId::Pursuit,
    GameplaySystemId::Movement,
    GameplaySystemId::Timers,
    GameplaySystemId::Cleanup,
];
