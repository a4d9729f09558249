use engine::{EntityId, Vec3};
use tracing::{debug, info, warn};

use super::capabilities::{InspectionKey, Inspectable};
use super::pursuit::PursuitTask;
use super::types::{CombatError, GameplayEvent, PresentationCue, PursuitOutcome};
use super::world::CombatWorld;

/// Player input, queued and applied at the start of the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum PlayerCommand {
    Attack(EntityId),
    Defend,
    Interact(EntityId),
    Inspect(EntityId),
    ToggleCombatMode,
    SetActivePlayer(usize),
    MoveTo(Vec3),
}

impl CombatWorld {
    pub(crate) fn queue_command(&mut self, command: PlayerCommand) {
        self.queued_commands.push(command);
    }

    pub(super) fn run_commands_system(&mut self) {
        let commands = std::mem::take(&mut self.queued_commands);
        for command in commands {
            let result = match command {
                PlayerCommand::Attack(target) => self.request_attack(target),
                PlayerCommand::Defend => self.request_defend(),
                PlayerCommand::Interact(target) => self.request_interact(target).map(|reply| {
                    info!(target = target.0, reply = reply.as_str(), "interaction_reply");
                }),
                PlayerCommand::Inspect(target) => self.inspect(target).map(|entries| {
                    for (key, value) in entries {
                        info!(target = target.0, key = ?key, value = value.as_str(), "inspection");
                    }
                }),
                PlayerCommand::ToggleCombatMode => {
                    self.toggle_combat_mode();
                    Ok(())
                }
                PlayerCommand::SetActivePlayer(index) => self.set_active_player(index),
                PlayerCommand::MoveTo(destination) => self.move_active_player(destination),
            };
            if let Err(err) = result {
                warn!(command = ?command, error = %err, "player_command_refused");
            }
        }
    }

    fn living_active_player_id(&self) -> Result<EntityId, CombatError> {
        self.living_active_player()
            .map(|(id, _)| id)
            .ok_or(CombatError::NoActivePlayer)
    }

    fn require_combat_ready(&self, player: EntityId) -> Result<(), CombatError> {
        let ready = self
            .actants
            .get(&player)
            .is_some_and(|actant| actant.combat_ready);
        if ready {
            Ok(())
        } else {
            Err(CombatError::NotCombatReady(player))
        }
    }

    /// Starts the active player's pursue-and-attack toward `target`.
    pub(crate) fn request_attack(&mut self, target: EntityId) -> Result<(), CombatError> {
        let player = self.living_active_player_id()?;
        self.require_combat_ready(player)?;
        if target == player {
            debug!(target = target.0, "attack_request_self");
            return Err(CombatError::InvalidTarget(target));
        }
        let attackable = self.actants.get_mut(&target).is_some_and(|actant| {
            actant.is_alive() && actant.as_damageable_mut().is_some()
        });
        if !attackable {
            debug!(target = target.0, "attack_request_invalid_target");
            return Err(CombatError::InvalidTarget(target));
        }
        let Some(attack) = self
            .actants
            .get(&player)
            .and_then(|actant| actant.attack_profile())
        else {
            return Err(CombatError::InvalidTarget(target));
        };

        self.manual_moves.remove(&player);
        self.start_pursuit(player, target, attack.distance);
        Ok(())
    }

    /// Raises a temporary armor boost on the active player for a mana cost.
    pub(crate) fn request_defend(&mut self) -> Result<(), CombatError> {
        let player = self.living_active_player_id()?;
        self.require_combat_ready(player)?;
        if !self
            .actants
            .get(&player)
            .is_some_and(|actant| actant.can_defend())
        {
            return Err(CombatError::InvalidTarget(player));
        }

        self.consume_mana(player, self.tuning.defend_mana_cost)?;
        let bonus = self.tuning.defend_armor_bonus;
        let duration = self.tuning.defend_duration_seconds;
        if let Some(state) = self
            .actants
            .get_mut(&player)
            .and_then(|actant| actant.as_damageable_mut())
            .map(|damageable| damageable.entity_state_mut())
        {
            state.boost_armor_temporarily(bonus, duration);
        }
        self.presentation.cue(player, PresentationCue::Defend);
        self.events.emit(GameplayEvent::DefendRaised { actant: player });
        info!(actant = player.0, bonus, duration, "defend_raised");
        Ok(())
    }

    /// Talks to `target`; only possible outside combat mode.
    pub(crate) fn request_interact(&mut self, target: EntityId) -> Result<String, CombatError> {
        let player = self.living_active_player_id()?;
        let Some(player_actant) = self.actants.get(&player) else {
            return Err(CombatError::NoActivePlayer);
        };
        if player_actant.combat_ready {
            return Err(CombatError::InCombatMode(player));
        }
        let visitor = player_actant.name().to_string();
        let Some(actant) = self.actants.get_mut(&target) else {
            return Err(CombatError::InvalidTarget(target));
        };
        let Some(interactable) = actant.as_interactable_mut() else {
            return Err(CombatError::NotInteractable(target));
        };
        Ok(interactable.interact(&visitor))
    }

    /// Name and description of `target`; works in either mode and on the dead.
    pub(crate) fn inspect(
        &self,
        target: EntityId,
    ) -> Result<Vec<(InspectionKey, String)>, CombatError> {
        self.actants
            .get(&target)
            .map(Inspectable::info)
            .ok_or(CombatError::InvalidTarget(target))
    }

    /// Manual move order. Overrides any pursuit the player had running.
    pub(crate) fn move_active_player(&mut self, destination: Vec3) -> Result<(), CombatError> {
        let player = self.living_active_player_id()?;
        if self.pursuits.request_cancel(player) {
            debug!(actor = player.0, "pursuit_cancel_manual_override");
        }
        self.manual_moves.insert(player, destination);
        Ok(())
    }

    pub(crate) fn set_active_player(&mut self, index: usize) -> Result<(), CombatError> {
        if index >= self.players.len() {
            return Err(CombatError::UnknownPlayer {
                index,
                count: self.players.len(),
            });
        }
        self.active_player_index = Some(index);
        let combat_mode = self.combat_mode;
        for (slot, id) in self.players.iter().enumerate() {
            if let Some(actant) = self.actants.get_mut(id) {
                actant.combat_ready = slot == index && combat_mode;
            }
        }
        info!(index, "active_player_changed");
        Ok(())
    }

    pub(super) fn start_pursuit(&mut self, actor: EntityId, target: EntityId, attack_distance: f32) {
        let task = PursuitTask::new(actor, target, attack_distance);
        if let Some(displaced) = self.pursuits.start(task) {
            self.events.emit(GameplayEvent::PursuitFinished {
                actor,
                outcome: PursuitOutcome::Cancelled,
            });
            debug!(
                actor = actor.0,
                previous_target = displaced.target().0,
                "pursuit_replaced"
            );
        }
        debug!(actor = actor.0, target = target.0, "pursuit_started");
    }
}
