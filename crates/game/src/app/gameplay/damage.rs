use engine::EntityId;
use tracing::{debug, info};

use super::capabilities::{Damageable, Rewards};
use super::types::{CombatError, GameplayEvent, PresentationCue};
use super::world::CombatWorld;

impl CombatWorld {
    /// One attack resolution from `attacker` onto `target`, using the attacker's power.
    pub(crate) fn resolve_strike(
        &mut self,
        attacker: EntityId,
        target: EntityId,
    ) -> Result<i32, CombatError> {
        let Some(attacker_actant) = self.actants.get(&attacker) else {
            return Err(CombatError::InvalidTarget(attacker));
        };
        if !attacker_actant.is_alive() {
            debug!(attacker = attacker.0, "strike_ignored_dead_attacker");
            return Err(CombatError::InvalidTarget(attacker));
        }
        let power = attacker_actant.state().attack_power();

        self.presentation.cue(attacker, PresentationCue::Attack);
        if let Some(record) = self.aggression.get_mut(&attacker) {
            record.last_attack_time = Some(self.clock_seconds);
        }
        self.events
            .emit(GameplayEvent::AttackResolved { attacker, target });
        self.apply_damage(target, power, Some(attacker))
    }

    /// Applies `amount` (before armor) to `target` and resolves death in the same call.
    ///
    /// Returns the health actually removed. A dead target absorbs nothing and reports 0.
    pub(crate) fn apply_damage(
        &mut self,
        target: EntityId,
        amount: i32,
        source: Option<EntityId>,
    ) -> Result<i32, CombatError> {
        let Some(state) = self
            .actants
            .get_mut(&target)
            .and_then(|actant| actant.as_damageable_mut())
            .map(Damageable::entity_state_mut)
        else {
            debug!(target = target.0, "apply_damage_invalid_target");
            return Err(CombatError::InvalidTarget(target));
        };
        if state.is_dead() {
            debug!(target = target.0, amount, "apply_damage_ignored_dead");
            return Ok(0);
        }

        let taken = state.take_damage(amount);
        let health = state.health();
        self.presentation.cue(target, PresentationCue::Hit);
        self.events.emit(GameplayEvent::DamageApplied {
            target,
            amount: taken.applied,
        });
        debug!(
            target = target.0,
            source = ?source.map(|id| id.0),
            amount,
            applied = taken.applied,
            health,
            "damage_applied"
        );

        if taken.lethal {
            self.kill(target, source);
        } else if let Some(attacker) = source {
            self.retaliate(target, attacker);
        }
        Ok(taken.applied)
    }

    /// Marks `target` dead. Only the first call has effects: rewards to `responsible`,
    /// the death cue, and scheduling registry removal after the grace period.
    pub(crate) fn kill(&mut self, target: EntityId, responsible: Option<EntityId>) -> bool {
        let Some(actant) = self.actants.get_mut(&target) else {
            return false;
        };
        let rewards = actant.rewards();
        let Some(damageable) = actant.as_damageable_mut() else {
            debug!(target = target.0, "kill_ignored_not_damageable");
            return false;
        };
        if !damageable.entity_state_mut().mark_dead() {
            debug!(target = target.0, "kill_ignored_already_dead");
            return false;
        }
        info!(actant = target.0, name = actant.name(), "actant_died");

        self.presentation.cue(target, PresentationCue::Death);
        self.events.emit(GameplayEvent::ActantDied { actant: target });
        self.pursuits.request_cancel(target);
        self.manual_moves.remove(&target);

        if let Some(recipient) = responsible.filter(|recipient| *recipient != target) {
            self.grant_rewards(recipient, rewards);
        }
        if self.registry.is_live(target) {
            self.pending_removals
                .entry(target)
                .or_insert(self.tuning.death_grace_seconds);
        }
        true
    }

    fn grant_rewards(&mut self, recipient: EntityId, rewards: Rewards) {
        let Some(state) = self
            .actants
            .get_mut(&recipient)
            .filter(|actant| actant.is_alive())
            .and_then(|actant| actant.as_damageable_mut())
            .map(Damageable::entity_state_mut)
        else {
            debug!(recipient = recipient.0, "reward_skipped_no_recipient");
            return;
        };
        state.gain_experience(rewards.experience);
        state.heal(rewards.health);
        state.restore_mana(rewards.mana);
        let experience = state.experience();
        self.events.emit(GameplayEvent::RewardGranted {
            recipient,
            experience: rewards.experience,
        });
        info!(
            recipient = recipient.0,
            experience_gained = rewards.experience,
            experience_total = experience,
            health = rewards.health,
            mana = rewards.mana,
            "reward_granted"
        );
    }

    /// Spends `amount` mana from `actant`; refused without change when short.
    pub(crate) fn consume_mana(&mut self, actant: EntityId, amount: i32) -> Result<(), CombatError> {
        let Some(state) = self
            .actants
            .get_mut(&actant)
            .and_then(|entry| entry.as_damageable_mut())
            .map(Damageable::entity_state_mut)
        else {
            return Err(CombatError::InvalidTarget(actant));
        };
        let available = state.mana();
        if state.consume_mana(amount) {
            Ok(())
        } else {
            debug!(actant = actant.0, required = amount, available, "consume_mana_refused");
            Err(CombatError::InsufficientResource {
                actant,
                required: amount,
                available,
            })
        }
    }
}
