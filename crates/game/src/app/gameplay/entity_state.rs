use std::fmt;

use tracing::debug;

use super::sinks::IndicatorSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResourceStats {
    pub(crate) max_health: i32,
    pub(crate) max_mana: i32,
    pub(crate) armor: i32,
    pub(crate) attack_power: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ArmorBoostId(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
struct ArmorBoost {
    id: ArmorBoostId,
    delta: i32,
    remaining_seconds: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DamageTaken {
    /// Health actually removed by this hit.
    pub(crate) applied: i32,
    pub(crate) lethal: bool,
}

/// Mutable resources of one actant.
///
/// Invariants: `0 <= health <= max_health`, `0 <= mana <= max_mana`, armor never
/// negative. Once dead, health stays at 0 and damage/heal calls are no-ops. Every
/// health or mana mutation is reported to the attached indicators, even when the
/// value did not move.
///
/// Armor boosts stack additively and expire independently: each boost keeps its own
/// countdown, and the effective armor is the base plus every boost still running.
pub(crate) struct EntityState {
    health: i32,
    max_health: i32,
    mana: i32,
    max_mana: i32,
    base_armor: i32,
    armor_boosts: Vec<ArmorBoost>,
    next_armor_boost_id: u32,
    attack_power: i32,
    experience: i32,
    is_dead: bool,
    indicators: Vec<Box<dyn IndicatorSink>>,
}

impl fmt::Debug for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityState")
            .field("health", &self.health)
            .field("max_health", &self.max_health)
            .field("mana", &self.mana)
            .field("max_mana", &self.max_mana)
            .field("armor", &self.armor())
            .field("attack_power", &self.attack_power)
            .field("experience", &self.experience)
            .field("is_dead", &self.is_dead)
            .field("indicator_count", &self.indicators.len())
            .finish()
    }
}

fn non_negative(value: i32, input: &'static str) -> i32 {
    if value < 0 {
        debug!(input, value, "negative_input_clamped");
        0
    } else {
        value
    }
}

impl EntityState {
    pub(crate) fn new(stats: ResourceStats) -> Self {
        let max_health = non_negative(stats.max_health, "max_health");
        let max_mana = non_negative(stats.max_mana, "max_mana");
        Self {
            health: max_health,
            max_health,
            mana: max_mana,
            max_mana,
            base_armor: non_negative(stats.armor, "armor"),
            armor_boosts: Vec::new(),
            next_armor_boost_id: 0,
            attack_power: non_negative(stats.attack_power, "attack_power"),
            experience: 0,
            is_dead: false,
            indicators: Vec::new(),
        }
    }

    pub(crate) fn health(&self) -> i32 {
        self.health
    }

    pub(crate) fn max_health(&self) -> i32 {
        self.max_health
    }

    pub(crate) fn mana(&self) -> i32 {
        self.mana
    }

    pub(crate) fn max_mana(&self) -> i32 {
        self.max_mana
    }

    pub(crate) fn armor(&self) -> i32 {
        self.armor_boosts
            .iter()
            .fold(self.base_armor, |armor, boost| armor.saturating_add(boost.delta))
    }

    pub(crate) fn active_armor_boosts(&self) -> usize {
        self.armor_boosts.len()
    }

    pub(crate) fn attack_power(&self) -> i32 {
        self.attack_power
    }

    pub(crate) fn experience(&self) -> i32 {
        self.experience
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.is_dead
    }

    pub(crate) fn is_alive(&self) -> bool {
        !self.is_dead
    }

    /// Reports the max values to `sink` right away, then every later mutation.
    pub(crate) fn attach_indicator(&mut self, mut sink: Box<dyn IndicatorSink>) {
        sink.max_values_set(self.max_health, self.max_mana);
        self.indicators.push(sink);
    }

    fn notify_health(&mut self) {
        let value = self.health;
        for sink in &mut self.indicators {
            sink.health_changed(value);
        }
    }

    fn notify_mana(&mut self) {
        let value = self.mana;
        for sink in &mut self.indicators {
            sink.mana_changed(value);
        }
    }

    /// Armor-mitigated hit. The caller decides what a lethal hit means.
    pub(crate) fn take_damage(&mut self, amount: i32) -> DamageTaken {
        let amount = non_negative(amount, "damage");
        if self.is_dead {
            return DamageTaken {
                applied: 0,
                lethal: false,
            };
        }

        let adjusted = amount.saturating_sub(self.armor()).max(0);
        let before = self.health;
        self.health = before.saturating_sub(adjusted).clamp(0, self.max_health);
        self.notify_health();

        DamageTaken {
            applied: before - self.health,
            lethal: self.health == 0,
        }
    }

    /// Returns `true` only for the call that actually flipped the actant to dead.
    pub(crate) fn mark_dead(&mut self) -> bool {
        if self.is_dead {
            return false;
        }
        self.is_dead = true;
        if self.health != 0 {
            self.health = 0;
            self.notify_health();
        }
        true
    }

    pub(crate) fn heal(&mut self, amount: i32) {
        let amount = non_negative(amount, "heal");
        if self.is_dead {
            debug!(amount, "heal_ignored_dead");
            return;
        }
        self.health = self.health.saturating_add(amount).min(self.max_health);
        self.notify_health();
    }

    pub(crate) fn restore_mana(&mut self, amount: i32) {
        let amount = non_negative(amount, "restore_mana");
        self.mana = self.mana.saturating_add(amount).min(self.max_mana);
        self.notify_mana();
    }

    /// Deducts `amount` only when the full cost is available.
    pub(crate) fn consume_mana(&mut self, amount: i32) -> bool {
        let amount = non_negative(amount, "consume_mana");
        if self.mana < amount {
            return false;
        }
        self.mana -= amount;
        self.notify_mana();
        true
    }

    pub(crate) fn gain_experience(&mut self, amount: i32) {
        let amount = non_negative(amount, "experience");
        self.experience = self.experience.saturating_add(amount);
    }

    pub(crate) fn boost_armor_temporarily(
        &mut self,
        delta: i32,
        duration_seconds: f32,
    ) -> Option<ArmorBoostId> {
        let delta = non_negative(delta, "armor_boost");
        if delta == 0 || !(duration_seconds > 0.0) {
            debug!(delta, duration_seconds, "armor_boost_ignored_empty");
            return None;
        }
        let id = ArmorBoostId(self.next_armor_boost_id);
        self.next_armor_boost_id = self.next_armor_boost_id.saturating_add(1);
        self.armor_boosts.push(ArmorBoost {
            id,
            delta,
            remaining_seconds: duration_seconds,
        });
        Some(id)
    }

    /// Counts boosts down by `dt_seconds` and drops the expired ones; returns how many ended.
    pub(crate) fn tick_armor_boosts(&mut self, dt_seconds: f32) -> usize {
        if self.armor_boosts.is_empty() {
            return 0;
        }
        for boost in &mut self.armor_boosts {
            boost.remaining_seconds -= dt_seconds;
        }
        let before = self.armor_boosts.len();
        self.armor_boosts.retain(|boost| {
            let keep = boost.remaining_seconds > 0.0;
            if !keep {
                debug!(boost_id = boost.id.0, delta = boost.delta, "armor_boost_expired");
            }
            keep
        });
        before - self.armor_boosts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::sinks::recording::{IndicatorUpdate, RecordingIndicatorSink};
    use super::*;

    fn stats(max_health: i32, max_mana: i32, armor: i32) -> ResourceStats {
        ResourceStats {
            max_health,
            max_mana,
            armor,
            attack_power: 10,
        }
    }

    #[test]
    fn armor_mitigates_damage() {
        let mut state = EntityState::new(stats(30, 0, 10));
        let taken = state.take_damage(25);
        assert_eq!(taken.applied, 15);
        assert!(!taken.lethal);
        assert_eq!(state.health(), 15);
        assert!(state.is_alive());
    }

    #[test]
    fn damage_below_armor_still_notifies() {
        let mut state = EntityState::new(stats(30, 0, 10));
        let sink = RecordingIndicatorSink::default();
        state.attach_indicator(Box::new(sink.clone()));

        let taken = state.take_damage(4);
        assert_eq!(taken.applied, 0);
        assert_eq!(state.health(), 30);
        assert_eq!(sink.health_updates(), vec![30]);
    }

    #[test]
    fn overkill_clamps_to_zero_and_reports_lethal() {
        let mut state = EntityState::new(stats(10, 0, 0));
        let taken = state.take_damage(50);
        assert_eq!(taken.applied, 10);
        assert!(taken.lethal);
        assert_eq!(state.health(), 0);
    }

    #[test]
    fn dead_state_ignores_damage_and_heal() {
        let mut state = EntityState::new(stats(10, 0, 0));
        state.take_damage(10);
        assert!(state.mark_dead());
        assert!(!state.mark_dead());

        let taken = state.take_damage(5);
        assert_eq!(taken.applied, 0);
        assert!(!taken.lethal);
        state.heal(5);
        assert_eq!(state.health(), 0);
    }

    #[test]
    fn consume_mana_refuses_when_short() {
        let mut state = EntityState::new(stats(10, 5, 0));
        assert!(!state.consume_mana(10));
        assert_eq!(state.mana(), 5);
        assert!(state.consume_mana(5));
        assert_eq!(state.mana(), 0);
    }

    #[test]
    fn heal_and_restore_cap_at_max() {
        let mut state = EntityState::new(stats(20, 10, 0));
        state.take_damage(15);
        state.heal(100);
        assert_eq!(state.health(), 20);
        state.consume_mana(8);
        state.restore_mana(100);
        assert_eq!(state.mana(), 10);
    }

    #[test]
    fn negative_inputs_are_clamped_not_applied() {
        let mut state = EntityState::new(stats(20, 10, 0));
        state.take_damage(5);
        let taken = state.take_damage(-50);
        assert_eq!(taken.applied, 0);
        assert_eq!(state.health(), 15);
        state.heal(-5);
        assert_eq!(state.health(), 15);
        assert!(state.consume_mana(-3));
        assert_eq!(state.mana(), 10);
        state.gain_experience(-7);
        assert_eq!(state.experience(), 0);
    }

    #[test]
    fn attach_reports_max_values_first() {
        let mut state = EntityState::new(stats(40, 25, 0));
        let sink = RecordingIndicatorSink::default();
        state.attach_indicator(Box::new(sink.clone()));
        state.consume_mana(5);

        assert_eq!(
            sink.updates(),
            vec![
                IndicatorUpdate::MaxValues {
                    max_health: 40,
                    max_mana: 25
                },
                IndicatorUpdate::Mana(20),
            ]
        );
    }

    #[test]
    fn overlapping_armor_boosts_stack_and_expire_independently() {
        let mut state = EntityState::new(stats(100, 0, 2));
        state.boost_armor_temporarily(5, 1.0).expect("first boost");
        state.tick_armor_boosts(0.5);
        state.boost_armor_temporarily(5, 1.0).expect("second boost");
        assert_eq!(state.armor(), 12);

        assert_eq!(state.tick_armor_boosts(0.6), 1);
        assert_eq!(state.armor(), 7);
        assert_eq!(state.tick_armor_boosts(0.5), 1);
        assert_eq!(state.armor(), 2);
        assert_eq!(state.active_armor_boosts(), 0);
    }

    #[test]
    fn empty_armor_boost_is_ignored() {
        let mut state = EntityState::new(stats(100, 0, 2));
        assert!(state.boost_armor_temporarily(0, 1.0).is_none());
        assert!(state.boost_armor_temporarily(3, 0.0).is_none());
        assert_eq!(state.armor(), 2);
    }
}
