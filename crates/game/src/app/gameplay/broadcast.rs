use tracing::info;

use super::types::GameplayEvent;
use super::world::CombatWorld;

impl CombatWorld {
    /// Flips the global combat flag and pushes it to every living registered hostile's
    /// health indicator and to the active player's readiness. Returns the new mode.
    pub(crate) fn toggle_combat_mode(&mut self) -> bool {
        self.combat_mode = !self.combat_mode;
        let enabled = self.combat_mode;

        let mut hostiles_updated = 0usize;
        for id in self.registry.live_members() {
            let Some(actant) = self.actants.get(&id) else {
                continue;
            };
            if !actant.is_hostile() || !actant.is_alive() {
                continue;
            }
            self.presentation.set_health_indicator_visible(id, enabled);
            hostiles_updated += 1;
        }

        if let Some(player) = self.active_player() {
            if let Some(actant) = self.actants.get_mut(&player) {
                actant.combat_ready = enabled;
            }
        }

        self.events
            .emit(GameplayEvent::CombatModeToggled { enabled });
        info!(enabled, hostiles_updated, "combat_mode_toggled");
        enabled
    }

    pub(crate) fn combat_mode(&self) -> bool {
        self.combat_mode
    }
}
