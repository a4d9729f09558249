use engine::EntityId;
use tracing::{debug, info};

use super::types::PresentationCue;

/// Receives resource readouts for one actant, e.g. a health/mana bar.
pub(crate) trait IndicatorSink {
    fn health_changed(&mut self, value: i32);
    fn mana_changed(&mut self, value: i32);
    fn max_values_set(&mut self, max_health: i32, max_mana: i32);
}

/// Animation and UI side of combat. Nothing here feeds back into the simulation.
pub(crate) trait PresentationSink {
    fn cue(&mut self, actant: EntityId, cue: PresentationCue);
    fn set_health_indicator_visible(&mut self, actant: EntityId, visible: bool);
}

#[derive(Debug)]
pub(crate) struct TracingIndicatorSink {
    actant: EntityId,
    label: String,
}

impl TracingIndicatorSink {
    pub(crate) fn new(actant: EntityId, label: impl Into<String>) -> Self {
        Self {
            actant,
            label: label.into(),
        }
    }
}

impl IndicatorSink for TracingIndicatorSink {
    fn health_changed(&mut self, value: i32) {
        debug!(
            actant = self.actant.0,
            label = self.label.as_str(),
            value,
            "indicator_health"
        );
    }

    fn mana_changed(&mut self, value: i32) {
        debug!(
            actant = self.actant.0,
            label = self.label.as_str(),
            value,
            "indicator_mana"
        );
    }

    fn max_values_set(&mut self, max_health: i32, max_mana: i32) {
        debug!(
            actant = self.actant.0,
            label = self.label.as_str(),
            max_health,
            max_mana,
            "indicator_max_values"
        );
    }
}

#[derive(Debug, Default)]
pub(crate) struct TracingPresentationSink;

impl PresentationSink for TracingPresentationSink {
    fn cue(&mut self, actant: EntityId, cue: PresentationCue) {
        info!(actant = actant.0, cue = ?cue, "presentation_cue");
    }

    fn set_health_indicator_visible(&mut self, actant: EntityId, visible: bool) {
        debug!(actant = actant.0, visible, "health_indicator_visibility");
    }
}
