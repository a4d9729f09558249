use std::collections::BTreeMap;

use engine::{EntityId, Vec3};
use tracing::{debug, warn};

use super::types::SpawnError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpawnPoint {
    pub(crate) name: String,
    pub(crate) position: Vec3,
    /// `defName` of the archetype this point produces.
    pub(crate) archetype: String,
    pub(crate) capacity: usize,
    members: Vec<EntityId>,
}

impl SpawnPoint {
    pub(crate) fn members(&self) -> &[EntityId] {
        &self.members
    }

    pub(crate) fn live_count(&self) -> usize {
        self.members.len()
    }
}

/// Spawn point → owned actants. The only answer to "is this actant still live" for
/// global scans.
#[derive(Debug, Default)]
pub(crate) struct SpawnRegistry {
    points: BTreeMap<String, SpawnPoint>,
    owner_by_actant: BTreeMap<EntityId, String>,
}

impl SpawnRegistry {
    pub(crate) fn add_point(
        &mut self,
        name: impl Into<String>,
        position: Vec3,
        archetype: impl Into<String>,
        capacity: usize,
    ) {
        let name = name.into();
        if let Some(existing) = self.points.get(&name) {
            warn!(
                point = name.as_str(),
                live = existing.live_count(),
                "spawn_point_redefined"
            );
        }
        let members = self
            .points
            .remove(&name)
            .map(|existing| existing.members)
            .unwrap_or_default();
        self.points.insert(
            name.clone(),
            SpawnPoint {
                name,
                position,
                archetype: archetype.into(),
                capacity,
                members,
            },
        );
    }

    pub(crate) fn point(&self, name: &str) -> Option<&SpawnPoint> {
        self.points.get(name)
    }

    pub(crate) fn points(&self) -> impl Iterator<Item = &SpawnPoint> {
        self.points.values()
    }

    /// Point that may take one more actant right now.
    pub(crate) fn check_capacity(&self, name: &str) -> Result<&SpawnPoint, SpawnError> {
        let point = self
            .point(name)
            .ok_or_else(|| SpawnError::UnknownSpawnPoint(name.to_string()))?;
        if point.members.len() >= point.capacity {
            return Err(SpawnError::CapacityReached {
                point: name.to_string(),
                capacity: point.capacity,
            });
        }
        Ok(point)
    }

    pub(crate) fn register(&mut self, name: &str, actant: EntityId) -> Result<(), SpawnError> {
        self.check_capacity(name)?;
        let Some(point) = self.points.get_mut(name) else {
            return Err(SpawnError::UnknownSpawnPoint(name.to_string()));
        };
        point.members.push(actant);
        self.owner_by_actant.insert(actant, name.to_string());
        Ok(())
    }

    /// Returns `true` only for the call that actually removed `actant`.
    pub(crate) fn remove(&mut self, actant: EntityId) -> bool {
        let Some(owner) = self.owner_by_actant.remove(&actant) else {
            debug!(actant = actant.0, "registry_remove_ignored_unknown");
            return false;
        };
        if let Some(point) = self.points.get_mut(&owner) {
            point.members.retain(|member| *member != actant);
        }
        true
    }

    pub(crate) fn is_live(&self, actant: EntityId) -> bool {
        self.owner_by_actant.contains_key(&actant)
    }

    pub(crate) fn owner_of(&self, actant: EntityId) -> Option<&str> {
        self.owner_by_actant.get(&actant).map(String::as_str)
    }

    /// Every registered actant in id order.
    pub(crate) fn live_members(&self) -> Vec<EntityId> {
        self.owner_by_actant.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_caps_registration() {
        let mut registry = SpawnRegistry::default();
        registry.add_point("den", Vec3::ZERO, "Wolf", 2);
        registry.register("den", EntityId(1)).expect("first");
        registry.register("den", EntityId(2)).expect("second");
        assert_eq!(
            registry.register("den", EntityId(3)),
            Err(SpawnError::CapacityReached {
                point: "den".to_string(),
                capacity: 2
            })
        );
        assert_eq!(registry.live_members(), vec![EntityId(1), EntityId(2)]);
    }

    #[test]
    fn remove_happens_exactly_once_and_frees_capacity() {
        let mut registry = SpawnRegistry::default();
        registry.add_point("den", Vec3::ZERO, "Wolf", 1);
        registry.register("den", EntityId(7)).expect("register");
        assert!(registry.check_capacity("den").is_err());

        assert!(registry.remove(EntityId(7)));
        assert!(!registry.remove(EntityId(7)));
        assert!(!registry.is_live(EntityId(7)));
        assert!(registry.check_capacity("den").is_ok());
    }

    #[test]
    fn unknown_point_is_reported() {
        let mut registry = SpawnRegistry::default();
        assert_eq!(
            registry.register("nowhere", EntityId(1)),
            Err(SpawnError::UnknownSpawnPoint("nowhere".to_string()))
        );
    }

    #[test]
    fn redefining_a_point_keeps_its_members() {
        let mut registry = SpawnRegistry::default();
        registry.add_point("den", Vec3::ZERO, "Wolf", 3);
        registry.register("den", EntityId(4)).expect("register");
        registry.add_point("den", Vec3::new(1.0, 0.0, 1.0), "Goblin", 3);
        let point = registry.point("den").expect("point");
        assert_eq!(point.archetype, "Goblin");
        assert_eq!(point.members(), &[EntityId(4)]);
        assert_eq!(registry.owner_of(EntityId(4)), Some("den"));
    }
}
