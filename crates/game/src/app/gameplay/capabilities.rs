use std::fmt;

use engine::{ArchetypeDef, ArchetypeId, ArchetypeRole, EntityId, Transform, Vec3};
use tracing::warn;

use super::entity_state::{EntityState, ResourceStats};

pub(crate) const UNNAMED_ACTANT: &str = "Unnamed";
const NO_DESCRIPTION: &str = "No description available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum InspectionKey {
    Name,
    Description,
}

pub(crate) trait Inspectable {
    fn info(&self) -> Vec<(InspectionKey, String)>;
}

/// Anything that can take hits through the damage resolver.
pub(crate) trait Damageable {
    fn entity_state_mut(&mut self) -> &mut EntityState;
}

pub(crate) trait Interactable {
    /// Answers a visitor; the reply is what the visitor hears.
    fn interact(&mut self, visitor_name: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AttackProfile {
    pub(crate) distance: f32,
    pub(crate) delay_seconds: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Movement {
    pub(crate) walk_speed: f32,
    pub(crate) run_speed: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Rewards {
    pub(crate) experience: i32,
    pub(crate) health: i32,
    pub(crate) mana: i32,
}

/// Per-archetype move/attack/defend/interact capability, picked once at construction.
pub(crate) trait ActantBehavior: fmt::Debug {
    fn role(&self) -> ArchetypeRole;
    fn movement(&self) -> Movement;
    fn attack_profile(&self) -> Option<AttackProfile>;
    fn aggression_range(&self) -> Option<f32> {
        None
    }
    fn can_defend(&self) -> bool {
        false
    }
    fn is_damageable(&self) -> bool {
        true
    }
    fn as_interactable_mut(&mut self) -> Option<&mut dyn Interactable> {
        None
    }
}

#[derive(Debug)]
struct PlayerBehavior {
    movement: Movement,
    attack: AttackProfile,
}

impl ActantBehavior for PlayerBehavior {
    fn role(&self) -> ArchetypeRole {
        ArchetypeRole::Player
    }

    fn movement(&self) -> Movement {
        self.movement
    }

    fn attack_profile(&self) -> Option<AttackProfile> {
        Some(self.attack)
    }

    fn can_defend(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct HostileBehavior {
    movement: Movement,
    attack: AttackProfile,
    aggression_range: f32,
}

impl ActantBehavior for HostileBehavior {
    fn role(&self) -> ArchetypeRole {
        ArchetypeRole::Hostile
    }

    fn movement(&self) -> Movement {
        self.movement
    }

    fn attack_profile(&self) -> Option<AttackProfile> {
        Some(self.attack)
    }

    fn aggression_range(&self) -> Option<f32> {
        Some(self.aggression_range)
    }
}

#[derive(Debug)]
struct NpcBehavior {
    movement: Movement,
    name: String,
    conversations: u32,
}

impl ActantBehavior for NpcBehavior {
    fn role(&self) -> ArchetypeRole {
        ArchetypeRole::Npc
    }

    fn movement(&self) -> Movement {
        self.movement
    }

    fn attack_profile(&self) -> Option<AttackProfile> {
        None
    }

    fn is_damageable(&self) -> bool {
        false
    }

    fn as_interactable_mut(&mut self) -> Option<&mut dyn Interactable> {
        Some(self as &mut dyn Interactable)
    }
}

impl Interactable for NpcBehavior {
    fn interact(&mut self, visitor_name: &str) -> String {
        self.conversations = self.conversations.saturating_add(1);
        if self.conversations == 1 {
            format!("{} turns toward {}.", self.name, visitor_name)
        } else {
            format!(
                "{} listens to {} again ({} times now).",
                self.name, visitor_name, self.conversations
            )
        }
    }
}

fn behavior_for(def: &ArchetypeDef, name: &str) -> Box<dyn ActantBehavior> {
    let movement = Movement {
        walk_speed: def.walk_speed,
        run_speed: def.run_speed,
    };
    let attack = AttackProfile {
        distance: def.attack_distance,
        delay_seconds: def.attack_delay_seconds,
    };
    match def.role {
        ArchetypeRole::Player => Box::new(PlayerBehavior { movement, attack }),
        ArchetypeRole::Hostile => Box::new(HostileBehavior {
            movement,
            attack,
            aggression_range: def.aggression_range,
        }),
        ArchetypeRole::Npc => Box::new(NpcBehavior {
            movement,
            name: name.to_string(),
            conversations: 0,
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Identity {
    name: String,
    description: String,
}

impl Identity {
    pub(crate) fn new(name: &str, description: &str) -> Self {
        let name = name.trim();
        let name = if name.is_empty() {
            warn!("actant_name_empty_rejected");
            UNNAMED_ACTANT.to_string()
        } else {
            name.to_string()
        };
        let description = description.trim();
        let description = if description.is_empty() {
            NO_DESCRIPTION.to_string()
        } else {
            description.to_string()
        };
        Self { name, description }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn description(&self) -> &str {
        &self.description
    }
}

/// One combatant or bystander: identity, resources, position and its archetype's behavior.
#[derive(Debug)]
pub(crate) struct Actant {
    pub(crate) id: EntityId,
    pub(crate) archetype: ArchetypeId,
    pub(crate) transform: Transform,
    pub(crate) home_position: Vec3,
    pub(crate) combat_ready: bool,
    identity: Identity,
    state: EntityState,
    behavior: Box<dyn ActantBehavior>,
    rewards: Rewards,
}

impl Actant {
    pub(crate) fn from_archetype(id: EntityId, def: &ArchetypeDef, position: Vec3) -> Self {
        let identity = Identity::new(&def.label, &def.description);
        let behavior = behavior_for(def, identity.name());
        Self {
            id,
            archetype: def.id,
            transform: Transform::at(position),
            home_position: position,
            combat_ready: false,
            state: EntityState::new(ResourceStats {
                max_health: def.max_health,
                max_mana: def.max_mana,
                armor: def.armor,
                attack_power: def.attack_power,
            }),
            behavior,
            rewards: Rewards {
                experience: def.experience_reward,
                health: def.health_reward,
                mana: def.mana_reward,
            },
            identity,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.identity.name()
    }

    pub(crate) fn role(&self) -> ArchetypeRole {
        self.behavior.role()
    }

    pub(crate) fn is_hostile(&self) -> bool {
        self.role() == ArchetypeRole::Hostile
    }

    pub(crate) fn position(&self) -> Vec3 {
        self.transform.position
    }

    pub(crate) fn movement(&self) -> Movement {
        self.behavior.movement()
    }

    pub(crate) fn attack_profile(&self) -> Option<AttackProfile> {
        self.behavior.attack_profile()
    }

    pub(crate) fn aggression_range(&self) -> Option<f32> {
        self.behavior.aggression_range()
    }

    pub(crate) fn can_defend(&self) -> bool {
        self.behavior.can_defend()
    }

    pub(crate) fn rewards(&self) -> Rewards {
        self.rewards
    }

    /// Read-only resource snapshot; every actant carries one even when it cannot be hit.
    pub(crate) fn state(&self) -> &EntityState {
        &self.state
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    pub(crate) fn as_damageable_mut(&mut self) -> Option<&mut dyn Damageable> {
        if self.behavior.is_damageable() {
            Some(self as &mut dyn Damageable)
        } else {
            None
        }
    }

    pub(crate) fn as_interactable_mut(&mut self) -> Option<&mut dyn Interactable> {
        self.behavior.as_interactable_mut()
    }
}

impl Damageable for Actant {
    fn entity_state_mut(&mut self) -> &mut EntityState {
        &mut self.state
    }
}

impl Inspectable for Actant {
    fn info(&self) -> Vec<(InspectionKey, String)> {
        vec![
            (InspectionKey::Name, self.identity.name().to_string()),
            (
                InspectionKey::Description,
                self.identity.description().to_string(),
            ),
        ]
    }
}
