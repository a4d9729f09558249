use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchetypeRole {
    Player,
    Hostile,
    Npc,
}

impl ArchetypeRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Player" => Some(Self::Player),
            "Hostile" => Some(Self::Hostile),
            "Npc" => Some(Self::Npc),
            _ => None,
        }
    }
}

/// Compiled `<ArchetypeDef>`: identity plus the combat numbers an actant is built from.
#[derive(Debug, Clone)]
pub struct ArchetypeDef {
    pub id: ArchetypeId,
    pub def_name: String,
    pub label: String,
    pub description: String,
    pub role: ArchetypeRole,
    pub max_health: i32,
    pub max_mana: i32,
    pub armor: i32,
    pub attack_power: i32,
    pub attack_distance: f32,
    pub aggression_range: f32,
    pub attack_delay_seconds: f32,
    pub walk_speed: f32,
    pub run_speed: f32,
    pub experience_reward: i32,
    pub health_reward: i32,
    pub mana_reward: i32,
}

#[derive(Debug, Default, Clone)]
pub struct DefDatabase {
    archetypes: Vec<ArchetypeDef>,
    archetype_ids_by_name: HashMap<String, ArchetypeId>,
}

impl DefDatabase {
    /// Ids follow the order of `archetypes`; callers pass them sorted by `def_name`.
    pub fn from_archetypes(mut archetypes: Vec<ArchetypeDef>) -> Self {
        let mut archetype_ids_by_name = HashMap::with_capacity(archetypes.len());
        for (idx, def) in archetypes.iter_mut().enumerate() {
            let id = ArchetypeId(idx as u32);
            def.id = id;
            archetype_ids_by_name.insert(def.def_name.clone(), id);
        }
        Self {
            archetypes,
            archetype_ids_by_name,
        }
    }

    pub fn archetype_id_by_name(&self, name: &str) -> Option<ArchetypeId> {
        self.archetype_ids_by_name.get(name).copied()
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&ArchetypeDef> {
        self.archetypes.get(id.0 as usize)
    }

    pub fn archetype_by_name(&self, name: &str) -> Option<&ArchetypeDef> {
        self.archetype_id_by_name(name)
            .and_then(|id| self.archetype(id))
    }

    pub fn archetypes(&self) -> &[ArchetypeDef] {
        &self.archetypes
    }

    pub fn archetypes_with_role(&self, role: ArchetypeRole) -> impl Iterator<Item = &ArchetypeDef> {
        self.archetypes.iter().filter(move |def| def.role == role)
    }
}
