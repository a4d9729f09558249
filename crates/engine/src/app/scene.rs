use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::DefDatabase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

/// World-space point or direction. `y` is up; the ground plane is `x`/`z`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    pub fn distance_sq(self, other: Vec3) -> f32 {
        (other - self).length_sq()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        self.distance_sq(other).sqrt()
    }

    pub fn scale(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    /// Heading around the up axis from `self` toward `target`, or `None` when the two
    /// points coincide on the ground plane.
    pub fn yaw_toward(self, target: Vec3) -> Option<f32> {
        let dx = target.x - self.x;
        let dz = target.z - self.z;
        if dx * dx + dz * dz <= f32::EPSILON {
            return None;
        }
        Some(dx.atan2(dz))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub yaw_radians: Option<f32>,
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            yaw_radians: None,
        }
    }

    pub fn face_toward(&mut self, target: Vec3) {
        if let Some(yaw) = self.position.yaw_toward(target) {
            self.yaw_radians = Some(yaw);
        }
    }
}

/// Tilemap origin convention:
/// - `origin` is the world position of tile (0,0) corner on the `x`/`z` plane.
/// - The center of tile (x,y) is `origin + (x + 0.5, 0, y + 0.5)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tilemap {
    width: u32,
    height: u32,
    origin: Vec3,
    tiles: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TilemapError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
}

impl Tilemap {
    pub fn new(
        width: u32,
        height: u32,
        origin: Vec3,
        tiles: Vec<u16>,
    ) -> Result<Self, TilemapError> {
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(TilemapError::TileCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            origin,
            tiles,
        })
    }

    pub fn filled(width: u32, height: u32, origin: Vec3, tile_id: u16) -> Self {
        Self {
            width,
            height,
            origin,
            tiles: vec![tile_id; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile_at(&self, x: u32, y: u32) -> Option<u16> {
        self.index_of(x, y)
            .and_then(|index| self.tiles.get(index).copied())
    }

    pub fn set_tile(&mut self, x: u32, y: u32, tile_id: u16) -> bool {
        match self.index_of(x, y) {
            Some(index) => {
                self.tiles[index] = tile_id;
                true
            }
            None => false,
        }
    }

    pub fn tile_center_world(&self, x: u32, y: u32) -> Option<Vec3> {
        self.index_of(x, y)?;
        Some(Vec3 {
            x: self.origin.x + x as f32 + 0.5,
            y: self.origin.y,
            z: self.origin.z + y as f32 + 0.5,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub transform: Transform,
    pub debug_name: String,
    pub actor: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub(crate) fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Body store for one scene. Spawns and despawns are queued and take effect at
/// `apply_pending`, which the loop runner calls once per tick after `Scene::update`.
#[derive(Debug, Default)]
pub struct SceneWorld {
    allocator: EntityIdAllocator,
    entities: Vec<Entity>,
    pending_spawns: Vec<Entity>,
    pending_despawns: Vec<EntityId>,
    tilemap: Option<Tilemap>,
    def_database: Option<DefDatabase>,
}

impl SceneWorld {
    pub fn spawn(&mut self, transform: Transform, debug_name: impl Into<String>) -> EntityId {
        self.spawn_internal(transform, debug_name.into(), false)
    }

    pub fn spawn_actor(
        &mut self,
        transform: Transform,
        debug_name: impl Into<String>,
    ) -> EntityId {
        self.spawn_internal(transform, debug_name.into(), true)
    }

    fn spawn_internal(&mut self, transform: Transform, debug_name: String, actor: bool) -> EntityId {
        let id = self.allocator.allocate();
        self.pending_spawns.push(Entity {
            id,
            transform,
            debug_name,
            actor,
        });
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        let exists_now = self.entities.iter().any(|entity| entity.id == id);
        let pending_spawn = self.pending_spawns.iter().any(|entity| entity.id == id);
        if !exists_now && !pending_spawn {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    pub fn apply_pending(&mut self) {
        if !self.pending_despawns.is_empty() {
            self.pending_despawns.sort_by_key(|id| id.0);
            self.pending_despawns.dedup();
            let pending = &self.pending_despawns;
            self.entities.retain(|entity| {
                pending
                    .binary_search_by_key(&entity.id.0, |id| id.0)
                    .is_err()
            });
            self.pending_spawns.retain(|entity| {
                pending
                    .binary_search_by_key(&entity.id.0, |id| id.0)
                    .is_err()
            });
            self.pending_despawns.clear();
        }

        self.entities.append(&mut self.pending_spawns);
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.pending_spawns.clear();
        self.pending_despawns.clear();
    }

    pub fn set_tilemap(&mut self, tilemap: Tilemap) {
        self.tilemap = Some(tilemap);
    }

    pub fn clear_tilemap(&mut self) {
        self.tilemap = None;
    }

    pub fn tilemap(&self) -> Option<&Tilemap> {
        self.tilemap.as_ref()
    }

    pub fn set_def_database(&mut self, def_database: DefDatabase) {
        self.def_database = Some(def_database);
    }

    pub fn def_database(&self) -> Option<&DefDatabase> {
        self.def_database.as_ref()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn find_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn find_entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id == id)
    }

    pub fn position_of(&self, id: EntityId) -> Option<Vec3> {
        self.find_entity(id).map(|entity| entity.transform.position)
    }
}

pub trait Scene {
    fn load(&mut self, world: &mut SceneWorld) -> Result<(), String>;
    fn update(&mut self, fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand;
    fn unload(&mut self, world: &mut SceneWorld);
    fn debug_title(&self, _world: &SceneWorld) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_is_deferred_until_apply_pending() {
        let mut world = SceneWorld::default();
        let id = world.spawn_actor(Transform::default(), "actor");
        assert!(world.find_entity(id).is_none());

        world.apply_pending();
        let actor = world.find_entity(id).expect("actor exists");
        assert!(actor.actor);
        assert_eq!(actor.debug_name, "actor");
    }

    #[test]
    fn despawn_unknown_entity_returns_false() {
        let mut world = SceneWorld::default();
        assert!(!world.despawn(EntityId(99)));
    }

    #[test]
    fn despawn_removes_entity_and_keeps_others() {
        let mut world = SceneWorld::default();
        let a = world.spawn(Transform::default(), "a");
        let b = world.spawn(Transform::default(), "b");
        world.apply_pending();

        assert!(world.despawn(a));
        assert!(world.despawn(a));
        world.apply_pending();

        assert!(world.find_entity(a).is_none());
        assert!(world.find_entity(b).is_some());
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn despawn_of_pending_spawn_drops_it_before_it_lands() {
        let mut world = SceneWorld::default();
        let id = world.spawn(Transform::default(), "short_lived");
        assert!(world.despawn(id));
        world.apply_pending();
        assert!(world.find_entity(id).is_none());
    }

    #[test]
    fn pending_spawns_land_in_spawn_order() {
        let mut world = SceneWorld::default();
        let first = world.spawn(Transform::default(), "first");
        let second = world.spawn(Transform::default(), "second");
        assert_eq!(world.entity_count(), 0);
        world.apply_pending();
        let ids = world.entities().iter().map(|entity| entity.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn vec3_distance_and_yaw() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < 1e-5);
        assert_eq!(a.yaw_toward(a), None);

        let yaw = a.yaw_toward(Vec3::new(0.0, 0.0, 1.0)).expect("yaw");
        assert!(yaw.abs() < 1e-5);
        let yaw = a.yaw_toward(Vec3::new(1.0, 0.0, 0.0)).expect("yaw");
        assert!((yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn tilemap_rejects_mismatched_tile_count() {
        let err = Tilemap::new(2, 2, Vec3::ZERO, vec![0; 3]).expect_err("mismatch");
        assert_eq!(
            err,
            TilemapError::TileCountMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn tilemap_center_uses_ground_plane() {
        let tilemap = Tilemap::filled(4, 4, Vec3::new(-2.0, 1.0, -2.0), 0);
        let center = tilemap.tile_center_world(1, 3).expect("center");
        assert_eq!(center, Vec3::new(-0.5, 1.0, 1.5));
        assert_eq!(tilemap.tile_center_world(4, 0), None);
    }

    #[test]
    fn transform_face_toward_keeps_previous_yaw_for_coincident_target() {
        let mut transform = Transform::at(Vec3::ZERO);
        transform.face_toward(Vec3::new(1.0, 0.0, 0.0));
        let yaw = transform.yaw_radians.expect("yaw");
        transform.face_toward(Vec3::ZERO);
        assert_eq!(transform.yaw_radians, Some(yaw));
    }
}
