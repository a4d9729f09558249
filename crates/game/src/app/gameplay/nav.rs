use engine::{Tilemap, Vec3};
use thiserror::Error;

pub(crate) const NAV_BLOCKED_TILE_ID: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub(crate) enum NavError {
    #[error("point ({x}, {z}) is outside the navigable area")]
    OutsideMap { x: f32, z: f32 },
    #[error("point ({x}, {z}) is on a blocked tile")]
    Blocked { x: f32, z: f32 },
    #[error("no route between the requested points")]
    NoRoute,
}

/// Path query used by pursuit. Waypoints exclude `from` and end at `to`.
pub(crate) trait Navigator {
    fn find_path(&mut self, from: Vec3, to: Vec3) -> Result<Vec<Vec3>, NavError>;
}

/// Straight-line navigation over an unobstructed square arena centered on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OpenFieldNavigator {
    half_extent: Option<f32>,
}

impl OpenFieldNavigator {
    pub(crate) fn unbounded() -> Self {
        Self { half_extent: None }
    }

    pub(crate) fn bounded(half_extent: f32) -> Self {
        Self {
            half_extent: Some(half_extent.abs()),
        }
    }

    fn check(&self, point: Vec3) -> Result<(), NavError> {
        if !point.is_finite() {
            return Err(NavError::NoRoute);
        }
        match self.half_extent {
            Some(limit) if point.x.abs() > limit || point.z.abs() > limit => {
                Err(NavError::OutsideMap {
                    x: point.x,
                    z: point.z,
                })
            }
            _ => Ok(()),
        }
    }
}

impl Navigator for OpenFieldNavigator {
    fn find_path(&mut self, from: Vec3, to: Vec3) -> Result<Vec<Vec3>, NavError> {
        self.check(from)?;
        self.check(to)?;
        Ok(vec![to])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TileCoord {
    x: u32,
    y: u32,
}

/// Walkability grid derived from a tilemap; tiles with `NAV_BLOCKED_TILE_ID` are walls.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TilemapNavigator {
    width: u32,
    height: u32,
    origin: Vec3,
    walkable: Vec<bool>,
}

impl TilemapNavigator {
    pub(crate) fn from_tilemap(tilemap: &Tilemap) -> Self {
        let width = tilemap.width();
        let height = tilemap.height();
        let mut walkable = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let tile_id = tilemap.tile_at(x, y).unwrap_or(0);
                walkable.push(tile_id != NAV_BLOCKED_TILE_ID);
            }
        }
        Self {
            width,
            height,
            origin: tilemap.origin(),
            walkable,
        }
    }

    fn world_to_tile(&self, world: Vec3) -> Result<TileCoord, NavError> {
        let outside = NavError::OutsideMap {
            x: world.x,
            z: world.z,
        };
        if !world.is_finite() {
            return Err(outside);
        }
        let tile_x = (world.x - self.origin.x).floor();
        let tile_y = (world.z - self.origin.z).floor();
        if tile_x < 0.0 || tile_y < 0.0 {
            return Err(outside);
        }
        let tile_x = tile_x as u32;
        let tile_y = tile_y as u32;
        if tile_x >= self.width || tile_y >= self.height {
            return Err(outside);
        }
        Ok(TileCoord {
            x: tile_x,
            y: tile_y,
        })
    }

    fn tile_center_world(&self, tile: TileCoord) -> Vec3 {
        Vec3 {
            x: self.origin.x + tile.x as f32 + 0.5,
            y: self.origin.y,
            z: self.origin.z + tile.y as f32 + 0.5,
        }
    }

    fn is_walkable(&self, tile: TileCoord) -> bool {
        self.index_of(tile)
            .and_then(|index| self.walkable.get(index))
            .copied()
            .unwrap_or(false)
    }

    fn index_of(&self, tile: TileCoord) -> Option<usize> {
        if tile.x >= self.width || tile.y >= self.height {
            return None;
        }
        Some(tile.y as usize * self.width as usize + tile.x as usize)
    }

    fn find_path_tiles(&self, start: TileCoord, goal: TileCoord) -> Option<Vec<TileCoord>> {
        let start_index = self.index_of(start)?;
        let goal_index = self.index_of(goal)?;
        if start == goal {
            return Some(vec![start]);
        }

        let node_count = self.width as usize * self.height as usize;
        let mut closed = vec![false; node_count];
        let mut best_g = vec![u32::MAX; node_count];
        let mut parent = vec![None::<usize>; node_count];
        let mut open = Vec::new();
        let mut next_insertion = 0u64;

        let start_h = manhattan_distance(start, goal);
        open.push(OpenNode {
            coord: start,
            h_cost: start_h,
            f_cost: start_h,
            insertion_order: next_insertion,
        });
        next_insertion = next_insertion.saturating_add(1);
        best_g[start_index] = 0;

        while !open.is_empty() {
            let best_index = pick_best_open_node_index(&open);
            let current = open.swap_remove(best_index);
            let Some(current_index) = self.index_of(current.coord) else {
                continue;
            };
            if closed[current_index] {
                continue;
            }
            closed[current_index] = true;

            if current.coord == goal {
                return reconstruct_tile_path(&parent, self.width, start_index, goal_index);
            }

            let current_g = best_g[current_index];
            for neighbor in self.neighbors(current.coord).into_iter().flatten() {
                let Some(neighbor_index) = self.index_of(neighbor) else {
                    continue;
                };
                if closed[neighbor_index] || !self.is_walkable(neighbor) {
                    continue;
                }

                let tentative_g = current_g.saturating_add(1);
                if tentative_g >= best_g[neighbor_index] {
                    continue;
                }

                best_g[neighbor_index] = tentative_g;
                parent[neighbor_index] = Some(current_index);
                let h_cost = manhattan_distance(neighbor, goal);
                open.push(OpenNode {
                    coord: neighbor,
                    h_cost,
                    f_cost: tentative_g.saturating_add(h_cost),
                    insertion_order: next_insertion,
                });
                next_insertion = next_insertion.saturating_add(1);
            }
        }

        None
    }

    fn neighbors(&self, coord: TileCoord) -> [Option<TileCoord>; 4] {
        let north = (coord.y + 1 < self.height).then(|| TileCoord {
            x: coord.x,
            y: coord.y + 1,
        });
        let east = (coord.x + 1 < self.width).then(|| TileCoord {
            x: coord.x + 1,
            y: coord.y,
        });
        let south = coord.y.checked_sub(1).map(|y| TileCoord { x: coord.x, y });
        let west = coord.x.checked_sub(1).map(|x| TileCoord { x, y: coord.y });
        [north, east, south, west]
    }
}

impl Navigator for TilemapNavigator {
    fn find_path(&mut self, from: Vec3, to: Vec3) -> Result<Vec<Vec3>, NavError> {
        let start_tile = self.world_to_tile(from)?;
        let goal_tile = self.world_to_tile(to)?;
        // A start inside a wall still routes out through its walkable neighbours.
        if !self.is_walkable(goal_tile) {
            return Err(NavError::Blocked { x: to.x, z: to.z });
        }

        let tile_path = self
            .find_path_tiles(start_tile, goal_tile)
            .ok_or(NavError::NoRoute)?;

        // Tile centers up to the goal tile, then the exact goal point inside it.
        let mut waypoints = tile_path
            .iter()
            .skip(1)
            .take(tile_path.len().saturating_sub(2))
            .map(|tile| self.tile_center_world(*tile))
            .collect::<Vec<_>>();
        waypoints.push(to);
        Ok(waypoints)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    coord: TileCoord,
    h_cost: u32,
    f_cost: u32,
    insertion_order: u64,
}

fn pick_best_open_node_index(open: &[OpenNode]) -> usize {
    let mut best_index = 0usize;
    for index in 1..open.len() {
        if open_node_order_key(open[index]) < open_node_order_key(open[best_index]) {
            best_index = index;
        }
    }
    best_index
}

fn open_node_order_key(node: OpenNode) -> (u32, u32, u32, u32, u64) {
    (
        node.f_cost,
        node.h_cost,
        node.coord.y,
        node.coord.x,
        node.insertion_order,
    )
}

fn reconstruct_tile_path(
    parent: &[Option<usize>],
    width: u32,
    start_index: usize,
    goal_index: usize,
) -> Option<Vec<TileCoord>> {
    let mut cursor = goal_index;
    let mut indices = vec![cursor];

    while cursor != start_index {
        cursor = parent.get(cursor).and_then(|value| *value)?;
        indices.push(cursor);
    }
    indices.reverse();
    Some(
        indices
            .into_iter()
            .map(|index| TileCoord {
                x: (index as u32) % width,
                y: (index as u32) / width,
            })
            .collect(),
    )
}

fn manhattan_distance(a: TileCoord, b: TileCoord) -> u32 {
    a.x.abs_diff(b.x).saturating_add(a.y.abs_diff(b.y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tilemap_with_tiles(width: u32, height: u32, tiles: Vec<u16>) -> Tilemap {
        Tilemap::new(width, height, Vec3::ZERO, tiles).expect("tilemap")
    }

    fn center(x: u32, y: u32) -> Vec3 {
        Vec3::new(x as f32 + 0.5, 0.0, y as f32 + 0.5)
    }

    fn wall_with_gap(width: u32, height: u32, gap_y: u32) -> Vec<u16> {
        let mut tiles = vec![0u16; (width * height) as usize];
        for y in 0..height {
            if y != gap_y {
                tiles[(y * width + 3) as usize] = NAV_BLOCKED_TILE_ID;
            }
        }
        tiles
    }

    #[test]
    fn astar_path_never_steps_onto_blocked_tile() {
        let tilemap = tilemap_with_tiles(7, 5, wall_with_gap(7, 5, 4));
        let mut nav = TilemapNavigator::from_tilemap(&tilemap);

        let goal = Vec3::new(5.2, 0.0, 2.7);
        let path = nav.find_path(center(1, 2), goal).expect("reachable");
        assert_eq!(path.last().copied(), Some(goal));
        for waypoint in &path {
            let tile = nav.world_to_tile(*waypoint).expect("on map");
            assert!(nav.is_walkable(tile), "waypoint stepped onto blocked tile");
        }
        assert!(path.iter().any(|waypoint| waypoint.z > 4.0));
    }

    #[test]
    fn astar_tie_break_is_deterministic_on_symmetric_map() {
        let mut tiles = vec![0u16; 25];
        tiles[2 * 5 + 2] = NAV_BLOCKED_TILE_ID;
        let mut nav = TilemapNavigator::from_tilemap(&tilemap_with_tiles(5, 5, tiles));

        let first = nav.find_path(center(0, 2), center(4, 2)).expect("first");
        let second = nav.find_path(center(0, 2), center(4, 2)).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn same_tile_goal_returns_exact_point() {
        let mut nav = TilemapNavigator::from_tilemap(&Tilemap::filled(3, 3, Vec3::ZERO, 0));
        let goal = Vec3::new(1.2, 0.0, 1.8);
        let path = nav.find_path(Vec3::new(1.7, 0.0, 1.1), goal).expect("path");
        assert_eq!(path, vec![goal]);
    }

    #[test]
    fn sealed_wall_has_no_route() {
        let mut tiles = vec![0u16; 35];
        for y in 0..5 {
            tiles[y * 7 + 3] = NAV_BLOCKED_TILE_ID;
        }
        let mut nav = TilemapNavigator::from_tilemap(&tilemap_with_tiles(7, 5, tiles));
        assert_eq!(
            nav.find_path(center(1, 2), center(5, 2)),
            Err(NavError::NoRoute)
        );
    }

    #[test]
    fn blocked_and_outside_points_are_reported() {
        let tilemap = tilemap_with_tiles(7, 5, wall_with_gap(7, 5, 4));
        let mut nav = TilemapNavigator::from_tilemap(&tilemap);
        assert!(matches!(
            nav.find_path(center(1, 1), center(3, 1)),
            Err(NavError::Blocked { .. })
        ));
        assert!(matches!(
            nav.find_path(center(1, 1), Vec3::new(-3.0, 0.0, 1.0)),
            Err(NavError::OutsideMap { .. })
        ));
    }

    #[test]
    fn start_inside_wall_routes_out() {
        let tilemap = tilemap_with_tiles(7, 5, wall_with_gap(7, 5, 4));
        let mut nav = TilemapNavigator::from_tilemap(&tilemap);
        let path = nav.find_path(center(3, 1), center(1, 1)).expect("route out");
        assert_eq!(path.first().copied(), Some(center(2, 1)));
        assert_eq!(path.last().copied(), Some(center(1, 1)));
    }

    #[test]
    fn open_field_goes_straight_and_respects_bounds() {
        let mut nav = OpenFieldNavigator::bounded(10.0);
        let to = Vec3::new(4.0, 0.0, -2.0);
        assert_eq!(nav.find_path(Vec3::ZERO, to), Ok(vec![to]));
        assert!(matches!(
            nav.find_path(Vec3::ZERO, Vec3::new(11.0, 0.0, 0.0)),
            Err(NavError::OutsideMap { .. })
        ));
        let mut unbounded = OpenFieldNavigator::unbounded();
        assert_eq!(
            unbounded.find_path(Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 0.0)),
            Err(NavError::NoRoute)
        );
    }
}
