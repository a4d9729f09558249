use engine::Vec3;

use self::nav::{NavError, Navigator};

mod aggression;
mod broadcast;
mod capabilities;
mod commands;
mod damage;
mod entity_state;
mod nav;
mod pursuit;
mod registry;
mod scene_impl;
mod sinks;
mod types;
mod world;


pub(crate) use scene_impl::SkirmishScene;

/// Leash and chase limit, as a multiple of aggression range.
const LEASH_RANGE_FACTOR: f32 = 2.0;
const ROAM_OFFSET_UNITS: f32 = 1.5;
const ROAM_ARRIVAL_THRESHOLD: f32 = 0.15;
const ROAM_WALK_SECONDS: f32 = 3.0;
const ROAM_PAUSE_SECONDS: f32 = 2.0;
const MANUAL_MOVE_ARRIVAL_THRESHOLD: f32 = 0.1;

/// Moves `current` toward `target` by at most `speed * dt` on the x/z plane.
/// Returns the new position and whether it landed within `arrival_threshold`.
fn step_toward(
    current: Vec3,
    target: Vec3,
    speed: f32,
    fixed_dt_seconds: f32,
    arrival_threshold: f32,
) -> (Vec3, bool) {
    let offset = Vec3::new(target.x - current.x, 0.0, target.z - current.z);
    let distance_sq = offset.length_sq();
    if distance_sq <= arrival_threshold * arrival_threshold {
        return (Vec3::new(target.x, current.y, target.z), true);
    }

    let distance = distance_sq.sqrt();
    let max_step = speed.max(0.0) * fixed_dt_seconds;
    if max_step >= distance {
        return (Vec3::new(target.x, current.y, target.z), true);
    }

    let next = current + offset.scale(max_step / distance);
    let remaining = Vec3::new(target.x - next.x, 0.0, target.z - next.z);
    (next, remaining.length_sq() <= arrival_threshold * arrival_threshold)
}

/// One walking step toward `destination` along the navigator's route. Intermediate
/// waypoints clamp the step, so only the final leg can report arrival.
fn route_step(
    navigator: &mut dyn Navigator,
    current: Vec3,
    destination: Vec3,
    speed: f32,
    fixed_dt_seconds: f32,
    arrival_threshold: f32,
) -> Result<(Vec3, bool), NavError> {
    let dx = destination.x - current.x;
    let dz = destination.z - current.z;
    if dx * dx + dz * dz <= arrival_threshold * arrival_threshold {
        return Ok((Vec3::new(destination.x, current.y, destination.z), true));
    }

    let path = navigator.find_path(current, destination)?;
    match path.as_slice() {
        [waypoint, _, ..] => {
            let (next, _) = step_toward(current, *waypoint, speed, fixed_dt_seconds, 0.0);
            Ok((next, false))
        }
        _ => Ok(step_toward(
            current,
            destination,
            speed,
            fixed_dt_seconds,
            arrival_threshold,
        )),
    }
}
