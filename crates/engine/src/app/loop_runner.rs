use std::env;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::{compile_def_database, resolve_app_paths, ContentCompileError, StartupError};

use super::metrics::MetricsAccumulator;
use super::{MetricsHandle, Scene, SceneCommand, SceneWorld};

pub const SLOW_TICK_ENV_VAR: &str = "SKIRMISH_SLOW_TICK_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    /// Stop after this many ticks even if the scene never asks to.
    pub max_ticks: Option<u64>,
    /// Sleep out the remainder of each fixed step instead of running flat out.
    pub realtime: bool,
    pub tick_budget: Duration,
    pub metrics_log_interval: Duration,
    pub simulated_slow_tick_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_ticks: None,
            realtime: false,
            tick_budget: Duration::from_millis(4),
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_tick_ms: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to compile content definitions: {0}")]
    ContentCompile(#[from] ContentCompileError),
    #[error("scene failed to load: {0}")]
    SceneLoad(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SceneStop,
    MaxTicks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopReport {
    pub ticks_run: u64,
    pub stop_reason: StopReason,
    pub final_entity_count: usize,
}

pub fn run_app(config: LoopConfig, scene: Box<dyn Scene>) -> Result<LoopReport, AppError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        base_content_dir = %app_paths.base_content_dir.display(),
        "startup"
    );
    let def_database = compile_def_database(&app_paths)?;

    let mut world = SceneWorld::default();
    world.set_def_database(def_database);
    run_scene(config, world, scene, MetricsHandle::default())
}

/// Drives `scene` on `world` at a fixed step until the scene stops or `max_ticks` is hit.
///
/// Each tick runs `Scene::update` and then applies the world's pending spawns and
/// despawns, so entities created during a tick become visible on the next one.
pub fn run_scene(
    config: LoopConfig,
    mut world: SceneWorld,
    mut scene: Box<dyn Scene>,
    metrics_handle: MetricsHandle,
) -> Result<LoopReport, AppError> {
    let target_tps = config.target_tps.max(1);
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let tick_budget = normalize_non_zero_duration(config.tick_budget, fixed_dt);
    let slow_tick_delay = resolve_slow_tick_delay(config.simulated_slow_tick_ms);

    scene.load(&mut world).map_err(AppError::SceneLoad)?;
    world.apply_pending();
    info!(entity_count = world.entity_count(), "scene_loaded");
    info!(
        target_tps,
        max_ticks = ?config.max_ticks,
        realtime = config.realtime,
        tick_budget_us = tick_budget.as_micros() as u64,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_tick_delay_ms = slow_tick_delay.as_millis() as u64,
        "loop_config"
    );

    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval, tick_budget);
    let mut ticks_run = 0u64;
    let stop_reason = loop {
        if config.max_ticks.is_some_and(|max| ticks_run >= max) {
            break StopReason::MaxTicks;
        }

        let tick_start = Instant::now();
        if slow_tick_delay > Duration::ZERO {
            thread::sleep(slow_tick_delay);
        }
        let command = scene.update(fixed_dt_seconds, &mut world);
        world.apply_pending();
        ticks_run = ticks_run.saturating_add(1);

        let now = Instant::now();
        let tick_time = now.saturating_duration_since(tick_start);
        metrics_accumulator.record_tick(tick_time);
        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
            metrics_handle.publish(snapshot);
            let title = scene.debug_title(&world);
            info!(
                scene = title.as_deref().unwrap_or("-"),
                tps = snapshot.tps,
                tick_time_ms = snapshot.tick_time_ms,
                over_budget_ticks = snapshot.over_budget_ticks,
                entity_count = world.entity_count(),
                "tick_metrics"
            );
        }

        if command == SceneCommand::Stop {
            break StopReason::SceneStop;
        }

        if config.realtime {
            let pacing_sleep = compute_pacing_sleep(tick_time, fixed_dt);
            if pacing_sleep > Duration::ZERO {
                thread::sleep(pacing_sleep);
            }
        }
    };

    let final_entity_count = world.entity_count();
    scene.unload(&mut world);
    info!(ticks_run, stop_reason = ?stop_reason, final_entity_count, "shutdown");

    Ok(LoopReport {
        ticks_run,
        stop_reason,
        final_entity_count,
    })
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_pacing_sleep(elapsed: Duration, fixed_dt: Duration) -> Duration {
    fixed_dt.saturating_sub(elapsed)
}

fn resolve_slow_tick_delay(config_slow_tick_ms: u64) -> Duration {
    match env::var(SLOW_TICK_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_TICK_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-tick env var value; falling back to config"
                );
                Duration::from_millis(config_slow_tick_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_tick_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_TICK_ENV_VAR,
                error = %err,
                "unable to read slow-tick env var; falling back to config"
            );
            Duration::from_millis(config_slow_tick_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Transform, Vec3};

    #[derive(Default)]
    struct CountingScene {
        stop_after: Option<u32>,
        updates: u32,
        loaded: bool,
        unloaded: std::rc::Rc<std::cell::Cell<bool>>,
    }

    impl Scene for CountingScene {
        fn load(&mut self, world: &mut SceneWorld) -> Result<(), String> {
            self.loaded = true;
            world.spawn(Transform::at(Vec3::ZERO), "marker");
            Ok(())
        }

        fn update(&mut self, _fixed_dt_seconds: f32, world: &mut SceneWorld) -> SceneCommand {
            self.updates += 1;
            world.spawn(Transform::default(), "per_tick");
            match self.stop_after {
                Some(limit) if self.updates >= limit => SceneCommand::Stop,
                _ => SceneCommand::None,
            }
        }

        fn unload(&mut self, _world: &mut SceneWorld) {
            self.unloaded.set(true);
        }
    }

    struct FailingScene;

    impl Scene for FailingScene {
        fn load(&mut self, _world: &mut SceneWorld) -> Result<(), String> {
            Err("missing layout".to_string())
        }

        fn update(&mut self, _fixed_dt_seconds: f32, _world: &mut SceneWorld) -> SceneCommand {
            SceneCommand::None
        }

        fn unload(&mut self, _world: &mut SceneWorld) {}
    }

    #[test]
    fn scene_stop_ends_loop_and_applies_pending_each_tick() {
        let unloaded = std::rc::Rc::new(std::cell::Cell::new(false));
        let scene = CountingScene {
            stop_after: Some(3),
            unloaded: unloaded.clone(),
            ..CountingScene::default()
        };
        let report = run_scene(
            LoopConfig::default(),
            SceneWorld::default(),
            Box::new(scene),
            MetricsHandle::default(),
        )
        .expect("run");

        assert_eq!(report.ticks_run, 3);
        assert_eq!(report.stop_reason, StopReason::SceneStop);
        assert_eq!(report.final_entity_count, 4);
        assert!(unloaded.get());
    }

    #[test]
    fn max_ticks_caps_a_scene_that_never_stops() {
        let report = run_scene(
            LoopConfig {
                max_ticks: Some(5),
                ..LoopConfig::default()
            },
            SceneWorld::default(),
            Box::new(CountingScene::default()),
            MetricsHandle::default(),
        )
        .expect("run");

        assert_eq!(report.ticks_run, 5);
        assert_eq!(report.stop_reason, StopReason::MaxTicks);
    }

    #[test]
    fn load_failure_is_reported() {
        let err = run_scene(
            LoopConfig::default(),
            SceneWorld::default(),
            Box::new(FailingScene),
            MetricsHandle::default(),
        )
        .expect_err("load should fail");
        assert!(matches!(err, AppError::SceneLoad(message) if message == "missing layout"));
    }

    #[test]
    fn pacing_sleep_is_zero_when_over_budget() {
        let fixed_dt = Duration::from_millis(16);
        assert_eq!(
            compute_pacing_sleep(Duration::from_millis(20), fixed_dt),
            Duration::ZERO
        );
        assert_eq!(
            compute_pacing_sleep(Duration::from_millis(6), fixed_dt),
            Duration::from_millis(10)
        );
    }

    #[test]
    fn zero_durations_fall_back() {
        assert_eq!(
            normalize_non_zero_duration(Duration::ZERO, Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(3), Duration::from_secs(1)),
            Duration::from_millis(3)
        );
    }
}
