mod loop_runner;
mod metrics;
mod scene;

pub use loop_runner::{
    run_app, run_scene, AppError, LoopConfig, LoopReport, StopReason, SLOW_TICK_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use scene::{
    Entity, EntityId, Scene, SceneCommand, SceneWorld, Tilemap, TilemapError, Transform, Vec3,
};
