//! Tuning constants and the per-step configuration for the engine.
//!
//! Values are in meters-kilograms-seconds units.

use std::f32::consts::PI;

/// Maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Maximum bodies a world will hold before creation fails.
pub const MAX_BODIES: usize = u16::MAX as usize;

/// Maximum fixtures a world will hold before creation fails.
pub const MAX_FIXTURES: usize = u16::MAX as usize;

/// Maximum joints a world will hold before creation fails.
pub const MAX_JOINTS: usize = u16::MAX as usize;

/// Maximum live contacts tracked by the contact manager.
pub const MAX_CONTACTS: usize = u32::MAX as usize;

/// Collision and constraint tolerance. Chosen to be numerically
/// significant but visually insignificant.
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular analogue of [`LINEAR_SLOP`].
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;

/// Skin radius of polygon and edge shapes. Keeps a buffer for continuous
/// collision; the manifold builder subtracts it back out.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Fattening applied to broad-phase AABBs so proxies can move a little
/// without re-insertion.
pub const AABB_EXTENSION: f32 = 0.1;

/// Dimensionless multiplier on proxy displacement used to predict motion
/// when fattening broad-phase AABBs.
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Collisions with a relative approach speed below this are inelastic.
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Clamp on per-iteration linear position correction.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Clamp on per-iteration angular position correction.
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;

/// Clamp on per-step body translation.
pub const MAX_TRANSLATION: f32 = 2.0;

/// Clamp on per-step body rotation.
pub const MAX_ROTATION: f32 = 0.5 * PI;

/// Bias factor converting position error into velocity correction.
pub const BAUMGARTE: f32 = 0.2;

/// Bias factor used by the TOI sub-step position solver.
pub const TOI_BAUMGARTE: f32 = 0.75;

/// Maximum TOI events resolved per contact per step.
pub const MAX_SUB_STEPS: usize = 8;

/// Cap on the outer time-of-impact iteration.
pub const MAX_TOI_ITERATIONS: usize = 20;

/// Cap on the TOI root-finder iteration.
pub const MAX_TOI_ROOT_ITERATIONS: usize = 50;

/// Cap on GJK iterations per distance query.
pub const MAX_DISTANCE_ITERATIONS: usize = 20;

/// Reference-face length to vertex-radius ratio above which the corners
/// fallback emits a one-point face manifold instead of circles. Guards
/// against jitter when sliding across chain segments.
pub const MAX_CIRCLES_RATIO: f32 = 4.0;

/// Still time before a body is allowed to sleep.
pub const TIME_TO_SLEEP: f32 = 0.5;

/// A body cannot sleep while its linear speed exceeds this.
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// A body cannot sleep while its angular speed exceeds this.
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * PI;

/// Per-step configuration handed to [`crate::world::World::step`].
#[derive(Debug, Clone, Copy)]
pub struct StepConf {
    /// Time slice in seconds. Zero is a legal no-op step.
    pub dt: f32,
    /// Inverse of `dt`, zero when `dt` is zero.
    pub inv_dt: f32,
    /// `dt / previous dt`, used to scale warm-started impulses.
    pub dt_ratio: f32,
    /// Velocity iteration cap for the discrete solver.
    pub reg_velocity_iterations: usize,
    /// Position iteration cap for the discrete solver.
    pub reg_position_iterations: usize,
    /// Velocity iteration cap during TOI sub-steps.
    pub toi_velocity_iterations: usize,
    /// Position iteration cap during TOI sub-steps.
    pub toi_position_iterations: usize,
    /// Maximum TOI events resolved per contact per step.
    pub max_sub_steps: usize,
    pub linear_slop: f32,
    pub angular_slop: f32,
    /// Target penetration depth for the TOI root finder.
    pub target_depth: f32,
    /// Width of the TOI acceptance band around the target.
    pub tolerance: f32,
    /// Approach speeds below this are treated as inelastic.
    pub velocity_threshold: f32,
    pub max_linear_correction: f32,
    pub max_angular_correction: f32,
    pub max_translation: f32,
    pub max_rotation: f32,
    /// Fat-AABB margin for the broad phase.
    pub aabb_extension: f32,
    /// Early-exit separation threshold for the discrete position solver.
    pub reg_min_separation: f32,
    /// Early-exit separation threshold for the TOI position solver.
    pub toi_min_separation: f32,
    pub baumgarte: f32,
    pub toi_baumgarte: f32,
    /// Global sleep enable.
    pub allow_sleep: bool,
    /// When false, contact impulses start from zero every step.
    pub warm_starting: bool,
    /// When false, the 2x2 block normal solver is bypassed.
    pub block_solve: bool,
}

impl StepConf {
    pub fn new(dt: f32) -> Self {
        Self {
            dt,
            inv_dt: if dt != 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: 1.0,
            reg_velocity_iterations: 8,
            reg_position_iterations: 3,
            toi_velocity_iterations: 8,
            toi_position_iterations: 20,
            max_sub_steps: MAX_SUB_STEPS,
            linear_slop: LINEAR_SLOP,
            angular_slop: ANGULAR_SLOP,
            target_depth: 3.0 * LINEAR_SLOP,
            tolerance: LINEAR_SLOP / 4.0,
            velocity_threshold: VELOCITY_THRESHOLD,
            max_linear_correction: MAX_LINEAR_CORRECTION,
            max_angular_correction: MAX_ANGULAR_CORRECTION,
            max_translation: MAX_TRANSLATION,
            max_rotation: MAX_ROTATION,
            aabb_extension: AABB_EXTENSION,
            reg_min_separation: -3.0 * LINEAR_SLOP,
            toi_min_separation: -1.5 * LINEAR_SLOP,
            baumgarte: BAUMGARTE,
            toi_baumgarte: TOI_BAUMGARTE,
            allow_sleep: true,
            warm_starting: true,
            block_solve: true,
        }
    }

    /// Updates `dt`, `inv_dt` and `dt_ratio` for a new time slice.
    pub fn with_dt(mut self, dt: f32) -> Self {
        self.dt_ratio = if self.dt != 0.0 { dt / self.dt } else { 1.0 };
        self.dt = dt;
        self.inv_dt = if dt != 0.0 { 1.0 / dt } else { 0.0 };
        self
    }

    pub fn with_velocity_iterations(mut self, iterations: usize) -> Self {
        self.reg_velocity_iterations = iterations;
        self
    }

    pub fn with_position_iterations(mut self, iterations: usize) -> Self {
        self.reg_position_iterations = iterations;
        self
    }
}

impl Default for StepConf {
    fn default() -> Self {
        Self::new(1.0 / 60.0)
    }
}
