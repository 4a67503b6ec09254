pub mod aabb;
pub mod broadphase;
pub mod distance;
pub mod manifold;
pub mod toi;

use glam::Vec2;

/// Input for segment casts against shapes, proxies, and the tree.
#[derive(Debug, Clone, Copy)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    /// The cast covers `p1 + t * (p2 - p1)` for `t` in [0, max_fraction].
    pub max_fraction: f32,
}

/// Hit data produced by a successful shape cast.
#[derive(Debug, Clone, Copy)]
pub struct RayCastHit {
    /// Outward surface normal at the hit point.
    pub normal: Vec2,
    pub fraction: f32,
}
