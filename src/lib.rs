//! impulse2d – an iterative, impulse-based 2D rigid body engine.
//!
//! The crate is organized around the per-step pipeline: a dynamic-AABB-tree
//! broad phase feeds a proxy-based narrow phase, touching contacts and
//! joints are grouped into islands and solved with warm-started sequential
//! impulses, bullets get a time-of-impact sub-stepping pass, and idle
//! islands are put to sleep.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::Vec2;

pub use collision::aabb::Aabb;
pub use collision::broadphase::{BroadPhase, DynamicTree};
pub use collision::distance::{distance, DistanceInput, DistanceOutput, SimplexCache};
pub use collision::manifold::{ContactFeature, Manifold, ManifoldPoint, ManifoldType, WorldManifold};
pub use collision::toi::{time_of_impact, ToiConf, ToiInput, ToiOutput, ToiState};
pub use collision::{RayCastHit, RayCastInput};
pub use config::StepConf;
pub use core::body::{Body, BodyDef, BodyId, BodyType};
pub use core::fixture::{Filter, Fixture, FixtureDef, FixtureId};
pub use core::joints::{Joint, JointDef, JointId};
pub use core::shapes::{DistanceProxy, Shape};
pub use core::types::{MassData, Position, Rot, Sweep, Transform, Velocity};
pub use dynamics::contact::{Contact, ContactId};
pub use dynamics::solver::ContactImpulse;
pub use error::WorldError;
pub use world::{
    ContactFilter, ContactListener, DestructionListener, RayCastBehavior, StepStats, World,
};
