use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::core::fixture::{Fixture, FixtureId};
use crate::core::joints::JointId;
use crate::core::types::{Sweep, Transform};
use crate::dynamics::contact::ContactId;
use crate::utils::arena::{Arena, Handle};

pub type BodyId = Handle<Body>;

/// The three dynamic regimes a body can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Infinite mass, zero velocity, never integrated.
    Static,
    /// Infinite mass, velocity allowed, unaffected by forces.
    Kinematic,
    /// Finite mass, full dynamics.
    Dynamic,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BodyFlags: u8 {
        const ISLAND = 0x01;
        const AWAKE = 0x02;
        const AUTO_SLEEP = 0x04;
        /// Impenetrable: participates in the TOI sub-stepper.
        const BULLET = 0x08;
        const FIXED_ROTATION = 0x10;
        const ENABLED = 0x20;
    }
}

/// Description used to create a body.
#[derive(Debug, Clone)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    pub bullet: bool,
    pub enabled: bool,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
        }
    }
}

impl BodyDef {
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            ..Self::default()
        }
    }

    pub fn dynamic() -> Self {
        Self::new(BodyType::Dynamic)
    }

    pub fn at(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, omega: f32) -> Self {
        self.angular_velocity = omega;
        self
    }

    pub fn as_bullet(mut self) -> Self {
        self.bullet = true;
        self
    }

    pub fn with_fixed_rotation(mut self) -> Self {
        self.fixed_rotation = true;
        self
    }
}

/// A rigid body: transform, velocities, mass, and memberships in the
/// contact and joint graphs.
#[derive(Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) flags: BodyFlags,
    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,
    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,
    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,
    pub(crate) under_active_time: f32,
    pub(crate) fixtures: Vec<FixtureId>,
    pub(crate) joints: Vec<JointId>,
    pub(crate) contacts: Vec<ContactId>,
    /// Slot in the island arrays during a solve.
    pub(crate) island_index: usize,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let mut flags = BodyFlags::empty();
        if def.allow_sleep {
            flags |= BodyFlags::AUTO_SLEEP;
        }
        if def.awake {
            flags |= BodyFlags::AWAKE;
        }
        if def.fixed_rotation {
            flags |= BodyFlags::FIXED_ROTATION;
        }
        if def.bullet {
            flags |= BodyFlags::BULLET;
        }
        if def.enabled {
            flags |= BodyFlags::ENABLED;
        }

        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: def.position,
            a0: def.angle,
            c: def.position,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = match def.body_type {
            BodyType::Dynamic => (1.0, 1.0),
            _ => (0.0, 0.0),
        };

        Self {
            body_type: def.body_type,
            flags,
            xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            under_active_time: 0.0,
            fixtures: Vec::new(),
            joints: Vec::new(),
            contacts: Vec::new(),
            island_index: 0,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn transform(&self) -> Transform {
        self.xf
    }

    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.xf.apply(local)
    }

    pub fn local_point(&self, world: Vec2) -> Vec2 {
        self.xf.apply_inverse(world)
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Rotational inertia about the center of mass.
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    pub fn fixtures(&self) -> &[FixtureId] {
        &self.fixtures
    }

    pub fn is_awake(&self) -> bool {
        self.flags.contains(BodyFlags::AWAKE)
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(BodyFlags::ENABLED)
    }

    pub fn is_bullet(&self) -> bool {
        self.flags.contains(BodyFlags::BULLET)
    }

    pub fn is_sleep_allowed(&self) -> bool {
        self.flags.contains(BodyFlags::AUTO_SLEEP)
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.flags.contains(BodyFlags::FIXED_ROTATION)
    }

    pub fn under_active_time(&self) -> f32 {
        self.under_active_time
    }

    pub fn set_awake(&mut self, awake: bool) {
        if self.body_type == BodyType::Static {
            return;
        }
        if awake {
            self.flags |= BodyFlags::AWAKE;
            self.under_active_time = 0.0;
        } else {
            self.flags -= BodyFlags::AWAKE;
            self.under_active_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    /// Marks the body impenetrable: the TOI sub-stepper will keep it
    /// from tunneling through other bodies.
    pub fn set_bullet(&mut self, bullet: bool) {
        if bullet {
            self.flags |= BodyFlags::BULLET;
        } else {
            self.flags -= BodyFlags::BULLET;
        }
    }

    pub fn set_sleep_allowed(&mut self, allowed: bool) {
        if allowed {
            self.flags |= BodyFlags::AUTO_SLEEP;
        } else {
            self.flags -= BodyFlags::AUTO_SLEEP;
            self.set_awake(true);
        }
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if velocity.length_squared() > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = velocity;
    }

    pub fn set_angular_velocity(&mut self, omega: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if omega * omega > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = omega;
    }

    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += crate::utils::math::cross(point - self.sweep.c, force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.linear_velocity += self.inv_mass * impulse;
        self.angular_velocity +=
            self.inv_inertia * crate::utils::math::cross(point - self.sweep.c, impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.angular_velocity += self.inv_inertia * impulse;
    }

    /// Recomputes mass, center of mass, and inertia from the attached
    /// fixtures. Dynamic bodies get at least unit mass so they stay
    /// well-conditioned in the solver.
    pub(crate) fn reset_mass_data(&mut self, fixtures: &Arena<Fixture>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;

        if self.body_type != BodyType::Dynamic {
            self.sweep.local_center = Vec2::ZERO;
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2::ZERO;
        for fixture_id in &self.fixtures {
            let fixture = match fixtures.get(*fixture_id) {
                Some(fixture) => fixture,
                None => continue,
            };
            if fixture.density == 0.0 {
                continue;
            }
            let mass_data = fixture.shape.compute_mass(fixture.density);
            self.mass += mass_data.mass;
            local_center += mass_data.mass * mass_data.center;
            self.inertia += mass_data.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if self.inertia > 0.0 && !self.flags.contains(BodyFlags::FIXED_ROTATION) {
            // Shift from shape origin to the center of mass.
            self.inertia -= self.mass * local_center.length_squared();
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        // Preserve the world velocity of the new center of mass.
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        let new_center = self.xf.apply(local_center);
        self.sweep.c0 = new_center;
        self.sweep.c = new_center;
        self.linear_velocity +=
            crate::utils::math::cross_sv(self.angular_velocity, new_center - old_center);
    }

    /// Rebuilds the body transform from the end-of-step sweep position.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf = Transform::new(Vec2::ZERO, self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Advances the sweep origin to `alpha` and snaps the transform to it.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_bodies_expose_zero_inverse_mass() {
        let body = Body::new(&BodyDef::new(BodyType::Static));
        assert_eq!(body.inv_mass, 0.0);
        assert_eq!(body.inv_inertia, 0.0);
    }

    #[test]
    fn sleep_clears_velocities() {
        let mut body = Body::new(
            &BodyDef::dynamic()
                .with_linear_velocity(Vec2::new(3.0, 0.0))
                .with_angular_velocity(1.0),
        );
        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.angular_velocity(), 0.0);
    }

    #[test]
    fn impulses_wake_and_accelerate() {
        let mut body = Body::new(&BodyDef::dynamic());
        body.set_awake(false);
        body.apply_linear_impulse(Vec2::new(2.0, 0.0), body.world_center());
        assert!(body.is_awake());
        assert_eq!(body.linear_velocity(), Vec2::new(2.0, 0.0));
    }
}
