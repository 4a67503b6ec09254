use bitflags::bitflags;

use crate::collision::manifold::{collide, Manifold};
use crate::core::body::BodyId;
use crate::core::fixture::FixtureId;
use crate::core::shapes::DistanceProxy;
use crate::core::types::Transform;
use crate::utils::arena::Handle;

pub type ContactId = Handle<Contact>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ContactFlags: u8 {
        /// Visited by the current island traversal.
        const ISLAND = 0x01;
        /// The manifold has at least one point (or sensors overlap).
        const TOUCHING = 0x02;
        /// Solver participation; cleared by pre-solve or TOI failure.
        const ENABLED = 0x04;
        /// The user filter must be re-evaluated before the next update.
        const FILTER = 0x08;
        /// The cached `toi` value is valid for this step.
        const TOI = 0x10;
    }
}

/// Friction mixing: geometric mean, so either surface can kill sliding.
#[inline]
pub fn mix_friction(friction_a: f32, friction_b: f32) -> f32 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing: the bouncier surface wins.
#[inline]
pub fn mix_restitution(restitution_a: f32, restitution_b: f32) -> f32 {
    restitution_a.max(restitution_b)
}

/// Edge in the contact graph between two fixture children.
///
/// Carries the cached manifold with accumulated impulses (keyed by
/// contact feature for warm starting), the per-contact surface
/// parameters, and the TOI bookkeeping used by the sub-stepper.
#[derive(Debug)]
pub struct Contact {
    pub(crate) flags: ContactFlags,
    pub(crate) fixture_a: FixtureId,
    pub(crate) fixture_b: FixtureId,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) manifold: Manifold,
    pub(crate) toi_count: usize,
    pub(crate) toi: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,
}

impl Contact {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        fixture_a: FixtureId,
        child_a: usize,
        body_a: BodyId,
        fixture_b: FixtureId,
        child_b: usize,
        body_b: BodyId,
        friction: f32,
        restitution: f32,
    ) -> Self {
        Self {
            flags: ContactFlags::ENABLED,
            fixture_a,
            fixture_b,
            child_a,
            child_b,
            body_a,
            body_b,
            manifold: Manifold::empty(),
            toi_count: 0,
            toi: 1.0,
            friction,
            restitution,
            tangent_speed: 0.0,
        }
    }

    pub fn fixture_a(&self) -> FixtureId {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureId {
        self.fixture_b
    }

    pub fn child_a(&self) -> usize {
        self.child_a
    }

    pub fn child_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING)
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ContactFlags::ENABLED)
    }

    /// Disables the contact for the rest of the step. Pre-solve
    /// callbacks use this to ignore individual collisions.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.flags |= ContactFlags::ENABLED;
        } else {
            self.flags -= ContactFlags::ENABLED;
        }
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Overrides the mixed friction for this contact.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    /// Conveyor-belt style surface speed along the tangent.
    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    pub fn set_tangent_speed(&mut self, speed: f32) {
        self.tangent_speed = speed;
    }

    pub(crate) fn flag_for_filtering(&mut self) {
        self.flags |= ContactFlags::FILTER;
    }

    /// Recomputes the manifold, carrying impulses forward for points
    /// whose contact feature survived. Returns the touching transition
    /// and the previous manifold for pre-solve reporting.
    pub(crate) fn update_manifold(
        &mut self,
        proxy_a: &DistanceProxy,
        xf_a: Transform,
        proxy_b: &DistanceProxy,
        xf_b: Transform,
    ) -> (bool, bool, Manifold) {
        let was_touching = self.flags.contains(ContactFlags::TOUCHING);

        let old_manifold = std::mem::replace(
            &mut self.manifold,
            collide(proxy_a, xf_a, proxy_b, xf_b),
        );

        for point in &mut self.manifold.points {
            for old_point in &old_manifold.points {
                if old_point.feature == point.feature {
                    point.normal_impulse = old_point.normal_impulse;
                    point.tangent_impulse = old_point.tangent_impulse;
                    break;
                }
            }
        }

        let touching = self.manifold.point_count() > 0;
        if touching {
            self.flags |= ContactFlags::TOUCHING;
        } else {
            self.flags -= ContactFlags::TOUCHING;
        }
        (was_touching, touching, old_manifold)
    }

    /// Marks the sensor overlap state without producing manifold points.
    pub(crate) fn update_sensor(&mut self, overlapping: bool) -> (bool, bool) {
        let was_touching = self.flags.contains(ContactFlags::TOUCHING);
        self.manifold.points.clear();
        if overlapping {
            self.flags |= ContactFlags::TOUCHING;
        } else {
            self.flags -= ContactFlags::TOUCHING;
        }
        (was_touching, overlapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shapes::Shape;
    use glam::Vec2;

    #[test]
    fn mixing_rules() {
        assert_eq!(mix_friction(0.0, 0.9), 0.0);
        assert!((mix_friction(0.4, 0.4) - 0.4).abs() < 1e-6);
        assert_eq!(mix_restitution(0.2, 0.8), 0.8);
    }

    #[test]
    fn impulses_persist_across_updates_with_same_feature() {
        let mut contact = Contact::new(
            FixtureId::default(),
            0,
            BodyId::default(),
            FixtureId::default(),
            0,
            BodyId::default(),
            0.3,
            0.0,
        );
        let a = Shape::box_shape(1.0, 1.0);
        let b = Shape::box_shape(1.0, 1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(0.0, 1.99), 0.0);

        let (_, touching, _) = contact.update_manifold(&a.proxy(0), xf_a, &b.proxy(0), xf_b);
        assert!(touching);

        for point in &mut contact.manifold.points {
            point.normal_impulse = 1.5;
        }

        // A tiny shift keeps the same features; impulses carry over.
        let xf_b2 = Transform::new(Vec2::new(0.0005, 1.99), 0.0);
        contact.update_manifold(&a.proxy(0), xf_a, &b.proxy(0), xf_b2);
        for point in &contact.manifold.points {
            assert_eq!(point.normal_impulse, 1.5);
        }
    }

    #[test]
    fn separation_clears_touching() {
        let mut contact = Contact::new(
            FixtureId::default(),
            0,
            BodyId::default(),
            FixtureId::default(),
            0,
            BodyId::default(),
            0.3,
            0.0,
        );
        let a = Shape::circle(1.0);
        let b = Shape::circle(1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);

        let (_, touching, _) = contact.update_manifold(
            &a.proxy(0),
            xf_a,
            &b.proxy(0),
            Transform::new(Vec2::new(1.5, 0.0), 0.0),
        );
        assert!(touching);

        let (was, now, _) = contact.update_manifold(
            &a.proxy(0),
            xf_a,
            &b.proxy(0),
            Transform::new(Vec2::new(5.0, 0.0), 0.0),
        );
        assert!(was);
        assert!(!now);
    }
}
