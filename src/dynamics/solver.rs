//! Sequential-impulse contact solver.
//!
//! Velocity constraints remove approaching normal velocity under Coulomb
//! friction, warm-started from the impulses persisted in the contact
//! manifolds. Position constraints remove residual overlap with a
//! Baumgarte-biased Gauss-Seidel pass over the island.

use arrayvec::ArrayVec;
use glam::Vec2;

use crate::collision::manifold::{ManifoldType, WorldManifold};
use crate::config::{MAX_MANIFOLD_POINTS, StepConf};
use crate::core::body::Body;
use crate::core::fixture::Fixture;
use crate::core::types::{Position, Rot, Transform, Velocity};
use crate::dynamics::contact::{Contact, ContactId};
use crate::utils::arena::Arena;
use crate::utils::math::{cross, cross_sv};

/// Ill-conditioning bound for the 2x2 block solver; above it the second
/// point is dropped rather than amplifying error.
const MAX_CONDITION_NUMBER: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug)]
struct VelocityConstraint {
    points: ArrayVec<VelocityConstraintPoint, MAX_MANIFOLD_POINTS>,
    normal: Vec2,
    /// Effective-mass matrix and its inverse for the two-point block
    /// solve, stored as column vectors.
    k: [Vec2; 2],
    normal_mass_matrix: [Vec2; 2],
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    contact: ContactId,
}

#[derive(Debug)]
struct PositionConstraint {
    local_points: ArrayVec<Vec2, MAX_MANIFOLD_POINTS>,
    local_normal: Vec2,
    local_point: Vec2,
    kind: ManifoldType,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    radius_a: f32,
    radius_b: f32,
}

/// Accumulated impulses for one contact, reported to post-solve.
#[derive(Debug, Clone, Copy)]
pub struct ContactImpulse {
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

pub(crate) struct ContactSolver {
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
}

fn body_transform(position: &Position, local_center: Vec2) -> Transform {
    let q = Rot::from_angle(position.a);
    Transform {
        p: position.c - q.apply(local_center),
        q,
    }
}

impl ContactSolver {
    pub(crate) fn new(
        contact_ids: &[ContactId],
        contacts: &Arena<Contact>,
        fixtures: &Arena<Fixture>,
        bodies: &Arena<Body>,
        conf: &StepConf,
    ) -> Self {
        let mut velocity_constraints = Vec::with_capacity(contact_ids.len());
        let mut position_constraints = Vec::with_capacity(contact_ids.len());

        for &contact_id in contact_ids {
            let contact = contacts.get(contact_id).expect("island contact");
            let fixture_a = fixtures.get(contact.fixture_a).expect("fixture A");
            let fixture_b = fixtures.get(contact.fixture_b).expect("fixture B");
            let body_a = bodies.get(contact.body_a).expect("body A");
            let body_b = bodies.get(contact.body_b).expect("body B");
            let radius_a = fixture_a.shape.vertex_radius(contact.child_a);
            let radius_b = fixture_b.shape.vertex_radius(contact.child_b);
            let manifold = &contact.manifold;
            debug_assert!(manifold.point_count() > 0);

            let mut vc = VelocityConstraint {
                points: ArrayVec::new(),
                normal: Vec2::ZERO,
                k: [Vec2::ZERO; 2],
                normal_mass_matrix: [Vec2::ZERO; 2],
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                contact: contact_id,
            };
            for point in &manifold.points {
                let scale = if conf.warm_starting { conf.dt_ratio } else { 0.0 };
                vc.points.push(VelocityConstraintPoint {
                    normal_impulse: scale * point.normal_impulse,
                    tangent_impulse: scale * point.tangent_impulse,
                    ..VelocityConstraintPoint::default()
                });
            }
            velocity_constraints.push(vc);

            position_constraints.push(PositionConstraint {
                local_points: manifold.points.iter().map(|p| p.local_point).collect(),
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                kind: manifold.kind,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                radius_a,
                radius_b,
            });
        }

        Self {
            velocity_constraints,
            position_constraints,
        }
    }

    /// Builds world-space constraint data from the current positions.
    pub(crate) fn initialize_velocity_constraints(
        &mut self,
        contacts: &Arena<Contact>,
        positions: &[Position],
        velocities: &[Velocity],
        conf: &StepConf,
    ) {
        for (vc, pc) in self
            .velocity_constraints
            .iter_mut()
            .zip(self.position_constraints.iter())
        {
            let manifold = &contacts.get(vc.contact).expect("island contact").manifold;

            let xf_a = body_transform(&positions[vc.index_a], pc.local_center_a);
            let xf_b = body_transform(&positions[vc.index_b], pc.local_center_b);
            let world_manifold =
                WorldManifold::new(manifold, xf_a, pc.radius_a, xf_b, pc.radius_b);

            vc.normal = world_manifold.normal;
            let tangent = Vec2::new(vc.normal.y, -vc.normal.x);

            let c_a = positions[vc.index_a].c;
            let c_b = positions[vc.index_b].c;
            let v_a = velocities[vc.index_a];
            let v_b = velocities[vc.index_b];

            for (j, point) in vc.points.iter_mut().enumerate() {
                point.r_a = world_manifold.points[j] - c_a;
                point.r_b = world_manifold.points[j] - c_b;

                let rn_a = cross(point.r_a, vc.normal);
                let rn_b = cross(point.r_b, vc.normal);
                let k_normal = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn_a * rn_a
                    + vc.inv_i_b * rn_b * rn_b;
                point.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cross(point.r_a, tangent);
                let rt_b = cross(point.r_b, tangent);
                let k_tangent = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rt_a * rt_a
                    + vc.inv_i_b * rt_b * rt_b;
                point.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution bias from the approach speed at init time.
                point.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    v_b.v + cross_sv(v_b.w, point.r_b) - v_a.v - cross_sv(v_a.w, point.r_a),
                );
                if v_rel < -conf.velocity_threshold {
                    point.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // Precompute the 2x2 block matrix, dropping to one point when
            // ill-conditioned.
            if vc.points.len() == 2 && conf.block_solve {
                let rn1_a = cross(vc.points[0].r_a, vc.normal);
                let rn1_b = cross(vc.points[0].r_b, vc.normal);
                let rn2_a = cross(vc.points[1].r_a, vc.normal);
                let rn2_b = cross(vc.points[1].r_b, vc.normal);

                let k11 = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn1_a * rn1_a
                    + vc.inv_i_b * rn1_b * rn1_b;
                let k22 = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn2_a * rn2_a
                    + vc.inv_i_b * rn2_b * rn2_b;
                let k12 = vc.inv_mass_a
                    + vc.inv_mass_b
                    + vc.inv_i_a * rn1_a * rn2_a
                    + vc.inv_i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = [Vec2::new(k11, k12), Vec2::new(k12, k22)];
                    let det = k11 * k22 - k12 * k12;
                    let inv_det = if det != 0.0 { 1.0 / det } else { 0.0 };
                    vc.normal_mass_matrix = [
                        Vec2::new(inv_det * k22, -inv_det * k12),
                        Vec2::new(-inv_det * k12, inv_det * k11),
                    ];
                } else {
                    vc.points.truncate(1);
                }
            }
        }
    }

    /// Applies the persisted impulses so the velocity iterations start
    /// from last step's solution.
    pub(crate) fn warm_start(&mut self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let tangent = Vec2::new(vc.normal.y, -vc.normal.x);
            for point in &vc.points {
                let impulse = point.normal_impulse * vc.normal + point.tangent_impulse * tangent;
                velocities[vc.index_a].v -= vc.inv_mass_a * impulse;
                velocities[vc.index_a].w -= vc.inv_i_a * cross(point.r_a, impulse);
                velocities[vc.index_b].v += vc.inv_mass_b * impulse;
                velocities[vc.index_b].w += vc.inv_i_b * cross(point.r_b, impulse);
            }
        }
    }

    /// One Coulomb friction pass over every contact point.
    pub(crate) fn solve_tangent_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let mut v_a = velocities[vc.index_a];
            let mut v_b = velocities[vc.index_b];
            let tangent = Vec2::new(vc.normal.y, -vc.normal.x);

            for point in &mut vc.points {
                let dv = v_b.v + cross_sv(v_b.w, point.r_b) - v_a.v - cross_sv(v_a.w, point.r_a);
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = point.tangent_mass * (-vt);

                // Clamp within the friction cone.
                let max_friction = vc.friction * point.normal_impulse;
                let new_impulse =
                    (point.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - point.tangent_impulse;
                point.tangent_impulse = new_impulse;

                let impulse = lambda * tangent;
                v_a.v -= vc.inv_mass_a * impulse;
                v_a.w -= vc.inv_i_a * cross(point.r_a, impulse);
                v_b.v += vc.inv_mass_b * impulse;
                v_b.w += vc.inv_i_b * cross(point.r_b, impulse);
            }

            velocities[vc.index_a] = v_a;
            velocities[vc.index_b] = v_b;
        }
    }

    /// One non-penetration pass; two-point manifolds use the block
    /// solver unless it was dropped at init.
    pub(crate) fn solve_normal_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let mut v_a = velocities[vc.index_a];
            let mut v_b = velocities[vc.index_b];

            if vc.points.len() == 1 || vc.k[0] == Vec2::ZERO {
                for point in &mut vc.points {
                    let dv =
                        v_b.v + cross_sv(v_b.w, point.r_b) - v_a.v - cross_sv(v_a.w, point.r_a);
                    let vn = dv.dot(vc.normal);
                    let lambda = -point.normal_mass * (vn - point.velocity_bias);

                    // Accumulated impulse stays non-negative.
                    let new_impulse = (point.normal_impulse + lambda).max(0.0);
                    let lambda = new_impulse - point.normal_impulse;
                    point.normal_impulse = new_impulse;

                    let impulse = lambda * vc.normal;
                    v_a.v -= vc.inv_mass_a * impulse;
                    v_a.w -= vc.inv_i_a * cross(point.r_a, impulse);
                    v_b.v += vc.inv_mass_b * impulse;
                    v_b.w += vc.inv_i_b * cross(point.r_b, impulse);
                }
            } else {
                Self::solve_normal_block(vc, &mut v_a, &mut v_b);
            }

            velocities[vc.index_a] = v_a;
            velocities[vc.index_b] = v_b;
        }
    }

    /// Two-point LCP solved by case enumeration.
    ///
    /// The complementarity problem is `vn = K x + b, x >= 0, vn >= 0,
    /// x . vn = 0`; with two points there are exactly four support sets
    /// and the first feasible one wins.
    fn solve_normal_block(vc: &mut VelocityConstraint, v_a: &mut Velocity, v_b: &mut Velocity) {
        let (p1, p2) = (vc.points[0], vc.points[1]);
        let a = Vec2::new(p1.normal_impulse, p2.normal_impulse);
        debug_assert!(a.x >= 0.0 && a.y >= 0.0);

        let dv1 = v_b.v + cross_sv(v_b.w, p1.r_b) - v_a.v - cross_sv(v_a.w, p1.r_a);
        let dv2 = v_b.v + cross_sv(v_b.w, p2.r_b) - v_a.v - cross_sv(v_a.w, p2.r_a);
        let vn1 = dv1.dot(vc.normal);
        let vn2 = dv2.dot(vc.normal);

        let mut b = Vec2::new(vn1 - p1.velocity_bias, vn2 - p2.velocity_bias);
        // Remove the contribution of the current accumulated impulses.
        b -= vc.k[0] * a.x + vc.k[1] * a.y;

        let apply = |vc: &VelocityConstraint,
                     v_a: &mut Velocity,
                     v_b: &mut Velocity,
                     x: Vec2,
                     a: Vec2| {
            let d = x - a;
            let impulse1 = d.x * vc.normal;
            let impulse2 = d.y * vc.normal;
            v_a.v -= vc.inv_mass_a * (impulse1 + impulse2);
            v_a.w -= vc.inv_i_a
                * (cross(vc.points[0].r_a, impulse1) + cross(vc.points[1].r_a, impulse2));
            v_b.v += vc.inv_mass_b * (impulse1 + impulse2);
            v_b.w += vc.inv_i_b
                * (cross(vc.points[0].r_b, impulse1) + cross(vc.points[1].r_b, impulse2));
        };

        // Case 1: both points active. x = -K^-1 b.
        let x = -(vc.normal_mass_matrix[0] * b.x + vc.normal_mass_matrix[1] * b.y);
        if x.x >= 0.0 && x.y >= 0.0 {
            apply(vc, v_a, v_b, x, a);
            vc.points[0].normal_impulse = x.x;
            vc.points[1].normal_impulse = x.y;
            return;
        }

        // Case 2: point 1 active, point 2 separating.
        let x = Vec2::new(-p1.normal_mass * b.x, 0.0);
        let vn2 = vc.k[0].y * x.x + b.y;
        if x.x >= 0.0 && vn2 >= 0.0 {
            apply(vc, v_a, v_b, x, a);
            vc.points[0].normal_impulse = x.x;
            vc.points[1].normal_impulse = 0.0;
            return;
        }

        // Case 3: point 2 active, point 1 separating.
        let x = Vec2::new(0.0, -p2.normal_mass * b.y);
        let vn1 = vc.k[1].x * x.y + b.x;
        if x.y >= 0.0 && vn1 >= 0.0 {
            apply(vc, v_a, v_b, x, a);
            vc.points[0].normal_impulse = 0.0;
            vc.points[1].normal_impulse = x.y;
            return;
        }

        // Case 4: both separating.
        if b.x >= 0.0 && b.y >= 0.0 {
            apply(vc, v_a, v_b, Vec2::ZERO, a);
            vc.points[0].normal_impulse = 0.0;
            vc.points[1].normal_impulse = 0.0;
        }
    }

    /// Publishes accumulated impulses back into the contact manifolds
    /// for warm starting the next step.
    pub(crate) fn store_impulses(&self, contacts: &mut Arena<Contact>) {
        for vc in &self.velocity_constraints {
            let contact = contacts.get_mut(vc.contact).expect("island contact");
            for (point, manifold_point) in
                vc.points.iter().zip(contact.manifold.points.iter_mut())
            {
                manifold_point.normal_impulse = point.normal_impulse;
                manifold_point.tangent_impulse = point.tangent_impulse;
            }
        }
    }

    /// Impulse report for post-solve callbacks.
    pub(crate) fn impulses(&self) -> Vec<(ContactId, ContactImpulse)> {
        self.velocity_constraints
            .iter()
            .map(|vc| {
                let mut impulse = ContactImpulse {
                    normal_impulses: [0.0; MAX_MANIFOLD_POINTS],
                    tangent_impulses: [0.0; MAX_MANIFOLD_POINTS],
                    count: vc.points.len(),
                };
                for (j, point) in vc.points.iter().enumerate() {
                    impulse.normal_impulses[j] = point.normal_impulse;
                    impulse.tangent_impulses[j] = point.tangent_impulse;
                }
                (vc.contact, impulse)
            })
            .collect()
    }

    /// One Gauss-Seidel pass over all position constraints. Returns the
    /// minimum separation found, for the early-exit test.
    pub(crate) fn solve_position_constraints(
        &self,
        positions: &mut [Position],
        conf: &StepConf,
    ) -> f32 {
        self.solve_position_pass(positions, conf.baumgarte, conf, None)
    }

    /// TOI variant: only the two sub-step seeds move; everything else in
    /// the impact island acts as infinite mass.
    pub(crate) fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        conf: &StepConf,
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> f32 {
        self.solve_position_pass(
            positions,
            conf.toi_baumgarte,
            conf,
            Some((toi_index_a, toi_index_b)),
        )
    }

    fn solve_position_pass(
        &self,
        positions: &mut [Position],
        baumgarte: f32,
        conf: &StepConf,
        toi_bodies: Option<(usize, usize)>,
    ) -> f32 {
        let mut min_separation = 0.0_f32;

        for pc in &self.position_constraints {
            let (mut inv_mass_a, mut inv_i_a) = (pc.inv_mass_a, pc.inv_i_a);
            let (mut inv_mass_b, mut inv_i_b) = (pc.inv_mass_b, pc.inv_i_b);
            if let Some((toi_a, toi_b)) = toi_bodies {
                if pc.index_a != toi_a && pc.index_a != toi_b {
                    inv_mass_a = 0.0;
                    inv_i_a = 0.0;
                }
                if pc.index_b != toi_a && pc.index_b != toi_b {
                    inv_mass_b = 0.0;
                    inv_i_b = 0.0;
                }
            }

            for j in 0..pc.local_points.len() {
                let xf_a = body_transform(&positions[pc.index_a], pc.local_center_a);
                let xf_b = body_transform(&positions[pc.index_b], pc.local_center_b);

                let (normal, point, separation) = position_solver_manifold(pc, xf_a, xf_b, j);
                let r_a = point - positions[pc.index_a].c;
                let r_b = point - positions[pc.index_b].c;

                min_separation = min_separation.min(separation);

                let correction = (baumgarte * (separation + conf.linear_slop))
                    .clamp(-conf.max_linear_correction, 0.0);

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = inv_mass_a + inv_mass_b + inv_i_a * rn_a * rn_a + inv_i_b * rn_b * rn_b;

                let impulse = if k > 0.0 { -correction / k } else { 0.0 };
                let p = impulse * normal;

                positions[pc.index_a].c -= inv_mass_a * p;
                positions[pc.index_a].a -= inv_i_a * cross(r_a, p);
                positions[pc.index_b].c += inv_mass_b * p;
                positions[pc.index_b].a += inv_i_b * cross(r_b, p);
            }
        }

        min_separation
    }
}

/// World-space normal, point, and signed separation of one manifold
/// point under trial positions.
fn position_solver_manifold(
    pc: &PositionConstraint,
    xf_a: Transform,
    xf_b: Transform,
    index: usize,
) -> (Vec2, Vec2, f32) {
    debug_assert!(!pc.local_points.is_empty());

    match pc.kind {
        ManifoldType::Circles => {
            let point_a = xf_a.apply(pc.local_point);
            let point_b = xf_b.apply(pc.local_points[0]);
            let normal = (point_b - point_a).normalize_or_zero();
            let point = 0.5 * (point_a + point_b);
            let separation = (point_b - point_a).length() - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.q.apply(pc.local_normal);
            let plane_point = xf_a.apply(pc.local_point);
            let clip_point = xf_b.apply(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.q.apply(pc.local_normal);
            let plane_point = xf_b.apply(pc.local_point);
            let clip_point = xf_a.apply(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Report the normal from A to B.
            (-normal, clip_point, separation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The solver's end-to-end behavior is covered by the world-level
    // integration tests; here we pin the block-solver conditioning rule.
    #[test]
    fn condition_number_bound_drops_degenerate_blocks() {
        // A second point at the same location makes K singular:
        // k11 * k22 - k12^2 == 0, so the inequality must fail.
        let k11 = 2.0_f32;
        let k22 = 2.0_f32;
        let k12 = 2.0_f32;
        assert!(k11 * k11 >= MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12));

        // Distinct points keep the block.
        let k12 = 0.5_f32;
        assert!(k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12));
    }
}
