//! The closed set of joint constraints.
//!
//! The solver drives joints only through the three-behavior constraint
//! interface: `init_velocity_constraints`, `solve_velocity_constraints`,
//! and `solve_position_constraints`.

use glam::Vec2;

use crate::config::LINEAR_SLOP;
use crate::core::body::{Body, BodyId};
use crate::core::types::{Position, Rot, Velocity};
use crate::utils::arena::{Arena, Handle};
use crate::utils::math::{cross, cross_sv, solve22};

pub type JointId = Handle<Joint>;

/// Step data shared with joints during a solve.
#[derive(Debug, Clone, Copy)]
pub struct SolverContext {
    pub dt: f32,
    pub inv_dt: f32,
    pub dt_ratio: f32,
    pub warm_starting: bool,
    pub max_linear_correction: f32,
}

/// Description used to create a joint.
#[derive(Debug, Clone)]
pub enum JointDef {
    /// Pins a point of body A to a point of body B, leaving rotation free.
    Revolute {
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        collide_connected: bool,
    },
    /// Holds two anchor points at a fixed distance.
    Distance {
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        length: f32,
        collide_connected: bool,
    },
}

impl JointDef {
    pub fn bodies(&self) -> (BodyId, BodyId) {
        match self {
            JointDef::Revolute { body_a, body_b, .. }
            | JointDef::Distance { body_a, body_b, .. } => (*body_a, *body_b),
        }
    }
}

#[derive(Debug)]
pub struct Joint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,
    pub(crate) island_flag: bool,
    pub(crate) kind: JointKind,
}

#[derive(Debug)]
pub enum JointKind {
    Revolute(RevoluteJoint),
    Distance(DistanceJoint),
}

impl Joint {
    pub(crate) fn new(def: JointDef) -> Self {
        match def {
            JointDef::Revolute {
                body_a,
                body_b,
                local_anchor_a,
                local_anchor_b,
                collide_connected,
            } => Self {
                body_a,
                body_b,
                collide_connected,
                island_flag: false,
                kind: JointKind::Revolute(RevoluteJoint::new(local_anchor_a, local_anchor_b)),
            },
            JointDef::Distance {
                body_a,
                body_b,
                local_anchor_a,
                local_anchor_b,
                length,
                collide_connected,
            } => Self {
                body_a,
                body_b,
                collide_connected,
                island_flag: false,
                kind: JointKind::Distance(DistanceJoint::new(
                    local_anchor_a,
                    local_anchor_b,
                    length,
                )),
            },
        }
    }

    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    /// Reaction force on body B at the anchor, from the previous solve.
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        match &self.kind {
            JointKind::Revolute(joint) => joint.impulse * inv_dt,
            JointKind::Distance(joint) => joint.impulse * joint.u * inv_dt,
        }
    }

    /// Reaction torque on body B, from the previous solve.
    pub fn reaction_torque(&self, _inv_dt: f32) -> f32 {
        0.0
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        ctx: &SolverContext,
        bodies: &Arena<Body>,
        positions: &[Position],
        velocities: &mut [Velocity],
    ) {
        let anchor = JointAnchors::capture(self.body_a, self.body_b, bodies);
        match &mut self.kind {
            JointKind::Revolute(joint) => {
                joint.init_velocity_constraints(ctx, &anchor, positions, velocities)
            }
            JointKind::Distance(joint) => {
                joint.init_velocity_constraints(ctx, &anchor, positions, velocities)
            }
        }
    }

    pub(crate) fn solve_velocity_constraints(
        &mut self,
        _ctx: &SolverContext,
        velocities: &mut [Velocity],
    ) {
        match &mut self.kind {
            JointKind::Revolute(joint) => joint.solve_velocity_constraints(velocities),
            JointKind::Distance(joint) => joint.solve_velocity_constraints(velocities),
        }
    }

    /// Returns true when the position error is within tolerance.
    pub(crate) fn solve_position_constraints(
        &mut self,
        ctx: &SolverContext,
        positions: &mut [Position],
    ) -> bool {
        match &mut self.kind {
            JointKind::Revolute(joint) => joint.solve_position_constraints(ctx, positions),
            JointKind::Distance(joint) => joint.solve_position_constraints(ctx, positions),
        }
    }
}

/// Per-body data every joint needs, captured once per init.
#[derive(Debug, Clone, Copy)]
struct JointAnchors {
    index_a: usize,
    index_b: usize,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
}

impl JointAnchors {
    fn capture(body_a: BodyId, body_b: BodyId, bodies: &Arena<Body>) -> Self {
        let a = bodies.get(body_a).expect("joint body A");
        let b = bodies.get(body_b).expect("joint body B");
        Self {
            index_a: a.island_index,
            index_b: b.island_index,
            local_center_a: a.sweep.local_center,
            local_center_b: b.sweep.local_center,
            inv_mass_a: a.inv_mass,
            inv_mass_b: b.inv_mass,
            inv_i_a: a.inv_inertia,
            inv_i_b: b.inv_inertia,
        }
    }
}

#[derive(Debug)]
pub struct RevoluteJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    impulse: Vec2,
    // Cached between init and solve.
    anchors: Option<JointAnchors>,
    r_a: Vec2,
    r_b: Vec2,
    /// Effective-mass matrix columns.
    k1: Vec2,
    k2: Vec2,
}

impl RevoluteJoint {
    fn new(local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            impulse: Vec2::ZERO,
            anchors: None,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            k1: Vec2::ZERO,
            k2: Vec2::ZERO,
        }
    }

    fn init_velocity_constraints(
        &mut self,
        ctx: &SolverContext,
        anchors: &JointAnchors,
        positions: &[Position],
        velocities: &mut [Velocity],
    ) {
        self.anchors = Some(*anchors);

        let q_a = Rot::from_angle(positions[anchors.index_a].a);
        let q_b = Rot::from_angle(positions[anchors.index_b].a);
        self.r_a = q_a.apply(self.local_anchor_a - anchors.local_center_a);
        self.r_b = q_b.apply(self.local_anchor_b - anchors.local_center_b);

        let (m_a, m_b) = (anchors.inv_mass_a, anchors.inv_mass_b);
        let (i_a, i_b) = (anchors.inv_i_a, anchors.inv_i_b);

        self.k1 = Vec2::new(
            m_a + m_b + i_a * self.r_a.y * self.r_a.y + i_b * self.r_b.y * self.r_b.y,
            -i_a * self.r_a.x * self.r_a.y - i_b * self.r_b.x * self.r_b.y,
        );
        self.k2 = Vec2::new(
            self.k1.y,
            m_a + m_b + i_a * self.r_a.x * self.r_a.x + i_b * self.r_b.x * self.r_b.x,
        );

        if ctx.warm_starting {
            self.impulse *= ctx.dt_ratio;
            let p = self.impulse;
            velocities[anchors.index_a].v -= m_a * p;
            velocities[anchors.index_a].w -= i_a * cross(self.r_a, p);
            velocities[anchors.index_b].v += m_b * p;
            velocities[anchors.index_b].w += i_b * cross(self.r_b, p);
        } else {
            self.impulse = Vec2::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        let anchors = self.anchors.expect("init before solve");
        let (ia, ib) = (anchors.index_a, anchors.index_b);

        let cdot = velocities[ib].v + cross_sv(velocities[ib].w, self.r_b)
            - velocities[ia].v
            - cross_sv(velocities[ia].w, self.r_a);
        let impulse = solve22(self.k1, self.k2, -cdot);
        self.impulse += impulse;

        velocities[ia].v -= anchors.inv_mass_a * impulse;
        velocities[ia].w -= anchors.inv_i_a * cross(self.r_a, impulse);
        velocities[ib].v += anchors.inv_mass_b * impulse;
        velocities[ib].w += anchors.inv_i_b * cross(self.r_b, impulse);
    }

    fn solve_position_constraints(
        &mut self,
        _ctx: &SolverContext,
        positions: &mut [Position],
    ) -> bool {
        let anchors = self.anchors.expect("init before solve");
        let (ia, ib) = (anchors.index_a, anchors.index_b);

        let q_a = Rot::from_angle(positions[ia].a);
        let q_b = Rot::from_angle(positions[ib].a);
        let r_a = q_a.apply(self.local_anchor_a - anchors.local_center_a);
        let r_b = q_b.apply(self.local_anchor_b - anchors.local_center_b);

        let c = positions[ib].c + r_b - positions[ia].c - r_a;
        let position_error = c.length();

        let (m_a, m_b) = (anchors.inv_mass_a, anchors.inv_mass_b);
        let (i_a, i_b) = (anchors.inv_i_a, anchors.inv_i_b);

        let k1 = Vec2::new(
            m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
            -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
        );
        let k2 = Vec2::new(k1.y, m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x);

        let impulse = -solve22(k1, k2, c);

        positions[ia].c -= m_a * impulse;
        positions[ia].a -= i_a * cross(r_a, impulse);
        positions[ib].c += m_b * impulse;
        positions[ib].a += i_b * cross(r_b, impulse);

        position_error <= LINEAR_SLOP
    }
}

#[derive(Debug)]
pub struct DistanceJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length: f32,
    impulse: f32,
    anchors: Option<JointAnchors>,
    /// Unit axis from anchor A to anchor B in world space.
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    fn new(local_anchor_a: Vec2, local_anchor_b: Vec2, length: f32) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            length: length.max(LINEAR_SLOP),
            impulse: 0.0,
            anchors: None,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    fn init_velocity_constraints(
        &mut self,
        ctx: &SolverContext,
        anchors: &JointAnchors,
        positions: &[Position],
        velocities: &mut [Velocity],
    ) {
        self.anchors = Some(*anchors);

        let q_a = Rot::from_angle(positions[anchors.index_a].a);
        let q_b = Rot::from_angle(positions[anchors.index_b].a);
        self.r_a = q_a.apply(self.local_anchor_a - anchors.local_center_a);
        self.r_b = q_b.apply(self.local_anchor_b - anchors.local_center_b);
        self.u =
            positions[anchors.index_b].c + self.r_b - positions[anchors.index_a].c - self.r_a;

        let length = self.u.length();
        if length > LINEAR_SLOP {
            self.u /= length;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_a = cross(self.r_a, self.u);
        let cr_b = cross(self.r_b, self.u);
        let inv_mass = anchors.inv_mass_a
            + anchors.inv_i_a * cr_a * cr_a
            + anchors.inv_mass_b
            + anchors.inv_i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if ctx.warm_starting {
            self.impulse *= ctx.dt_ratio;
            let p = self.impulse * self.u;
            velocities[anchors.index_a].v -= anchors.inv_mass_a * p;
            velocities[anchors.index_a].w -= anchors.inv_i_a * cross(self.r_a, p);
            velocities[anchors.index_b].v += anchors.inv_mass_b * p;
            velocities[anchors.index_b].w += anchors.inv_i_b * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        let anchors = self.anchors.expect("init before solve");
        let (ia, ib) = (anchors.index_a, anchors.index_b);

        let vp_a = velocities[ia].v + cross_sv(velocities[ia].w, self.r_a);
        let vp_b = velocities[ib].v + cross_sv(velocities[ib].w, self.r_b);
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * cdot;
        self.impulse += impulse;

        let p = impulse * self.u;
        velocities[ia].v -= anchors.inv_mass_a * p;
        velocities[ia].w -= anchors.inv_i_a * cross(self.r_a, p);
        velocities[ib].v += anchors.inv_mass_b * p;
        velocities[ib].w += anchors.inv_i_b * cross(self.r_b, p);
    }

    fn solve_position_constraints(
        &mut self,
        ctx: &SolverContext,
        positions: &mut [Position],
    ) -> bool {
        let anchors = self.anchors.expect("init before solve");
        let (ia, ib) = (anchors.index_a, anchors.index_b);

        let q_a = Rot::from_angle(positions[ia].a);
        let q_b = Rot::from_angle(positions[ib].a);
        let r_a = q_a.apply(self.local_anchor_a - anchors.local_center_a);
        let r_b = q_b.apply(self.local_anchor_b - anchors.local_center_b);

        let mut u = positions[ib].c + r_b - positions[ia].c - r_a;
        let length = u.length();
        if length > LINEAR_SLOP {
            u /= length;
        }
        let c = (length - self.length).clamp(
            -ctx.max_linear_correction,
            ctx.max_linear_correction,
        );

        let impulse = -self.mass * c;
        let p = impulse * u;

        positions[ia].c -= anchors.inv_mass_a * p;
        positions[ia].a -= anchors.inv_i_a * cross(r_a, p);
        positions[ib].c += anchors.inv_mass_b * p;
        positions[ib].a += anchors.inv_i_b * cross(r_b, p);

        (length - self.length).abs() < LINEAR_SLOP
    }
}
