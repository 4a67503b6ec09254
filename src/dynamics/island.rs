//! Per-step solver island: a connected set of awake bodies with the
//! contacts and joints among them, packed into contiguous position and
//! velocity arrays for the constraint solver.

use glam::Vec2;

use crate::config::{
    ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, StepConf, TIME_TO_SLEEP,
};
use crate::core::body::{Body, BodyId, BodyType};
use crate::core::fixture::Fixture;
use crate::core::joints::{Joint, JointId, SolverContext};
use crate::core::types::{Position, Velocity};
use crate::dynamics::contact::{Contact, ContactId};
use crate::dynamics::solver::{ContactImpulse, ContactSolver};
use crate::utils::arena::Arena;

/// Result of solving one island.
pub(crate) struct IslandReport {
    pub post_solve: Vec<(ContactId, ContactImpulse)>,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub bodies_slept: usize,
}

pub(crate) struct Island {
    pub bodies: Vec<BodyId>,
    pub contacts: Vec<ContactId>,
    pub joints: Vec<JointId>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
}

impl Island {
    pub fn new() -> Self {
        Self {
            bodies: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            positions: Vec::new(),
            velocities: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
        self.positions.clear();
        self.velocities.clear();
    }

    /// Adds a body and assigns its slot in the solver arrays.
    pub fn add_body(&mut self, id: BodyId, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(id);
    }

    /// Discrete solve: integrate velocities, resolve constraints,
    /// integrate positions, correct overlap, then account for sleep.
    pub fn solve(
        &mut self,
        bodies: &mut Arena<Body>,
        contacts: &mut Arena<Contact>,
        joints: &mut Arena<Joint>,
        fixtures: &Arena<Fixture>,
        conf: &StepConf,
        gravity: Vec2,
    ) -> IslandReport {
        let h = conf.dt;

        self.positions.clear();
        self.velocities.clear();
        for &id in &self.bodies {
            let body = bodies.get_mut(id).expect("island body");
            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            // Stash the pre-solve position for the TOI machinery.
            body.sweep.c0 = c;
            body.sweep.a0 = a;

            if body.body_type == BodyType::Dynamic {
                v += h * (body.gravity_scale * gravity + body.inv_mass * body.force);
                w += h * body.inv_inertia * body.torque;

                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        let ctx = SolverContext {
            dt: h,
            inv_dt: conf.inv_dt,
            dt_ratio: conf.dt_ratio,
            warm_starting: conf.warm_starting,
            max_linear_correction: conf.max_linear_correction,
        };

        let mut contact_solver =
            ContactSolver::new(&self.contacts, contacts, fixtures, bodies, conf);
        contact_solver.initialize_velocity_constraints(
            contacts,
            &self.positions,
            &self.velocities,
            conf,
        );
        if conf.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        for &joint_id in &self.joints {
            let joint = joints.get_mut(joint_id).expect("island joint");
            joint.init_velocity_constraints(&ctx, bodies, &self.positions, &mut self.velocities);
        }

        // Tangent constraints first, then joints, then the normal
        // constraints, each iteration.
        for _ in 0..conf.reg_velocity_iterations {
            contact_solver.solve_tangent_constraints(&mut self.velocities);
            for &joint_id in &self.joints {
                let joint = joints.get_mut(joint_id).expect("island joint");
                joint.solve_velocity_constraints(&ctx, &mut self.velocities);
            }
            contact_solver.solve_normal_constraints(&mut self.velocities);
        }
        contact_solver.store_impulses(contacts);

        self.integrate_positions(h, conf);

        let mut position_iterations = 0;
        let mut position_solved = false;
        for _ in 0..conf.reg_position_iterations {
            position_iterations += 1;
            let min_separation =
                contact_solver.solve_position_constraints(&mut self.positions, conf);
            let contacts_ok = min_separation >= conf.reg_min_separation;

            let mut joints_ok = true;
            for &joint_id in &self.joints {
                let joint = joints.get_mut(joint_id).expect("island joint");
                joints_ok &= joint.solve_position_constraints(&ctx, &mut self.positions);
            }

            if contacts_ok && joints_ok {
                position_solved = true;
                break;
            }
        }

        self.write_back(bodies);

        let mut bodies_slept = 0;
        if conf.allow_sleep {
            let mut min_sleep_time = f32::MAX;
            let lin_tol_sqr = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
            let ang_tol_sqr = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

            for &id in &self.bodies {
                let body = bodies.get_mut(id).expect("island body");
                if body.body_type == BodyType::Static {
                    continue;
                }

                if !body.is_sleep_allowed()
                    || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                    || body.linear_velocity.length_squared() > lin_tol_sqr
                {
                    body.under_active_time = 0.0;
                    min_sleep_time = 0.0;
                } else {
                    body.under_active_time += h;
                    min_sleep_time = min_sleep_time.min(body.under_active_time);
                }
            }

            if min_sleep_time >= TIME_TO_SLEEP && position_solved {
                for &id in &self.bodies {
                    let body = bodies.get_mut(id).expect("island body");
                    if body.body_type != BodyType::Static && body.is_awake() {
                        body.set_awake(false);
                        bodies_slept += 1;
                    }
                }
            }
        }

        IslandReport {
            post_solve: contact_solver.impulses(),
            velocity_iterations: conf.reg_velocity_iterations,
            position_iterations,
            bodies_slept,
        }
    }

    /// TOI sub-step solve: position-correct the impact pair, then run a
    /// short velocity solve advancing the island over the remaining
    /// interval. No joints, no warm starting, no sleep accounting.
    pub fn solve_toi(
        &mut self,
        bodies: &mut Arena<Body>,
        contacts: &mut Arena<Contact>,
        fixtures: &Arena<Fixture>,
        sub_conf: &StepConf,
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> IslandReport {
        debug_assert!(toi_index_a < self.bodies.len());
        debug_assert!(toi_index_b < self.bodies.len());

        self.positions.clear();
        self.velocities.clear();
        for &id in &self.bodies {
            let body = bodies.get(id).expect("island body");
            self.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            self.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }

        let mut contact_solver =
            ContactSolver::new(&self.contacts, contacts, fixtures, bodies, sub_conf);

        // Pull the impact pair out of overlap before the velocity pass.
        let mut position_iterations = 0;
        for _ in 0..sub_conf.toi_position_iterations {
            position_iterations += 1;
            let min_separation = contact_solver.solve_toi_position_constraints(
                &mut self.positions,
                sub_conf,
                toi_index_a,
                toi_index_b,
            );
            if min_separation >= sub_conf.toi_min_separation {
                break;
            }
        }

        // The corrected poses become the sweep origin for the remainder
        // of the step.
        {
            let body_a = bodies.get_mut(self.bodies[toi_index_a]).expect("toi body A");
            body_a.sweep.c0 = self.positions[toi_index_a].c;
            body_a.sweep.a0 = self.positions[toi_index_a].a;
        }
        {
            let body_b = bodies.get_mut(self.bodies[toi_index_b]).expect("toi body B");
            body_b.sweep.c0 = self.positions[toi_index_b].c;
            body_b.sweep.a0 = self.positions[toi_index_b].a;
        }

        contact_solver.initialize_velocity_constraints(
            contacts,
            &self.positions,
            &self.velocities,
            sub_conf,
        );
        for _ in 0..sub_conf.toi_velocity_iterations {
            contact_solver.solve_tangent_constraints(&mut self.velocities);
            contact_solver.solve_normal_constraints(&mut self.velocities);
        }

        self.integrate_positions(sub_conf.dt, sub_conf);
        self.write_back(bodies);

        IslandReport {
            post_solve: contact_solver.impulses(),
            velocity_iterations: sub_conf.toi_velocity_iterations,
            position_iterations,
            bodies_slept: 0,
        }
    }

    fn integrate_positions(&mut self, h: f32, conf: &StepConf) {
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            let mut v = velocity.v;
            let mut w = velocity.w;

            let translation = h * v;
            if translation.length_squared() > conf.max_translation * conf.max_translation {
                v *= conf.max_translation / translation.length();
            }
            let rotation = h * w;
            if rotation * rotation > conf.max_rotation * conf.max_rotation {
                w *= conf.max_rotation / rotation.abs();
            }

            position.c += h * v;
            position.a += h * w;
            velocity.v = v;
            velocity.w = w;
        }
    }

    fn write_back(&self, bodies: &mut Arena<Body>) {
        for (i, &id) in self.bodies.iter().enumerate() {
            let body = bodies.get_mut(id).expect("island body");
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }
    }
}
