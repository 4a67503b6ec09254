//! The root simulation container and its step driver.

use glam::Vec2;
use log::{debug, warn};

use crate::collision::aabb::Aabb;
use crate::collision::broadphase::BroadPhase;
use crate::collision::manifold::Manifold;
use crate::collision::toi::{time_of_impact, ToiConf, ToiInput, ToiState};
use crate::collision::RayCastInput;
use crate::config::{StepConf, MAX_BODIES, MAX_FIXTURES, MAX_JOINTS, MAX_TOI_ITERATIONS, MAX_TOI_ROOT_ITERATIONS};
use crate::core::body::{Body, BodyDef, BodyFlags, BodyId, BodyType};
use crate::core::fixture::{Fixture, FixtureDef, FixtureId};
use crate::core::joints::{Joint, JointDef, JointId};
use crate::core::types::{Rot, Transform};
use crate::dynamics::contact::{Contact, ContactFlags, ContactId};
use crate::dynamics::island::Island;
use crate::dynamics::solver::ContactImpulse;
use crate::error::WorldError;
use crate::utils::arena::Arena;
use crate::utils::logging::StepTimings;

pub(crate) mod contact_manager;

use contact_manager::{ContactManager, ProxyData};

/// Maximum contacts pulled into one TOI impact island.
const MAX_TOI_CONTACTS: usize = 32;

/// Synchronous contact event sink.
///
/// Callbacks run inside `step`; the world is locked, so they may read
/// state and tweak the passed contact but cannot create or destroy
/// entities.
#[allow(unused_variables)]
pub trait ContactListener {
    fn begin_contact(&mut self, contact_id: ContactId, contact: &mut Contact) {}
    fn end_contact(&mut self, contact_id: ContactId, contact: &mut Contact) {}
    fn pre_solve(&mut self, contact_id: ContactId, contact: &mut Contact, old_manifold: &Manifold) {}
    fn post_solve(&mut self, contact_id: ContactId, contact: &Contact, impulse: &ContactImpulse) {}
}

/// User hook vetoing collisions beyond the built-in filter rules.
pub trait ContactFilter {
    fn should_collide(&mut self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool;
}

/// Notified when entities die implicitly (e.g. joints and fixtures of a
/// destroyed body). Events raised while the world is locked are queued
/// and fired in FIFO order when the step ends.
#[allow(unused_variables)]
pub trait DestructionListener {
    fn fixture_destroyed(&mut self, fixture: FixtureId) {}
    fn joint_destroyed(&mut self, joint: JointId) {}
}

/// Visitor verdict for world ray casts.
#[derive(Debug, Clone, Copy)]
pub enum RayCastBehavior {
    /// Stop visiting fixtures.
    Terminate,
    /// Ignore this hit and restore the full search segment.
    ResetRay,
    /// Replace the search bound with the given fraction.
    ContinueRay(f32),
    /// Clip the search segment to the given fraction.
    ClipRay(f32),
}

#[derive(Debug)]
enum DestructionEvent {
    Fixture(FixtureId),
    Joint(JointId),
}

/// Aggregate counters reported by one `step`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepStats {
    pub contacts_created: usize,
    pub contacts_destroyed: usize,
    pub contacts_updated: usize,
    pub islands: usize,
    pub sum_velocity_iterations: usize,
    pub sum_position_iterations: usize,
    pub bodies_slept: usize,
    pub toi_contacts: usize,
    pub toi_islands: usize,
    /// TOI queries that came back failed or already-overlapped; the
    /// offending contacts were disabled for the rest of the step.
    pub toi_failures: usize,
}

/// Root container owning bodies, fixtures, joints, contacts, and the
/// broad-phase index.
pub struct World {
    bodies: Arena<Body>,
    fixtures: Arena<Fixture>,
    joints: Arena<Joint>,
    contact_manager: ContactManager,
    gravity: Vec2,
    locked: bool,
    auto_clear_forces: bool,
    listener: Option<Box<dyn ContactListener>>,
    contact_filter: Option<Box<dyn ContactFilter>>,
    destruction_listener: Option<Box<dyn DestructionListener>>,
    destruction_queue: Vec<DestructionEvent>,
}

impl World {
    pub fn new(gravity: Vec2) -> Self {
        Self {
            bodies: Arena::new(),
            fixtures: Arena::new(),
            joints: Arena::new(),
            contact_manager: ContactManager::new(),
            gravity,
            locked: false,
            auto_clear_forces: true,
            listener: None,
            contact_filter: None,
            destruction_listener: None,
            destruction_queue: Vec::new(),
        }
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    /// Whether a step is currently executing.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_auto_clear_forces(&mut self, enabled: bool) {
        self.auto_clear_forces = enabled;
    }

    pub fn set_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = Some(listener);
    }

    pub fn set_contact_filter(&mut self, filter: Box<dyn ContactFilter>) {
        self.contact_filter = Some(filter);
    }

    pub fn set_destruction_listener(&mut self, listener: Box<dyn DestructionListener>) {
        self.destruction_listener = Some(listener);
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contacts.len()
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    /// Mutable body access. Transform changes must go through
    /// [`World::set_transform`] so the broad phase stays in sync.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    pub fn body_ids(&self) -> Vec<BodyId> {
        self.bodies.handles()
    }

    pub fn fixture(&self, id: FixtureId) -> Option<&Fixture> {
        self.fixtures.get(id)
    }

    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id)
    }

    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contact_manager.contacts.get(id)
    }

    pub fn contact_ids(&self) -> Vec<ContactId> {
        self.contact_manager.contacts.handles()
    }

    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyId, WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        if self.bodies.len() >= MAX_BODIES {
            return Err(WorldError::CapacityExceeded("bodies"));
        }
        Ok(self.bodies.insert(Body::new(def)))
    }

    /// Destroys a body along with its joints, fixtures, and contacts.
    pub fn destroy_body(&mut self, body_id: BodyId) -> Result<(), WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        if !self.bodies.contains(body_id) {
            return Err(WorldError::InvalidArgument("unknown body"));
        }

        let joint_ids = self.bodies.get(body_id).expect("live body").joints.clone();
        for joint_id in joint_ids {
            self.remove_joint_internal(joint_id, true);
        }

        let fixture_ids = self.bodies.get(body_id).expect("live body").fixtures.clone();
        for fixture_id in fixture_ids {
            self.remove_fixture_internal(fixture_id, true);
        }

        self.bodies.remove(body_id);
        self.drain_destruction_queue();
        Ok(())
    }

    pub fn create_fixture(
        &mut self,
        body_id: BodyId,
        def: FixtureDef,
    ) -> Result<FixtureId, WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        if def.density < 0.0 || def.friction < 0.0 {
            return Err(WorldError::InvalidArgument(
                "density and friction must be non-negative",
            ));
        }
        if !self.bodies.contains(body_id) {
            return Err(WorldError::InvalidArgument("unknown body"));
        }
        if self.fixtures.len() >= MAX_FIXTURES {
            return Err(WorldError::CapacityExceeded("fixtures"));
        }

        let fixture_id = self.fixtures.insert(Fixture::new(body_id, def));
        let body = self.bodies.get_mut(body_id).expect("live body");
        body.fixtures.push(fixture_id);
        let xf = body.xf;
        let enabled = body.is_enabled();

        if enabled {
            let fixture = self.fixtures.get_mut(fixture_id).expect("new fixture");
            for child in 0..fixture.shape.child_count() {
                let aabb = fixture.shape.compute_aabb(xf, child);
                let proxy = self
                    .contact_manager
                    .broadphase
                    .create_proxy(aabb, (fixture_id, child as u32));
                fixture.proxies.push(proxy);
            }
        }

        if self.fixtures.get(fixture_id).expect("new fixture").density > 0.0 {
            let body = self.bodies.get_mut(body_id).expect("live body");
            body.reset_mass_data(&self.fixtures);
        }

        Ok(fixture_id)
    }

    pub fn destroy_fixture(&mut self, fixture_id: FixtureId) -> Result<(), WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        if !self.fixtures.contains(fixture_id) {
            return Err(WorldError::InvalidArgument("unknown fixture"));
        }
        self.remove_fixture_internal(fixture_id, false);
        self.drain_destruction_queue();
        Ok(())
    }

    pub fn create_joint(&mut self, def: JointDef) -> Result<JointId, WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        if self.joints.len() >= MAX_JOINTS {
            return Err(WorldError::CapacityExceeded("joints"));
        }
        let (body_a, body_b) = def.bodies();
        if body_a == body_b {
            return Err(WorldError::InvalidArgument("joint bodies must differ"));
        }
        if !self.bodies.contains(body_a) || !self.bodies.contains(body_b) {
            return Err(WorldError::InvalidArgument("unknown joint body"));
        }

        let joint = Joint::new(def);
        let collide_connected = joint.collide_connected;
        let joint_id = self.joints.insert(joint);

        for id in [body_a, body_b] {
            let body = self.bodies.get_mut(id).expect("live body");
            body.joints.push(joint_id);
            body.set_awake(true);
        }

        // Existing contacts between the pair must re-run filtering.
        if !collide_connected {
            self.refilter_pair(body_a, body_b);
        }

        Ok(joint_id)
    }

    /// Creates a revolute joint pinned at a world-space anchor.
    pub fn create_revolute_joint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        world_anchor: Vec2,
    ) -> Result<JointId, WorldError> {
        let local_anchor_a = self
            .bodies
            .get(body_a)
            .ok_or(WorldError::InvalidArgument("unknown joint body"))?
            .local_point(world_anchor);
        let local_anchor_b = self
            .bodies
            .get(body_b)
            .ok_or(WorldError::InvalidArgument("unknown joint body"))?
            .local_point(world_anchor);
        self.create_joint(JointDef::Revolute {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            collide_connected: false,
        })
    }

    /// Creates a distance joint between two world-space anchors at their
    /// current separation.
    pub fn create_distance_joint(
        &mut self,
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vec2,
        anchor_b: Vec2,
    ) -> Result<JointId, WorldError> {
        let local_anchor_a = self
            .bodies
            .get(body_a)
            .ok_or(WorldError::InvalidArgument("unknown joint body"))?
            .local_point(anchor_a);
        let local_anchor_b = self
            .bodies
            .get(body_b)
            .ok_or(WorldError::InvalidArgument("unknown joint body"))?
            .local_point(anchor_b);
        self.create_joint(JointDef::Distance {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            length: anchor_a.distance(anchor_b),
            collide_connected: false,
        })
    }

    pub fn destroy_joint(&mut self, joint_id: JointId) -> Result<(), WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        if !self.joints.contains(joint_id) {
            return Err(WorldError::InvalidArgument("unknown joint"));
        }
        self.remove_joint_internal(joint_id, false);
        self.drain_destruction_queue();
        Ok(())
    }

    /// Teleports a body, keeping the broad phase in sync.
    pub fn set_transform(
        &mut self,
        body_id: BodyId,
        position: Vec2,
        angle: f32,
    ) -> Result<(), WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        let body = self
            .bodies
            .get_mut(body_id)
            .ok_or(WorldError::InvalidArgument("unknown body"))?;

        body.xf = Transform::new(position, angle);
        body.sweep.c = body.xf.apply(body.sweep.local_center);
        body.sweep.a = angle;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = angle;
        body.set_awake(true);

        let xf = body.xf;
        for fixture_id in body.fixtures.clone() {
            let fixture = self.fixtures.get(fixture_id).expect("live fixture");
            for (child, &proxy) in fixture.proxies.iter().enumerate() {
                let aabb = fixture.shape.compute_aabb(xf, child);
                self.contact_manager
                    .broadphase
                    .update_proxy(proxy, aabb, Vec2::ZERO);
                self.contact_manager.broadphase.touch_proxy(proxy);
            }
        }
        Ok(())
    }

    /// Enables or disables a body. A disabled body keeps its fixtures
    /// and joints but leaves the broad phase entirely: no contacts, no
    /// solving, no queries.
    pub fn set_enabled(&mut self, body_id: BodyId, enabled: bool) -> Result<(), WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        let body = self
            .bodies
            .get_mut(body_id)
            .ok_or(WorldError::InvalidArgument("unknown body"))?;
        if body.is_enabled() == enabled {
            return Ok(());
        }

        if enabled {
            body.flags |= BodyFlags::ENABLED;
            let xf = body.xf;
            for fixture_id in body.fixtures.clone() {
                let fixture = self.fixtures.get_mut(fixture_id).expect("live fixture");
                for child in 0..fixture.shape.child_count() {
                    let aabb = fixture.shape.compute_aabb(xf, child);
                    let proxy = self
                        .contact_manager
                        .broadphase
                        .create_proxy(aabb, (fixture_id, child as u32));
                    fixture.proxies.push(proxy);
                }
            }
        } else {
            body.flags -= BodyFlags::ENABLED;
            for fixture_id in body.fixtures.clone() {
                self.contact_manager.destroy_fixture_contacts(
                    fixture_id,
                    &mut self.bodies,
                    &self.fixtures,
                    &mut self.listener,
                );
                let fixture = self.fixtures.get_mut(fixture_id).expect("live fixture");
                for proxy in std::mem::take(&mut fixture.proxies) {
                    self.contact_manager.broadphase.destroy_proxy(proxy);
                }
            }
        }
        Ok(())
    }

    /// Changes a fixture's density and recomputes the owning body's
    /// mass data.
    pub fn set_fixture_density(
        &mut self,
        fixture_id: FixtureId,
        density: f32,
    ) -> Result<(), WorldError> {
        if density < 0.0 {
            return Err(WorldError::InvalidArgument("density must be non-negative"));
        }
        let fixture = self
            .fixtures
            .get_mut(fixture_id)
            .ok_or(WorldError::InvalidArgument("unknown fixture"))?;
        fixture.density = density;
        let body_id = fixture.body;
        if let Some(body) = self.bodies.get_mut(body_id) {
            body.reset_mass_data(&self.fixtures);
        }
        Ok(())
    }

    /// Re-evaluates filtering for the fixture's contacts on the next
    /// step (call after changing its filter data).
    pub fn refilter_fixture(&mut self, fixture_id: FixtureId) -> Result<(), WorldError> {
        let fixture = self
            .fixtures
            .get(fixture_id)
            .ok_or(WorldError::InvalidArgument("unknown fixture"))?;
        let body = self
            .bodies
            .get(fixture.body)
            .ok_or(WorldError::InvalidArgument("orphan fixture"))?;
        for &contact_id in &body.contacts {
            if let Some(contact) = self.contact_manager.contacts.get_mut(contact_id) {
                if contact.fixture_a == fixture_id || contact.fixture_b == fixture_id {
                    contact.flag_for_filtering();
                }
            }
        }
        for &proxy in &fixture.proxies {
            self.contact_manager.broadphase.touch_proxy(proxy);
        }
        Ok(())
    }

    /// Shifts the world origin; all positions become relative to the new
    /// origin. Useful for large worlds drifting from the float sweet
    /// spot.
    pub fn shift_origin(&mut self, new_origin: Vec2) -> Result<(), WorldError> {
        if self.locked {
            return Err(WorldError::Locked);
        }
        for (_, body) in self.bodies.iter_mut() {
            body.xf.p -= new_origin;
            body.sweep.c0 -= new_origin;
            body.sweep.c -= new_origin;
        }
        self.contact_manager.broadphase.shift_origin(new_origin);
        Ok(())
    }

    /// Visits every fixture child whose fat AABB overlaps the query box.
    /// Return `false` from the visitor to stop.
    pub fn query_aabb(&self, aabb: &Aabb, mut visitor: impl FnMut(FixtureId, usize) -> bool) {
        self.contact_manager.broadphase.query(aabb, |proxy| {
            let (fixture_id, child) = self.contact_manager.broadphase.user_data(proxy);
            visitor(fixture_id, child as usize)
        });
    }

    /// Casts a segment through the world, invoking the visitor for every
    /// exact shape hit with the hit point, outward normal, and fraction.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        mut visitor: impl FnMut(FixtureId, usize, Vec2, Vec2, f32) -> RayCastBehavior,
    ) {
        let original_max = input.max_fraction;
        self.contact_manager.broadphase.ray_cast(input, |sub, proxy| {
            let (fixture_id, child) = self.contact_manager.broadphase.user_data(proxy);
            let fixture = match self.fixtures.get(fixture_id) {
                Some(fixture) => fixture,
                None => return sub.max_fraction,
            };
            let body = match self.bodies.get(fixture.body) {
                Some(body) => body,
                None => return sub.max_fraction,
            };

            match fixture.shape.ray_cast(sub, body.xf, child as usize) {
                Some(hit) => {
                    let point = sub.p1 + hit.fraction * (sub.p2 - sub.p1);
                    match visitor(fixture_id, child as usize, point, hit.normal, hit.fraction) {
                        RayCastBehavior::Terminate => 0.0,
                        RayCastBehavior::ResetRay => original_max,
                        RayCastBehavior::ContinueRay(fraction) => fraction,
                        RayCastBehavior::ClipRay(fraction) => fraction.min(sub.max_fraction),
                    }
                }
                None => sub.max_fraction,
            }
        });
    }

    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    /// Advances the world by one time slice.
    ///
    /// A zero `dt` still refreshes broad-phase pairs and contact state
    /// (with callbacks) but moves nothing.
    pub fn step(&mut self, conf: &StepConf) -> StepStats {
        let mut timings = StepTimings::begin();
        let mut stats = StepStats::default();
        self.locked = true;
        self.contact_manager.broadphase.set_margin(conf.aabb_extension);

        // New pairs from proxies moved last step or created since.
        stats.contacts_created = self.contact_manager.find_new_contacts(
            &mut self.bodies,
            &self.fixtures,
            &self.joints,
            &mut self.contact_filter,
        );
        timings.mark_pair_sweep();

        // Manifold refresh and touch transitions.
        self.contact_manager.collide(
            &mut self.bodies,
            &self.fixtures,
            &self.joints,
            &mut self.listener,
            &mut self.contact_filter,
            &mut stats,
        );
        timings.mark_contact_update();

        if conf.dt > 0.0 {
            self.solve(conf, &mut stats);
            timings.mark_solve();

            let has_bullets = self
                .bodies
                .iter()
                .any(|(_, body)| body.is_bullet() && body.body_type == BodyType::Dynamic);
            if has_bullets {
                self.solve_toi(conf, &mut stats);
                timings.mark_toi();
            }
        }

        if self.auto_clear_forces {
            self.clear_forces();
        }

        self.locked = false;
        self.drain_destruction_queue();

        debug!(
            "step: {} islands, {} contacts, {} slept, {} toi islands, {} toi failures",
            stats.islands,
            self.contact_manager.contacts.len(),
            stats.bodies_slept,
            stats.toi_islands,
            stats.toi_failures
        );
        timings.report(conf.dt);
        stats
    }

    /// Discrete solve: island assembly and the regular constraint solver.
    fn solve(&mut self, conf: &StepConf, stats: &mut StepStats) {
        for (_, body) in self.bodies.iter_mut() {
            body.flags -= BodyFlags::ISLAND;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.flags -= ContactFlags::ISLAND;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.island_flag = false;
        }

        let mut island = Island::new();
        let mut stack: Vec<BodyId> = Vec::new();

        for seed_id in self.bodies.handles() {
            {
                let seed = self.bodies.get(seed_id).expect("live body");
                if seed.flags.contains(BodyFlags::ISLAND)
                    || !seed.is_awake()
                    || !seed.is_enabled()
                    || seed.body_type == BodyType::Static
                {
                    continue;
                }
            }

            island.clear();
            stack.clear();
            stack.push(seed_id);
            self.bodies
                .get_mut(seed_id)
                .expect("live body")
                .flags |= BodyFlags::ISLAND;

            while let Some(body_id) = stack.pop() {
                let (contact_list, joint_list, propagate) = {
                    let body = self.bodies.get_mut(body_id).expect("live body");
                    island.add_body(body_id, body);
                    // Keep the body awake without resetting its sleep timer.
                    body.flags |= BodyFlags::AWAKE;
                    if body.body_type == BodyType::Static {
                        // Statics anchor islands but never extend them.
                        (Vec::new(), Vec::new(), false)
                    } else {
                        (body.contacts.clone(), body.joints.clone(), true)
                    }
                };
                if !propagate {
                    continue;
                }

                for contact_id in contact_list {
                    let contact = self
                        .contact_manager
                        .contacts
                        .get_mut(contact_id)
                        .expect("body contact");
                    if contact.flags.contains(ContactFlags::ISLAND)
                        || !contact.is_enabled()
                        || !contact.is_touching()
                    {
                        continue;
                    }
                    let sensor = self
                        .fixtures
                        .get(contact.fixture_a)
                        .map(|fixture| fixture.is_sensor)
                        .unwrap_or(false)
                        || self
                            .fixtures
                            .get(contact.fixture_b)
                            .map(|fixture| fixture.is_sensor)
                            .unwrap_or(false);
                    if sensor {
                        continue;
                    }

                    contact.flags |= ContactFlags::ISLAND;
                    island.contacts.push(contact_id);

                    let other = if contact.body_a == body_id {
                        contact.body_b
                    } else {
                        contact.body_a
                    };
                    let other_body = self.bodies.get_mut(other).expect("contact body");
                    if other_body.flags.contains(BodyFlags::ISLAND) {
                        continue;
                    }
                    other_body.flags |= BodyFlags::ISLAND;
                    stack.push(other);
                }

                for joint_id in joint_list {
                    let joint = self.joints.get_mut(joint_id).expect("body joint");
                    if joint.island_flag {
                        continue;
                    }
                    let other = if joint.body_a == body_id {
                        joint.body_b
                    } else {
                        joint.body_a
                    };
                    if !self
                        .bodies
                        .get(other)
                        .map(|body| body.is_enabled())
                        .unwrap_or(false)
                    {
                        continue;
                    }

                    joint.island_flag = true;
                    island.joints.push(joint_id);

                    let other_body = self.bodies.get_mut(other).expect("joint body");
                    if other_body.flags.contains(BodyFlags::ISLAND) {
                        continue;
                    }
                    other_body.flags |= BodyFlags::ISLAND;
                    stack.push(other);
                }
            }

            let report = island.solve(
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
                &self.fixtures,
                conf,
                self.gravity,
            );
            stats.islands += 1;
            stats.sum_velocity_iterations += report.velocity_iterations;
            stats.sum_position_iterations += report.position_iterations;
            stats.bodies_slept += report.bodies_slept;

            if let Some(listener) = self.listener.as_deref_mut() {
                for (contact_id, impulse) in &report.post_solve {
                    if let Some(contact) = self.contact_manager.contacts.get(*contact_id) {
                        listener.post_solve(*contact_id, contact, impulse);
                    }
                }
            }

            // Statics may take part in several islands per step.
            for &body_id in &island.bodies {
                let body = self.bodies.get_mut(body_id).expect("island body");
                if body.body_type == BodyType::Static {
                    body.flags -= BodyFlags::ISLAND;
                }
            }
        }

        // Push the solved positions out to the broad phase.
        for body_id in self.bodies.handles() {
            let body = self.bodies.get(body_id).expect("live body");
            if !body.flags.contains(BodyFlags::ISLAND) || body.body_type == BodyType::Static {
                continue;
            }
            Self::synchronize_fixtures(body, &self.fixtures, &mut self.contact_manager.broadphase);
        }
    }

    /// Continuous pass: finds the earliest impact among bullet contacts,
    /// advances the affected pair, and re-solves a local impact island,
    /// repeating until the step interval is clean.
    fn solve_toi(&mut self, conf: &StepConf, stats: &mut StepStats) {
        let mut island = Island::new();

        for (_, body) in self.bodies.iter_mut() {
            body.flags -= BodyFlags::ISLAND;
            body.sweep.alpha0 = 0.0;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.flags -= ContactFlags::ISLAND | ContactFlags::TOI;
            contact.toi_count = 0;
            contact.toi = 1.0;
        }

        loop {
            // Earliest TOI among eligible contacts, computed lazily and
            // cached on the contact.
            let mut min_contact: Option<ContactId> = None;
            let mut min_alpha = 1.0_f32;

            for contact_id in self.contact_manager.contacts.handles() {
                let contact = self
                    .contact_manager
                    .contacts
                    .get(contact_id)
                    .expect("live contact");
                if !contact.is_enabled() || contact.toi_count > conf.max_sub_steps {
                    continue;
                }

                let alpha = if contact.flags.contains(ContactFlags::TOI) {
                    contact.toi
                } else {
                    match self.compute_contact_toi(contact_id, conf, stats) {
                        Some(alpha) => alpha,
                        None => continue,
                    }
                };

                if alpha < min_alpha {
                    min_alpha = alpha;
                    min_contact = Some(contact_id);
                }
            }

            let min_contact = match min_contact {
                Some(id) if min_alpha < 1.0 - 10.0 * f32::EPSILON => id,
                _ => break,
            };
            stats.toi_contacts += 1;

            let (body_a_id, body_b_id) = {
                let contact = self
                    .contact_manager
                    .contacts
                    .get(min_contact)
                    .expect("live contact");
                (contact.body_a, contact.body_b)
            };

            let backup_a = self.bodies.get(body_a_id).expect("live body").sweep;
            let backup_b = self.bodies.get(body_b_id).expect("live body").sweep;

            self.bodies
                .get_mut(body_a_id)
                .expect("live body")
                .advance(min_alpha);
            self.bodies
                .get_mut(body_b_id)
                .expect("live body")
                .advance(min_alpha);

            // The impact may already be gone after moving to the TOI.
            self.update_contact_with_events(min_contact);
            {
                let contact = self
                    .contact_manager
                    .contacts
                    .get_mut(min_contact)
                    .expect("live contact");
                contact.flags -= ContactFlags::TOI;
                contact.toi_count += 1;

                if !contact.is_enabled() || !contact.is_touching() {
                    contact.set_enabled(false);
                    let body_a = self.bodies.get_mut(body_a_id).expect("live body");
                    body_a.sweep = backup_a;
                    body_a.synchronize_transform();
                    let body_b = self.bodies.get_mut(body_b_id).expect("live body");
                    body_b.sweep = backup_b;
                    body_b.synchronize_transform();
                    continue;
                }
            }

            self.bodies
                .get_mut(body_a_id)
                .expect("live body")
                .set_awake(true);
            self.bodies
                .get_mut(body_b_id)
                .expect("live body")
                .set_awake(true);

            // Impact island: the pair plus everything touching it.
            island.clear();
            for id in [body_a_id, body_b_id] {
                let body = self.bodies.get_mut(id).expect("live body");
                body.flags |= BodyFlags::ISLAND;
                island.add_body(id, body);
            }
            {
                let contact = self
                    .contact_manager
                    .contacts
                    .get_mut(min_contact)
                    .expect("live contact");
                contact.flags |= ContactFlags::ISLAND;
            }
            island.contacts.push(min_contact);

            for seed_id in [body_a_id, body_b_id] {
                if self.bodies.get(seed_id).expect("live body").body_type != BodyType::Dynamic {
                    continue;
                }
                self.grow_impact_island(&mut island, seed_id, min_alpha);
            }

            let sub_conf = StepConf {
                dt: (1.0 - min_alpha) * conf.dt,
                inv_dt: if conf.dt > 0.0 {
                    1.0 / ((1.0 - min_alpha) * conf.dt)
                } else {
                    0.0
                },
                dt_ratio: 1.0,
                warm_starting: false,
                ..*conf
            };

            let index_a = self.bodies.get(body_a_id).expect("live body").island_index;
            let index_b = self.bodies.get(body_b_id).expect("live body").island_index;
            let report = island.solve_toi(
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &self.fixtures,
                &sub_conf,
                index_a,
                index_b,
            );
            stats.toi_islands += 1;
            stats.sum_velocity_iterations += report.velocity_iterations;
            stats.sum_position_iterations += report.position_iterations;

            if let Some(listener) = self.listener.as_deref_mut() {
                for (contact_id, impulse) in &report.post_solve {
                    if let Some(contact) = self.contact_manager.contacts.get(*contact_id) {
                        listener.post_solve(*contact_id, contact, impulse);
                    }
                }
            }

            // Invalidate cached TOIs around moved bodies and commit their
            // proxies.
            for &body_id in &island.bodies {
                let body = self.bodies.get_mut(body_id).expect("island body");
                body.flags -= BodyFlags::ISLAND;
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                let contact_list = body.contacts.clone();
                let body = self.bodies.get(body_id).expect("island body");
                Self::synchronize_fixtures(
                    body,
                    &self.fixtures,
                    &mut self.contact_manager.broadphase,
                );
                for contact_id in contact_list {
                    if let Some(contact) = self.contact_manager.contacts.get_mut(contact_id) {
                        contact.flags -= ContactFlags::TOI | ContactFlags::ISLAND;
                    }
                }
            }

            stats.contacts_created += self.contact_manager.find_new_contacts(
                &mut self.bodies,
                &self.fixtures,
                &self.joints,
                &mut self.contact_filter,
            );
        }
    }

    /// Computes and caches the TOI of one contact. Returns `None` when
    /// the contact is ineligible, or when the query failed (the contact
    /// gets disabled).
    fn compute_contact_toi(
        &mut self,
        contact_id: ContactId,
        conf: &StepConf,
        stats: &mut StepStats,
    ) -> Option<f32> {
        let contact = self.contact_manager.contacts.get(contact_id)?;
        let fixture_a = self.fixtures.get(contact.fixture_a)?;
        let fixture_b = self.fixtures.get(contact.fixture_b)?;
        if fixture_a.is_sensor || fixture_b.is_sensor {
            return None;
        }

        let (body_a_id, body_b_id) = (contact.body_a, contact.body_b);
        let (child_a, child_b) = (contact.child_a, contact.child_b);

        {
            let body_a = self.bodies.get(body_a_id)?;
            let body_b = self.bodies.get(body_b_id)?;

            let active_a = body_a.is_awake() && body_a.body_type != BodyType::Static;
            let active_b = body_b.is_awake() && body_b.body_type != BodyType::Static;
            if !active_a && !active_b {
                return None;
            }

            let bullet_a = body_a.is_bullet() && body_a.body_type == BodyType::Dynamic;
            let bullet_b = body_b.is_bullet() && body_b.body_type == BodyType::Dynamic;
            if !bullet_a && !bullet_b {
                return None;
            }
        }

        // Bring both sweeps onto a shared time origin.
        let (body_a, body_b) = self.bodies.get2_mut(body_a_id, body_b_id)?;
        let alpha0 = body_a.sweep.alpha0.max(body_b.sweep.alpha0);
        debug_assert!(alpha0 < 1.0);
        if body_a.sweep.alpha0 < alpha0 {
            body_a.sweep.advance(alpha0);
        } else if body_b.sweep.alpha0 < alpha0 {
            body_b.sweep.advance(alpha0);
        }

        let proxy_a = fixture_a.shape.proxy(child_a);
        let proxy_b = fixture_b.shape.proxy(child_b);
        let output = time_of_impact(
            &ToiInput {
                proxy_a: &proxy_a,
                sweep_a: body_a.sweep,
                proxy_b: &proxy_b,
                sweep_b: body_b.sweep,
            },
            &ToiConf {
                t_max: 1.0,
                target_depth: conf.target_depth,
                tolerance: conf.tolerance,
                max_toi_iterations: MAX_TOI_ITERATIONS,
                max_root_iterations: MAX_TOI_ROOT_ITERATIONS,
            },
        );

        let contact = self.contact_manager.contacts.get_mut(contact_id)?;
        let alpha = match output.state {
            ToiState::Touching => (alpha0 + (1.0 - alpha0) * output.t).min(1.0),
            ToiState::Separated => 1.0,
            ToiState::Failed | ToiState::Overlapped => {
                // Numeric failure: log it and drop the contact from the
                // rest of the step so the loop cannot spin on it.
                stats.toi_failures += 1;
                warn!(
                    "toi query {:?} on contact {:?}; contact disabled for this step",
                    output.state, contact_id
                );
                contact.set_enabled(false);
                contact.toi = 1.0;
                contact.flags |= ContactFlags::TOI;
                return None;
            }
        };
        contact.toi = alpha;
        contact.flags |= ContactFlags::TOI;
        Some(alpha)
    }

    /// Adds everything touching `seed_id` to the impact island,
    /// tentatively advancing the neighbors to the impact time.
    fn grow_impact_island(&mut self, island: &mut Island, seed_id: BodyId, min_alpha: f32) {
        let seed_is_bullet = self.bodies.get(seed_id).expect("live body").is_bullet();
        let contact_list = self.bodies.get(seed_id).expect("live body").contacts.clone();

        for contact_id in contact_list {
            if island.contacts.len() >= MAX_TOI_CONTACTS {
                break;
            }
            let contact = match self.contact_manager.contacts.get(contact_id) {
                Some(contact) => contact,
                None => continue,
            };
            if contact.flags.contains(ContactFlags::ISLAND) {
                continue;
            }

            let other_id = if contact.body_a == seed_id {
                contact.body_b
            } else {
                contact.body_a
            };
            let other = self.bodies.get(other_id).expect("contact body");

            // Dynamic neighbors only chain through bullets; everything
            // else is handled by the discrete solver.
            if other.body_type == BodyType::Dynamic && !seed_is_bullet && !other.is_bullet() {
                continue;
            }

            let sensor = self
                .fixtures
                .get(contact.fixture_a)
                .map(|fixture| fixture.is_sensor)
                .unwrap_or(false)
                || self
                    .fixtures
                    .get(contact.fixture_b)
                    .map(|fixture| fixture.is_sensor)
                    .unwrap_or(false);
            if sensor {
                continue;
            }

            let other_in_island = other.flags.contains(BodyFlags::ISLAND);
            let backup = other.sweep;
            if !other_in_island {
                self.bodies
                    .get_mut(other_id)
                    .expect("contact body")
                    .advance(min_alpha);
            }

            self.update_contact_with_events(contact_id);
            let contact = self
                .contact_manager
                .contacts
                .get_mut(contact_id)
                .expect("live contact");
            if !contact.is_enabled() || !contact.is_touching() {
                if !other_in_island {
                    let other = self.bodies.get_mut(other_id).expect("contact body");
                    other.sweep = backup;
                    other.synchronize_transform();
                }
                continue;
            }

            contact.flags |= ContactFlags::ISLAND;
            island.contacts.push(contact_id);

            if other_in_island {
                continue;
            }
            let other = self.bodies.get_mut(other_id).expect("contact body");
            other.flags |= BodyFlags::ISLAND;
            if other.body_type != BodyType::Static {
                other.set_awake(true);
            }
            island.add_body(other_id, other);
        }
    }

    /// Refreshes one contact's manifold and fires the transition events,
    /// mirroring the per-step update pass for TOI-advanced bodies.
    fn update_contact_with_events(&mut self, contact_id: ContactId) {
        let contact = match self.contact_manager.contacts.get(contact_id) {
            Some(contact) => contact,
            None => return,
        };
        let fixture_a = self.fixtures.get(contact.fixture_a).expect("fixture A");
        let fixture_b = self.fixtures.get(contact.fixture_b).expect("fixture B");
        let body_a = self.bodies.get(contact.body_a).expect("body A");
        let body_b = self.bodies.get(contact.body_b).expect("body B");
        let sensor = fixture_a.is_sensor || fixture_b.is_sensor;
        let proxy_a = fixture_a.shape.proxy(contact.child_a);
        let proxy_b = fixture_b.shape.proxy(contact.child_b);
        let (xf_a, xf_b) = (body_a.xf, body_b.xf);

        let contact = self
            .contact_manager
            .contacts
            .get_mut(contact_id)
            .expect("live contact");
        let (was_touching, touching, old_manifold) = if sensor {
            let overlapping =
                crate::collision::distance::test_overlap(&proxy_a, xf_a, &proxy_b, xf_b);
            let (was, now) = contact.update_sensor(overlapping);
            (was, now, None)
        } else {
            let (was, now, old) = contact.update_manifold(&proxy_a, xf_a, &proxy_b, xf_b);
            (was, now, Some(old))
        };

        if let Some(listener) = self.listener.as_deref_mut() {
            let contact = self
                .contact_manager
                .contacts
                .get_mut(contact_id)
                .expect("live contact");
            if !was_touching && touching {
                listener.begin_contact(contact_id, contact);
            }
            if was_touching && !touching {
                listener.end_contact(contact_id, contact);
            }
            if touching && !sensor {
                if let Some(old_manifold) = &old_manifold {
                    listener.pre_solve(contact_id, contact, old_manifold);
                }
            }
        }
    }

    fn synchronize_fixtures(
        body: &Body,
        fixtures: &Arena<Fixture>,
        broadphase: &mut BroadPhase<ProxyData>,
    ) {
        let q0 = Rot::from_angle(body.sweep.a0);
        let xf1 = Transform {
            p: body.sweep.c0 - q0.apply(body.sweep.local_center),
            q: q0,
        };
        let xf2 = body.xf;

        for &fixture_id in &body.fixtures {
            let fixture = match fixtures.get(fixture_id) {
                Some(fixture) => fixture,
                None => continue,
            };
            for (child, &proxy) in fixture.proxies.iter().enumerate() {
                let aabb1 = fixture.shape.compute_aabb(xf1, child);
                let aabb2 = fixture.shape.compute_aabb(xf2, child);
                let aabb = aabb1.combine(&aabb2);
                let displacement = aabb2.center() - aabb1.center();
                broadphase.update_proxy(proxy, aabb, displacement);
            }
        }
    }

    fn refilter_pair(&mut self, body_a: BodyId, body_b: BodyId) {
        if let Some(body) = self.bodies.get(body_a) {
            for &contact_id in &body.contacts {
                if let Some(contact) = self.contact_manager.contacts.get_mut(contact_id) {
                    let connects = (contact.body_a == body_a && contact.body_b == body_b)
                        || (contact.body_a == body_b && contact.body_b == body_a);
                    if connects {
                        contact.flag_for_filtering();
                    }
                }
            }
        }
    }

    fn remove_fixture_internal(&mut self, fixture_id: FixtureId, notify: bool) {
        self.contact_manager.destroy_fixture_contacts(
            fixture_id,
            &mut self.bodies,
            &self.fixtures,
            &mut self.listener,
        );

        let fixture = match self.fixtures.remove(fixture_id) {
            Some(fixture) => fixture,
            None => return,
        };
        for proxy in &fixture.proxies {
            self.contact_manager.broadphase.destroy_proxy(*proxy);
        }

        if let Some(body) = self.bodies.get_mut(fixture.body) {
            body.fixtures.retain(|&id| id != fixture_id);
        }
        if let Some(body) = self.bodies.get_mut(fixture.body) {
            body.reset_mass_data(&self.fixtures);
        }

        if notify {
            self.destruction_queue
                .push(DestructionEvent::Fixture(fixture_id));
        }
    }

    fn remove_joint_internal(&mut self, joint_id: JointId, notify: bool) {
        let joint = match self.joints.remove(joint_id) {
            Some(joint) => joint,
            None => return,
        };

        for id in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(id) {
                body.joints.retain(|&jid| jid != joint_id);
                body.set_awake(true);
            }
        }

        // The pair may collide again now.
        if !joint.collide_connected {
            self.refilter_pair(joint.body_a, joint.body_b);
        }

        if notify {
            self.destruction_queue
                .push(DestructionEvent::Joint(joint_id));
        }
    }

    fn drain_destruction_queue(&mut self) {
        if self.destruction_queue.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.destruction_queue);
        if let Some(listener) = self.destruction_listener.as_deref_mut() {
            for event in events {
                match event {
                    DestructionEvent::Fixture(id) => listener.fixture_destroyed(id),
                    DestructionEvent::Joint(id) => listener.joint_destroyed(id),
                }
            }
        }
    }
}
