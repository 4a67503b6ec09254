//! Bridges broad-phase pairs into contact records and advances them.

use std::collections::HashMap;

use log::debug;

use crate::collision::broadphase::{BroadPhase, ProxyId};
use crate::collision::distance::test_overlap;
use crate::core::body::{Body, BodyId, BodyType};
use crate::core::fixture::{Fixture, FixtureId};
use crate::core::joints::Joint;
use crate::dynamics::contact::{
    mix_friction, mix_restitution, Contact, ContactFlags, ContactId,
};
use crate::utils::arena::Arena;

use super::{ContactFilter, ContactListener, StepStats};

/// Broad-phase user data: which fixture child a leaf belongs to.
pub(crate) type ProxyData = (FixtureId, u32);

pub(crate) struct ContactManager {
    pub(crate) broadphase: BroadPhase<ProxyData>,
    pub(crate) contacts: Arena<Contact>,
    pair_map: HashMap<(ProxyId, ProxyId), ContactId>,
}

impl ContactManager {
    pub fn new() -> Self {
        Self {
            broadphase: BroadPhase::new(),
            contacts: Arena::new(),
            pair_map: HashMap::new(),
        }
    }

    /// Whether the body-level rules let two fixtures' bodies collide:
    /// different bodies, at least one dynamic, and no joint between them
    /// that forbids it.
    fn bodies_should_collide(
        bodies: &Arena<Body>,
        joints: &Arena<Joint>,
        body_a_id: BodyId,
        body_b_id: BodyId,
    ) -> bool {
        if body_a_id == body_b_id {
            return false;
        }
        let body_a = match bodies.get(body_a_id) {
            Some(body) => body,
            None => return false,
        };
        let body_b = match bodies.get(body_b_id) {
            Some(body) => body,
            None => return false,
        };

        if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
            return false;
        }

        for &joint_id in &body_a.joints {
            if let Some(joint) = joints.get(joint_id) {
                let connects = (joint.body_a == body_a_id && joint.body_b == body_b_id)
                    || (joint.body_a == body_b_id && joint.body_b == body_a_id);
                if connects && !joint.collide_connected {
                    return false;
                }
            }
        }
        true
    }

    /// Sweeps the moved proxies and creates contacts for fresh pairs
    /// that pass the filters. Returns the number created.
    pub fn find_new_contacts(
        &mut self,
        bodies: &mut Arena<Body>,
        fixtures: &Arena<Fixture>,
        joints: &Arena<Joint>,
        filter: &mut Option<Box<dyn ContactFilter>>,
    ) -> usize {
        let mut created = 0;

        for (proxy_a, proxy_b) in self.broadphase.update_pairs() {
            let key = (proxy_a, proxy_b);
            if self.pair_map.contains_key(&key) {
                continue;
            }

            let (fixture_a_id, child_a) = self.broadphase.user_data(proxy_a);
            let (fixture_b_id, child_b) = self.broadphase.user_data(proxy_b);
            if fixture_a_id == fixture_b_id {
                continue;
            }

            let fixture_a = match fixtures.get(fixture_a_id) {
                Some(fixture) => fixture,
                None => continue,
            };
            let fixture_b = match fixtures.get(fixture_b_id) {
                Some(fixture) => fixture,
                None => continue,
            };

            if !Self::bodies_should_collide(bodies, joints, fixture_a.body, fixture_b.body) {
                continue;
            }
            if !fixture_a.filter.should_collide(&fixture_b.filter) {
                continue;
            }
            if let Some(user_filter) = filter.as_deref_mut() {
                if !user_filter.should_collide(fixture_a, fixture_b) {
                    continue;
                }
            }

            let contact_id = self.contacts.insert(Contact::new(
                fixture_a_id,
                child_a as usize,
                fixture_a.body,
                fixture_b_id,
                child_b as usize,
                fixture_b.body,
                mix_friction(fixture_a.friction, fixture_b.friction),
                mix_restitution(fixture_a.restitution, fixture_b.restitution),
            ));
            self.pair_map.insert(key, contact_id);
            if let Some(body) = bodies.get_mut(fixture_a.body) {
                body.contacts.push(contact_id);
            }
            if let Some(body) = bodies.get_mut(fixture_b.body) {
                body.contacts.push(contact_id);
            }
            created += 1;
        }

        created
    }

    /// Destroys a contact, firing `end_contact` when it was touching.
    pub fn destroy_contact(
        &mut self,
        contact_id: ContactId,
        bodies: &mut Arena<Body>,
        fixtures: &Arena<Fixture>,
        listener: Option<&mut (dyn ContactListener + '_)>,
    ) {
        let contact = match self.contacts.get_mut(contact_id) {
            Some(contact) => contact,
            None => return,
        };

        if contact.is_touching() {
            if let Some(listener) = listener {
                listener.end_contact(contact_id, contact);
            }
            // Bodies near a vanished contact must get a chance to move.
            if let Some(body) = bodies.get_mut(contact.body_a) {
                body.set_awake(true);
            }
            if let Some(body) = bodies.get_mut(contact.body_b) {
                body.set_awake(true);
            }
        }

        let contact = self.contacts.remove(contact_id).expect("live contact");
        if let Some(body) = bodies.get_mut(contact.body_a) {
            body.contacts.retain(|&id| id != contact_id);
        }
        if let Some(body) = bodies.get_mut(contact.body_b) {
            body.contacts.retain(|&id| id != contact_id);
        }

        let proxy_a = fixtures
            .get(contact.fixture_a)
            .map(|fixture| fixture.proxies[contact.child_a]);
        let proxy_b = fixtures
            .get(contact.fixture_b)
            .map(|fixture| fixture.proxies[contact.child_b]);
        if let (Some(proxy_a), Some(proxy_b)) = (proxy_a, proxy_b) {
            let key = if proxy_a < proxy_b {
                (proxy_a, proxy_b)
            } else {
                (proxy_b, proxy_a)
            };
            self.pair_map.remove(&key);
        }
    }

    /// Removes every contact touching the given fixture (used when the
    /// fixture or its body is destroyed).
    pub fn destroy_fixture_contacts(
        &mut self,
        fixture_id: FixtureId,
        bodies: &mut Arena<Body>,
        fixtures: &Arena<Fixture>,
        listener: &mut Option<Box<dyn ContactListener>>,
    ) {
        let doomed: Vec<ContactId> = self
            .contacts
            .iter()
            .filter(|(_, contact)| {
                contact.fixture_a == fixture_id || contact.fixture_b == fixture_id
            })
            .map(|(id, _)| id)
            .collect();
        for contact_id in doomed {
            self.destroy_contact(contact_id, bodies, fixtures, listener.as_deref_mut());
        }
    }

    /// The per-step update pass: re-filters flagged contacts, destroys
    /// contacts whose fat AABBs separated, and recomputes manifolds with
    /// begin/end transition events.
    pub fn collide(
        &mut self,
        bodies: &mut Arena<Body>,
        fixtures: &Arena<Fixture>,
        joints: &Arena<Joint>,
        listener: &mut Option<Box<dyn ContactListener>>,
        filter: &mut Option<Box<dyn ContactFilter>>,
        stats: &mut StepStats,
    ) {
        for contact_id in self.contacts.handles() {
            let contact = self.contacts.get(contact_id).expect("live contact");
            let fixture_a_id = contact.fixture_a;
            let fixture_b_id = contact.fixture_b;
            let (child_a, child_b) = (contact.child_a, contact.child_b);
            let (body_a_id, body_b_id) = (contact.body_a, contact.body_b);

            let fixture_a = fixtures.get(fixture_a_id).expect("contact fixture A");
            let fixture_b = fixtures.get(fixture_b_id).expect("contact fixture B");

            // Re-run filtering when requested.
            if contact.flags.contains(ContactFlags::FILTER) {
                let rejected = !Self::bodies_should_collide(bodies, joints, body_a_id, body_b_id)
                    || !fixture_a.filter.should_collide(&fixture_b.filter)
                    || filter
                        .as_deref_mut()
                        .map(|f| !f.should_collide(fixture_a, fixture_b))
                        .unwrap_or(false);
                if rejected {
                    self.destroy_contact(contact_id, bodies, fixtures, listener.as_deref_mut());
                    stats.contacts_destroyed += 1;
                    continue;
                }
                let contact = self.contacts.get_mut(contact_id).expect("live contact");
                contact.flags -= ContactFlags::FILTER;
            }

            let body_a = bodies.get(body_a_id).expect("contact body A");
            let body_b = bodies.get(body_b_id).expect("contact body B");

            let active_a = body_a.is_awake() && body_a.body_type != BodyType::Static;
            let active_b = body_b.is_awake() && body_b.body_type != BodyType::Static;
            if !active_a && !active_b {
                continue;
            }

            // Separated in the broad phase: the contact dies.
            let proxy_a = fixture_a.proxies[child_a];
            let proxy_b = fixture_b.proxies[child_b];
            if !self.broadphase.proxies_overlap(proxy_a, proxy_b) {
                self.destroy_contact(contact_id, bodies, fixtures, listener.as_deref_mut());
                stats.contacts_destroyed += 1;
                continue;
            }

            let xf_a = body_a.xf;
            let xf_b = body_b.xf;
            let sensor = fixture_a.is_sensor || fixture_b.is_sensor;
            let dist_proxy_a = fixture_a.shape.proxy(child_a);
            let dist_proxy_b = fixture_b.shape.proxy(child_b);

            let contact = self.contacts.get_mut(contact_id).expect("live contact");
            let (was_touching, touching, old_manifold) = if sensor {
                let overlapping = test_overlap(&dist_proxy_a, xf_a, &dist_proxy_b, xf_b);
                let (was, now) = contact.update_sensor(overlapping);
                (was, now, None)
            } else {
                let (was, now, old) =
                    contact.update_manifold(&dist_proxy_a, xf_a, &dist_proxy_b, xf_b);
                (was, now, Some(old))
            };
            stats.contacts_updated += 1;

            if was_touching != touching {
                if let Some(body) = bodies.get_mut(body_a_id) {
                    body.set_awake(true);
                }
                if let Some(body) = bodies.get_mut(body_b_id) {
                    body.set_awake(true);
                }
            }

            if let Some(listener) = listener.as_deref_mut() {
                let contact = self.contacts.get_mut(contact_id).expect("live contact");
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

        debug!(
            "contact pass: {} live, {} updated, {} destroyed",
            self.contacts.len(),
            stats.contacts_updated,
            stats.contacts_destroyed
        );
    }
}
