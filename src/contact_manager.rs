//! The contact manager turns broad-phase pair events into persistent
//! contacts and drives the narrow phase over them each step. Contacts are
//! destroyed only when the broad-phase AABBs separate, so resting pairs keep
//! their warm-start state across steps.

use std::collections::HashMap;

use log::{debug, trace};

use crate::body::Body;
use crate::broad_phase::{BroadPhase, ProxyData};
use crate::collide::collision_rank;
use crate::contact::{mix_friction, mix_restitution, Contact, ContactEnd, ContactFlags, ContactKey};

/// Touch transition of a fixture-child pair, reported once per transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactEvent {
    Begin { a: ContactEnd, b: ContactEnd },
    End { a: ContactEnd, b: ContactEnd },
}

#[derive(Default)]
pub struct ContactManager {
    pub(crate) broad_phase: BroadPhase,
    pub(crate) contacts: HashMap<ContactKey, Contact>,
    pub(crate) events: Vec<ContactEvent>,
}

impl ContactManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Sweep the broad phase for new overlapping pairs and create contacts
    /// for them.
    pub(crate) fn find_new_contacts(&mut self, bodies: &[Option<Body>]) {
        let mut pairs = Vec::new();
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));

        for (a, b) in pairs {
            self.add_pair(a, b, bodies);
        }
    }

    fn add_pair(&mut self, data_a: ProxyData, data_b: ProxyData, bodies: &[Option<Body>]) {
        // A body never collides with itself.
        if data_a.body == data_b.body {
            return;
        }

        let (Some(body_a), Some(body_b)) = (
            bodies.get(data_a.body.0).and_then(Option::as_ref),
            bodies.get(data_b.body.0).and_then(Option::as_ref),
        ) else {
            return;
        };
        let (Some(fixture_a), Some(fixture_b)) = (
            body_a.fixtures.get(data_a.fixture),
            body_b.fixtures.get(data_b.fixture),
        ) else {
            return;
        };

        if !body_a.should_collide(body_b) {
            return;
        }
        if !fixture_a.filter.should_collide(&fixture_b.filter) {
            return;
        }

        // Put the endpoint with the higher-ranked shape in the A slot so the
        // narrow phase only ever sees canonical orderings.
        let end_a = ContactEnd {
            body: data_a.body,
            fixture: data_a.fixture,
            child: data_a.child,
        };
        let end_b = ContactEnd {
            body: data_b.body,
            fixture: data_b.fixture,
            child: data_b.child,
        };
        let (end_a, end_b, fixture_a, fixture_b) =
            if collision_rank(&fixture_a.shape) >= collision_rank(&fixture_b.shape) {
                (end_a, end_b, fixture_a, fixture_b)
            } else {
                (end_b, end_a, fixture_b, fixture_a)
            };

        let key = ContactKey::new(end_a, end_b);
        if self.contacts.contains_key(&key) {
            return;
        }

        trace!("contact created: {:?} <-> {:?}", end_a, end_b);
        self.contacts.insert(
            key,
            Contact::new(
                end_a,
                end_b,
                mix_friction(fixture_a.friction, fixture_b.friction),
                mix_restitution(fixture_a.restitution, fixture_b.restitution),
            ),
        );
    }

    /// Narrow phase: update every contact, destroying those whose
    /// broad-phase overlap has ended. Emits Begin/End events, including the
    /// End owed by a touching contact that is being destroyed.
    pub(crate) fn collide(&mut self, bodies: &mut [Option<Body>]) {
        let mut destroy = Vec::new();

        for (key, contact) in self.contacts.iter_mut() {
            let ia = contact.end_a.body.0;
            let ib = contact.end_b.body.0;

            let Ok([slot_a, slot_b]) = bodies.get_disjoint_mut([ia, ib]) else {
                destroy.push(*key);
                continue;
            };
            let (Some(body_a), Some(body_b)) = (slot_a.as_mut(), slot_b.as_mut()) else {
                destroy.push(*key);
                continue;
            };

            let (Some(fixture_a), Some(fixture_b)) = (
                body_a.fixtures.get(contact.end_a.fixture),
                body_b.fixtures.get(contact.end_b.fixture),
            ) else {
                destroy.push(*key);
                continue;
            };

            // A fixture filter changed since the last step.
            if contact.flags.contains(ContactFlags::FILTER) {
                if !fixture_a.filter.should_collide(&fixture_b.filter)
                    || !body_a.should_collide(body_b)
                {
                    if contact.is_touching() {
                        self.events.push(ContactEvent::End {
                            a: contact.end_a,
                            b: contact.end_b,
                        });
                    }
                    destroy.push(*key);
                    continue;
                }
                contact.flags.remove(ContactFlags::FILTER);
            }

            // Sleeping pairs keep their state untouched.
            let active_a = body_a.is_awake() && body_a.body_type() != crate::body::BodyType::Static;
            let active_b = body_b.is_awake() && body_b.body_type() != crate::body::BodyType::Static;
            if !active_a && !active_b {
                continue;
            }

            let proxy_a = fixture_a.proxies[contact.end_a.child].proxy_id;
            let proxy_b = fixture_b.proxies[contact.end_b.child].proxy_id;

            // The contact dies when the fat AABBs no longer overlap.
            if !self.broad_phase.test_overlap(proxy_a, proxy_b) {
                if contact.is_touching() {
                    self.events.push(ContactEvent::End {
                        a: contact.end_a,
                        b: contact.end_b,
                    });
                }
                destroy.push(*key);
                continue;
            }

            contact.update(body_a, body_b, &mut self.events);
        }

        for key in destroy {
            trace!("contact destroyed: {:?}", key);
            self.contacts.remove(&key);
        }
    }

    /// Remove every contact attached to a body, emitting End events for
    /// pairs that were touching. Called when a body is destroyed or
    /// disabled.
    pub(crate) fn destroy_body_contacts(&mut self, body: crate::body::BodyId) {
        let mut destroy = Vec::new();
        for (key, contact) in self.contacts.iter() {
            if contact.end_a.body == body || contact.end_b.body == body {
                if contact.is_touching() {
                    self.events.push(ContactEvent::End {
                        a: contact.end_a,
                        b: contact.end_b,
                    });
                }
                destroy.push(*key);
            }
        }
        if !destroy.is_empty() {
            debug!("destroying {} contacts for {:?}", destroy.len(), body);
        }
        for key in destroy {
            self.contacts.remove(&key);
        }
    }

    /// Mark every contact attached to a fixture for a filter recheck on the
    /// next step. Called when the fixture's filter data changes.
    pub(crate) fn flag_contacts_for_filtering(&mut self, body: crate::body::BodyId, fixture: usize) {
        for contact in self.contacts.values_mut() {
            if (contact.end_a.body == body && contact.end_a.fixture == fixture)
                || (contact.end_b.body == body && contact.end_b.fixture == fixture)
            {
                contact.flags |= ContactFlags::FILTER;
            }
        }
    }

    /// Drain the Begin/End events accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.events)
    }
}
