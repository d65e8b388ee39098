//! The simulation world. Owns the body arena, the contact manager and the
//! stepping loop. All quantities here are in meters, kilograms and seconds;
//! pixel-space concerns live in the facade on top.

use log::debug;

use crate::body::{Body, BodyDef, BodyFlags, BodyId, BodyType};
use crate::collision::{RayCastInput, RayCastOutput};
use crate::contact::ContactFlags;
use crate::contact_manager::{ContactEvent, ContactManager};
use crate::fixture::{Filter, FixtureDef};
use crate::island::Island;
use crate::math::Vec2;
use crate::time_step::TimeStep;

/// Closest fixture hit by a ray cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastHit {
    pub body: BodyId,
    pub fixture: usize,
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f32,
}

pub struct World {
    gravity: Vec2,
    bodies: Vec<Option<Body>>,
    free_bodies: Vec<usize>,
    contact_manager: ContactManager,
    island: Island,
    locked: bool,
    allow_sleep: bool,
    warm_starting: bool,
    inv_dt0: f32,
}

impl World {
    pub fn new(gravity: Vec2) -> Self {
        debug!("world created, gravity {:?}", gravity);
        Self {
            gravity,
            bodies: Vec::new(),
            free_bodies: Vec::new(),
            contact_manager: ContactManager::new(),
            island: Island::new(),
            locked: false,
            allow_sleep: true,
            warm_starting: true,
            inv_dt0: 0.0,
        }
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    /// Change gravity, waking every dynamic body so resting stacks react.
    pub fn set_gravity(&mut self, gravity: Vec2) {
        if self.gravity != gravity {
            for slot in self.bodies.iter_mut().flatten() {
                if slot.body_type() == BodyType::Dynamic {
                    slot.set_awake(true);
                }
            }
        }
        self.gravity = gravity;
    }

    /// True while a step is running. Structural changes must be deferred
    /// until the step finishes.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn body_count(&self) -> usize {
        self.bodies.iter().filter(|b| b.is_some()).count()
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.0).and_then(Option::as_ref)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn create_body(&mut self, def: &BodyDef) -> BodyId {
        debug_assert!(!self.locked);

        let body = Body::new(def);
        let id = match self.free_bodies.pop() {
            Some(slot) => {
                self.bodies[slot] = Some(body);
                BodyId(slot)
            }
            None => {
                self.bodies.push(Some(body));
                BodyId(self.bodies.len() - 1)
            }
        };
        debug!("body created: {:?} ({:?})", id, def.body_type);
        id
    }

    /// Destroy a body, its fixtures and its contacts. Touching contacts
    /// emit their End event.
    pub fn destroy_body(&mut self, id: BodyId) {
        debug_assert!(!self.locked);

        self.contact_manager.destroy_body_contacts(id);

        if let Some(mut body) = self.bodies.get_mut(id.0).and_then(Option::take) {
            for fixture in body.fixtures.iter_mut() {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
            self.free_bodies.push(id.0);
            debug!("body destroyed: {:?}", id);
        }
    }

    /// Attach a fixture, registering broad-phase proxies. Returns the
    /// fixture index on the body.
    pub fn create_fixture(&mut self, id: BodyId, def: &FixtureDef) -> usize {
        debug_assert!(!self.locked);

        let Some(body) = self.bodies.get_mut(id.0).and_then(Option::as_mut) else {
            debug_assert!(false, "create_fixture on missing body {:?}", id);
            return 0;
        };

        let index = body.create_fixture_internal(def);
        if body.is_enabled() {
            let xf = body.xf;
            body.fixtures[index].create_proxies(
                &mut self.contact_manager.broad_phase,
                &xf,
                id,
                index,
            );
        }
        index
    }

    /// Teleport a body. Contacts are refreshed on the next step.
    pub fn set_transform(&mut self, id: BodyId, position: Vec2, angle: f32) {
        debug_assert!(!self.locked);
        if self.locked {
            return;
        }

        let Some(body) = self.bodies.get_mut(id.0).and_then(Option::as_mut) else {
            return;
        };

        body.set_transform_internal(position, angle);
        let xf = body.xf;
        for fixture in body.fixtures.iter_mut() {
            fixture.synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
        }
    }

    /// Replace a fixture's collision filter. Existing contacts are
    /// rechecked on the next step; newly allowed pairs appear through the
    /// refreshed broad-phase proxies.
    pub fn set_filter(&mut self, id: BodyId, fixture_index: usize, filter: Filter) {
        let Some(body) = self.bodies.get_mut(id.0).and_then(Option::as_mut) else {
            return;
        };
        let Some(fixture) = body.fixtures.get_mut(fixture_index) else {
            return;
        };

        fixture.filter = filter;
        fixture.refilter(&mut self.contact_manager.broad_phase);
        self.contact_manager
            .flag_contacts_for_filtering(id, fixture_index);
    }

    /// Enable or disable a body. A disabled body keeps its fixtures but has
    /// no broad-phase presence and no contacts; touching contacts emit End.
    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) {
        debug_assert!(!self.locked);

        let Some(body) = self.bodies.get_mut(id.0).and_then(Option::as_mut) else {
            return;
        };
        if body.is_enabled() == enabled {
            return;
        }

        if enabled {
            body.flags |= BodyFlags::ENABLED;
            let xf = body.xf;
            let fixture_count = body.fixtures.len();
            for index in 0..fixture_count {
                body.fixtures[index].create_proxies(
                    &mut self.contact_manager.broad_phase,
                    &xf,
                    id,
                    index,
                );
            }
        } else {
            body.flags.remove(BodyFlags::ENABLED);
            for fixture in body.fixtures.iter_mut() {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
            self.contact_manager.destroy_body_contacts(id);
        }
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32, velocity_iterations: usize, position_iterations: usize) {
        self.locked = true;

        let step = TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations,
            position_iterations,
            warm_starting: self.warm_starting,
        };

        // Narrow phase: update contacts, emit begin/end events.
        self.contact_manager.collide(&mut self.bodies);

        // Integrate and solve islands.
        if dt > 0.0 {
            self.solve(&step);
        }

        // Broad phase: refresh proxies for moved bodies and pick up newly
        // overlapping pairs so they exist before their first touch.
        for slot in self.bodies.iter_mut() {
            let Some(body) = slot.as_mut() else { continue };
            if body.body_type() == BodyType::Static || !body.is_awake() || !body.is_enabled() {
                continue;
            }
            body.synchronize_fixtures(&mut self.contact_manager.broad_phase);
        }
        self.contact_manager.find_new_contacts(&self.bodies);

        if dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }
        self.locked = false;
    }

    fn solve(&mut self, step: &TimeStep) {
        // Clear island markers from the previous step.
        for slot in self.bodies.iter_mut().flatten() {
            slot.flags.remove(BodyFlags::ISLAND);
        }
        for contact in self.contact_manager.contacts.values_mut() {
            contact.flags.remove(ContactFlags::ISLAND);
        }

        // Contact adjacency per body slot, solid touching contacts only.
        let mut adjacency: Vec<Vec<crate::contact::ContactKey>> =
            vec![Vec::new(); self.bodies.len()];
        for (key, contact) in self.contact_manager.contacts.iter() {
            if !contact.is_touching() || !contact.is_enabled() {
                continue;
            }
            let sensor = self
                .body(contact.end_a.body)
                .map(|b| b.fixtures[contact.end_a.fixture].is_sensor)
                .unwrap_or(true)
                || self
                    .body(contact.end_b.body)
                    .map(|b| b.fixtures[contact.end_b.fixture].is_sensor)
                    .unwrap_or(true);
            if sensor {
                continue;
            }
            adjacency[contact.end_a.body.0].push(*key);
            adjacency[contact.end_b.body.0].push(*key);
        }

        // Depth-first flood from every awake dynamic body not yet assigned
        // to an island.
        let mut stack: Vec<BodyId> = Vec::new();
        for seed in 0..self.bodies.len() {
            let seed_id = BodyId(seed);
            {
                let Some(body) = self.bodies[seed].as_ref() else {
                    continue;
                };
                // The seed can be dynamic or kinematic.
                if body.flags.contains(BodyFlags::ISLAND)
                    || !body.is_awake()
                    || !body.is_enabled()
                    || body.body_type() == BodyType::Static
                {
                    continue;
                }
            }

            self.island.clear();
            stack.clear();
            stack.push(seed_id);
            if let Some(body) = self.bodies[seed].as_mut() {
                body.flags |= BodyFlags::ISLAND;
            }

            while let Some(id) = stack.pop() {
                self.island.add_body(id);

                let is_static = {
                    let Some(body) = self.bodies[id.0].as_mut() else {
                        continue;
                    };
                    // A body touched by an awake island must be simulated.
                    body.flags |= BodyFlags::AWAKE;
                    body.body_type() == BodyType::Static
                };

                // Static bodies participate but do not propagate the flood.
                if is_static {
                    continue;
                }

                for key in &adjacency[id.0] {
                    let Some(contact) = self.contact_manager.contacts.get_mut(key) else {
                        continue;
                    };
                    if contact.flags.contains(ContactFlags::ISLAND) {
                        continue;
                    }
                    contact.flags |= ContactFlags::ISLAND;
                    self.island.add_contact(*key);

                    let other = if contact.end_a.body == id {
                        contact.end_b.body
                    } else {
                        contact.end_a.body
                    };
                    if let Some(other_body) = self.bodies[other.0].as_mut() {
                        if !other_body.flags.contains(BodyFlags::ISLAND) {
                            other_body.flags |= BodyFlags::ISLAND;
                            stack.push(other);
                        }
                    }
                }
            }

            self.island.solve(
                step,
                self.gravity,
                self.allow_sleep,
                &mut self.bodies,
                &mut self.contact_manager.contacts,
            );

            // Allow static bodies to join other islands.
            for i in 0..self.island.bodies.len() {
                let id = self.island.bodies[i];
                if let Some(body) = self.bodies[id.0].as_mut() {
                    if body.body_type() == BodyType::Static {
                        body.flags.remove(BodyFlags::ISLAND);
                    }
                }
            }
        }
    }

    /// Begin/End contact events accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<ContactEvent> {
        self.contact_manager.drain_events()
    }

    /// Cast a ray and return the closest hit, if any. Fixtures marked
    /// raycast-ignored are skipped.
    pub fn ray_cast(&self, p1: Vec2, p2: Vec2) -> Option<RayCastHit> {
        let mut best: Option<RayCastHit> = None;
        let mut max_fraction = 1.0;

        for (slot, body) in self.bodies.iter().enumerate() {
            let Some(body) = body else { continue };
            if !body.is_enabled() {
                continue;
            }
            for (fixture_index, fixture) in body.fixtures.iter().enumerate() {
                if fixture.is_raycast_ignored {
                    continue;
                }
                for child in 0..fixture.shape.child_count() {
                    let input = RayCastInput {
                        p1,
                        p2,
                        max_fraction,
                    };
                    let Some(RayCastOutput { normal, fraction }) =
                        fixture.shape.ray_cast(&input, &body.xf, child)
                    else {
                        continue;
                    };

                    max_fraction = fraction;
                    best = Some(RayCastHit {
                        body: BodyId(slot),
                        fixture: fixture_index,
                        point: p1 + fraction * (p2 - p1),
                        normal,
                        fraction,
                    });
                }
            }
        }

        best
    }

    pub(crate) fn bodies(&self) -> &[Option<Body>] {
        &self.bodies
    }
}
