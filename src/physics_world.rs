//! Game-facing physics facade. Works in screen pixels with y growing
//! downward, converts to the meter-space simulation world underneath, and
//! dispatches collision callbacks between typed entities.

use std::collections::HashMap;
use std::hash::Hash;

use log::{debug, trace};

use crate::body::{BodyDef, BodyId, BodyType};
use crate::contact::ContactEnd;
use crate::contact_manager::ContactEvent;
use crate::fixture::FixtureDef;
use crate::hit_box::{BoundingShape, HitBox};
use crate::math::Vec2;
use crate::shape::{ChainKind, ChainShape, CircleShape, PolygonShape, Shape, ShapeError};
use crate::world::World;

/// Fixed simulation step, in seconds.
pub const FIXED_STEP: f32 = 1.0 / 60.0;

const VELOCITY_ITERATIONS: usize = 8;
const POSITION_ITERATIONS: usize = 3;

/// Handle to an entity registered with the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

/// Everything needed to register an entity. Position is the entity's
/// top-left corner in pixels; rotation is degrees clockwise.
#[derive(Clone, Debug)]
pub struct EntityDef<T> {
    pub entity_type: T,
    pub position: Vec2,
    pub rotation: f32,
    pub body_type: BodyType,
    pub hit_boxes: Vec<HitBox>,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub is_sensor: bool,
    pub is_raycast_ignored: bool,
    pub fixed_rotation: bool,
}

impl<T> EntityDef<T> {
    pub fn new(entity_type: T, position: Vec2) -> Self {
        Self {
            entity_type,
            position,
            rotation: 0.0,
            body_type: BodyType::Static,
            hit_boxes: Vec::new(),
            density: 0.5,
            friction: 0.25,
            restitution: 0.0,
            is_sensor: false,
            is_raycast_ignored: false,
            fixed_rotation: false,
        }
    }
}

/// Collision callbacks between two entity types. `type_a`/`type_b` declare
/// the pair the handler is interested in; callbacks always receive the
/// entities in declared order, regardless of which side initiated contact.
pub trait CollisionHandler<T> {
    fn type_a(&self) -> T;
    fn type_b(&self) -> T;

    /// A pair of named hit boxes started a new overlap between the two
    /// entities; fired once per newly-begun overlap. For sensor fixtures
    /// this is the only callback that fires.
    fn on_hit_box_trigger(&mut self, _a: EntityId, _b: EntityId, _box_a: &HitBox, _box_b: &HitBox) {
    }
    /// The entity pair started colliding (first touching hit box pair).
    /// Not fired for sensor overlaps.
    fn on_collision_begin(&mut self, _a: EntityId, _b: EntityId) {}
    /// Fired once per update while the pair stays in collision, including
    /// the update in which the collision began.
    fn on_collision(&mut self, _a: EntityId, _b: EntityId) {}
    /// The entity pair stopped colliding (last touching hit box pair ended).
    fn on_collision_end(&mut self, _a: EntityId, _b: EntityId) {}
}

/// Result of a pixel-space ray cast. A miss is a result, not an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct RaycastResult {
    pub entity: Option<EntityId>,
    pub point: Option<Vec2>,
}

struct EntityRecord<T> {
    entity_type: T,
    body: BodyId,
    hit_boxes: Vec<HitBox>,
    /// Pixel-space bounding box extent over all hit boxes.
    size: Vec2,
}

/// An entity pair currently in collision. Entities are stored in handler
/// dispatch order; `touching` counts the hit box pairs holding it alive.
struct ActiveCollision {
    a: EntityId,
    b: EntityId,
    touching: usize,
}

pub struct PhysicsWorld<T> {
    world: World,
    pixels_per_meter: f32,
    app_height: f32,
    accumulator: f32,
    next_entity: u32,
    entities: HashMap<EntityId, EntityRecord<T>>,
    body_to_entity: HashMap<BodyId, EntityId>,
    handlers: Vec<Box<dyn CollisionHandler<T>>>,
    active: Vec<ActiveCollision>,
    pending_add: Vec<(EntityId, EntityDef<T>)>,
    pending_remove: Vec<EntityId>,
}

impl<T: Copy + Eq + Hash> PhysicsWorld<T> {
    /// `app_height` is the screen height in pixels, used to flip the y axis;
    /// `pixels_per_meter` sets the scale (a typical value is 50).
    pub fn new(app_height: f32, pixels_per_meter: f32) -> Self {
        debug!(
            "physics world initialized: appHeight={}, ppm={}",
            app_height, pixels_per_meter
        );
        Self {
            world: World::new(Vec2::ZERO),
            pixels_per_meter,
            app_height,
            accumulator: 0.0,
            next_entity: 0,
            entities: HashMap::new(),
            body_to_entity: HashMap::new(),
            handlers: Vec::new(),
            active: Vec::new(),
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
        }
    }

    // Unit conversions. Pixel space has y growing downward from the top of
    // the screen; meter space has y growing upward.

    pub fn to_meters(&self, pixels: f32) -> f32 {
        pixels / self.pixels_per_meter
    }

    pub fn to_pixels(&self, meters: f32) -> f32 {
        meters * self.pixels_per_meter
    }

    /// Convert a pixel-space point to a meter-space point, flipping y about
    /// the bottom of the screen.
    pub fn to_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.to_meters(p.x), self.to_meters(self.app_height - p.y))
    }

    pub fn to_pixel_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.to_pixels(p.x), self.app_height - self.to_pixels(p.y))
    }

    /// Convert a pixel-space vector (a direction, not a position) to meter
    /// space: only the y sign flips.
    pub fn to_vector(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.to_meters(v.x), -self.to_meters(v.y))
    }

    pub fn to_pixel_vector(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.to_pixels(v.x), -self.to_pixels(v.y))
    }

    /// Set gravity from a pixel-space vector (positive y pulls down the
    /// screen).
    pub fn set_gravity(&mut self, gx: f32, gy: f32) {
        self.world.set_gravity(self.to_vector(Vec2::new(gx, gy)));
    }

    /// Gravity in meter space, as stored by the simulation.
    pub fn gravity_meters(&self) -> Vec2 {
        self.world.gravity()
    }

    /// Register an entity. Shape validation happens up front, so a deferred
    /// add can no longer fail. Returns the entity handle.
    pub fn add_entity(&mut self, def: EntityDef<T>) -> Result<EntityId, ShapeError> {
        let size = entity_size(&def.hit_boxes);
        for hit_box in &def.hit_boxes {
            self.make_shape(hit_box, size)?;
        }

        let id = EntityId(self.next_entity);
        self.next_entity += 1;

        if self.world.is_locked() {
            trace!("deferring add of entity {:?}", id);
            self.pending_add.push((id, def));
        } else {
            self.spawn(id, def);
        }
        Ok(id)
    }

    /// Remove an entity. All callbacks involving it stop immediately; no
    /// End is delivered for its active collisions.
    pub fn remove_entity(&mut self, id: EntityId) {
        if self.world.is_locked() {
            trace!("deferring removal of entity {:?}", id);
            self.pending_remove.push(id);
        } else {
            self.despawn(id);
        }
    }

    /// Register a collision handler. Registration is order-insensitive: a
    /// handler for (A, B) also matches (B, A) pairs. Registering another
    /// handler for the same pair replaces the previous one.
    pub fn add_collision_handler(&mut self, handler: Box<dyn CollisionHandler<T>>) {
        let ta = handler.type_a();
        let tb = handler.type_b();
        self.handlers.retain(|h| {
            !((h.type_a() == ta && h.type_b() == tb) || (h.type_a() == tb && h.type_b() == ta))
        });
        self.handlers.push(handler);
    }

    /// Remove the handler for a type pair, in either declaration order.
    /// Active collisions for the pair stop producing callbacks.
    pub fn remove_collision_handler(&mut self, type_a: T, type_b: T) {
        self.handlers.retain(|h| {
            !((h.type_a() == type_a && h.type_b() == type_b)
                || (h.type_a() == type_b && h.type_b() == type_a))
        });
    }

    pub fn entity_type(&self, id: EntityId) -> Option<T> {
        self.entities.get(&id).map(|r| r.entity_type)
    }

    /// Top-left corner of the entity in pixels, after simulation.
    pub fn entity_position(&self, id: EntityId) -> Option<Vec2> {
        let record = self.entities.get(&id)?;
        let body = self.world.body(record.body)?;
        let center_px = self.to_pixel_point(body.position());
        Some(center_px - 0.5 * record.size)
    }

    /// Entity rotation in degrees clockwise.
    pub fn entity_rotation(&self, id: EntityId) -> Option<f32> {
        let record = self.entities.get(&id)?;
        let body = self.world.body(record.body)?;
        Some(-body.angle().to_degrees())
    }

    /// Teleport an entity to a new pixel-space top-left position.
    pub fn set_entity_position(&mut self, id: EntityId, position: Vec2) {
        let Some(record) = self.entities.get(&id) else {
            return;
        };
        let body = record.body;
        let center = self.to_point(position + 0.5 * record.size);
        let angle = self
            .world
            .body(body)
            .map(|b| b.angle())
            .unwrap_or_default();
        self.world.set_transform(body, center, angle);
    }

    pub fn set_entity_rotation(&mut self, id: EntityId, degrees: f32) {
        let Some(record) = self.entities.get(&id) else {
            return;
        };
        let body = record.body;
        let position = self
            .world
            .body(body)
            .map(|b| b.position())
            .unwrap_or_default();
        self.world.set_transform(body, position, -degrees.to_radians());
    }

    /// Set the entity's velocity in pixels per second.
    pub fn set_entity_velocity(&mut self, id: EntityId, velocity: Vec2) {
        let Some(record) = self.entities.get(&id) else {
            return;
        };
        let v = self.to_vector(velocity);
        if let Some(body) = self.world.body_mut(record.body) {
            body.set_linear_velocity(v);
        }
    }

    /// Toggle whether the entity participates in collision. Deactivating an
    /// entity mid-collision delivers End on the next update.
    pub fn set_entity_active(&mut self, id: EntityId, active: bool) {
        let Some(record) = self.entities.get(&id) else {
            return;
        };
        self.world.set_enabled(record.body, active);
    }

    /// Advance the simulation by `tpf` seconds of wall time; runs zero or
    /// more fixed steps and dispatches collision callbacks after each.
    pub fn on_update(&mut self, tpf: f32) {
        self.accumulator += tpf;

        while self.accumulator >= FIXED_STEP {
            self.accumulator -= FIXED_STEP;

            self.world
                .step(FIXED_STEP, VELOCITY_ITERATIONS, POSITION_ITERATIONS);
            self.flush_pending();

            let events = self.world.drain_events();
            self.process_events(events);
            self.notify_collisions();
        }
    }

    /// Cast a ray between two pixel-space points and return the closest
    /// entity hit, skipping raycast-ignored fixtures.
    pub fn raycast(&self, start: Vec2, end: Vec2) -> RaycastResult {
        let hit = self.world.ray_cast(self.to_point(start), self.to_point(end));

        match hit {
            Some(hit) => RaycastResult {
                entity: self.body_to_entity.get(&hit.body).copied(),
                point: Some(self.to_pixel_point(hit.point)),
            },
            None => RaycastResult::default(),
        }
    }

    fn flush_pending(&mut self) {
        let removals: Vec<_> = self.pending_remove.drain(..).collect();
        for id in removals {
            self.despawn(id);
        }
        let additions: Vec<_> = self.pending_add.drain(..).collect();
        for (id, def) in additions {
            self.spawn(id, def);
        }
    }

    fn spawn(&mut self, id: EntityId, def: EntityDef<T>) {
        let size = entity_size(&def.hit_boxes);
        let center = def.position + 0.5 * size;

        let body = self.world.create_body(&BodyDef {
            body_type: def.body_type,
            position: self.to_point(center),
            angle: -def.rotation.to_radians(),
            fixed_rotation: def.fixed_rotation,
            ..Default::default()
        });

        for (index, hit_box) in def.hit_boxes.iter().enumerate() {
            // Already validated in add_entity.
            let Ok(shape) = self.make_shape(hit_box, size) else {
                continue;
            };
            let mut fixture_def = FixtureDef::new(shape);
            fixture_def.density = def.density;
            fixture_def.friction = def.friction;
            fixture_def.restitution = def.restitution;
            fixture_def.is_sensor = def.is_sensor;
            fixture_def.is_raycast_ignored = def.is_raycast_ignored;
            fixture_def.hit_box_index = index;
            self.world.create_fixture(body, &fixture_def);
        }

        trace!("entity {:?} spawned with {} hit boxes", id, def.hit_boxes.len());
        self.entities.insert(
            id,
            EntityRecord {
                entity_type: def.entity_type,
                body,
                hit_boxes: def.hit_boxes,
                size,
            },
        );
        self.body_to_entity.insert(body, id);
    }

    fn despawn(&mut self, id: EntityId) {
        let Some(record) = self.entities.remove(&id) else {
            return;
        };
        self.body_to_entity.remove(&record.body);
        self.world.destroy_body(record.body);

        // Drop active collisions silently: a removed entity produces no
        // further callbacks, End included.
        self.active.retain(|c| c.a != id && c.b != id);
        trace!("entity {:?} removed", id);
    }

    /// Build the meter-space fixture shape for a hit box, positioned
    /// relative to the body center (the entity's pixel-space bbox center).
    fn make_shape(&self, hit_box: &HitBox, entity_size: Vec2) -> Result<Shape, ShapeError> {
        let entity_center = 0.5 * entity_size;
        // Pixel offsets flip y when entering meter space.
        let offset_px = hit_box.center() - entity_center;
        let offset = Vec2::new(self.to_meters(offset_px.x), -self.to_meters(offset_px.y));

        match &hit_box.shape {
            BoundingShape::Box { width, height } => Ok(Shape::Polygon(
                PolygonShape::as_oriented_box(
                    self.to_meters(0.5 * width),
                    self.to_meters(0.5 * height),
                    offset,
                    0.0,
                ),
            )),
            BoundingShape::Circle { radius } => Ok(Shape::Circle(CircleShape::new(
                self.to_meters(*radius),
                offset,
            )?)),
            BoundingShape::Polygon(points) => {
                let vertices = self.local_vertices(hit_box, entity_center, points);
                Ok(Shape::Polygon(PolygonShape::new(&vertices)?))
            }
            BoundingShape::Chain(points) => {
                let vertices = self.local_vertices(hit_box, entity_center, points);
                Ok(Shape::Chain(ChainShape::new(ChainKind::Open, &vertices)?))
            }
        }
    }

    fn local_vertices(&self, hit_box: &HitBox, entity_center: Vec2, points: &[Vec2]) -> Vec<Vec2> {
        points
            .iter()
            .map(|p| {
                let px = hit_box.local_origin + *p - entity_center;
                Vec2::new(self.to_meters(px.x), -self.to_meters(px.y))
            })
            .collect()
    }

    /// Resolve a contact endpoint to its entity, the hit box involved and
    /// whether the fixture is a sensor.
    fn resolve(&self, end: &ContactEnd) -> Option<(EntityId, usize, bool)> {
        let entity = *self.body_to_entity.get(&end.body)?;
        let body = self.world.body(end.body)?;
        let fixture = body.fixtures().get(end.fixture)?;
        Some((entity, fixture.hit_box_index, fixture.is_sensor))
    }

    fn process_events(&mut self, events: Vec<ContactEvent>) {
        // Handlers are moved out so they can borrow themselves mutably
        // while we read the registry.
        let mut handlers = std::mem::take(&mut self.handlers);

        for event in events {
            match event {
                ContactEvent::Begin { a, b } => {
                    let (Some((entity_a, box_a, sensor_a)), Some((entity_b, box_b, sensor_b))) =
                        (self.resolve(&a), self.resolve(&b))
                    else {
                        continue;
                    };
                    if entity_a == entity_b {
                        continue;
                    }
                    let (Some(type_a), Some(type_b)) =
                        (self.entity_type(entity_a), self.entity_type(entity_b))
                    else {
                        continue;
                    };

                    let Some((index, flipped)) = handler_index(&handlers, type_a, type_b) else {
                        continue;
                    };
                    let (entity_a, entity_b, box_a, box_b) = if flipped {
                        (entity_b, entity_a, box_b, box_a)
                    } else {
                        (entity_a, entity_b, box_a, box_b)
                    };

                    // A sensor overlap reports through the hit box trigger
                    // alone; the collision lifecycle is reserved for solid
                    // contacts.
                    if sensor_a || sensor_b {
                        let hit_box_a = &self.entities[&entity_a].hit_boxes[box_a];
                        let hit_box_b = &self.entities[&entity_b].hit_boxes[box_b];
                        handlers[index]
                            .on_hit_box_trigger(entity_a, entity_b, hit_box_a, hit_box_b);
                        continue;
                    }

                    match self
                        .active
                        .iter_mut()
                        .find(|c| pair_matches(c, entity_a, entity_b))
                    {
                        // Another hit box pair of an already colliding
                        // entity pair; no new callbacks.
                        Some(collision) => collision.touching += 1,
                        None => {
                            self.active.push(ActiveCollision {
                                a: entity_a,
                                b: entity_b,
                                touching: 1,
                            });
                            let hit_box_a = &self.entities[&entity_a].hit_boxes[box_a];
                            let hit_box_b = &self.entities[&entity_b].hit_boxes[box_b];
                            handlers[index]
                                .on_hit_box_trigger(entity_a, entity_b, hit_box_a, hit_box_b);
                            handlers[index].on_collision_begin(entity_a, entity_b);
                        }
                    }
                }
                ContactEvent::End { a, b } => {
                    let (Some((entity_a, _, _)), Some((entity_b, _, _))) =
                        (self.resolve(&a), self.resolve(&b))
                    else {
                        continue;
                    };
                    let Some(position) = self
                        .active
                        .iter()
                        .position(|c| pair_matches(c, entity_a, entity_b))
                    else {
                        continue;
                    };

                    self.active[position].touching -= 1;
                    if self.active[position].touching > 0 {
                        continue;
                    }
                    let collision = self.active.remove(position);

                    let (Some(type_a), Some(type_b)) =
                        (self.entity_type(collision.a), self.entity_type(collision.b))
                    else {
                        continue;
                    };
                    if let Some((index, _)) = handler_index(&handlers, type_a, type_b) {
                        handlers[index].on_collision_end(collision.a, collision.b);
                    }
                }
            }
        }

        debug_assert!(self.handlers.is_empty());
        self.handlers = handlers;
    }

    /// Fire `on_collision` for every pair still in collision, in the order
    /// the collisions began.
    fn notify_collisions(&mut self) {
        let mut handlers = std::mem::take(&mut self.handlers);

        for collision in &self.active {
            let (Some(type_a), Some(type_b)) =
                (self.entity_type(collision.a), self.entity_type(collision.b))
            else {
                continue;
            };
            // The pair is stored in dispatch order already.
            if let Some((index, _)) = handler_index(&handlers, type_a, type_b) {
                handlers[index].on_collision(collision.a, collision.b);
            }
        }

        self.handlers = handlers;
    }
}

fn pair_matches(collision: &ActiveCollision, a: EntityId, b: EntityId) -> bool {
    (collision.a == a && collision.b == b) || (collision.a == b && collision.b == a)
}

/// Find the handler matching a type pair, trying both orders. Returns the
/// handler index and whether the event order must be flipped to match the
/// declared order.
fn handler_index<T: Copy + Eq>(
    handlers: &[Box<dyn CollisionHandler<T>>],
    type_a: T,
    type_b: T,
) -> Option<(usize, bool)> {
    for (index, handler) in handlers.iter().enumerate() {
        if handler.type_a() == type_a && handler.type_b() == type_b {
            return Some((index, false));
        }
        if handler.type_a() == type_b && handler.type_b() == type_a {
            return Some((index, true));
        }
    }
    None
}

/// Pixel-space bounding box extent over a set of hit boxes.
fn entity_size(hit_boxes: &[HitBox]) -> Vec2 {
    let mut size = Vec2::ZERO;
    for hit_box in hit_boxes {
        size = size.max(hit_box.local_origin + hit_box.shape.size());
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1.0e-5;

    fn world() -> PhysicsWorld<u8> {
        PhysicsWorld::new(600.0, 50.0)
    }

    #[test]
    fn point_conversion_flips_y_about_app_height() {
        let pw = world();
        let p = pw.to_point(Vec2::new(100.0, 50.0));
        assert!((p.x - 2.0).abs() < TOLERANCE);
        assert!((p.y - 11.0).abs() < TOLERANCE);
    }

    #[test]
    fn vector_conversion_negates_y() {
        let pw = world();
        let v = pw.to_vector(Vec2::new(100.0, 50.0));
        assert!((v.x - 2.0).abs() < TOLERANCE);
        assert!((v.y - -1.0).abs() < TOLERANCE);
    }

    #[test]
    fn point_round_trip() {
        let pw = world();
        let original = Vec2::new(123.0, 456.0);
        let back = pw.to_pixel_point(pw.to_point(original));
        assert!((back - original).length() < 1.0e-3);
    }

    #[test]
    fn gravity_is_stored_in_meters() {
        let mut pw = world();
        pw.set_gravity(50.0, 10.0);
        let g = pw.gravity_meters();
        assert!((g.x - 1.0).abs() < TOLERANCE);
        assert!((g.y - -0.2).abs() < TOLERANCE);
    }

    #[test]
    fn entity_position_survives_registration() {
        let mut pw = world();
        let mut def = EntityDef::new(0u8, Vec2::new(100.0, 200.0));
        def.hit_boxes
            .push(HitBox::new("BODY", BoundingShape::boxed(40.0, 40.0)));
        let id = pw.add_entity(def).unwrap();

        let position = pw.entity_position(id).unwrap();
        assert!((position - Vec2::new(100.0, 200.0)).length() < 1.0e-3);
        assert_eq!(pw.entity_rotation(id), Some(0.0));
    }

    #[test]
    fn degenerate_hit_box_is_rejected() {
        let mut pw = world();
        let mut def = EntityDef::new(0u8, Vec2::ZERO);
        def.hit_boxes
            .push(HitBox::new("BAD", BoundingShape::circle(0.0)));
        assert!(pw.add_entity(def).is_err());
    }

    #[test]
    fn handler_registration_is_last_wins() {
        struct Named(u8, u8);
        impl CollisionHandler<u8> for Named {
            fn type_a(&self) -> u8 {
                self.0
            }
            fn type_b(&self) -> u8 {
                self.1
            }
        }

        let mut pw = world();
        pw.add_collision_handler(Box::new(Named(1, 2)));
        // Reversed declaration replaces the original.
        pw.add_collision_handler(Box::new(Named(2, 1)));
        assert_eq!(pw.handlers.len(), 1);
        assert_eq!(pw.handlers[0].type_a(), 2);

        pw.remove_collision_handler(1, 2);
        assert!(pw.handlers.is_empty());
    }
}
