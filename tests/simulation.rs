//! End-to-end facade tests: entities with hit boxes, fixed-step updates and
//! collision handler dispatch, all in screen-pixel coordinates.

use std::cell::RefCell;
use std::rc::Rc;

use pulse2d::{
    BodyType, BoundingShape, CollisionHandler, EntityDef, EntityId, HitBox, PhysicsWorld, Vec2,
    FIXED_STEP,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum EntityType {
    Player,
    Wall,
}

#[derive(Default)]
struct Counts {
    trigger: usize,
    begin: usize,
    collision: usize,
    end: usize,
    box_names: Vec<(String, String)>,
    arg_order: Vec<(EntityId, EntityId)>,
}

struct Recorder {
    counts: Rc<RefCell<Counts>>,
}

impl CollisionHandler<EntityType> for Recorder {
    fn type_a(&self) -> EntityType {
        EntityType::Player
    }

    fn type_b(&self) -> EntityType {
        EntityType::Wall
    }

    fn on_hit_box_trigger(&mut self, a: EntityId, b: EntityId, box_a: &HitBox, box_b: &HitBox) {
        let mut counts = self.counts.borrow_mut();
        counts.trigger += 1;
        counts.box_names.push((box_a.name.clone(), box_b.name.clone()));
        counts.arg_order.push((a, b));
    }

    fn on_collision_begin(&mut self, a: EntityId, b: EntityId) {
        let mut counts = self.counts.borrow_mut();
        counts.begin += 1;
        counts.arg_order.push((a, b));
    }

    fn on_collision(&mut self, _a: EntityId, _b: EntityId) {
        self.counts.borrow_mut().collision += 1;
    }

    fn on_collision_end(&mut self, _a: EntityId, _b: EntityId) {
        self.counts.borrow_mut().end += 1;
    }
}

fn dynamic_box(entity_type: EntityType, position: Vec2, name: &str) -> EntityDef<EntityType> {
    let mut def = EntityDef::new(entity_type, position);
    def.body_type = BodyType::Dynamic;
    def.hit_boxes
        .push(HitBox::new(name, BoundingShape::boxed(40.0, 40.0)));
    def
}

fn wall_at(position: Vec2) -> EntityDef<EntityType> {
    let mut def = EntityDef::new(EntityType::Wall, position);
    def.hit_boxes
        .push(HitBox::new("WALL", BoundingShape::boxed(40.0, 40.0)));
    def
}

fn recording_world() -> (PhysicsWorld<EntityType>, Rc<RefCell<Counts>>) {
    let mut pw = PhysicsWorld::new(600.0, 50.0);
    let counts = Rc::new(RefCell::new(Counts::default()));
    pw.add_collision_handler(Box::new(Recorder {
        counts: counts.clone(),
    }));
    (pw, counts)
}

/// Spawns a solid box and a wall 50 px apart, teleports them into overlap
/// and checks the callback sequence over individual fixed steps.
#[test]
fn collision_lifecycle_dispatches_each_callback_once() {
    let (mut pw, counts) = recording_world();

    // Wall is registered first; dispatch order must still be declaration
    // order (player first).
    let wall = pw.add_entity(wall_at(Vec2::new(190.0, 100.0))).unwrap();
    let player = pw
        .add_entity(dynamic_box(EntityType::Player, Vec2::new(100.0, 100.0), "BODY"))
        .unwrap();

    for _ in 0..3 {
        pw.on_update(FIXED_STEP);
    }
    assert_eq!(counts.borrow().begin, 0, "50 px apart must not collide");

    // 10 px of overlap with the wall.
    pw.set_entity_position(player, Vec2::new(160.0, 100.0));

    // First step discovers the pair, second step reports it.
    pw.on_update(FIXED_STEP);
    assert_eq!(counts.borrow().begin, 0);
    pw.on_update(FIXED_STEP);
    {
        let counts = counts.borrow();
        assert_eq!(counts.trigger, 1);
        assert_eq!(counts.begin, 1);
        assert_eq!(counts.collision, 1, "first colliding step also notifies");
        assert_eq!(counts.end, 0);
        assert_eq!(counts.box_names[0], ("BODY".to_string(), "WALL".to_string()));
        for (a, b) in &counts.arg_order {
            assert_eq!((*a, *b), (player, wall));
        }
    }

    // The resting contact persists within slop, so the pair notifies once
    // per step with no new begin.
    pw.on_update(FIXED_STEP);
    assert_eq!(counts.borrow().begin, 1);
    assert_eq!(counts.borrow().collision, 2);

    // Separate and expect exactly one end.
    pw.set_entity_position(player, Vec2::new(400.0, 100.0));
    pw.on_update(FIXED_STEP);
    pw.on_update(FIXED_STEP);
    {
        let counts = counts.borrow();
        assert_eq!(counts.end, 1);
        assert_eq!(counts.begin, 1);
        assert_eq!(counts.collision, 2, "no notify after separation");
    }
}

/// A sensor overlap reports through the hit box trigger only: no begin, no
/// per-step notify, no end.
#[test]
fn sensor_overlap_fires_only_the_trigger() {
    let (mut pw, counts) = recording_world();

    pw.add_entity(wall_at(Vec2::new(130.0, 100.0))).unwrap();
    let mut sensor = dynamic_box(EntityType::Player, Vec2::new(100.0, 100.0), "SENSOR");
    sensor.is_sensor = true;
    let sensor = pw.add_entity(sensor).unwrap();

    for _ in 0..4 {
        pw.on_update(FIXED_STEP);
    }
    {
        let counts = counts.borrow();
        assert_eq!(counts.trigger, 1);
        assert_eq!(counts.begin, 0);
        assert_eq!(counts.collision, 0);
        assert_eq!(counts.box_names[0].0, "SENSOR");
    }

    pw.set_entity_position(sensor, Vec2::new(400.0, 100.0));
    pw.on_update(FIXED_STEP);
    pw.on_update(FIXED_STEP);
    assert_eq!(counts.borrow().end, 0, "sensor overlaps have no lifecycle");
}

/// Two hit boxes of one entity overlapping the same wall still make a
/// single entity-pair collision: one trigger, one begin, one end.
#[test]
fn multiple_hit_boxes_make_one_collision() {
    let (mut pw, counts) = recording_world();

    let mut wall = EntityDef::new(EntityType::Wall, Vec2::new(130.0, 100.0));
    wall.hit_boxes
        .push(HitBox::new("WALL", BoundingShape::boxed(40.0, 80.0)));
    pw.add_entity(wall).unwrap();

    let mut player = EntityDef::new(EntityType::Player, Vec2::new(100.0, 100.0));
    player.body_type = BodyType::Dynamic;
    player
        .hit_boxes
        .push(HitBox::new("HEAD", BoundingShape::boxed(40.0, 40.0)));
    player.hit_boxes.push(HitBox::with_origin(
        "BODY",
        Vec2::new(0.0, 40.0),
        BoundingShape::boxed(40.0, 40.0),
    ));
    let player = pw.add_entity(player).unwrap();

    // Both hit box pairs begin on the same step.
    pw.on_update(FIXED_STEP);
    pw.on_update(FIXED_STEP);
    {
        let counts = counts.borrow();
        assert_eq!(counts.trigger, 1, "trigger fires once per entity pair");
        assert_eq!(counts.begin, 1);
        assert_eq!(counts.collision, 1);
    }

    pw.set_entity_position(player, Vec2::new(400.0, 100.0));
    pw.on_update(FIXED_STEP);
    pw.on_update(FIXED_STEP);
    // End only when the last touching hit box pair separates.
    assert_eq!(counts.borrow().end, 1);
}

#[test]
fn removing_the_handler_stops_callbacks() {
    let (mut pw, counts) = recording_world();

    pw.add_entity(wall_at(Vec2::new(130.0, 100.0))).unwrap();
    pw.add_entity(dynamic_box(EntityType::Player, Vec2::new(100.0, 100.0), "BODY"))
        .unwrap();

    pw.on_update(FIXED_STEP);
    pw.on_update(FIXED_STEP);
    assert_eq!(counts.borrow().begin, 1);

    // Removal works with the types in either order.
    pw.remove_collision_handler(EntityType::Wall, EntityType::Player);

    for _ in 0..5 {
        pw.on_update(FIXED_STEP);
    }
    assert_eq!(counts.borrow().collision, 1);
    assert_eq!(counts.borrow().end, 0);
}

#[test]
fn removing_an_entity_stops_callbacks_without_end() {
    let (mut pw, counts) = recording_world();

    let wall = pw.add_entity(wall_at(Vec2::new(130.0, 100.0))).unwrap();
    pw.add_entity(dynamic_box(EntityType::Player, Vec2::new(100.0, 100.0), "BODY"))
        .unwrap();

    pw.on_update(FIXED_STEP);
    pw.on_update(FIXED_STEP);
    assert_eq!(counts.borrow().begin, 1);

    pw.remove_entity(wall);
    for _ in 0..5 {
        pw.on_update(FIXED_STEP);
    }
    assert_eq!(counts.borrow().collision, 1);
    assert_eq!(counts.borrow().end, 0, "removed entities fire no end");
}

#[test]
fn deactivating_an_entity_fires_collision_end() {
    let (mut pw, counts) = recording_world();

    let wall = pw.add_entity(wall_at(Vec2::new(130.0, 100.0))).unwrap();
    pw.add_entity(dynamic_box(EntityType::Player, Vec2::new(100.0, 100.0), "BODY"))
        .unwrap();

    pw.on_update(FIXED_STEP);
    pw.on_update(FIXED_STEP);
    assert_eq!(counts.borrow().begin, 1);

    pw.set_entity_active(wall, false);
    pw.on_update(FIXED_STEP);
    assert_eq!(counts.borrow().end, 1);
}

#[test]
fn gravity_pulls_entities_down_the_screen() {
    let mut pw: PhysicsWorld<EntityType> = PhysicsWorld::new(600.0, 50.0);
    // 500 px/s^2 down the screen, i.e. (0, -10) in meters.
    pw.set_gravity(0.0, 500.0);

    let id = pw
        .add_entity(dynamic_box(EntityType::Player, Vec2::new(100.0, 100.0), "BODY"))
        .unwrap();

    pw.on_update(1.0);

    let position = pw.entity_position(id).unwrap();
    assert!((position.x - 100.0).abs() < 1.0e-3);
    assert!(position.y > 300.0, "fell less than expected: {}", position.y);
}

#[test]
fn raycast_returns_closest_hit_in_pixels() {
    let mut pw: PhysicsWorld<EntityType> = PhysicsWorld::new(600.0, 50.0);

    let mut near = EntityDef::new(EntityType::Wall, Vec2::new(100.0, 290.0));
    near.is_raycast_ignored = true;
    near.hit_boxes
        .push(HitBox::new("NEAR", BoundingShape::boxed(20.0, 20.0)));
    pw.add_entity(near).unwrap();

    let mut far = EntityDef::new(EntityType::Wall, Vec2::new(200.0, 290.0));
    far.hit_boxes
        .push(HitBox::new("FAR", BoundingShape::boxed(20.0, 20.0)));
    let far = pw.add_entity(far).unwrap();

    let result = pw.raycast(Vec2::new(0.0, 300.0), Vec2::new(400.0, 300.0));
    assert_eq!(result.entity, Some(far), "ignored entity must be skipped");
    let point = result.point.unwrap();
    assert!((point.x - 200.0).abs() < 1.0e-2, "hit at x = {}", point.x);
    assert!((point.y - 300.0).abs() < 1.0e-2);

    let miss = pw.raycast(Vec2::new(0.0, 100.0), Vec2::new(400.0, 100.0));
    assert!(miss.entity.is_none());
    assert!(miss.point.is_none());
}
