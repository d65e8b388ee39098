//! Rigid bodies. A body carries position, velocity and mass data plus the
//! fixtures that give it a collision footprint. Bodies live in a slot arena
//! owned by the world and are addressed by [`BodyId`].

use bitflags::bitflags;

use crate::broad_phase::BroadPhase;
use crate::fixture::{Fixture, FixtureDef};
use crate::math::{Sweep, Transform, Vec2};

/// Stable handle to a body slot in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub usize);

/// The body type.
///
/// - Static: zero mass, zero velocity, may be moved manually.
/// - Kinematic: zero mass, velocity set by user, moved by the solver.
/// - Dynamic: positive mass, velocity determined by forces and impulses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyType {
    #[default]
    Static,
    Kinematic,
    Dynamic,
}

bitflags! {
    pub struct BodyFlags: u16 {
        /// Already visited by the current island traversal.
        const ISLAND = 0x0001;
        const AWAKE = 0x0002;
        const AUTO_SLEEP = 0x0004;
        const FIXED_ROTATION = 0x0008;
        const ENABLED = 0x0010;
    }
}

/// Everything needed to construct a body. Definitions can be reused.
#[derive(Clone, Copy, Debug)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    /// Velocity loss per second, in [0, infinity). 0 means no damping.
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Scales the world gravity for this body alone.
    pub gravity_scale: f32,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            gravity_scale: 1.0,
        }
    }
}

pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) flags: BodyFlags,

    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,

    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,

    pub(crate) sleep_time: f32,

    pub(crate) fixtures: Vec<Fixture>,

    /// Slot in the island currently being solved.
    pub(crate) island_index: usize,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let mut flags = BodyFlags::ENABLED;
        if def.allow_sleep {
            flags |= BodyFlags::AUTO_SLEEP;
        }
        if def.awake {
            flags |= BodyFlags::AWAKE;
        }
        if def.fixed_rotation {
            flags |= BodyFlags::FIXED_ROTATION;
        }

        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: def.position,
            c: def.position,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = match def.body_type {
            BodyType::Dynamic => (1.0, 1.0),
            _ => (0.0, 0.0),
        };

        Self {
            body_type: def.body_type,
            flags,
            xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            fixtures: Vec::new(),
            island_index: 0,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.dot(v) > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Apply a force at the center of mass, waking the body.
    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    /// Apply a force at a world point. Off-center forces generate torque.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += (point - self.sweep.c).cross(force);
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    /// Apply an impulse at a world point, changing velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.linear_velocity += self.inv_mass * impulse;
        self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
    }

    pub fn is_awake(&self) -> bool {
        self.flags.contains(BodyFlags::AWAKE)
    }

    pub fn set_awake(&mut self, awake: bool) {
        if awake {
            self.flags |= BodyFlags::AWAKE;
            self.sleep_time = 0.0;
        } else {
            self.flags.remove(BodyFlags::AWAKE);
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.flags.contains(BodyFlags::AUTO_SLEEP)
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(BodyFlags::ENABLED)
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.flags.contains(BodyFlags::FIXED_ROTATION)
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    /// Move the body to a new pose. The broad-phase is refreshed by the
    /// world, which owns it.
    pub(crate) fn set_transform_internal(&mut self, position: Vec2, angle: f32) {
        self.xf = Transform::new(position, angle);
        self.sweep.c = self.xf * self.sweep.local_center;
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    pub(crate) fn create_fixture_internal(&mut self, def: &FixtureDef) -> usize {
        self.fixtures.push(Fixture::new(def));
        self.reset_mass_data();
        self.fixtures.len() - 1
    }

    /// Recompute mass, center of mass and inertia from the fixtures.
    /// Non-dynamic bodies have no mass; a dynamic body with zero-density
    /// fixtures gets unit mass so it still responds to forces.
    pub(crate) fn reset_mass_data(&mut self) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.sweep.local_center = Vec2::ZERO;

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2::ZERO;
        for fixture in &self.fixtures {
            if fixture.density == 0.0 {
                continue;
            }
            let mass_data = fixture.compute_mass();
            self.mass += mass_data.mass;
            local_center += mass_data.mass * mass_data.center;
            self.inertia += mass_data.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if self.inertia > 0.0 && !self.flags.contains(BodyFlags::FIXED_ROTATION) {
            // Shift inertia to the center of mass.
            self.inertia -= self.mass * local_center.dot(local_center);
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        // Keep the center velocity consistent across the center shift.
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf * local_center;
        self.sweep.c0 = self.sweep.c;
        self.linear_velocity +=
            Vec2::scalar_cross(self.angular_velocity, self.sweep.c - old_center);
    }

    /// Rebuild the origin transform from the sweep end state.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q.set_angle(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q * self.sweep.local_center;
    }

    /// Refit broad-phase proxies to cover the swept motion of this step.
    pub(crate) fn synchronize_fixtures(&mut self, broad_phase: &mut BroadPhase) {
        let mut xf1 = Transform::IDENTITY;
        xf1.q.set_angle(self.sweep.a0);
        xf1.p = self.sweep.c0 - xf1.q * self.sweep.local_center;

        let xf2 = self.xf;
        for fixture in self.fixtures.iter_mut() {
            fixture.synchronize(broad_phase, &xf1, &xf2);
        }
    }

    /// Two bodies collide only if at least one of them is dynamic.
    pub(crate) fn should_collide(&self, other: &Body) -> bool {
        self.body_type == BodyType::Dynamic || other.body_type == BodyType::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{CircleShape, PolygonShape, Shape};

    const TOLERANCE: f32 = 1.0e-5;

    fn dynamic_def() -> BodyDef {
        BodyDef {
            body_type: BodyType::Dynamic,
            ..Default::default()
        }
    }

    #[test]
    fn static_body_has_no_mass() {
        let mut body = Body::new(&BodyDef::default());
        let mut def = FixtureDef::new(Shape::Polygon(PolygonShape::as_box(1.0, 1.0)));
        def.density = 5.0;
        body.create_fixture_internal(&def);

        assert_eq!(body.mass(), 0.0);
        assert_eq!(body.inv_mass, 0.0);
    }

    #[test]
    fn dynamic_body_mass_from_fixtures() {
        let mut body = Body::new(&dynamic_def());
        let mut def = FixtureDef::new(Shape::Polygon(PolygonShape::as_box(0.5, 0.5)));
        def.density = 2.0;
        body.create_fixture_internal(&def);

        // 1x1 box at density 2.
        assert!((body.mass() - 2.0).abs() < TOLERANCE);
        assert!((body.inv_mass - 0.5).abs() < TOLERANCE);
        assert!(body.inv_inertia > 0.0);
    }

    #[test]
    fn zero_density_dynamic_body_defaults_to_unit_mass() {
        let mut body = Body::new(&dynamic_def());
        let def = FixtureDef::new(Shape::Circle(CircleShape::new(0.5, Vec2::ZERO).unwrap()));
        body.create_fixture_internal(&def);

        assert_eq!(body.mass(), 1.0);
        assert_eq!(body.inv_mass, 1.0);
    }

    #[test]
    fn fixed_rotation_zeroes_inertia() {
        let mut body = Body::new(&BodyDef {
            fixed_rotation: true,
            ..dynamic_def()
        });
        let mut def = FixtureDef::new(Shape::Polygon(PolygonShape::as_box(1.0, 1.0)));
        def.density = 1.0;
        body.create_fixture_internal(&def);

        assert!(body.mass() > 0.0);
        assert_eq!(body.inv_inertia, 0.0);
    }

    #[test]
    fn offset_fixture_shifts_center_of_mass() {
        let mut body = Body::new(&dynamic_def());
        let mut def = FixtureDef::new(Shape::Circle(
            CircleShape::new(0.5, Vec2::new(2.0, 0.0)).unwrap(),
        ));
        def.density = 1.0;
        body.create_fixture_internal(&def);

        assert!((body.local_center() - Vec2::new(2.0, 0.0)).length() < TOLERANCE);
        assert!((body.world_center() - Vec2::new(2.0, 0.0)).length() < TOLERANCE);
    }

    #[test]
    fn putting_a_body_to_sleep_clears_motion() {
        let mut body = Body::new(&BodyDef {
            linear_velocity: Vec2::new(3.0, 0.0),
            angular_velocity: 1.0,
            ..dynamic_def()
        });

        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.angular_velocity(), 0.0);
    }

    #[test]
    fn static_body_ignores_velocity_and_forces() {
        let mut body = Body::new(&BodyDef::default());
        body.set_linear_velocity(Vec2::new(1.0, 0.0));
        body.apply_force_to_center(Vec2::new(10.0, 0.0));

        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.force, Vec2::ZERO);
    }
}
