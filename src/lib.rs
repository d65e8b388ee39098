//! 2D rigid body physics with a pixel-space game facade.
//!
//! The simulation core lives in [`world`]: rigid bodies carrying convex
//! fixtures, a fat-AABB broad phase, persistent contacts and a sequential
//! impulse solver. [`physics_world`] wraps it for games: entities with named
//! hit boxes, screen-pixel coordinates with y growing downward, and typed
//! collision handlers dispatched on a fixed timestep.

pub mod body;
pub mod broad_phase;
pub mod collide;
pub mod collision;
pub mod contact;
pub mod contact_manager;
pub mod contact_solver;
pub mod fixture;
pub mod hit_box;
pub mod island;
pub mod math;
pub mod physics_world;
pub mod settings;
pub mod shape;
pub mod time_step;
pub mod world;

pub use body::{Body, BodyDef, BodyId, BodyType};
pub use collision::{Aabb, Manifold, ManifoldType, WorldManifold};
pub use contact_manager::ContactEvent;
pub use fixture::{Filter, Fixture, FixtureDef};
pub use hit_box::{BoundingShape, HitBox};
pub use math::{Mat2x2, Rot, Transform, Vec2};
pub use physics_world::{
    CollisionHandler, EntityDef, EntityId, PhysicsWorld, RaycastResult, FIXED_STEP,
};
pub use shape::{
    ChainKind, ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeError,
};
pub use world::{RayCastHit, World};
