//! Global tuning constants based on meters-kilograms-seconds (MKS) units.

/// The maximum number of contact points between two convex shapes. Do
/// not change this value.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// The maximum number of vertices on a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// This is used to fatten AABBs in the broad-phase. This allows proxies
/// to move by a small amount without triggering a pair update.
/// This is in meters.
pub const AABB_EXTENSION: f32 = 0.1;

/// This is used to fatten AABBs in the broad-phase. This is used to predict
/// the future position based on the current displacement.
/// This is a dimensionless multiplier.
pub const AABB_MULTIPLIER: f32 = 4.0;

/// A small length used as a collision and constraint tolerance. Usually it is
/// chosen to be numerically significant, but visually insignificant. In meters.
pub const LINEAR_SLOP: f32 = 0.005;

/// The radius of the polygon/edge shape skin. This should not be modified.
/// Making it larger may create artifacts for vertex collision.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// A velocity threshold for elastic collisions. Any collision with a relative
/// linear velocity below this threshold will be treated as inelastic.
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// The maximum linear position correction used when solving constraints. This
/// helps to prevent overshoot. Meters.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// The maximum linear translation of a body per step. This limit is very
/// large and is used to prevent numerical problems. You shouldn't need to
/// adjust this. Meters.
pub const MAX_TRANSLATION: f32 = 2.0;
pub const MAX_TRANSLATION_SQUARED: f32 = MAX_TRANSLATION * MAX_TRANSLATION;

/// The maximum angular rotation of a body per step. This limit is very large
/// and is used to prevent numerical problems. You shouldn't need to adjust
/// this.
pub const MAX_ROTATION: f32 = 0.5 * std::f32::consts::PI;
pub const MAX_ROTATION_SQUARED: f32 = MAX_ROTATION * MAX_ROTATION;

/// This scale factor controls how fast overlap is resolved. Ideally this
/// would be 1 so that overlap is removed in one time step. However using
/// values close to 1 often lead to overshoot.
pub const BAUMGARTE: f32 = 0.2;

// Sleep

/// The time that a body must be still before it will go to sleep.
pub const TIME_TO_SLEEP: f32 = 0.5;

/// A body cannot sleep if its linear velocity is above this tolerance.
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// A body cannot sleep if its angular velocity is above this tolerance.
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * std::f32::consts::PI;
