//! Per-step solver data shared between the island and the contact solver.

use crate::math::Vec2;

/// Timing and iteration parameters for one simulation step.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeStep {
    /// Time step, in seconds.
    pub dt: f32,
    /// Inverse time step (0 if dt == 0).
    pub inv_dt: f32,
    /// dt * inv_dt0, for scaling warm-started impulses across variable steps.
    pub dt_ratio: f32,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

/// Position state of a body in the island-local solver arrays.
#[derive(Clone, Copy, Debug, Default)]
pub struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Velocity state of a body in the island-local solver arrays.
#[derive(Clone, Copy, Debug, Default)]
pub struct Velocity {
    pub v: Vec2,
    pub w: f32,
}
