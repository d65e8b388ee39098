//! Sequential-impulse contact solver. Velocity constraints are solved
//! iteratively with accumulated impulse clamping (friction before normal),
//! then penetration is corrected directly on the positions with a Baumgarte
//! pseudo-impulse pass. Points are solved one at a time; there is no block
//! solver.

use crate::collision::{Manifold, ManifoldType, WorldManifold};
use crate::math::{Transform, Vec2};
use crate::settings::{BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, VELOCITY_THRESHOLD};
use crate::time_step::{Position, TimeStep, Velocity};

/// Everything the solver needs from one island contact. Built by the island
/// from the contact and the two bodies, with `index_a`/`index_b` pointing
/// into the island-local position/velocity arrays.
#[derive(Clone, Debug)]
pub struct ContactSolverDef {
    pub manifold: Manifold,
    pub index_a: usize,
    pub index_b: usize,
    pub inv_mass_a: f32,
    pub inv_mass_b: f32,
    pub inv_i_a: f32,
    pub inv_i_b: f32,
    pub local_center_a: Vec2,
    pub local_center_b: Vec2,
    pub radius_a: f32,
    pub radius_b: f32,
    pub friction: f32,
    pub restitution: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

struct VelocityConstraint {
    points: [VelocityConstraintPoint; 2],
    normal: Vec2,
    point_count: usize,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
}

struct PositionConstraint {
    local_points: [Vec2; 2],
    local_normal: Vec2,
    local_point: Vec2,
    point_count: usize,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    radius_a: f32,
    radius_b: f32,
    manifold_type: ManifoldType,
}

pub struct ContactSolver {
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
}

impl ContactSolver {
    /// Build and initialize the constraints from the current island state.
    /// Warm-started impulses are scaled by `dt_ratio` to stay consistent
    /// across variable step sizes.
    pub fn new(
        step: &TimeStep,
        defs: &[ContactSolverDef],
        positions: &[Position],
        velocities: &[Velocity],
    ) -> Self {
        let mut solver = Self {
            velocity_constraints: Vec::with_capacity(defs.len()),
            position_constraints: Vec::with_capacity(defs.len()),
        };

        for def in defs {
            let manifold = &def.manifold;
            debug_assert!(manifold.point_count > 0);

            let mut vc = VelocityConstraint {
                points: [VelocityConstraintPoint::default(); 2],
                normal: Vec2::ZERO,
                point_count: manifold.point_count,
                index_a: def.index_a,
                index_b: def.index_b,
                inv_mass_a: def.inv_mass_a,
                inv_mass_b: def.inv_mass_b,
                inv_i_a: def.inv_i_a,
                inv_i_b: def.inv_i_b,
                friction: def.friction,
            };

            let mut pc = PositionConstraint {
                local_points: [Vec2::ZERO; 2],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                point_count: manifold.point_count,
                index_a: def.index_a,
                index_b: def.index_b,
                inv_mass_a: def.inv_mass_a,
                inv_mass_b: def.inv_mass_b,
                inv_i_a: def.inv_i_a,
                inv_i_b: def.inv_i_b,
                local_center_a: def.local_center_a,
                local_center_b: def.local_center_b,
                radius_a: def.radius_a,
                radius_b: def.radius_b,
                manifold_type: manifold.manifold_type,
            };

            for j in 0..manifold.point_count {
                let cp = &manifold.points[j];
                vc.points[j].normal_impulse = if step.warm_starting {
                    step.dt_ratio * cp.normal_impulse
                } else {
                    0.0
                };
                vc.points[j].tangent_impulse = if step.warm_starting {
                    step.dt_ratio * cp.tangent_impulse
                } else {
                    0.0
                };
                pc.local_points[j] = cp.local_point;
            }

            // World-space anchors and effective masses from the current
            // positions.
            let pos_a = positions[def.index_a];
            let pos_b = positions[def.index_b];
            let vel_a = velocities[def.index_a];
            let vel_b = velocities[def.index_b];

            let xf_a = body_transform(pos_a, def.local_center_a);
            let xf_b = body_transform(pos_b, def.local_center_b);

            let world_manifold =
                WorldManifold::initialize(manifold, &xf_a, def.radius_a, &xf_b, def.radius_b);
            vc.normal = world_manifold.normal;
            let tangent = vc.normal.cross_scalar(1.0);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];
                vcp.r_a = world_manifold.points[j] - pos_a.c;
                vcp.r_b = world_manifold.points[j] - pos_b.c;

                let rn_a = vcp.r_a.cross(vc.normal);
                let rn_b = vcp.r_b.cross(vc.normal);
                let k_normal = def.inv_mass_a
                    + def.inv_mass_b
                    + def.inv_i_a * rn_a * rn_a
                    + def.inv_i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = vcp.r_a.cross(tangent);
                let rt_b = vcp.r_b.cross(tangent);
                let k_tangent = def.inv_mass_a
                    + def.inv_mass_b
                    + def.inv_i_a * rt_a * rt_a
                    + def.inv_i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution bias when the approach speed is significant.
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    vel_b.v + Vec2::scalar_cross(vel_b.w, vcp.r_b)
                        - vel_a.v
                        - Vec2::scalar_cross(vel_a.w, vcp.r_a),
                );
                if v_rel < -VELOCITY_THRESHOLD {
                    vcp.velocity_bias = -def.restitution * v_rel;
                }
            }

            solver.velocity_constraints.push(vc);
            solver.position_constraints.push(pc);
        }

        solver
    }

    /// Apply the impulses carried over from the previous step so the
    /// iterative solve starts near the converged solution.
    pub fn warm_start(&mut self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let mut vel_a = velocities[vc.index_a];
            let mut vel_b = velocities[vc.index_b];

            let tangent = vc.normal.cross_scalar(1.0);

            for j in 0..vc.point_count {
                let vcp = &vc.points[j];
                let p = vcp.normal_impulse * vc.normal + vcp.tangent_impulse * tangent;
                vel_a.v -= vc.inv_mass_a * p;
                vel_a.w -= vc.inv_i_a * vcp.r_a.cross(p);
                vel_b.v += vc.inv_mass_b * p;
                vel_b.w += vc.inv_i_b * vcp.r_b.cross(p);
            }

            velocities[vc.index_a] = vel_a;
            velocities[vc.index_b] = vel_b;
        }
    }

    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in self.velocity_constraints.iter_mut() {
            let mut vel_a = velocities[vc.index_a];
            let mut vel_b = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = normal.cross_scalar(1.0);

            // Solve tangent constraints first because non-penetration is
            // more important than friction.
            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];

                let dv = vel_b.v + Vec2::scalar_cross(vel_b.w, vcp.r_b)
                    - vel_a.v
                    - Vec2::scalar_cross(vel_a.w, vcp.r_a);

                let vt = dv.dot(tangent);
                let lambda = vcp.tangent_mass * -vt;

                // Coulomb cone: |friction impulse| <= mu * normal impulse.
                let max_friction = vc.friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                vel_a.v -= vc.inv_mass_a * p;
                vel_a.w -= vc.inv_i_a * vcp.r_a.cross(p);
                vel_b.v += vc.inv_mass_b * p;
                vel_b.w += vc.inv_i_b * vcp.r_b.cross(p);
            }

            // Normal constraints, clamped so contacts only push.
            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];

                let dv = vel_b.v + Vec2::scalar_cross(vel_b.w, vcp.r_b)
                    - vel_a.v
                    - Vec2::scalar_cross(vel_a.w, vcp.r_a);

                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                let p = lambda * normal;
                vel_a.v -= vc.inv_mass_a * p;
                vel_a.w -= vc.inv_i_a * vcp.r_a.cross(p);
                vel_b.v += vc.inv_mass_b * p;
                vel_b.w += vc.inv_i_b * vcp.r_b.cross(p);
            }

            velocities[vc.index_a] = vel_a;
            velocities[vc.index_b] = vel_b;
        }
    }

    /// Copy the accumulated impulses back into the manifolds for warm
    /// starting the next step. `manifolds[i]` corresponds to `defs[i]`.
    pub fn store_impulses(&self, manifolds: &mut [Manifold]) {
        for (i, vc) in self.velocity_constraints.iter().enumerate() {
            let manifold = &mut manifolds[i];
            for j in 0..vc.point_count {
                manifold.points[j].normal_impulse = vc.points[j].normal_impulse;
                manifold.points[j].tangent_impulse = vc.points[j].tangent_impulse;
            }
        }
    }

    /// One Baumgarte position-correction pass. Returns true once the worst
    /// remaining penetration is within tolerance, which lets the island stop
    /// iterating early.
    pub fn solve_position_constraints(&mut self, positions: &mut [Position]) -> bool {
        let mut min_separation = 0.0_f32;

        for pc in &self.position_constraints {
            let mut pos_a = positions[pc.index_a];
            let mut pos_b = positions[pc.index_b];

            for j in 0..pc.point_count {
                let xf_a = body_transform(pos_a, pc.local_center_a);
                let xf_b = body_transform(pos_b, pc.local_center_b);

                let (normal, point, separation) = position_manifold(pc, &xf_a, &xf_b, j);

                let r_a = point - pos_a.c;
                let r_b = point - pos_b.c;

                min_separation = min_separation.min(separation);

                // Clamp the correction so resting stacks do not overshoot.
                let c = (BAUMGARTE * (separation + LINEAR_SLOP))
                    .clamp(-MAX_LINEAR_CORRECTION, 0.0);

                let rn_a = r_a.cross(normal);
                let rn_b = r_b.cross(normal);
                let k = pc.inv_mass_a
                    + pc.inv_mass_b
                    + pc.inv_i_a * rn_a * rn_a
                    + pc.inv_i_b * rn_b * rn_b;

                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = impulse * normal;

                pos_a.c -= pc.inv_mass_a * p;
                pos_a.a -= pc.inv_i_a * r_a.cross(p);
                pos_b.c += pc.inv_mass_b * p;
                pos_b.a += pc.inv_i_b * r_b.cross(p);
            }

            positions[pc.index_a] = pos_a;
            positions[pc.index_b] = pos_b;
        }

        // Cannot push the slop to zero: the narrow phase relies on some
        // residual overlap to keep contacts alive.
        min_separation >= -3.0 * LINEAR_SLOP
    }
}

fn body_transform(pos: Position, local_center: Vec2) -> Transform {
    let mut xf = Transform::IDENTITY;
    xf.q.set_angle(pos.a);
    xf.p = pos.c - xf.q * local_center;
    xf
}

/// Re-derive the world normal, contact point and separation of one manifold
/// point from trial positions during the position solve.
fn position_manifold(
    pc: &PositionConstraint,
    xf_a: &Transform,
    xf_b: &Transform,
    index: usize,
) -> (Vec2, Vec2, f32) {
    debug_assert!(pc.point_count > 0);

    match pc.manifold_type {
        ManifoldType::Circles => {
            let point_a = *xf_a * pc.local_point;
            let point_b = *xf_b * pc.local_points[0];
            let normal = (point_b - point_a).normalize();
            let point = 0.5 * (point_a + point_b);
            let separation = (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.q * pc.local_normal;
            let plane_point = *xf_a * pc.local_point;
            let clip_point = *xf_b * pc.local_points[index];
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.q * pc.local_normal;
            let plane_point = *xf_b * pc.local_point;
            let clip_point = *xf_a * pc.local_points[index];
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Ensure the normal points from A to B.
            (-normal, clip_point, separation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{ManifoldPoint, ManifoldType};

    const TOLERANCE: f32 = 1.0e-5;

    fn head_on_circles() -> (ContactSolverDef, Vec<Position>, Vec<Velocity>) {
        // Two unit-mass circles of radius 0.5 exactly touching on the x
        // axis, approaching each other at 1 m/s each.
        let mut manifold = Manifold {
            manifold_type: ManifoldType::Circles,
            local_point: Vec2::ZERO,
            local_normal: Vec2::ZERO,
            point_count: 1,
            points: [ManifoldPoint::default(); 2],
        };
        manifold.points[0].local_point = Vec2::ZERO;

        let def = ContactSolverDef {
            manifold,
            index_a: 0,
            index_b: 1,
            inv_mass_a: 1.0,
            inv_mass_b: 1.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            local_center_a: Vec2::ZERO,
            local_center_b: Vec2::ZERO,
            radius_a: 0.5,
            radius_b: 0.5,
            friction: 0.0,
            restitution: 0.0,
        };

        let positions = vec![
            Position {
                c: Vec2::ZERO,
                a: 0.0,
            },
            Position {
                c: Vec2::new(1.0, 0.0),
                a: 0.0,
            },
        ];
        let velocities = vec![
            Velocity {
                v: Vec2::new(1.0, 0.0),
                w: 0.0,
            },
            Velocity {
                v: Vec2::new(-1.0, 0.0),
                w: 0.0,
            },
        ];

        (def, positions, velocities)
    }

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    #[test]
    fn normal_impulse_stops_approach() {
        let (def, positions, mut velocities) = head_on_circles();
        let mut solver = ContactSolver::new(&step(), &[def], &positions, &velocities);

        solver.warm_start(&mut velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }

        // Equal masses, zero restitution: both bodies stop.
        assert!(velocities[0].v.length() < TOLERANCE);
        assert!(velocities[1].v.length() < TOLERANCE);
    }

    #[test]
    fn restitution_reverses_approach_velocity() {
        let (mut def, positions, mut velocities) = head_on_circles();
        def.restitution = 1.0;
        let mut solver = ContactSolver::new(&step(), &[def], &positions, &velocities);

        solver.warm_start(&mut velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }

        // Perfectly elastic: approach speed of 2 becomes separation speed
        // of 2, split between the bodies.
        let separating = velocities[1].v.x - velocities[0].v.x;
        assert!((separating - 2.0).abs() < 1.0e-3);
    }

    #[test]
    fn normal_impulses_never_pull() {
        // Bodies already separating: the contact must not slow them down.
        let (def, positions, mut velocities) = head_on_circles();
        velocities[0].v = Vec2::new(-1.0, 0.0);
        velocities[1].v = Vec2::new(1.0, 0.0);

        let mut solver = ContactSolver::new(&step(), &[def], &positions, &velocities);
        solver.warm_start(&mut velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }

        assert!((velocities[0].v.x - -1.0).abs() < TOLERANCE);
        assert!((velocities[1].v.x - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn position_solve_reduces_penetration() {
        // Overlapping circles: centers 0.8 apart with combined radius 1.
        let (def, mut positions, velocities) = head_on_circles();
        positions[1].c = Vec2::new(0.8, 0.0);

        let mut solver = ContactSolver::new(&step(), &[def], &positions, &velocities);

        let before = positions[1].c.x - positions[0].c.x;
        for _ in 0..20 {
            if solver.solve_position_constraints(&mut positions) {
                break;
            }
        }
        let after = positions[1].c.x - positions[0].c.x;

        assert!(after > before);
        // Within the solver's slop band.
        assert!(after >= 1.0 - 3.0 * LINEAR_SLOP - TOLERANCE);
    }
}
