//! Island solver. An island is a connected set of awake bodies and the
//! contacts between them; each island is simulated as an isolated system so
//! sleeping can switch off whole islands at once.

use std::collections::HashMap;

use log::trace;

use crate::body::{Body, BodyId, BodyType};
use crate::contact::{Contact, ContactKey};
use crate::contact_solver::{ContactSolver, ContactSolverDef};
use crate::math::Vec2;
use crate::settings::{
    ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION, MAX_ROTATION_SQUARED,
    MAX_TRANSLATION, MAX_TRANSLATION_SQUARED, POLYGON_RADIUS, TIME_TO_SLEEP,
};
use crate::shape::Shape;
use crate::time_step::{Position, TimeStep, Velocity};

#[derive(Default)]
pub struct Island {
    pub(crate) bodies: Vec<BodyId>,
    pub(crate) contacts: Vec<ContactKey>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.positions.clear();
        self.velocities.clear();
    }

    pub fn add_body(&mut self, id: BodyId) -> usize {
        self.bodies.push(id);
        self.bodies.len() - 1
    }

    pub fn add_contact(&mut self, key: ContactKey) {
        self.contacts.push(key);
    }

    /// Integrate, solve contacts and write the results back to the bodies.
    /// Puts the whole island to sleep when every body has been below the
    /// motion tolerances for long enough.
    pub fn solve(
        &mut self,
        step: &TimeStep,
        gravity: Vec2,
        allow_sleep: bool,
        bodies: &mut [Option<Body>],
        contacts: &mut HashMap<ContactKey, Contact>,
    ) {
        let h = step.dt;

        // Integrate forces into the island-local buffers.
        self.positions.clear();
        self.velocities.clear();
        for (i, id) in self.bodies.iter().enumerate() {
            let Some(body) = bodies[id.0].as_mut() else {
                // Keep the buffers aligned with the island body list.
                self.positions.push(Position::default());
                self.velocities.push(Velocity::default());
                continue;
            };
            body.island_index = i;

            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            // Store the step-start pose for broad-phase sweeps.
            body.sweep.c0 = c;
            body.sweep.a0 = a;

            if body.body_type == BodyType::Dynamic {
                v += h * (body.gravity_scale * gravity + body.inv_mass * body.force);
                w += h * body.inv_inertia * body.torque;

                // Damping via a Pade approximation of the exact integral,
                // stable for any damping coefficient:
                // v2 = v1 * 1 / (1 + h * c)
                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        // Snapshot the solver inputs for the island contacts.
        let mut defs = Vec::with_capacity(self.contacts.len());
        let mut keys = Vec::with_capacity(self.contacts.len());
        for key in &self.contacts {
            let Some(contact) = contacts.get(key) else {
                continue;
            };
            if contact.manifold.point_count == 0 {
                continue;
            }
            let (Some(body_a), Some(body_b)) = (
                bodies[contact.end_a.body.0].as_ref(),
                bodies[contact.end_b.body.0].as_ref(),
            ) else {
                continue;
            };

            let radius = |body: &Body, fixture: usize| match &body.fixtures[fixture].shape {
                Shape::Circle(circle) => circle.radius,
                Shape::Polygon(_) | Shape::Chain(_) => POLYGON_RADIUS,
            };

            defs.push(ContactSolverDef {
                manifold: contact.manifold,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                radius_a: radius(body_a, contact.end_a.fixture),
                radius_b: radius(body_b, contact.end_b.fixture),
                friction: contact.friction,
                restitution: contact.restitution,
            });
            keys.push(*key);
        }

        let mut solver = ContactSolver::new(step, &defs, &self.positions, &self.velocities);
        if step.warm_starting {
            solver.warm_start(&mut self.velocities);
        }

        for _ in 0..step.velocity_iterations {
            solver.solve_velocity_constraints(&mut self.velocities);
        }

        // Integrate positions, capping per-step motion so a tunnelling body
        // cannot blow up the solver.
        for i in 0..self.positions.len() {
            let mut c = self.positions[i].c;
            let mut a = self.positions[i].a;
            let mut v = self.velocities[i].v;
            let mut w = self.velocities[i].w;

            let translation = h * v;
            if translation.dot(translation) > MAX_TRANSLATION_SQUARED {
                v *= MAX_TRANSLATION / translation.length();
            }

            let rotation = h * w;
            if rotation * rotation > MAX_ROTATION_SQUARED {
                w *= MAX_ROTATION / rotation.abs();
            }

            c += h * v;
            a += h * w;

            self.positions[i] = Position { c, a };
            self.velocities[i] = Velocity { v, w };
        }

        // Baumgarte position correction, with early exit when resolved.
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            if solver.solve_position_constraints(&mut self.positions) {
                position_solved = true;
                break;
            }
        }

        // Push the accumulated impulses back for next step's warm start.
        let mut manifolds: Vec<_> = defs.iter().map(|d| d.manifold).collect();
        solver.store_impulses(&mut manifolds);
        for (key, manifold) in keys.iter().zip(manifolds.iter()) {
            if let Some(contact) = contacts.get_mut(key) {
                for j in 0..manifold.point_count {
                    contact.manifold.points[j].normal_impulse = manifold.points[j].normal_impulse;
                    contact.manifold.points[j].tangent_impulse =
                        manifold.points[j].tangent_impulse;
                }
            }
        }

        // Copy state back to the bodies.
        for (i, id) in self.bodies.iter().enumerate() {
            let Some(body) = bodies[id.0].as_mut() else {
                continue;
            };
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();

            // Force/torque accumulators are consumed by the step.
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }

        if allow_sleep {
            let mut min_sleep_time = f32::MAX;
            let lin_tol_sqr = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
            let ang_tol_sqr = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

            for id in &self.bodies {
                let Some(body) = bodies[id.0].as_mut() else {
                    continue;
                };
                if body.body_type == BodyType::Static {
                    continue;
                }

                if !body.is_sleeping_allowed()
                    || body.angular_velocity * body.angular_velocity > ang_tol_sqr
                    || body.linear_velocity.dot(body.linear_velocity) > lin_tol_sqr
                {
                    body.sleep_time = 0.0;
                    min_sleep_time = 0.0;
                } else {
                    body.sleep_time += h;
                    min_sleep_time = min_sleep_time.min(body.sleep_time);
                }
            }

            // The whole island sleeps or none of it does; a single restless
            // body keeps its neighbors awake.
            if min_sleep_time >= TIME_TO_SLEEP && position_solved {
                trace!("island of {} bodies going to sleep", self.bodies.len());
                for id in &self.bodies {
                    if let Some(body) = bodies[id.0].as_mut() {
                        body.set_awake(false);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;

    const TOLERANCE: f32 = 1.0e-5;

    fn step(dt: f32) -> TimeStep {
        TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    fn solve_single(body: Body, dt: f32, gravity: Vec2, allow_sleep: bool) -> Body {
        let mut bodies = vec![Some(body)];
        let mut contacts = HashMap::new();
        let mut island = Island::new();
        island.add_body(BodyId(0));
        island.solve(&step(dt), gravity, allow_sleep, &mut bodies, &mut contacts);
        bodies.remove(0).unwrap()
    }

    fn dynamic_body() -> Body {
        Body::new(&BodyDef {
            body_type: BodyType::Dynamic,
            ..Default::default()
        })
    }

    #[test]
    fn gravity_accelerates_dynamic_body() {
        let dt = 1.0 / 60.0;
        let body = solve_single(dynamic_body(), dt, Vec2::new(0.0, -10.0), false);

        assert!((body.linear_velocity().y - -10.0 * dt).abs() < TOLERANCE);
        assert!((body.position().y - -10.0 * dt * dt).abs() < TOLERANCE);
    }

    #[test]
    fn gravity_scale_applies() {
        let dt = 1.0 / 60.0;
        let mut body = dynamic_body();
        body.gravity_scale = 0.0;
        let body = solve_single(body, dt, Vec2::new(0.0, -10.0), false);

        assert_eq!(body.linear_velocity().y, 0.0);
    }

    #[test]
    fn static_body_is_not_integrated() {
        let body = Body::new(&BodyDef::default());
        let body = solve_single(body, 1.0 / 60.0, Vec2::new(0.0, -10.0), false);

        assert_eq!(body.position(), Vec2::ZERO);
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
    }

    #[test]
    fn linear_damping_decays_velocity() {
        let dt = 0.5;
        let mut body = dynamic_body();
        body.linear_damping = 2.0;
        body.linear_velocity = Vec2::new(4.0, 0.0);
        let body = solve_single(body, dt, Vec2::ZERO, false);

        // v * 1 / (1 + h * c) = 4 / 2
        assert!((body.linear_velocity().x - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn per_step_translation_is_capped() {
        let dt = 1.0;
        let mut body = dynamic_body();
        body.linear_velocity = Vec2::new(100.0, 0.0);
        let body = solve_single(body, dt, Vec2::ZERO, false);

        assert!((body.position().x - MAX_TRANSLATION).abs() < TOLERANCE);
    }

    #[test]
    fn idle_body_falls_asleep_after_time_to_sleep() {
        let dt = 1.0 / 60.0;
        let mut body = dynamic_body();

        let steps = (TIME_TO_SLEEP / dt).ceil() as usize + 1;
        for _ in 0..steps {
            body = solve_single(body, dt, Vec2::ZERO, true);
        }

        assert!(!body.is_awake());
    }

    #[test]
    fn moving_body_stays_awake() {
        let dt = 1.0 / 60.0;
        let mut body = dynamic_body();
        body.linear_velocity = Vec2::new(1.0, 0.0);

        for _ in 0..40 {
            body = solve_single(body, dt, Vec2::ZERO, true);
        }

        assert!(body.is_awake());
    }
}
