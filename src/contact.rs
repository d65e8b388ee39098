//! Persistent contacts. A contact exists for as long as the broad-phase
//! AABBs of two fixture children overlap; whether the shapes actually touch
//! is tracked by a flag that flips as the narrow phase runs each step.

use bitflags::bitflags;

use crate::body::Body;
use crate::collide;
use crate::collision::Manifold;
use crate::contact_manager::ContactEvent;

/// One end of a contact: a fixture child on a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactEnd {
    pub body: crate::body::BodyId,
    pub fixture: usize,
    pub child: usize,
}

/// Order-insensitive identity of a contact, used as the arena key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContactKey(ContactEnd, ContactEnd);

impl ContactKey {
    pub fn new(a: ContactEnd, b: ContactEnd) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

bitflags! {
    pub struct ContactFlags: u32 {
        /// The shapes are overlapping this step.
        const TOUCHING = 0x0001;
        /// Cleared by the user to disable the contact for one step.
        const ENABLED = 0x0002;
        /// Needs a filter re-check after a fixture filter changed.
        const FILTER = 0x0004;
        /// Already visited by the current island traversal.
        const ISLAND = 0x0008;
    }
}

/// Friction mixing: geometric mean, so one frictionless surface slides.
pub fn mix_friction(friction_a: f32, friction_b: f32) -> f32 {
    (friction_a * friction_b).sqrt()
}

/// Restitution mixing: the bouncier surface wins (inelastic ball on a
/// trampoline still bounces).
pub fn mix_restitution(restitution_a: f32, restitution_b: f32) -> f32 {
    restitution_a.max(restitution_b)
}

pub struct Contact {
    /// Endpoint whose shape has the higher collision rank; the narrow phase
    /// only handles canonical pair orderings.
    pub(crate) end_a: ContactEnd,
    pub(crate) end_b: ContactEnd,
    pub(crate) manifold: Manifold,
    pub(crate) flags: ContactFlags,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
}

impl Contact {
    pub(crate) fn new(end_a: ContactEnd, end_b: ContactEnd, friction: f32, restitution: f32) -> Self {
        Self {
            end_a,
            end_b,
            manifold: Manifold::default(),
            flags: ContactFlags::ENABLED,
            friction,
            restitution,
        }
    }

    pub fn key(&self) -> ContactKey {
        ContactKey::new(self.end_a, self.end_b)
    }

    pub fn is_touching(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING)
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ContactFlags::ENABLED)
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Run the narrow phase and update the touching state, preserving the
    /// impulses of manifold points that survived from the previous step so
    /// the solver can warm-start. Begin/End transitions are appended to the
    /// event buffer.
    pub(crate) fn update(
        &mut self,
        body_a: &mut Body,
        body_b: &mut Body,
        events: &mut Vec<ContactEvent>,
    ) {
        let old_manifold = self.manifold;
        let was_touching = self.flags.contains(ContactFlags::TOUCHING);

        // Re-enable: the user may have disabled the contact last step.
        self.flags |= ContactFlags::ENABLED;

        let fixture_a = &body_a.fixtures[self.end_a.fixture];
        let fixture_b = &body_b.fixtures[self.end_b.fixture];
        let sensor = fixture_a.is_sensor || fixture_b.is_sensor;

        let touching;
        if sensor {
            // Sensors report overlap but carry no manifold for the solver.
            touching = collide::test_overlap(
                &fixture_a.shape,
                self.end_a.child,
                &body_a.xf,
                &fixture_b.shape,
                self.end_b.child,
                &body_b.xf,
            );
            self.manifold.point_count = 0;
        } else {
            collide::evaluate(
                &mut self.manifold,
                &fixture_a.shape,
                self.end_a.child,
                &body_a.xf,
                &fixture_b.shape,
                &body_b.xf,
            );
            touching = self.manifold.point_count > 0;

            // Match old contact points to new ones by feature id and carry
            // the accumulated impulses over.
            for i in 0..self.manifold.point_count {
                let new_point = &mut self.manifold.points[i];
                new_point.normal_impulse = 0.0;
                new_point.tangent_impulse = 0.0;

                for j in 0..old_manifold.point_count {
                    let old_point = &old_manifold.points[j];
                    if old_point.id == new_point.id {
                        new_point.normal_impulse = old_point.normal_impulse;
                        new_point.tangent_impulse = old_point.tangent_impulse;
                        break;
                    }
                }
            }

            if touching != was_touching {
                body_a.set_awake(true);
                body_b.set_awake(true);
            }
        }

        if touching {
            self.flags |= ContactFlags::TOUCHING;
        } else {
            self.flags.remove(ContactFlags::TOUCHING);
        }

        if !was_touching && touching {
            events.push(ContactEvent::Begin {
                a: self.end_a,
                b: self.end_b,
            });
        }
        if was_touching && !touching {
            events.push(ContactEvent::End {
                a: self.end_a,
                b: self.end_b,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyId;

    #[test]
    fn key_is_order_insensitive() {
        let a = ContactEnd {
            body: BodyId(3),
            fixture: 1,
            child: 0,
        };
        let b = ContactEnd {
            body: BodyId(1),
            fixture: 0,
            child: 2,
        };
        assert_eq!(ContactKey::new(a, b), ContactKey::new(b, a));
    }

    #[test]
    fn distinct_children_get_distinct_keys() {
        let a = ContactEnd {
            body: BodyId(0),
            fixture: 0,
            child: 0,
        };
        let b0 = ContactEnd {
            body: BodyId(1),
            fixture: 0,
            child: 0,
        };
        let b1 = ContactEnd {
            body: BodyId(1),
            fixture: 0,
            child: 1,
        };
        assert_ne!(ContactKey::new(a, b0), ContactKey::new(a, b1));
    }

    #[test]
    fn mixing_rules() {
        assert_eq!(mix_friction(0.0, 0.8), 0.0);
        assert!((mix_friction(0.5, 0.5) - 0.5).abs() < 1.0e-6);
        assert_eq!(mix_restitution(0.2, 0.9), 0.9);
    }
}
