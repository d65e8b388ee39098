//! A fixture binds a shape to a body and carries the material and filtering
//! data that are not part of the raw geometry. Fixtures own the broad-phase
//! proxies for their shape's children.

use crate::body::BodyId;
use crate::broad_phase::{BroadPhase, ProxyData, ProxyId};
use crate::collision::Aabb;
use crate::math::Transform;
use crate::shape::{MassData, Shape};

/// Collision filtering data. A contact is allowed when the category of one
/// fixture is in the mask of the other, in both directions. A shared
/// non-zero group index overrides the category check: positive always
/// collides, negative never does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }

        (self.mask_bits & other.category_bits) != 0
            && (self.category_bits & other.mask_bits) != 0
    }
}

/// A fixture definition. The shape is cloned into the fixture, so a def can
/// be reused.
#[derive(Clone, Debug)]
pub struct FixtureDef {
    pub shape: Shape,
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
    /// A sensor detects overlap and raises begin/end events but produces no
    /// collision response.
    pub is_sensor: bool,
    /// Excluded from world ray casts.
    pub is_raycast_ignored: bool,
    pub filter: Filter,
    /// Index of the owning entity's hit box, for trigger dispatch.
    pub hit_box_index: usize,
}

impl FixtureDef {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            friction: 0.2,
            restitution: 0.0,
            density: 0.0,
            is_sensor: false,
            is_raycast_ignored: false,
            filter: Filter::default(),
            hit_box_index: 0,
        }
    }
}

/// One broad-phase entry per shape child.
#[derive(Clone, Copy, Debug)]
pub struct FixtureProxy {
    pub aabb: Aabb,
    pub child_index: usize,
    pub proxy_id: ProxyId,
}

pub struct Fixture {
    pub shape: Shape,
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
    pub is_sensor: bool,
    pub is_raycast_ignored: bool,
    pub filter: Filter,
    pub hit_box_index: usize,
    pub(crate) proxies: Vec<FixtureProxy>,
}

impl Fixture {
    pub(crate) fn new(def: &FixtureDef) -> Self {
        debug_assert!(def.density >= 0.0);
        Self {
            shape: def.shape.clone(),
            friction: def.friction,
            restitution: def.restitution,
            density: def.density,
            is_sensor: def.is_sensor,
            is_raycast_ignored: def.is_raycast_ignored,
            filter: def.filter,
            hit_box_index: def.hit_box_index,
            proxies: Vec::new(),
        }
    }

    pub fn compute_mass(&self) -> MassData {
        self.shape.compute_mass(self.density)
    }

    /// These support body activation and deactivation.
    pub(crate) fn create_proxies(
        &mut self,
        broad_phase: &mut BroadPhase,
        xf: &Transform,
        body: BodyId,
        fixture_index: usize,
    ) {
        debug_assert!(self.proxies.is_empty());

        for child in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child);
            let proxy_id = broad_phase.create_proxy(
                &aabb,
                ProxyData {
                    body,
                    fixture: fixture_index,
                    child,
                },
            );
            self.proxies.push(FixtureProxy {
                aabb,
                child_index: child,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Refit the proxies for a body that moved from `xf1` to `xf2`. The
    /// proxy AABB covers both endpoints so the contact survives the swept
    /// motion of one step.
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut BroadPhase,
        xf1: &Transform,
        xf2: &Transform,
    ) {
        for proxy in self.proxies.iter_mut() {
            let aabb1 = self.shape.compute_aabb(xf1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(xf2, proxy.child_index);
            proxy.aabb = aabb1.combine(&aabb2);

            let displacement = aabb2.center() - aabb1.center();
            broad_phase.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
        }
    }

    /// Re-issue pairs after a filter change so the contact layer can
    /// re-evaluate should_collide.
    pub(crate) fn refilter(&self, broad_phase: &mut BroadPhase) {
        for proxy in self.proxies.iter() {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("shape", &self.shape)
            .field("density", &self.density)
            .field("is_sensor", &self.is_sensor)
            .field("proxies", &self.proxies.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_collides_with_itself() {
        let a = Filter::default();
        let b = Filter::default();
        assert!(a.should_collide(&b));
    }

    #[test]
    fn disjoint_masks_do_not_collide() {
        let a = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0004,
            group_index: 0,
        };
        let b = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0004,
            group_index: 0,
        };
        // Each is category 2 but only accepts category 4.
        assert!(!a.should_collide(&b));
    }

    #[test]
    fn group_index_overrides_categories() {
        let mut a = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0004,
            group_index: 3,
        };
        let mut b = a;
        assert!(a.should_collide(&b));

        a.group_index = -3;
        b.group_index = -3;
        a.mask_bits = 0xFFFF;
        b.mask_bits = 0xFFFF;
        assert!(!a.should_collide(&b));
    }
}
