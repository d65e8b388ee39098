//! Structures shared by the broad- and narrow-phase: bounding boxes, contact
//! manifolds and the feature ids that let impulses persist across steps.

use crate::math::{Transform, Vec2};
use crate::settings::MAX_MANIFOLD_POINTS;

/// The features that intersect to form the contact point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContactFeatureType {
    #[default]
    Vertex,
    Face,
}

/// Uniquely identifies a contact point between two shapes so the solver can
/// match points across steps for warm starting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContactFeature {
    /// Feature index on shape A.
    pub index_a: u8,
    /// Feature index on shape B.
    pub index_b: u8,
    pub type_a: ContactFeatureType,
    pub type_b: ContactFeatureType,
}

impl ContactFeature {
    pub fn flip(&self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// A manifold point is a contact point belonging to a contact manifold. It
/// holds details related to the geometry and dynamics of the contact points.
/// This structure is stored across time steps, so we keep it small.
///
/// Note: the impulses are used for internal caching and may not provide
/// reliable contact forces, especially for high speed collisions.
#[derive(Clone, Copy, Debug, Default)]
pub struct ManifoldPoint {
    /// Usage depends on manifold type.
    pub local_point: Vec2,
    /// The non-penetration impulse.
    pub normal_impulse: f32,
    /// The friction impulse.
    pub tangent_impulse: f32,
    /// Uniquely identifies a contact point between two shapes.
    pub id: ContactFeature,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// A manifold for two touching convex shapes.
///
/// The local point usage depends on the manifold type:
/// - Circles: the local center of circle A
/// - FaceA: the center of face A
/// - FaceB: the center of face B
///
/// Similarly the local normal usage:
/// - Circles: not used
/// - FaceA: the normal on shape A
/// - FaceB: the normal on shape B
///
/// We store contacts in this way so that position correction can account for
/// movement, which is critical for continuous physics.
#[derive(Clone, Copy, Debug, Default)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub manifold_type: ManifoldType,
    /// The number of manifold points.
    pub point_count: usize,
}

/// The world-space state of a contact manifold.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorldManifold {
    /// World vector pointing from A to B.
    pub normal: Vec2,
    /// World contact points (points of intersection).
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// A negative value indicates overlap, in meters.
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn initialize(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut this = Self::default();
        if manifold.point_count == 0 {
            return this;
        }

        match manifold.manifold_type {
            ManifoldType::Circles => {
                let mut normal = Vec2::new(1.0, 0.0);
                let point_a = *xf_a * manifold.local_point;
                let point_b = *xf_b * manifold.points[0].local_point;
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    normal = (point_b - point_a).normalize();
                }

                let c_a = point_a + radius_a * normal;
                let c_b = point_b - radius_b * normal;
                this.normal = normal;
                this.points[0] = 0.5 * (c_a + c_b);
                this.separations[0] = (c_b - c_a).dot(normal);
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q * manifold.local_normal;
                let plane_point = *xf_a * manifold.local_point;

                for i in 0..manifold.point_count {
                    let clip_point = *xf_b * manifold.points[i].local_point;
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(normal)) * normal;
                    let c_b = clip_point - radius_b * normal;
                    this.points[i] = 0.5 * (c_a + c_b);
                    this.separations[i] = (c_b - c_a).dot(normal);
                }
                this.normal = normal;
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q * manifold.local_normal;
                let plane_point = *xf_b * manifold.local_point;

                for i in 0..manifold.point_count {
                    let clip_point = *xf_a * manifold.points[i].local_point;
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(normal)) * normal;
                    let c_a = clip_point - radius_a * normal;
                    this.points[i] = 0.5 * (c_a + c_b);
                    this.separations[i] = (c_a - c_b).dot(normal);
                }

                // Ensure normal points from A to B.
                this.normal = -normal;
            }
        }

        this
    }
}

/// Used for computing contact manifolds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipVertex {
    pub v: Vec2,
    pub id: ContactFeature,
}

/// Sutherland-Hodgman clipping of a two-point segment against a half-plane.
/// Returns the number of output points.
pub fn clip_segment_to_line(
    v_out: &mut [ClipVertex; 2],
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> usize {
    // Start with no output points.
    let mut num_out = 0;

    // Calculate the distance of end points to the line.
    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    // If the points are behind the plane.
    if distance0 <= 0.0 {
        v_out[num_out] = v_in[0];
        num_out += 1;
    }
    if distance1 <= 0.0 {
        v_out[num_out] = v_in[1];
        num_out += 1;
    }

    // If the points are on different sides of the plane.
    if distance0 * distance1 < 0.0 {
        // Find intersection point of edge and plane.
        let interp = distance0 / (distance0 - distance1);
        v_out[num_out].v = v_in[0].v + interp * (v_in[1].v - v_in[0].v);

        // The vertex on the clipping plane hits the incident face.
        v_out[num_out].id = ContactFeature {
            index_a: vertex_index_a as u8,
            index_b: v_in[0].id.index_b,
            type_a: ContactFeatureType::Vertex,
            type_b: ContactFeatureType::Face,
        };
        num_out += 1;
    }

    num_out
}

/// Ray-cast input data. The ray extends from p1 to p1 + max_fraction * (p2 - p1).
#[derive(Debug, Clone, Copy)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

/// Ray-cast output data. The ray hits at p1 + fraction * (p2 - p1), where p1
/// and p2 come from [`RayCastInput`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

/// An axis aligned bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aabb {
    /// The lower vertex.
    pub lower_bound: Vec2,
    /// The upper vertex.
    pub upper_bound: Vec2,
}

impl Aabb {
    #[inline]
    pub fn new(lower_bound: Vec2, upper_bound: Vec2) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// Verify that the bounds are sorted and finite.
    pub fn is_valid(&self) -> bool {
        let d = self.upper_bound - self.lower_bound;
        d.x >= 0.0 && d.y >= 0.0 && self.lower_bound.is_valid() && self.upper_bound.is_valid()
    }

    /// Get the center of the AABB.
    #[inline]
    pub fn center(&self) -> Vec2 {
        0.5 * (self.lower_bound + self.upper_bound)
    }

    /// Get the extents of the AABB (half-widths).
    #[inline]
    pub fn extents(&self) -> Vec2 {
        0.5 * (self.upper_bound - self.lower_bound)
    }

    /// Get the perimeter length.
    #[inline]
    pub fn perimeter(&self) -> f32 {
        let wx = self.upper_bound.x - self.lower_bound.x;
        let wy = self.upper_bound.y - self.lower_bound.y;
        2.0 * (wx + wy)
    }

    /// Combine this AABB with another, returning the enclosing box.
    #[inline]
    pub fn combine(&self, other: &Aabb) -> Self {
        Self {
            lower_bound: self.lower_bound.min(other.lower_bound),
            upper_bound: self.upper_bound.max(other.upper_bound),
        }
    }

    /// Is the given AABB contained within this AABB?
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower_bound.x <= other.lower_bound.x
            && self.lower_bound.y <= other.lower_bound.y
            && self.upper_bound.x >= other.upper_bound.x
            && self.upper_bound.y >= other.upper_bound.y
    }

    /// Do the two boxes overlap (touching counts)?
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        let d1 = other.lower_bound - self.upper_bound;
        let d2 = self.lower_bound - other.upper_bound;
        d1.x <= 0.0 && d1.y <= 0.0 && d2.x <= 0.0 && d2.y <= 0.0
    }

    // From Real-time Collision Detection, p179.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = -f32::MAX;
        let mut tmax = f32::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();

        let mut normal = Vec2::ZERO;

        for i in 0..2 {
            if abs_d.get(i) < f32::EPSILON {
                // Parallel.
                if p.get(i) < self.lower_bound.get(i) || self.upper_bound.get(i) < p.get(i) {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d.get(i);
                let mut t1 = (self.lower_bound.get(i) - p.get(i)) * inv_d;
                let mut t2 = (self.upper_bound.get(i) - p.get(i)) * inv_d;

                // Sign of the normal vector.
                let mut s = -1.0;

                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }

                // Push the min up.
                if t1 > tmin {
                    normal = Vec2::ZERO;
                    *normal.get_mut(i) = s;
                    tmin = t1;
                }

                // Pull the max down.
                tmax = tmax.min(t2);

                if tmin > tmax {
                    return None;
                }
            }
        }

        // Does the ray start inside the box?
        // Does the ray intersect beyond the max fraction?
        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }

        Some(RayCastOutput {
            fraction: tmin,
            normal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_encloses_both() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(-2.0, 0.5), Vec2::new(0.5, 3.0));
        let c = a.combine(&b);

        assert!(c.contains(&a));
        assert!(c.contains(&b));
        assert_eq!(c.lower_bound, Vec2::new(-2.0, 0.0));
        assert_eq!(c.upper_bound, Vec2::new(1.0, 3.0));
    }

    #[test]
    fn overlap_is_inclusive_of_touching() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0));
        let c = Aabb::new(Vec2::new(1.1, 0.0), Vec2::new(2.0, 1.0));

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn ray_cast_hits_box_face() {
        let aabb = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 1.0,
        };

        let out = aabb.ray_cast(&input).unwrap();
        assert!((out.fraction - 1.0 / 3.0).abs() < 1.0e-5);
        assert_eq!(out.normal, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn ray_cast_misses() {
        let aabb = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 2.0),
            p2: Vec2::new(3.0, 2.0),
            max_fraction: 1.0,
        };
        assert!(aabb.ray_cast(&input).is_none());
    }

    #[test]
    fn clip_segment_keeps_points_behind_plane() {
        let v_in = [
            ClipVertex {
                v: Vec2::new(-1.0, 0.0),
                id: ContactFeature::default(),
            },
            ClipVertex {
                v: Vec2::new(1.0, 0.0),
                id: ContactFeature::default(),
            },
        ];
        let mut v_out = [ClipVertex::default(); 2];

        // Half-plane x <= 0.5.
        let n = clip_segment_to_line(&mut v_out, &v_in, Vec2::new(1.0, 0.0), 0.5, 3);
        assert_eq!(n, 2);
        assert_eq!(v_out[0].v, Vec2::new(-1.0, 0.0));
        assert!((v_out[1].v.x - 0.5).abs() < 1.0e-6);
        assert_eq!(v_out[1].id.index_a, 3);
        assert_eq!(v_out[1].id.type_a, ContactFeatureType::Vertex);
    }
}
