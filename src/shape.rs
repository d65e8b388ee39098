//! Collision shapes: circle, convex polygon and chain (poly-line).
//!
//! Shapes are plain geometry in body-local space. A shape is turned into a
//! simulated object by attaching it to a body through a fixture.

use thiserror::Error;

use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::math::{Transform, Vec2};
use crate::settings::{MAX_POLYGON_VERTICES, POLYGON_RADIUS};

/// Shape construction failures. These are raised at construction time so a
/// bad shape can never reach the collision pipeline.
#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
    #[error("circle radius must be positive, got {0}")]
    InvalidRadius(f32),
    #[error("polygon requires at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("polygon supports at most {MAX_POLYGON_VERTICES} vertices, got {0}")]
    TooManyVertices(usize),
    #[error("polygon vertices are not strictly convex")]
    NotConvex,
    #[error("degenerate edge between vertices {0} and {1}")]
    DegenerateEdge(usize, usize),
    #[error("chain requires at least 2 vertices, got {0}")]
    TooFewChainVertices(usize),
}

/// Mass, centroid and rotational inertia of a shape, as computed for a given
/// density. The inertia is about the body origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MassData {
    /// The mass, in kilograms.
    pub mass: f32,
    /// The centroid relative to the body origin.
    pub center: Vec2,
    /// The rotational inertia of the shape about the body origin.
    pub inertia: f32,
}

/// A solid circle with a local-space center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleShape {
    pub radius: f32,
    pub center: Vec2,
}

impl CircleShape {
    pub fn new(radius: f32, center: Vec2) -> Result<Self, ShapeError> {
        if !(radius > 0.0) || !radius.is_finite() {
            return Err(ShapeError::InvalidRadius(radius));
        }
        Ok(Self { radius, center })
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let p = *xf * self.center;
        let r = Vec2::splat(self.radius);
        Aabb::new(p - r, p + r)
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        let mass = density * std::f32::consts::PI * self.radius * self.radius;
        MassData {
            mass,
            center: self.center,
            // Inertia about the body origin (parallel axis).
            inertia: mass * (0.5 * self.radius * self.radius + self.center.dot(self.center)),
        }
    }

    // Collision Detection in Interactive 3D Environments by Gino van den Bergen
    // From Section 3.1.2
    // x = s + a * r
    // norm(x) = radius
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let position = *xf * self.center;
        let s = input.p1 - position;
        let b = s.length_squared() - self.radius * self.radius;

        // Solve quadratic equation.
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.length_squared();
        let sigma = c * c - rr * b;

        // Check for negative discriminant and short segment.
        if sigma < 0.0 || rr < f32::EPSILON {
            return None;
        }

        // Find the point of intersection of the line with the circle.
        let mut a = -(c + sigma.sqrt());

        // Is the intersection point on the segment?
        if 0.0 <= a && a <= input.max_fraction * rr {
            a /= rr;
            return Some(RayCastOutput {
                fraction: a,
                normal: (s + a * r).normalize(),
            });
        }

        None
    }
}

/// A convex polygon stored as a CCW vertex loop with outward edge normals and
/// a precomputed centroid.
///
/// Input may be wound either way; the constructor reorders clockwise input to
/// CCW. Non-convex input is rejected rather than hull-fixed.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonShape {
    pub vertices: Vec<Vec2>,
    pub normals: Vec<Vec2>,
    pub centroid: Vec2,
}

impl PolygonShape {
    pub fn new(vertices: &[Vec2]) -> Result<Self, ShapeError> {
        let n = vertices.len();
        if n < 3 {
            return Err(ShapeError::TooFewVertices(n));
        }
        if n > MAX_POLYGON_VERTICES {
            return Err(ShapeError::TooManyVertices(n));
        }

        // The centroid formula uses the signed area, so it is winding
        // agnostic; compute it before any reordering.
        let centroid = compute_centroid(vertices);

        let mut verts: Vec<Vec2> = vertices.to_vec();
        if signed_area(&verts) < 0.0 {
            verts.reverse();
        }

        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let i2 = (i + 1) % n;
            let edge = verts[i2] - verts[i];
            if edge.length_squared() < f32::EPSILON * f32::EPSILON {
                return Err(ShapeError::DegenerateEdge(i, i2));
            }
            normals.push(Vec2::new(edge.y, -edge.x).normalize());
        }

        // Strict convexity: every vertex must turn left.
        for i in 0..n {
            let i2 = (i + 1) % n;
            let i3 = (i + 2) % n;
            let e1 = verts[i2] - verts[i];
            let e2 = verts[i3] - verts[i2];
            if e1.cross(e2) <= 0.0 {
                return Err(ShapeError::NotConvex);
            }
        }

        Ok(Self {
            vertices: verts,
            normals,
            centroid,
        })
    }

    /// Build an axis-aligned box with the given half-extents, centered on the
    /// body origin.
    pub fn as_box(half_width: f32, half_height: f32) -> Self {
        Self {
            vertices: vec![
                Vec2::new(-half_width, -half_height),
                Vec2::new(half_width, -half_height),
                Vec2::new(half_width, half_height),
                Vec2::new(-half_width, half_height),
            ],
            normals: vec![
                Vec2::new(0.0, -1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(-1.0, 0.0),
            ],
            centroid: Vec2::ZERO,
        }
    }

    /// Build a box with the given half-extents, centered and rotated in body
    /// space.
    pub fn as_oriented_box(half_width: f32, half_height: f32, center: Vec2, angle: f32) -> Self {
        let mut shape = Self::as_box(half_width, half_height);
        shape.centroid = center;

        let xf = Transform::new(center, angle);
        for v in shape.vertices.iter_mut() {
            *v = xf * *v;
        }
        for n in shape.normals.iter_mut() {
            *n = xf.q * *n;
        }
        shape
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let mut lower = *xf * self.vertices[0];
        let mut upper = lower;

        for v in &self.vertices[1..] {
            let p = *xf * *v;
            lower = lower.min(p);
            upper = upper.max(p);
        }

        let r = Vec2::splat(POLYGON_RADIUS);
        Aabb::new(lower - r, upper + r)
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        // Accumulate mass, centroid and inertia over the triangle fan rooted
        // at a reference point inside the polygon.
        let n = self.vertices.len();

        let mut s = Vec2::ZERO;
        for v in &self.vertices {
            s += *v * (1.0 / n as f32);
        }

        let mut area = 0.0;
        let mut center = Vec2::ZERO;
        let mut inertia = 0.0;
        const K_INV3: f32 = 1.0 / 3.0;

        for i in 0..n {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % n] - s;

            let d = e1.cross(e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;

            // Area-weighted centroid.
            center += triangle_area * K_INV3 * (e1 + e2);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * K_INV3 * d) * (intx2 + inty2);
        }

        let mass = density * area;
        center = if area > f32::EPSILON {
            (1.0 / area) * center
        } else {
            Vec2::ZERO
        };
        let world_center = center + s;

        // Inertia about the body origin (parallel axis twice).
        let inertia = density * inertia
            + mass * (world_center.dot(world_center) - center.dot(center));

        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Put the ray into the polygon's frame of reference.
        let p1 = xf.q.mul_t_vec2(input.p1 - xf.p);
        let p2 = xf.q.mul_t_vec2(input.p2 - xf.p);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for i in 0..self.vertices.len() {
            // p = p1 + a * d
            // dot(normal, p - v) = 0
            // dot(normal, p1 - v) + a * dot(normal, d) = 0
            let numerator = self.normals[i].dot(self.vertices[i] - p1);
            let denominator = self.normals[i].dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else {
                // Note: we want this predicate without division:
                // lower < numerator / denominator, where denominator < 0
                // Since denominator < 0, we have to flip the inequality:
                // lower < numerator / denominator <==> denominator * lower > numerator.
                if denominator < 0.0 && numerator < lower * denominator {
                    // Increase lower. The segment enters this half-space.
                    lower = numerator / denominator;
                    index = Some(i);
                } else if denominator > 0.0 && numerator < upper * denominator {
                    // Decrease upper. The segment exits this half-space.
                    upper = numerator / denominator;
                }
            }

            if upper < lower {
                return None;
            }
        }

        debug_assert!(0.0 <= lower && lower <= input.max_fraction);

        index.map(|i| RayCastOutput {
            fraction: lower,
            normal: xf.q * self.normals[i],
        })
    }
}

fn signed_area(vertices: &[Vec2]) -> f32 {
    let mut area = 0.0;
    for i in 0..vertices.len() {
        let v1 = vertices[i];
        let v2 = vertices[(i + 1) % vertices.len()];
        area += v1.cross(v2);
    }
    0.5 * area
}

/// Area-weighted centroid via shoelace triangulation. Winding agnostic: the
/// per-triangle signed areas and the total signed area cancel.
fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    const K_INV3: f32 = 1.0 / 3.0;

    for i in 0..vertices.len() {
        let p2 = vertices[i];
        let p3 = vertices[(i + 1) % vertices.len()];

        let triangle_area = 0.5 * p2.cross(p3);
        area += triangle_area;
        c += triangle_area * K_INV3 * (p2 + p3);
    }

    if area.abs() > f32::EPSILON {
        (1.0 / area) * c
    } else {
        Vec2::ZERO
    }
}

/// Open or closed chain topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Open,
    Closed,
}

/// A segment of a chain, presented as a degenerate two-vertex polygon.
/// The optional adjacent vertices limit normal generation at segment ends:
/// an end vertex of an open chain has no adjoining edge and must not act as
/// a cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeShape {
    pub vertex1: Vec2,
    pub vertex2: Vec2,
    /// Vertex preceding vertex1, if the chain continues there.
    pub vertex0: Option<Vec2>,
    /// Vertex following vertex2, if the chain continues there.
    pub vertex3: Option<Vec2>,
}

impl EdgeShape {
    pub fn new(vertex1: Vec2, vertex2: Vec2) -> Self {
        Self {
            vertex1,
            vertex2,
            vertex0: None,
            vertex3: None,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let v1 = *xf * self.vertex1;
        let v2 = *xf * self.vertex2;

        let r = Vec2::splat(POLYGON_RADIUS);
        Aabb::new(v1.min(v2) - r, v1.max(v2) + r)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Put the ray into the edge's frame of reference.
        let p1 = xf.q.mul_t_vec2(input.p1 - xf.p);
        let p2 = xf.q.mul_t_vec2(input.p2 - xf.p);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;

        // Normal points to the right of the edge direction.
        let normal = Vec2::new(e.y, -e.x).normalize();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + t * d;

        // q = v1 + s * e, with s in [0,1].
        let rr = e.length_squared();
        if rr == 0.0 {
            return None;
        }
        let s = (q - v1).dot(e) / rr;
        if s < 0.0 || 1.0 < s {
            return None;
        }

        let normal = if numerator > 0.0 {
            -(xf.q * normal)
        } else {
            xf.q * normal
        };
        Some(RayCastOutput {
            fraction: t,
            normal,
        })
    }
}

/// An open or closed poly-line of edge segments, intended for static terrain.
/// A closed chain implicitly repeats the first vertex at the end, so
/// `vertex_count() == input.len() + 1`. Each segment is a separate
/// broad-phase child with its own AABB.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainShape {
    vertices: Vec<Vec2>,
    kind: ChainKind,
}

impl ChainShape {
    pub fn new(kind: ChainKind, vertices: &[Vec2]) -> Result<Self, ShapeError> {
        if vertices.len() < 2 {
            return Err(ShapeError::TooFewChainVertices(vertices.len()));
        }
        for i in 0..vertices.len() - 1 {
            if vertices[i].distance_squared(vertices[i + 1]) < f32::EPSILON * f32::EPSILON {
                return Err(ShapeError::DegenerateEdge(i, i + 1));
            }
        }

        let mut verts = vertices.to_vec();
        if kind == ChainKind::Closed {
            verts.push(vertices[0]);
        }

        Ok(Self {
            vertices: verts,
            kind,
        })
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    /// Total vertex count, including the duplicated closing vertex for a
    /// closed chain.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn get_vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    /// Number of edge segments, each a broad-phase child.
    pub fn child_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Materialize child segment `index` with its adjacency for one-sided
    /// collision. End vertices of an open chain have no adjoining edge.
    pub fn get_child_edge(&self, index: usize) -> EdgeShape {
        debug_assert!(index < self.child_count());

        let mut edge = EdgeShape::new(self.vertices[index], self.vertices[index + 1]);

        if index > 0 {
            edge.vertex0 = Some(self.vertices[index - 1]);
        } else if self.kind == ChainKind::Closed {
            // The last stored vertex duplicates vertex 0; the real neighbor
            // is the one before it.
            edge.vertex0 = Some(self.vertices[self.vertices.len() - 2]);
        }

        if index + 2 < self.vertices.len() {
            edge.vertex3 = Some(self.vertices[index + 2]);
        } else if self.kind == ChainKind::Closed {
            edge.vertex3 = Some(self.vertices[1]);
        }

        edge
    }

    pub fn compute_aabb(&self, xf: &Transform, child_index: usize) -> Aabb {
        self.get_child_edge(child_index).compute_aabb(xf)
    }
}

/// A collision shape, dispatched by tag rather than virtual double dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle(CircleShape),
    Polygon(PolygonShape),
    Chain(ChainShape),
}

impl Shape {
    /// Circles have their own radius; polygons and edges carry the skin
    /// radius used by the narrow-phase for a small collision margin.
    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle(circle) => circle.radius,
            Shape::Polygon(_) | Shape::Chain(_) => POLYGON_RADIUS,
        }
    }

    /// Number of broad-phase children. Chains decompose into one child per
    /// segment; other shapes are a single child.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Circle(_) | Shape::Polygon(_) => 1,
            Shape::Chain(chain) => chain.child_count(),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child_index: usize) -> Aabb {
        match self {
            Shape::Circle(circle) => circle.compute_aabb(xf),
            Shape::Polygon(polygon) => polygon.compute_aabb(xf),
            Shape::Chain(chain) => chain.compute_aabb(xf, child_index),
        }
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Shape::Circle(circle) => circle.compute_mass(density),
            Shape::Polygon(polygon) => polygon.compute_mass(density),
            // Chains are static-only and massless.
            Shape::Chain(_) => MassData::default(),
        }
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(circle) => circle.ray_cast(input, xf),
            Shape::Polygon(polygon) => polygon.ray_cast(input, xf),
            Shape::Chain(chain) => chain.get_child_edge(child_index).ray_cast(input, xf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f32 = 1.0e-5;

    #[test]
    fn circle_aabb_identity() {
        let circle = CircleShape::new(0.5, Vec2::ZERO).unwrap();
        let aabb = circle.compute_aabb(&Transform::IDENTITY);
        assert_eq!(aabb.lower_bound, Vec2::new(-0.5, -0.5));
        assert_eq!(aabb.upper_bound, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn circle_aabb_offset_center() {
        let circle = CircleShape::new(2.5, Vec2::new(-2.5, 3.2)).unwrap();
        let aabb = circle.compute_aabb(&Transform::IDENTITY);
        assert!((aabb.lower_bound.x - -5.0).abs() < TOLERANCE);
        assert!((aabb.lower_bound.y - 0.7).abs() < TOLERANCE);
        assert!((aabb.upper_bound.x - 0.0).abs() < TOLERANCE);
        assert!((aabb.upper_bound.y - 5.7).abs() < TOLERANCE);
    }

    #[test]
    fn circle_rejects_bad_radius() {
        assert_eq!(
            CircleShape::new(0.0, Vec2::ZERO),
            Err(ShapeError::InvalidRadius(0.0))
        );
        assert!(CircleShape::new(-1.0, Vec2::ZERO).is_err());
    }

    #[test]
    fn polygon_centroid() {
        let vertices = [
            Vec2::new(-1.0, 0.0),
            Vec2::new(-1.0, 1.0),
            Vec2::new(2.0, 0.5),
            Vec2::new(3.0, 0.25),
            Vec2::new(1.0, 0.0),
        ];
        let polygon = PolygonShape::new(&vertices).unwrap();
        assert!((polygon.centroid.x - 0.4561403).abs() < TOLERANCE);
        assert!((polygon.centroid.y - 0.3903509).abs() < TOLERANCE);
    }

    #[test]
    fn polygon_rejects_degenerate_input() {
        assert_eq!(
            PolygonShape::new(&[Vec2::ZERO, Vec2::new(1.0, 0.0)]),
            Err(ShapeError::TooFewVertices(2))
        );

        // Collinear midpoint is not strictly convex.
        let collinear = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 1.0),
        ];
        assert_eq!(PolygonShape::new(&collinear), Err(ShapeError::NotConvex));
    }

    #[test]
    fn polygon_aabb_encloses_all_vertices() {
        let polygon = PolygonShape::as_box(1.0, 2.0);
        let xf = Transform::new(Vec2::new(3.0, -1.0), 0.3);
        let aabb = polygon.compute_aabb(&xf);

        for v in &polygon.vertices {
            let p = xf * *v;
            assert!(aabb.lower_bound.x <= p.x && p.x <= aabb.upper_bound.x);
            assert!(aabb.lower_bound.y <= p.y && p.y <= aabb.upper_bound.y);
        }
    }

    #[test]
    fn box_mass_properties() {
        // 2x2 box, density 1: mass = 4, inertia about center = m*(w^2+h^2)/12.
        let polygon = PolygonShape::as_box(1.0, 1.0);
        let data = polygon.compute_mass(1.0);
        assert!((data.mass - 4.0).abs() < TOLERANCE);
        assert!(data.center.length() < TOLERANCE);
        assert!((data.inertia - 4.0 * 8.0 / 12.0).abs() < 1.0e-4);
    }

    #[test]
    fn closed_chain_repeats_first_vertex() {
        let vertices = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let chain = ChainShape::new(ChainKind::Closed, &vertices).unwrap();

        assert_eq!(chain.vertex_count(), vertices.len() + 1);
        assert_eq!(chain.get_vertex(chain.vertex_count() - 1), vertices[0]);
        assert_eq!(chain.child_count(), vertices.len());

        // Every child wraps with both neighbors present.
        for i in 0..chain.child_count() {
            let edge = chain.get_child_edge(i);
            assert!(edge.vertex0.is_some());
            assert!(edge.vertex3.is_some());
        }
    }

    #[test]
    fn open_chain_end_segments_have_no_outer_neighbor() {
        let vertices = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 1.0),
        ];
        let chain = ChainShape::new(ChainKind::Open, &vertices).unwrap();

        assert_eq!(chain.vertex_count(), 3);
        assert_eq!(chain.child_count(), 2);

        let first = chain.get_child_edge(0);
        assert!(first.vertex0.is_none());
        assert!(first.vertex3.is_some());

        let last = chain.get_child_edge(1);
        assert!(last.vertex0.is_some());
        assert!(last.vertex3.is_none());
    }

    #[test]
    fn polygon_ray_cast_front_face() {
        let polygon = PolygonShape::as_box(1.0, 1.0);
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(0.0, 0.0),
            max_fraction: 1.0,
        };
        let out = polygon
            .ray_cast(&input, &Transform::IDENTITY)
            .unwrap();
        assert!((out.fraction - 2.0 / 3.0).abs() < TOLERANCE);
        assert_eq!(out.normal, Vec2::new(-1.0, 0.0));
    }
}
