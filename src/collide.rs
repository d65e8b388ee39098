//! Narrow-phase collision routines. Each routine fills a [`Manifold`] with
//! up to two contact points whose feature ids stay stable across steps, so
//! the solver can warm-start matching points.

use crate::collision::{
    clip_segment_to_line, ClipVertex, ContactFeature, ContactFeatureType, Manifold, ManifoldPoint,
    ManifoldType,
};
use crate::math::{Transform, Vec2};
use crate::settings::{MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::shape::{CircleShape, EdgeShape, PolygonShape, Shape};

// Axis selection hysteresis. Reusing the previous reference face when the
// separations are nearly equal keeps the manifold from flickering between
// faces on resting contacts.
const RELATIVE_TOLERANCE: f32 = 0.98;
const ABSOLUTE_TOLERANCE: f32 = 0.001;

/// Collide two circles.
pub fn collide_circles(
    manifold: &mut Manifold,
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    let p_a = *xf_a * circle_a.center;
    let p_b = *xf_b * circle_b.center;

    let d = p_b - p_a;
    let dist_sqr = d.dot(d);
    let r = circle_a.radius + circle_b.radius;
    if dist_sqr > r * r {
        return;
    }

    manifold.manifold_type = ManifoldType::Circles;
    manifold.local_point = circle_a.center;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0] = ManifoldPoint {
        local_point: circle_b.center,
        ..Default::default()
    };
}

/// Collide a polygon and a circle.
pub fn collide_polygon_and_circle(
    manifold: &mut Manifold,
    polygon_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    // Compute circle position in the frame of the polygon.
    let c = *xf_b * circle_b.center;
    let c_local = xf_a.mul_t_vec2(c);

    // Find the min separating edge.
    let mut normal_index = 0;
    let mut separation = -f32::MAX;
    let radius = POLYGON_RADIUS + circle_b.radius;
    let vertex_count = polygon_a.vertex_count();

    for i in 0..vertex_count {
        let s = polygon_a.normals[i].dot(c_local - polygon_a.vertices[i]);
        if s > radius {
            // Early out.
            return;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    // Vertices that subtend the incident face.
    let vert_index1 = normal_index;
    let vert_index2 = (vert_index1 + 1) % vertex_count;
    let v1 = polygon_a.vertices[vert_index1];
    let v2 = polygon_a.vertices[vert_index2];

    // If the center is inside the polygon, use the deepest face normal.
    if separation < f32::EPSILON {
        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::FaceA;
        manifold.local_normal = polygon_a.normals[normal_index];
        manifold.local_point = 0.5 * (v1 + v2);
        manifold.points[0] = ManifoldPoint {
            local_point: circle_b.center,
            ..Default::default()
        };
        return;
    }

    // Compute barycentric coordinates.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return;
        }
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return;
        }
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = 0.5 * (v1 + v2);
        let s = (c_local - face_center).dot(polygon_a.normals[vert_index1]);
        if s > radius {
            return;
        }
        manifold.local_normal = polygon_a.normals[vert_index1];
        manifold.local_point = face_center;
    }

    manifold.point_count = 1;
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.points[0] = ManifoldPoint {
        local_point: circle_b.center,
        ..Default::default()
    };
}

/// Find the max separation between poly1 and poly2 using edge normals from
/// poly1. Returns the best edge index and its separation.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, f32) {
    let count1 = poly1.vertex_count();
    let count2 = poly2.vertex_count();
    let xf = xf2.mul_t(*xf1);

    let mut best_index = 0;
    let mut max_separation = -f32::MAX;
    for i in 0..count1 {
        // Get poly1 normal and vertex in frame2.
        let n = xf.q * poly1.normals[i];
        let v1 = xf * poly1.vertices[i];

        // Find the deepest point of poly2 along normal i.
        let mut si = f32::MAX;
        for j in 0..count2 {
            let sij = n.dot(poly2.vertices[j] - v1);
            if sij < si {
                si = sij;
            }
        }

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }

    (best_index, max_separation)
}

fn find_incident_edge(
    c: &mut [ClipVertex; 2],
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) {
    let count2 = poly2.vertex_count();

    // Get the normal of the reference edge in poly2's frame.
    let normal1 = xf2.q.mul_t_vec2(xf1.q * poly1.normals[edge1]);

    // Find the incident edge on poly2: most anti-parallel normal.
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for i in 0..count2 {
        let dot = normal1.dot(poly2.normals[i]);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % count2;

    c[0] = ClipVertex {
        v: *xf2 * poly2.vertices[i1],
        id: ContactFeature {
            index_a: edge1 as u8,
            index_b: i1 as u8,
            type_a: ContactFeatureType::Face,
            type_b: ContactFeatureType::Vertex,
        },
    };
    c[1] = ClipVertex {
        v: *xf2 * poly2.vertices[i2],
        id: ContactFeature {
            index_a: edge1 as u8,
            index_b: i2 as u8,
            type_a: ContactFeatureType::Face,
            type_b: ContactFeatureType::Vertex,
        },
    };
}

/// Collide two polygons using SAT over both vertex loops, then clip the
/// incident edge against the side planes of the reference face.
pub fn collide_polygons(
    manifold: &mut Manifold,
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;
    let total_radius = 2.0 * POLYGON_RADIUS;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return;
    }

    let (poly1, poly2, xf1, xf2, edge1, flip);
    if separation_b > RELATIVE_TOLERANCE * separation_a + ABSOLUTE_TOLERANCE {
        poly1 = poly_b;
        poly2 = poly_a;
        xf1 = xf_b;
        xf2 = xf_a;
        edge1 = edge_b;
        manifold.manifold_type = ManifoldType::FaceB;
        flip = true;
    } else {
        poly1 = poly_a;
        poly2 = poly_b;
        xf1 = xf_a;
        xf2 = xf_b;
        edge1 = edge_a;
        manifold.manifold_type = ManifoldType::FaceA;
        flip = false;
    }

    let mut incident_edge = [ClipVertex::default(); 2];
    find_incident_edge(&mut incident_edge, poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.vertex_count();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;

    let mut v11 = poly1.vertices[iv1];
    let mut v12 = poly1.vertices[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = local_tangent.cross_scalar(1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.q * local_tangent;
    let normal = tangent.cross_scalar(1.0);

    v11 = *xf1 * v11;
    v12 = *xf1 * v12;

    // Face offset.
    let front_offset = normal.dot(v11);

    // Side offsets, extended by polytope skin thickness.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // Clip incident edge against extruded edge1 side edges.
    let mut clip_points1 = [ClipVertex::default(); 2];
    let mut clip_points2 = [ClipVertex::default(); 2];

    let np = clip_segment_to_line(&mut clip_points1, &incident_edge, -tangent, side_offset1, iv1);
    if np < 2 {
        return;
    }

    let np = clip_segment_to_line(&mut clip_points2, &clip_points1, tangent, side_offset2, iv2);
    if np < 2 {
        return;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for cv in clip_points2.iter() {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.mul_t_vec2(cv.v);
            cp.id = if flip { cv.id.flip() } else { cv.id };
            cp.normal_impulse = 0.0;
            cp.tangent_impulse = 0.0;
            point_count += 1;
        }
    }

    manifold.point_count = point_count;
}

/// Collide a chain segment and a circle. Chain segments are one-sided: the
/// circle must be on the outward side (to the right of v1->v2) to collide,
/// and end vertices adjoining another segment yield their region to it.
pub fn collide_edge_and_circle(
    manifold: &mut Manifold,
    edge_a: &EdgeShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    // Compute circle in frame of edge.
    let q = xf_a.mul_t_vec2(*xf_b * circle_b.center);

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Normal points to the right for a CCW winding.
    let n = Vec2::new(e.y, -e.x);
    let offset = n.dot(q - a);
    if offset < 0.0 {
        return;
    }

    // Barycentric coordinates.
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = POLYGON_RADIUS + circle_b.radius;

    // Region A: before vertex1.
    if v <= 0.0 {
        let p = a;
        let d = q - p;
        if d.length_squared() > radius * radius {
            return;
        }

        // Is there an edge connected to A that owns this region?
        if let Some(a1) = edge_a.vertex0 {
            let e1 = a - a1;
            let u1 = e1.dot(a - q);
            if u1 > 0.0 {
                return;
            }
        }

        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = p;
        manifold.points[0] = ManifoldPoint {
            local_point: circle_b.center,
            ..Default::default()
        };
        return;
    }

    // Region B: past vertex2.
    if u <= 0.0 {
        let p = b;
        let d = q - p;
        if d.length_squared() > radius * radius {
            return;
        }

        if let Some(b2) = edge_a.vertex3 {
            let e2 = b2 - b;
            let v2 = e2.dot(q - b);
            if v2 > 0.0 {
                return;
            }
        }

        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = p;
        manifold.points[0] = ManifoldPoint {
            local_point: circle_b.center,
            id: ContactFeature {
                index_a: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        return;
    }

    // Region AB: project onto the segment interior.
    let den = e.length_squared();
    debug_assert!(den > 0.0);
    let p = (1.0 / den) * (u * a + v * b);
    let d = q - p;
    if d.length_squared() > radius * radius {
        return;
    }

    manifold.point_count = 1;
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.local_normal = n.normalize();
    manifold.local_point = a;
    manifold.points[0] = ManifoldPoint {
        local_point: circle_b.center,
        id: ContactFeature {
            type_a: ContactFeatureType::Face,
            ..Default::default()
        },
        ..Default::default()
    };
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EpAxisType {
    EdgeA,
    EdgeB,
}

#[derive(Clone, Copy)]
struct EpAxis {
    normal: Vec2,
    axis_type: EpAxisType,
    index: usize,
    separation: f32,
}

/// Polygon B brought into the frame of edge A.
struct TempPolygon {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
}

fn compute_edge_separation(polygon_b: &TempPolygon, v1: Vec2, normal1: Vec2) -> EpAxis {
    let mut axis = EpAxis {
        normal: normal1,
        axis_type: EpAxisType::EdgeA,
        index: 0,
        separation: -f32::MAX,
    };

    let axes = [normal1, -normal1];

    // Find axis with least overlap.
    for (j, axis_j) in axes.iter().enumerate() {
        let mut sj = f32::MAX;

        // Find deepest polygon vertex along axis j.
        for i in 0..polygon_b.count {
            let si = axis_j.dot(polygon_b.vertices[i] - v1);
            if si < sj {
                sj = si;
            }
        }

        if sj > axis.separation {
            axis.index = j;
            axis.separation = sj;
            axis.normal = *axis_j;
        }
    }

    axis
}

fn compute_polygon_separation(polygon_b: &TempPolygon, v1: Vec2, v2: Vec2) -> EpAxis {
    let mut axis = EpAxis {
        normal: Vec2::ZERO,
        axis_type: EpAxisType::EdgeB,
        index: 0,
        separation: -f32::MAX,
    };

    for i in 0..polygon_b.count {
        let n = -polygon_b.normals[i];

        let s1 = n.dot(polygon_b.vertices[i] - v1);
        let s2 = n.dot(polygon_b.vertices[i] - v2);
        let s = s1.min(s2);

        if s > axis.separation {
            axis.index = i;
            axis.separation = s;
            axis.normal = n;
        }
    }

    axis
}

/// Collide a chain segment and a polygon. The segment is one-sided and the
/// allowed normal range is limited by the neighbor segments so a box sliding
/// along a chain does not snag on interior vertices.
pub fn collide_edge_and_polygon(
    manifold: &mut Manifold,
    edge_a: &EdgeShape,
    xf_a: &Transform,
    polygon_b: &PolygonShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    let xf = xf_a.mul_t(*xf_b);
    let centroid_b = xf * polygon_b.centroid;

    let v1 = edge_a.vertex1;
    let v2 = edge_a.vertex2;

    let edge1 = (v2 - v1).normalize();

    // Normal points to the right for a CCW winding.
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    // One-sided: nothing to do if the polygon is behind the segment.
    if offset1 < 0.0 {
        return;
    }

    // Get polygon B in frame A.
    let mut temp = TempPolygon {
        vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        count: polygon_b.vertex_count(),
    };
    for i in 0..temp.count {
        temp.vertices[i] = xf * polygon_b.vertices[i];
        temp.normals[i] = xf.q * polygon_b.normals[i];
    }

    let radius = 2.0 * POLYGON_RADIUS;

    let edge_axis = compute_edge_separation(&temp, v1, normal1);
    if edge_axis.separation > radius {
        return;
    }

    let polygon_axis = compute_polygon_separation(&temp, v1, v2);
    if polygon_axis.separation > radius {
        return;
    }

    let mut primary_axis = if polygon_axis.separation - radius
        > RELATIVE_TOLERANCE * (edge_axis.separation - radius) + ABSOLUTE_TOLERANCE
    {
        polygon_axis
    } else {
        edge_axis
    };

    // Restrict the normal to the arc between the neighbor segment normals.
    // An end vertex of an open chain has no neighbor and imposes no limit.
    {
        const SIN_TOL: f32 = 0.1;
        let side1 = primary_axis.normal.dot(edge1) <= 0.0;

        if side1 {
            if let Some(v0) = edge_a.vertex0 {
                let edge0 = (v1 - v0).normalize();
                let normal0 = Vec2::new(edge0.y, -edge0.x);
                if edge0.cross(edge1) >= 0.0 {
                    // Convex neighbor: the vertex region is shared.
                    if primary_axis.normal.cross(normal0) > SIN_TOL {
                        return;
                    }
                } else {
                    primary_axis = edge_axis;
                }
            }
        } else if let Some(v3) = edge_a.vertex3 {
            let edge2 = (v3 - v2).normalize();
            let normal2 = Vec2::new(edge2.y, -edge2.x);
            if edge1.cross(edge2) >= 0.0 {
                if normal2.cross(primary_axis.normal) > SIN_TOL {
                    return;
                }
            } else {
                primary_axis = edge_axis;
            }
        }
    }

    // Reference face and the incident edge to clip against it.
    let mut clip_points = [ClipVertex::default(); 2];
    let (ref_i1, ref_i2, ref_v1, ref_v2, ref_normal);

    if primary_axis.axis_type == EpAxisType::EdgeA {
        manifold.manifold_type = ManifoldType::FaceA;

        // Search for the polygon normal that is most anti-parallel to the
        // edge normal.
        let mut best_index = 0;
        let mut best_value = primary_axis.normal.dot(temp.normals[0]);
        for i in 1..temp.count {
            let value = primary_axis.normal.dot(temp.normals[i]);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }

        let i1 = best_index;
        let i2 = (i1 + 1) % temp.count;

        clip_points[0] = ClipVertex {
            v: temp.vertices[i1],
            id: ContactFeature {
                index_a: 0,
                index_b: i1 as u8,
                type_a: ContactFeatureType::Face,
                type_b: ContactFeatureType::Vertex,
            },
        };
        clip_points[1] = ClipVertex {
            v: temp.vertices[i2],
            id: ContactFeature {
                index_a: 0,
                index_b: i2 as u8,
                type_a: ContactFeatureType::Face,
                type_b: ContactFeatureType::Vertex,
            },
        };

        ref_i1 = 0;
        ref_i2 = 1;
        ref_v1 = v1;
        ref_v2 = v2;
        ref_normal = primary_axis.normal;
    } else {
        manifold.manifold_type = ManifoldType::FaceB;

        clip_points[0] = ClipVertex {
            v: v2,
            id: ContactFeature {
                index_a: 1,
                index_b: primary_axis.index as u8,
                type_a: ContactFeatureType::Vertex,
                type_b: ContactFeatureType::Face,
            },
        };
        clip_points[1] = ClipVertex {
            v: v1,
            id: ContactFeature {
                index_a: 0,
                index_b: primary_axis.index as u8,
                type_a: ContactFeatureType::Vertex,
                type_b: ContactFeatureType::Face,
            },
        };

        ref_i1 = primary_axis.index;
        ref_i2 = (ref_i1 + 1) % temp.count;
        ref_v1 = temp.vertices[ref_i1];
        ref_v2 = temp.vertices[ref_i2];
        ref_normal = temp.normals[ref_i1];
    }

    // Side planes, perpendicular to the reference face.
    let side_normal1 = Vec2::new(ref_normal.y, -ref_normal.x);
    let side_normal2 = -side_normal1;
    let side_offset1 = side_normal1.dot(ref_v1);
    let side_offset2 = side_normal2.dot(ref_v2);

    let mut clip_points1 = [ClipVertex::default(); 2];
    let mut clip_points2 = [ClipVertex::default(); 2];

    let np = clip_segment_to_line(
        &mut clip_points1,
        &clip_points,
        side_normal1,
        side_offset1,
        ref_i1,
    );
    if np < 2 {
        return;
    }

    let np = clip_segment_to_line(
        &mut clip_points2,
        &clip_points1,
        side_normal2,
        side_offset2,
        ref_i2,
    );
    if np < 2 {
        return;
    }

    if primary_axis.axis_type == EpAxisType::EdgeA {
        manifold.local_normal = ref_normal;
        manifold.local_point = ref_v1;
    } else {
        manifold.local_normal = polygon_b.normals[ref_i1];
        manifold.local_point = polygon_b.vertices[ref_i1];
    }

    let mut point_count = 0;
    for cv in clip_points2.iter() {
        let separation = ref_normal.dot(cv.v - ref_v1);
        if separation <= radius {
            let cp = &mut manifold.points[point_count];
            if primary_axis.axis_type == EpAxisType::EdgeA {
                cp.local_point = xf.mul_t_vec2(cv.v);
                cp.id = cv.id;
            } else {
                cp.local_point = cv.v;
                cp.id = cv.id.flip();
            }
            cp.normal_impulse = 0.0;
            cp.tangent_impulse = 0.0;
            point_count += 1;
        }
    }

    manifold.point_count = point_count;
}

/// Evaluate the narrow phase for a pair of shape children. Shape A is
/// expected to have collision rank at least that of shape B, per
/// [`collision_rank`]; the contact layer normalizes the pair on creation.
pub fn evaluate(
    manifold: &mut Manifold,
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(manifold, a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => {
            collide_polygon_and_circle(manifold, a, xf_a, b, xf_b)
        }
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(manifold, a, xf_a, b, xf_b),
        (Shape::Chain(a), Shape::Circle(b)) => {
            collide_edge_and_circle(manifold, &a.get_child_edge(child_a), xf_a, b, xf_b)
        }
        (Shape::Chain(a), Shape::Polygon(b)) => {
            collide_edge_and_polygon(manifold, &a.get_child_edge(child_a), xf_a, b, xf_b)
        }
        // Chains are static and never collide with each other; other
        // combinations are excluded by pair normalization.
        _ => manifold.point_count = 0,
    }
}

/// Rank used to order a shape pair so [`evaluate`] only sees canonical
/// combinations. Higher ranks go in the A slot.
pub fn collision_rank(shape: &Shape) -> u8 {
    match shape {
        Shape::Circle(_) => 0,
        Shape::Polygon(_) => 1,
        Shape::Chain(_) => 2,
    }
}

/// Overlap test used for sensors. True when the narrow phase produces at
/// least one contact point for the child pair.
pub fn test_overlap(
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Transform,
    shape_b: &Shape,
    child_b: usize,
    xf_b: &Transform,
) -> bool {
    let mut manifold = Manifold::default();
    if collision_rank(shape_a) >= collision_rank(shape_b) {
        evaluate(&mut manifold, shape_a, child_a, xf_a, shape_b, xf_b);
    } else {
        evaluate(&mut manifold, shape_b, child_b, xf_b, shape_a, xf_a);
    }
    manifold.point_count > 0
}
