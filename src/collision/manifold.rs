//! Contact manifold generation between two distance proxies.
//!
//! Dispatch is by vertex count: 1-vs-1 produces a circles manifold,
//! 1-vs-many clamps the point onto the polygon's Voronoi regions, and
//! many-vs-many runs max-separation reference-face selection with incident
//! edge clipping. When clipping cannot keep two points (corner hits,
//! collinear edges) the builder falls back to a closest-vertex-pair
//! resolution.

use arrayvec::ArrayVec;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::{LINEAR_SLOP, MAX_CIRCLES_RATIO, MAX_MANIFOLD_POINTS};
use crate::core::shapes::DistanceProxy;
use crate::core::types::Transform;

/// Geometric feature on one side of a contact point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Vertex,
    Face,
}

/// The pair of features that generated a contact point. Persistence of
/// solver impulses across steps is keyed on feature identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFeature {
    pub kind_a: FeatureKind,
    pub index_a: u8,
    pub kind_b: FeatureKind,
    pub index_b: u8,
}

impl ContactFeature {
    pub fn vertex_vertex(index_a: usize, index_b: usize) -> Self {
        Self {
            kind_a: FeatureKind::Vertex,
            index_a: index_a as u8,
            kind_b: FeatureKind::Vertex,
            index_b: index_b as u8,
        }
    }

    pub fn face_vertex(index_a: usize, index_b: usize) -> Self {
        Self {
            kind_a: FeatureKind::Face,
            index_a: index_a as u8,
            kind_b: FeatureKind::Vertex,
            index_b: index_b as u8,
        }
    }

    /// Swaps the A and B sides.
    pub fn flipped(self) -> Self {
        Self {
            kind_a: self.kind_b,
            index_a: self.index_b,
            kind_b: self.kind_a,
            index_b: self.index_a,
        }
    }
}

/// One persisted contact point.
#[derive(Debug, Clone, Copy)]
pub struct ManifoldPoint {
    /// For `Circles`: the point on B in B's frame. For `FaceA`: the
    /// point on B in B's frame. For `FaceB`: the point on A in A's frame.
    pub local_point: Vec2,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub feature: ContactFeature,
}

impl ManifoldPoint {
    fn new(local_point: Vec2, feature: ContactFeature) -> Self {
        Self {
            local_point,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            feature,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifoldType {
    Circles,
    FaceA,
    FaceB,
}

/// Contact patch between two shapes: at most two points plus the data
/// needed to reconstruct world-space normal and separations.
#[derive(Debug, Clone)]
pub struct Manifold {
    pub kind: ManifoldType,
    /// Reference-face normal in the reference body's frame. Unused for
    /// circles manifolds.
    pub local_normal: Vec2,
    /// For `Circles`: the point on A in A's frame. For faces: a point on
    /// the reference face in the reference body's frame.
    pub local_point: Vec2,
    pub points: ArrayVec<ManifoldPoint, MAX_MANIFOLD_POINTS>,
}

impl Manifold {
    pub fn empty() -> Self {
        Self {
            kind: ManifoldType::Circles,
            local_normal: Vec2::ZERO,
            local_point: Vec2::ZERO,
            points: ArrayVec::new(),
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Swaps the roles of body A and body B.
    pub fn flipped(mut self) -> Self {
        match self.kind {
            ManifoldType::Circles => {
                if let Some(point) = self.points.first_mut() {
                    std::mem::swap(&mut self.local_point, &mut point.local_point);
                    point.feature = point.feature.flipped();
                }
            }
            ManifoldType::FaceA => {
                self.kind = ManifoldType::FaceB;
                for point in &mut self.points {
                    point.feature = point.feature.flipped();
                }
            }
            ManifoldType::FaceB => {
                self.kind = ManifoldType::FaceA;
                for point in &mut self.points {
                    point.feature = point.feature.flipped();
                }
            }
        }
        self
    }
}

/// World-space view of a manifold: shared normal plus mid-skin contact
/// points and signed separations.
#[derive(Debug, Clone, Copy)]
pub struct WorldManifold {
    pub normal: Vec2,
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: Transform,
        radius_a: f32,
        xf_b: Transform,
        radius_b: f32,
    ) -> Self {
        let mut out = Self {
            normal: Vec2::X,
            points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
            separations: [0.0; MAX_MANIFOLD_POINTS],
        };
        if manifold.points.is_empty() {
            return out;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    out.normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + radius_a * out.normal;
                let c_b = point_b - radius_b * out.normal;
                out.points[0] = 0.5 * (c_a + c_b);
                out.separations[0] = (c_b - c_a).dot(out.normal);
            }
            ManifoldType::FaceA => {
                out.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for (i, point) in manifold.points.iter().enumerate() {
                    let clip_point = xf_b.apply(point.local_point);
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(out.normal)) * out.normal;
                    let c_b = clip_point - radius_b * out.normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_b - c_a).dot(out.normal);
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for (i, point) in manifold.points.iter().enumerate() {
                    let clip_point = xf_a.apply(point.local_point);
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(normal)) * normal;
                    let c_a = clip_point - radius_a * normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_a - c_b).dot(normal);
                }
                // Report the normal pointing from A to B.
                out.normal = -normal;
            }
        }
        out
    }
}

/// Computes the manifold between two proxies under the given transforms.
pub fn collide(
    proxy_a: &DistanceProxy,
    xf_a: Transform,
    proxy_b: &DistanceProxy,
    xf_b: Transform,
) -> Manifold {
    match (proxy_a.vertex_count(), proxy_b.vertex_count()) {
        (1, 1) => collide_circles(proxy_a, xf_a, proxy_b, xf_b),
        (1, _) => collide_polygon_circle(proxy_b, xf_b, proxy_a, xf_a).flipped(),
        (_, 1) => collide_polygon_circle(proxy_a, xf_a, proxy_b, xf_b),
        _ => collide_polygons(proxy_a, xf_a, proxy_b, xf_b),
    }
}

fn collide_circles(
    proxy_a: &DistanceProxy,
    xf_a: Transform,
    proxy_b: &DistanceProxy,
    xf_b: Transform,
) -> Manifold {
    let mut manifold = Manifold::empty();

    let p_a = xf_a.apply(proxy_a.vertex(0));
    let p_b = xf_b.apply(proxy_b.vertex(0));
    let total_radius = proxy_a.radius + proxy_b.radius;

    if p_a.distance_squared(p_b) > total_radius * total_radius {
        return manifold;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = proxy_a.vertex(0);
    manifold.points.push(ManifoldPoint::new(
        proxy_b.vertex(0),
        ContactFeature::vertex_vertex(0, 0),
    ));
    manifold
}

/// Polygon (A) versus a single vertex with radius (B).
fn collide_polygon_circle(
    polygon: &DistanceProxy,
    xf_a: Transform,
    circle: &DistanceProxy,
    xf_b: Transform,
) -> Manifold {
    let mut manifold = Manifold::empty();

    // Circle center in the polygon's frame.
    let c = xf_a.apply_inverse(xf_b.apply(circle.vertex(0)));
    let total_radius = polygon.radius + circle.radius;
    let count = polygon.vertex_count();

    // Deepest-penetration face.
    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for i in 0..count {
        let s = polygon.normal(i).dot(c - polygon.vertex(i));
        if s > total_radius {
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = polygon.vertex(normal_index);
    let v2 = polygon.vertex((normal_index + 1) % count);

    // Center inside the polygon: use the face directly.
    if separation < f32::EPSILON {
        manifold.kind = ManifoldType::FaceA;
        manifold.local_normal = polygon.normal(normal_index);
        manifold.local_point = 0.5 * (v1 + v2);
        manifold.points.push(ManifoldPoint::new(
            circle.vertex(0),
            ContactFeature::face_vertex(normal_index, 0),
        ));
        return manifold;
    }

    // Voronoi region of the face: vertex 1, vertex 2, or the face span.
    let u1 = (c - v1).dot(v2 - v1);
    let u2 = (c - v2).dot(v1 - v2);

    if u1 <= 0.0 {
        if c.distance_squared(v1) > total_radius * total_radius {
            return manifold;
        }
        manifold.kind = ManifoldType::Circles;
        manifold.local_point = v1;
        manifold.points.push(ManifoldPoint::new(
            circle.vertex(0),
            ContactFeature::vertex_vertex(normal_index, 0),
        ));
    } else if u2 <= 0.0 {
        if c.distance_squared(v2) > total_radius * total_radius {
            return manifold;
        }
        manifold.kind = ManifoldType::Circles;
        manifold.local_point = v2;
        manifold.points.push(ManifoldPoint::new(
            circle.vertex(0),
            ContactFeature::vertex_vertex((normal_index + 1) % count, 0),
        ));
    } else {
        let face_center = 0.5 * (v1 + v2);
        if (c - face_center).dot(polygon.normal(normal_index)) > total_radius {
            return manifold;
        }
        manifold.kind = ManifoldType::FaceA;
        manifold.local_normal = polygon.normal(normal_index);
        manifold.local_point = face_center;
        manifold.points.push(ManifoldPoint::new(
            circle.vertex(0),
            ContactFeature::face_vertex(normal_index, 0),
        ));
    }
    manifold
}

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    v: Vec2,
    feature: ContactFeature,
}

/// Highest separation of `proxy2`'s vertices over `proxy1`'s faces.
fn find_max_separation(
    proxy1: &DistanceProxy,
    xf1: Transform,
    proxy2: &DistanceProxy,
    xf2: Transform,
) -> (usize, f32) {
    // Work in proxy2's frame.
    let xf = xf2.mul_transpose(xf1);

    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for i in 0..proxy1.vertex_count() {
        let n = xf.q.apply(proxy1.normal(i));
        let v1 = xf.apply(proxy1.vertex(i));

        let mut min_projection = f32::MAX;
        for j in 0..proxy2.vertex_count() {
            min_projection = min_projection.min(n.dot(proxy2.vertex(j) - v1));
        }

        if min_projection > max_separation {
            max_separation = min_projection;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge on `proxy2` most anti-parallel to the reference face on `proxy1`.
fn find_incident_edge(
    proxy1: &DistanceProxy,
    xf1: Transform,
    edge1: usize,
    proxy2: &DistanceProxy,
    xf2: Transform,
) -> [ClipVertex; 2] {
    let normal1 = xf2.q.apply_inverse(xf1.q.apply(proxy1.normal(edge1)));

    let count2 = proxy2.vertex_count();
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for i in 0..count2 {
        let dot = normal1.dot(proxy2.normal(i));
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (index + 1) % count2;

    [
        ClipVertex {
            v: xf2.apply(proxy2.vertex(i1)),
            feature: ContactFeature {
                kind_a: FeatureKind::Face,
                index_a: edge1 as u8,
                kind_b: FeatureKind::Vertex,
                index_b: i1 as u8,
            },
        },
        ClipVertex {
            v: xf2.apply(proxy2.vertex(i2)),
            feature: ContactFeature {
                kind_a: FeatureKind::Face,
                index_a: edge1 as u8,
                kind_b: FeatureKind::Vertex,
                index_b: i2 as u8,
            },
        },
    ]
}

/// Sutherland-Hodgman clip of a two-point segment against a half-plane.
fn clip_segment_to_line(
    input: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> ArrayVec<ClipVertex, 2> {
    let mut out = ArrayVec::new();

    let distance0 = normal.dot(input[0].v) - offset;
    let distance1 = normal.dot(input[1].v) - offset;

    if distance0 <= 0.0 {
        out.push(input[0]);
    }
    if distance1 <= 0.0 {
        out.push(input[1]);
    }

    // Crossing point: the clip plane's vertex becomes the new feature.
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        out.push(ClipVertex {
            v: input[0].v + interp * (input[1].v - input[0].v),
            feature: ContactFeature {
                kind_a: FeatureKind::Vertex,
                index_a: vertex_index_a as u8,
                kind_b: FeatureKind::Face,
                index_b: input[0].feature.index_b,
            },
        });
    }

    out
}

fn collide_polygons(
    proxy_a: &DistanceProxy,
    xf_a: Transform,
    proxy_b: &DistanceProxy,
    xf_b: Transform,
) -> Manifold {
    let total_radius = proxy_a.radius + proxy_b.radius;

    let (edge_a, separation_a) = find_max_separation(proxy_a, xf_a, proxy_b, xf_b);
    if separation_a > total_radius {
        return Manifold::empty();
    }
    let (edge_b, separation_b) = find_max_separation(proxy_b, xf_b, proxy_a, xf_a);
    if separation_b > total_radius {
        return Manifold::empty();
    }

    // Prefer face A on near-ties for coherence across steps.
    const RELATIVE_TOL: f32 = 0.98;
    const ABSOLUTE_TOL: f32 = 0.1 * LINEAR_SLOP;

    let (proxy1, xf1, proxy2, xf2, edge1, flip) =
        if separation_b > RELATIVE_TOL * separation_a + ABSOLUTE_TOL {
            (proxy_b, xf_b, proxy_a, xf_a, edge_b, true)
        } else {
            (proxy_a, xf_a, proxy_b, xf_b, edge_a, false)
        };

    let incident_edge = find_incident_edge(proxy1, xf1, edge1, proxy2, xf2);

    let count1 = proxy1.vertex_count();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;

    let local_v11 = proxy1.vertex(iv1);
    let local_v12 = proxy1.vertex(iv2);

    let local_tangent = (local_v12 - local_v11).normalize_or_zero();
    let local_normal = Vec2::new(local_tangent.y, -local_tangent.x);
    let plane_point = 0.5 * (local_v11 + local_v12);

    let tangent = xf1.q.apply(local_tangent);
    let normal = Vec2::new(tangent.y, -tangent.x);

    let v11 = xf1.apply(local_v11);
    let v12 = xf1.apply(local_v12);

    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let mut kept: ArrayVec<ManifoldPoint, MAX_MANIFOLD_POINTS> = ArrayVec::new();
    let clip1 = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if clip1.len() == 2 {
        let clip2 =
            clip_segment_to_line(&[clip1[0], clip1[1]], tangent, side_offset2, iv2);
        for clip_vertex in &clip2 {
            let separation = normal.dot(clip_vertex.v) - front_offset;
            if separation <= total_radius {
                let feature = if flip {
                    clip_vertex.feature.flipped()
                } else {
                    clip_vertex.feature
                };
                kept.push(ManifoldPoint::new(xf2.apply_inverse(clip_vertex.v), feature));
            }
        }
    }

    if kept.len() == MAX_MANIFOLD_POINTS {
        let mut manifold = Manifold::empty();
        manifold.kind = if flip {
            ManifoldType::FaceB
        } else {
            ManifoldType::FaceA
        };
        manifold.local_normal = local_normal;
        manifold.local_point = plane_point;
        manifold.points = kept;
        return manifold;
    }

    // Corners resolution: clipping lost the face overlap (corner hit or
    // collinear edges). Resolve against the closest vertex pair instead.
    let ref_edge_length = (local_v12 - local_v11).length();
    corners_fallback(
        proxy_a,
        xf_a,
        proxy_b,
        xf_b,
        total_radius,
        ref_edge_length,
        proxy1.radius,
        flip,
        local_normal,
        plane_point,
        kept,
    )
}

/// Closest-vertex-pair resolution used when face clipping keeps fewer
/// than two points. Produces a circles manifold, or a one-point face
/// manifold when the reference edge is long relative to its vertex
/// radius (circles manifolds jitter on long chain edges).
#[allow(clippy::too_many_arguments)]
fn corners_fallback(
    proxy_a: &DistanceProxy,
    xf_a: Transform,
    proxy_b: &DistanceProxy,
    xf_b: Transform,
    total_radius: f32,
    ref_edge_length: f32,
    ref_vertex_radius: f32,
    flip: bool,
    local_normal: Vec2,
    plane_point: Vec2,
    kept: ArrayVec<ManifoldPoint, MAX_MANIFOLD_POINTS>,
) -> Manifold {
    let mut manifold = Manifold::empty();

    let mut best = (0_usize, 0_usize, f32::MAX);
    for i in 0..proxy_a.vertex_count() {
        let p_a = xf_a.apply(proxy_a.vertex(i));
        for j in 0..proxy_b.vertex_count() {
            let p_b = xf_b.apply(proxy_b.vertex(j));
            let dist = p_a.distance_squared(p_b);
            if dist < best.2 {
                best = (i, j, dist);
            }
        }
    }

    if best.2 > total_radius * total_radius {
        return manifold;
    }

    if ref_edge_length > MAX_CIRCLES_RATIO * ref_vertex_radius && kept.len() == 1 {
        manifold.kind = if flip {
            ManifoldType::FaceB
        } else {
            ManifoldType::FaceA
        };
        manifold.local_normal = local_normal;
        manifold.local_point = plane_point;
        manifold.points = kept;
        return manifold;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = proxy_a.vertex(best.0);
    manifold.points.push(ManifoldPoint::new(
        proxy_b.vertex(best.1),
        ContactFeature::vertex_vertex(best.0, best.1),
    ));
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shapes::Shape;
    use approx::assert_relative_eq;

    fn manifold_between(
        shape_a: &Shape,
        xf_a: Transform,
        shape_b: &Shape,
        xf_b: Transform,
    ) -> Manifold {
        collide(&shape_a.proxy(0), xf_a, &shape_b.proxy(0), xf_b)
    }

    #[test]
    fn separated_circles_make_no_points() {
        let a = Shape::circle(1.0);
        let b = Shape::circle(1.0);
        let manifold = manifold_between(
            &a,
            Transform::new(Vec2::ZERO, 0.0),
            &b,
            Transform::new(Vec2::new(3.0, 0.0), 0.0),
        );
        assert_eq!(manifold.point_count(), 0);
    }

    #[test]
    fn overlapping_circles_make_one_point() {
        let a = Shape::circle(1.0);
        let b = Shape::circle(1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);
        let manifold = manifold_between(&a, xf_a, &b, xf_b);
        assert_eq!(manifold.kind, ManifoldType::Circles);
        assert_eq!(manifold.point_count(), 1);

        let world = WorldManifold::new(&manifold, xf_a, 1.0, xf_b, 1.0);
        assert_relative_eq!(world.normal.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(world.separations[0], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn face_contact_keeps_two_points() {
        let a = Shape::box_shape(1.0, 1.0);
        let b = Shape::box_shape(1.0, 1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(0.0, 1.99), 0.0);
        let manifold = manifold_between(&a, xf_a, &b, xf_b);
        assert_eq!(manifold.point_count(), 2);
        assert!(matches!(
            manifold.kind,
            ManifoldType::FaceA | ManifoldType::FaceB
        ));

        let radius = a.vertex_radius(0);
        let world = WorldManifold::new(&manifold, xf_a, radius, xf_b, radius);
        assert_relative_eq!(world.normal.y.abs(), 1.0, epsilon = 1e-5);
        for i in 0..2 {
            assert!(world.separations[i] < 0.0);
        }
    }

    #[test]
    fn polygon_circle_face_region() {
        let poly = Shape::box_shape(1.0, 1.0);
        let circle = Shape::circle(0.5);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(0.0, 1.4), 0.0);
        let manifold = manifold_between(&poly, xf_a, &circle, xf_b);
        assert_eq!(manifold.kind, ManifoldType::FaceA);
        assert_eq!(manifold.point_count(), 1);
    }

    #[test]
    fn polygon_circle_vertex_region_gives_circles() {
        let poly = Shape::box_shape(1.0, 1.0);
        let circle = Shape::circle(0.5);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        // Diagonally off the corner (1, 1).
        let xf_b = Transform::new(Vec2::new(1.25, 1.25), 0.0);
        let manifold = manifold_between(&poly, xf_a, &circle, xf_b);
        assert_eq!(manifold.kind, ManifoldType::Circles);
        assert_eq!(manifold.point_count(), 1);
    }

    #[test]
    fn circle_first_dispatch_flips_to_face_b() {
        let circle = Shape::circle(0.5);
        let poly = Shape::box_shape(1.0, 1.0);
        let xf_a = Transform::new(Vec2::new(0.0, 1.4), 0.0);
        let xf_b = Transform::new(Vec2::ZERO, 0.0);
        let manifold = manifold_between(&circle, xf_a, &poly, xf_b);
        assert_eq!(manifold.kind, ManifoldType::FaceB);

        let world = WorldManifold::new(&manifold, xf_a, 0.5, xf_b, poly.vertex_radius(0));
        // Normal points from the circle (A) toward the box (B).
        assert_relative_eq!(world.normal.y, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn collinear_edge_contact_uses_corners_fallback() {
        // Two edges meeting end-to-end and collinear: clipping cannot
        // keep a two-point face, so the corners path must answer.
        let a = Shape::edge(Vec2::new(-1.0, 0.0), Vec2::new(0.0, 0.0));
        let b = Shape::edge(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0));
        let manifold = manifold_between(
            &a,
            Transform::IDENTITY,
            &b,
            Transform::IDENTITY,
        );
        assert!(manifold.point_count() <= 1);
        if manifold.point_count() == 1 {
            assert!(matches!(
                manifold.kind,
                ManifoldType::Circles | ManifoldType::FaceA | ManifoldType::FaceB
            ));
        }
    }

    #[test]
    fn warm_start_features_are_stable_across_small_motion() {
        let a = Shape::box_shape(1.0, 1.0);
        let b = Shape::box_shape(1.0, 1.0);
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let m1 = manifold_between(&a, xf_a, &b, Transform::new(Vec2::new(0.0, 1.99), 0.0));
        let m2 = manifold_between(&a, xf_a, &b, Transform::new(Vec2::new(0.001, 1.99), 0.0));
        assert_eq!(m1.point_count(), 2);
        assert_eq!(m2.point_count(), 2);
        for (p1, p2) in m1.points.iter().zip(m2.points.iter()) {
            assert_eq!(p1.feature, p2.feature);
        }
    }
}
