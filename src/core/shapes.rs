//! The closed set of collision shapes.
//!
//! The collision pipeline never inspects concrete variants; it consumes the
//! uniform [`DistanceProxy`] view (vertex radius plus vertex/normal lists)
//! that every shape child exposes.

use arrayvec::ArrayVec;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::aabb::Aabb;
use crate::collision::{RayCastHit, RayCastInput};
use crate::config::{MAX_POLYGON_VERTICES, POLYGON_RADIUS};
use crate::core::types::{MassData, Transform};
use crate::error::WorldError;
use crate::utils::math::cross;

/// Minimal view of one shape child consumed by distance, TOI, and the
/// manifold builder.
#[derive(Debug, Clone)]
pub struct DistanceProxy {
    pub radius: f32,
    pub vertices: ArrayVec<Vec2, MAX_POLYGON_VERTICES>,
    pub normals: ArrayVec<Vec2, MAX_POLYGON_VERTICES>,
}

impl DistanceProxy {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    pub fn normal(&self, index: usize) -> Vec2 {
        self.normals[index]
    }

    /// Index of the vertex with maximum projection along `direction`.
    pub fn support(&self, direction: Vec2) -> usize {
        let mut best = 0;
        let mut best_value = self.vertices[0].dot(direction);
        for (i, v) in self.vertices.iter().enumerate().skip(1) {
            let value = v.dot(direction);
            if value > best_value {
                best_value = value;
                best = i;
            }
        }
        best
    }
}

/// Convex polygon data shared by the polygon and compound variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonData {
    pub vertices: ArrayVec<Vec2, MAX_POLYGON_VERTICES>,
    pub normals: ArrayVec<Vec2, MAX_POLYGON_VERTICES>,
    pub centroid: Vec2,
}

/// Collision geometry bound to a body through a fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Shape {
    /// Solid disk.
    Circle { radius: f32, center: Vec2 },
    /// One-sided line segment with a thin skin radius.
    Edge { vertices: [Vec2; 2] },
    /// Convex polygon with a thin skin radius.
    Polygon(PolygonData),
    /// Open polyline; one child per segment. Zero mass.
    Chain { vertices: Vec<Vec2> },
    /// Set of convex polygons; one child per hull.
    Compound { polygons: Vec<PolygonData> },
}

impl Shape {
    pub fn circle(radius: f32) -> Shape {
        Shape::Circle {
            radius,
            center: Vec2::ZERO,
        }
    }

    pub fn circle_at(radius: f32, center: Vec2) -> Shape {
        Shape::Circle { radius, center }
    }

    pub fn edge(v1: Vec2, v2: Vec2) -> Shape {
        Shape::Edge { vertices: [v1, v2] }
    }

    /// Axis-aligned box centered at the local origin.
    pub fn box_shape(half_width: f32, half_height: f32) -> Shape {
        let vertices = [
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ];
        let normals = [
            Vec2::new(0.0, -1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(-1.0, 0.0),
        ];
        Shape::Polygon(PolygonData {
            vertices: vertices.into_iter().collect(),
            normals: normals.into_iter().collect(),
            centroid: Vec2::ZERO,
        })
    }

    /// Convex hull of the given point cloud.
    pub fn polygon(points: &[Vec2]) -> Result<Shape, WorldError> {
        let data = convex_hull(points)?;
        Ok(Shape::Polygon(data))
    }

    pub fn chain(vertices: Vec<Vec2>) -> Result<Shape, WorldError> {
        if vertices.len() < 2 {
            return Err(WorldError::InvalidArgument(
                "chain needs at least two vertices",
            ));
        }
        Ok(Shape::Chain { vertices })
    }

    pub fn compound(hulls: Vec<Vec<Vec2>>) -> Result<Shape, WorldError> {
        if hulls.is_empty() {
            return Err(WorldError::InvalidArgument(
                "compound needs at least one hull",
            ));
        }
        let polygons = hulls
            .iter()
            .map(|points| convex_hull(points))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Shape::Compound { polygons })
    }

    /// Number of broad-phase children this shape occupies.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Circle { .. } | Shape::Edge { .. } | Shape::Polygon(_) => 1,
            Shape::Chain { vertices } => vertices.len() - 1,
            Shape::Compound { polygons } => polygons.len(),
        }
    }

    /// Vertex radius of the given child.
    pub fn vertex_radius(&self, _child: usize) -> f32 {
        match self {
            Shape::Circle { radius, .. } => *radius,
            _ => POLYGON_RADIUS,
        }
    }

    /// Distance-proxy view of the given child.
    pub fn proxy(&self, child: usize) -> DistanceProxy {
        match self {
            Shape::Circle { radius, center } => DistanceProxy {
                radius: *radius,
                vertices: std::iter::once(*center).collect(),
                normals: ArrayVec::new(),
            },
            Shape::Edge { vertices } => edge_proxy(vertices[0], vertices[1]),
            Shape::Polygon(data) => DistanceProxy {
                radius: POLYGON_RADIUS,
                vertices: data.vertices.clone(),
                normals: data.normals.clone(),
            },
            Shape::Chain { vertices } => {
                debug_assert!(child + 1 < vertices.len());
                edge_proxy(vertices[child], vertices[child + 1])
            }
            Shape::Compound { polygons } => {
                let data = &polygons[child];
                DistanceProxy {
                    radius: POLYGON_RADIUS,
                    vertices: data.vertices.clone(),
                    normals: data.normals.clone(),
                }
            }
        }
    }

    /// Tight AABB of the given child under `xf`.
    pub fn compute_aabb(&self, xf: Transform, child: usize) -> Aabb {
        let proxy = self.proxy(child);
        let mut lower = xf.apply(proxy.vertex(0));
        let mut upper = lower;
        for v in proxy.vertices.iter().skip(1) {
            let p = xf.apply(*v);
            lower = lower.min(p);
            upper = upper.max(p);
        }
        let r = Vec2::splat(proxy.radius);
        Aabb::new(lower - r, upper + r)
    }

    /// Mass, center, and rotational inertia about the shape origin for
    /// the whole shape at the given density. Edges and chains carry no
    /// volume and report zero mass at their midpoint.
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Shape::Circle { radius, center } => {
                let mass = density * std::f32::consts::PI * radius * radius;
                MassData {
                    mass,
                    center: *center,
                    inertia: mass * (0.5 * radius * radius + center.length_squared()),
                }
            }
            Shape::Edge { vertices } => MassData {
                mass: 0.0,
                center: 0.5 * (vertices[0] + vertices[1]),
                inertia: 0.0,
            },
            Shape::Polygon(data) => polygon_mass(data, density),
            Shape::Chain { vertices } => {
                let center = vertices.iter().copied().sum::<Vec2>() / vertices.len() as f32;
                MassData {
                    mass: 0.0,
                    center,
                    inertia: 0.0,
                }
            }
            Shape::Compound { polygons } => {
                let mut total = MassData::default();
                for data in polygons {
                    let part = polygon_mass(data, density);
                    let combined_mass = total.mass + part.mass;
                    if combined_mass > 0.0 {
                        total.center = (total.center * total.mass + part.center * part.mass)
                            / combined_mass;
                    }
                    total.mass = combined_mass;
                    total.inertia += part.inertia;
                }
                total
            }
        }
    }

    /// Exact segment cast against the given child.
    pub fn ray_cast(&self, input: &RayCastInput, xf: Transform, child: usize) -> Option<RayCastHit> {
        match self {
            Shape::Circle { radius, center } => ray_cast_circle(input, xf, *center, *radius),
            Shape::Edge { vertices } => ray_cast_segment(input, xf, vertices[0], vertices[1]),
            Shape::Polygon(data) => ray_cast_polygon(input, xf, data),
            Shape::Chain { vertices } => {
                ray_cast_segment(input, xf, vertices[child], vertices[child + 1])
            }
            Shape::Compound { polygons } => ray_cast_polygon(input, xf, &polygons[child]),
        }
    }

    /// Whether a world point lies inside the shape. Edges and chains
    /// have no interior.
    pub fn test_point(&self, xf: Transform, point: Vec2) -> bool {
        match self {
            Shape::Circle { radius, center } => {
                let local = xf.apply_inverse(point);
                (local - *center).length_squared() <= radius * radius
            }
            Shape::Edge { .. } | Shape::Chain { .. } => false,
            Shape::Polygon(data) => point_in_polygon(xf, data, point),
            Shape::Compound { polygons } => {
                polygons.iter().any(|data| point_in_polygon(xf, data, point))
            }
        }
    }
}

fn edge_proxy(v1: Vec2, v2: Vec2) -> DistanceProxy {
    let n = perp(v2 - v1).normalize_or_zero();
    DistanceProxy {
        radius: POLYGON_RADIUS,
        vertices: [v1, v2].into_iter().collect(),
        normals: [n, -n].into_iter().collect(),
    }
}

/// Forward perpendicular: rotates the vector -90 degrees so that the
/// normal of a counter-clockwise edge points outward.
fn perp(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

fn point_in_polygon(xf: Transform, data: &PolygonData, point: Vec2) -> bool {
    let local = xf.apply_inverse(point);
    for (v, n) in data.vertices.iter().zip(data.normals.iter()) {
        if n.dot(local - *v) > 0.0 {
            return false;
        }
    }
    true
}

fn polygon_mass(data: &PolygonData, density: f32) -> MassData {
    debug_assert!(data.vertices.len() >= 3);

    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    let mut inertia = 0.0;

    // Reference point inside the polygon keeps triangle areas positive.
    let reference = data.vertices.iter().copied().sum::<Vec2>() / data.vertices.len() as f32;

    let inv3 = 1.0 / 3.0;
    let count = data.vertices.len();
    for i in 0..count {
        let e1 = data.vertices[i] - reference;
        let e2 = data.vertices[(i + 1) % count] - reference;

        let d = cross(e1, e2);
        let triangle_area = 0.5 * d;
        area += triangle_area;
        center += triangle_area * inv3 * (e1 + e2);

        let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
        let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
        inertia += (0.25 * inv3 * d) * (intx2 + inty2);
    }

    let mass = density * area;
    center *= 1.0 / area;
    let world_center = center + reference;

    // Inertia about the reference, shifted to the shape origin.
    let inertia = density * inertia
        + mass * (world_center.length_squared() - center.length_squared());

    MassData {
        mass,
        center: world_center,
        inertia,
    }
}

/// Gift-wraps the point cloud into a counter-clockwise convex hull.
fn convex_hull(points: &[Vec2]) -> Result<PolygonData, WorldError> {
    if points.len() < 3 {
        return Err(WorldError::InvalidArgument(
            "polygon needs at least three points",
        ));
    }
    if points.len() > MAX_POLYGON_VERTICES {
        return Err(WorldError::InvalidArgument("too many polygon vertices"));
    }

    // Start from the rightmost-lowest point, which is always on the hull.
    let mut start = 0;
    for (i, p) in points.iter().enumerate().skip(1) {
        let best = points[start];
        if p.x > best.x || (p.x == best.x && p.y < best.y) {
            start = i;
        }
    }

    let mut hull: ArrayVec<usize, MAX_POLYGON_VERTICES> = ArrayVec::new();
    let mut index = start;
    loop {
        if hull.len() == MAX_POLYGON_VERTICES {
            return Err(WorldError::InvalidArgument("degenerate polygon hull"));
        }
        hull.push(index);

        let mut next = 0;
        for candidate in 1..points.len() {
            if next == index {
                next = candidate;
                continue;
            }
            let r = points[next] - points[hull[hull.len() - 1]];
            let v = points[candidate] - points[hull[hull.len() - 1]];
            let c = cross(r, v);
            if c < 0.0 {
                next = candidate;
            }
            // Collinear: keep the farthest.
            if c == 0.0 && v.length_squared() > r.length_squared() {
                next = candidate;
            }
        }

        index = next;
        if index == start {
            break;
        }
    }

    if hull.len() < 3 {
        return Err(WorldError::InvalidArgument("degenerate polygon hull"));
    }

    let vertices: ArrayVec<Vec2, MAX_POLYGON_VERTICES> =
        hull.iter().map(|&i| points[i]).collect();

    let mut normals: ArrayVec<Vec2, MAX_POLYGON_VERTICES> = ArrayVec::new();
    for i in 0..vertices.len() {
        let edge = vertices[(i + 1) % vertices.len()] - vertices[i];
        if edge.length_squared() <= f32::EPSILON * f32::EPSILON {
            return Err(WorldError::InvalidArgument("degenerate polygon hull"));
        }
        normals.push(perp(edge).normalize());
    }

    let centroid = polygon_mass(
        &PolygonData {
            vertices: vertices.clone(),
            normals: normals.clone(),
            centroid: Vec2::ZERO,
        },
        1.0,
    )
    .center;

    Ok(PolygonData {
        vertices,
        normals,
        centroid,
    })
}

fn ray_cast_circle(
    input: &RayCastInput,
    xf: Transform,
    center: Vec2,
    radius: f32,
) -> Option<RayCastHit> {
    let position = xf.apply(center);
    let s = input.p1 - position;
    let b = s.length_squared() - radius * radius;

    let r = input.p2 - input.p1;
    let c = s.dot(r);
    let rr = r.length_squared();
    let sigma = c * c - rr * b;

    if sigma < 0.0 || rr < f32::EPSILON {
        return None;
    }

    let t = -(c + sigma.sqrt());
    if 0.0 <= t && t <= input.max_fraction * rr {
        let fraction = t / rr;
        let normal = (s + fraction * r).normalize_or_zero();
        return Some(RayCastHit { normal, fraction });
    }
    None
}

fn ray_cast_segment(input: &RayCastInput, xf: Transform, v1: Vec2, v2: Vec2) -> Option<RayCastHit> {
    // Work in the shape's local frame.
    let p1 = xf.apply_inverse(input.p1);
    let p2 = xf.apply_inverse(input.p2);
    let d = p2 - p1;

    let e = v2 - v1;
    let normal = perp(e).normalize_or_zero();

    // p = p1 + t * d, dot(normal, p - v1) = 0
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
    let rr = e.length_squared();
    if rr == 0.0 {
        return None;
    }
    let s = (q - v1).dot(e) / rr;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }

    let world_normal = if numerator > 0.0 {
        xf.q.apply(-normal)
    } else {
        xf.q.apply(normal)
    };
    Some(RayCastHit {
        normal: world_normal,
        fraction: t,
    })
}

fn ray_cast_polygon(input: &RayCastInput, xf: Transform, data: &PolygonData) -> Option<RayCastHit> {
    let p1 = xf.apply_inverse(input.p1);
    let p2 = xf.apply_inverse(input.p2);
    let d = p2 - p1;

    let mut lower = 0.0_f32;
    let mut upper = input.max_fraction;
    let mut index = None;

    for i in 0..data.vertices.len() {
        // p = p1 + t * d; separation(p) = dot(normal, p - v) <= 0
        let numerator = data.normals[i].dot(data.vertices[i] - p1);
        let denominator = data.normals[i].dot(d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return None;
            }
        } else {
            if denominator < 0.0 && numerator < lower * denominator {
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                upper = numerator / denominator;
            }
        }

        if upper < lower {
            return None;
        }
    }

    index.map(|i| RayCastHit {
        normal: xf.q.apply(data.normals[i]),
        fraction: lower,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn box_mass_matches_closed_form() {
        let shape = Shape::box_shape(1.0, 2.0);
        let mass_data = shape.compute_mass(2.0);
        // 2x4 box at density 2: mass 16, I = m (w^2 + h^2) / 12.
        assert_relative_eq!(mass_data.mass, 16.0, epsilon = 1e-4);
        assert_relative_eq!(mass_data.center.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(
            mass_data.inertia,
            16.0 * (4.0 + 16.0) / 12.0,
            epsilon = 1e-3
        );
    }

    #[test]
    fn circle_mass_matches_closed_form() {
        let shape = Shape::circle(2.0);
        let mass_data = shape.compute_mass(1.0);
        let expected = std::f32::consts::PI * 4.0;
        assert_relative_eq!(mass_data.mass, expected, epsilon = 1e-4);
        assert_relative_eq!(mass_data.inertia, expected * 2.0, epsilon = 1e-3);
    }

    #[test]
    fn hull_discards_interior_points() {
        let shape = Shape::polygon(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(1.0, 1.0), // interior
        ])
        .expect("valid hull");
        match shape {
            Shape::Polygon(data) => assert_eq!(data.vertices.len(), 4),
            _ => unreachable!(),
        }
    }

    #[test]
    fn degenerate_polygon_is_rejected() {
        let collinear = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
        ];
        assert!(matches!(
            Shape::polygon(&collinear),
            Err(WorldError::InvalidArgument(_))
        ));
    }

    #[test]
    fn chain_children_expose_segment_proxies() {
        let shape = Shape::chain(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 1.0),
        ])
        .expect("valid chain");
        assert_eq!(shape.child_count(), 2);
        let proxy = shape.proxy(1);
        assert_eq!(proxy.vertex_count(), 2);
        assert_eq!(proxy.vertex(0), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn polygon_ray_cast_reports_entry_face() {
        let shape = Shape::box_shape(1.0, 1.0);
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = shape
            .ray_cast(&input, Transform::IDENTITY, 0)
            .expect("ray hits box");
        assert_relative_eq!(hit.fraction, 2.0 / 6.0, epsilon = 1e-5);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn circle_ray_cast_from_outside() {
        let shape = Shape::circle(1.0);
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = shape
            .ray_cast(&input, Transform::IDENTITY, 0)
            .expect("ray hits circle");
        assert_relative_eq!(hit.fraction, 2.0 / 6.0, epsilon = 1e-5);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn point_tests_respect_rotation() {
        let shape = Shape::box_shape(2.0, 0.5);
        let xf = Transform::new(Vec2::ZERO, std::f32::consts::FRAC_PI_2);
        assert!(shape.test_point(xf, Vec2::new(0.0, 1.5)));
        assert!(!shape.test_point(xf, Vec2::new(1.5, 0.0)));
    }
}
