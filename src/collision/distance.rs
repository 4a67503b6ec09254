//! GJK distance between two convex distance proxies.
//!
//! Uses an edge-based simplex of up to three vertices and supports warm
//! restarts from a cached simplex recorded by the previous query.

use arrayvec::ArrayVec;
use glam::Vec2;

use crate::config::MAX_DISTANCE_ITERATIONS;
use crate::core::shapes::DistanceProxy;
use crate::core::types::Transform;
use crate::utils::math::cross;

/// Simplex state carried between queries for warm restarts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplexCache {
    /// Length or area metric of the cached simplex, used to detect a
    /// degenerate restart.
    pub metric: f32,
    pub count: u8,
    pub index_a: [u8; 3],
    pub index_b: [u8; 3],
}

/// Distance query input.
pub struct DistanceInput<'a> {
    pub proxy_a: &'a DistanceProxy,
    pub proxy_b: &'a DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    /// When set, witness points are pulled onto the shape surfaces and
    /// the distance accounts for the vertex radii.
    pub use_radii: bool,
}

/// Distance query output: the closest pair of witness points.
#[derive(Debug, Clone, Copy)]
pub struct DistanceOutput {
    pub point_a: Vec2,
    pub point_b: Vec2,
    pub distance: f32,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point on proxy A in world coordinates.
    w_a: Vec2,
    /// Support point on proxy B in world coordinates.
    w_b: Vec2,
    /// `w_b - w_a`.
    w: Vec2,
    /// Barycentric weight for closest-point reconstruction.
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Default)]
struct Simplex {
    vertices: ArrayVec<SimplexVertex, 3>,
}

impl Simplex {
    fn read_cache(
        &mut self,
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: Transform,
        proxy_b: &DistanceProxy,
        xf_b: Transform,
    ) {
        self.vertices.clear();
        for i in 0..cache.count as usize {
            let index_a = cache.index_a[i] as usize;
            let index_b = cache.index_b[i] as usize;
            let w_a = xf_a.apply(proxy_a.vertex(index_a));
            let w_b = xf_b.apply(proxy_b.vertex(index_b));
            self.vertices.push(SimplexVertex {
                w_a,
                w_b,
                w: w_b - w_a,
                a: 0.0,
                index_a,
                index_b,
            });
        }

        // A cached simplex whose metric changed too much is stale;
        // restart from a single arbitrary support.
        if self.vertices.len() > 1 {
            let metric1 = cache.metric;
            let metric2 = self.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                self.vertices.clear();
            }
        }

        if self.vertices.is_empty() {
            let w_a = xf_a.apply(proxy_a.vertex(0));
            let w_b = xf_b.apply(proxy_b.vertex(0));
            self.vertices.push(SimplexVertex {
                w_a,
                w_b,
                w: w_b - w_a,
                a: 1.0,
                index_a: 0,
                index_b: 0,
            });
        }
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.vertices.len() as u8;
        for (i, v) in self.vertices.iter().enumerate() {
            cache.index_a[i] = v.index_a as u8;
            cache.index_b[i] = v.index_b as u8;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.vertices.len() {
            1 => -self.vertices[0].w,
            2 => {
                let e12 = self.vertices[1].w - self.vertices[0].w;
                let sgn = cross(e12, -self.vertices[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12.
                    Vec2::new(-e12.y, e12.x)
                } else {
                    Vec2::new(e12.y, -e12.x)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn closest_point(&self) -> Vec2 {
        match self.vertices.len() {
            1 => self.vertices[0].w,
            2 => self.vertices[0].a * self.vertices[0].w + self.vertices[1].a * self.vertices[1].w,
            3 => Vec2::ZERO,
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.vertices.len() {
            1 => (self.vertices[0].w_a, self.vertices[0].w_b),
            2 => {
                let a = &self.vertices[0];
                let b = &self.vertices[1];
                (
                    a.a * a.w_a + b.a * b.w_a,
                    a.a * a.w_b + b.a * b.w_b,
                )
            }
            3 => {
                let a = &self.vertices[0];
                let b = &self.vertices[1];
                let c = &self.vertices[2];
                let p = a.a * a.w_a + b.a * b.w_a + c.a * c.w_a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f32 {
        match self.vertices.len() {
            1 => 0.0,
            2 => (self.vertices[0].w - self.vertices[1].w).length(),
            3 => cross(
                self.vertices[1].w - self.vertices[0].w,
                self.vertices[2].w - self.vertices[0].w,
            ),
            _ => 0.0,
        }
    }

    /// Closest point on segment w1-w2 to the origin, reducing the
    /// simplex to the supporting feature.
    fn solve2(&mut self) {
        let w1 = self.vertices[0].w;
        let w2 = self.vertices[1].w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.vertices[0].a = 1.0;
            self.vertices.truncate(1);
            return;
        }

        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.vertices[1].a = 1.0;
            self.vertices[0] = self.vertices[1];
            self.vertices.truncate(1);
            return;
        }

        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.vertices[0].a = d12_1 * inv_d12;
        self.vertices[1].a = d12_2 * inv_d12;
    }

    /// Closest point on triangle w1-w2-w3 to the origin.
    fn solve3(&mut self) {
        let w1 = self.vertices[0].w;
        let w2 = self.vertices[1].w;
        let w3 = self.vertices[2].w;

        let e12 = w2 - w1;
        let w1e12 = w1.dot(e12);
        let w2e12 = w2.dot(e12);
        let d12_1 = w2e12;
        let d12_2 = -w1e12;

        let e13 = w3 - w1;
        let w1e13 = w1.dot(e13);
        let w3e13 = w3.dot(e13);
        let d13_1 = w3e13;
        let d13_2 = -w1e13;

        let e23 = w3 - w2;
        let w2e23 = w2.dot(e23);
        let w3e23 = w3.dot(e23);
        let d23_1 = w3e23;
        let d23_2 = -w2e23;

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // Vertex w1 region.
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.vertices[0].a = 1.0;
            self.vertices.truncate(1);
            return;
        }

        // Edge w1-w2 region.
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv_d12 = 1.0 / (d12_1 + d12_2);
            self.vertices[0].a = d12_1 * inv_d12;
            self.vertices[1].a = d12_2 * inv_d12;
            self.vertices.truncate(2);
            return;
        }

        // Edge w1-w3 region.
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv_d13 = 1.0 / (d13_1 + d13_2);
            self.vertices[0].a = d13_1 * inv_d13;
            self.vertices[2].a = d13_2 * inv_d13;
            self.vertices[1] = self.vertices[2];
            self.vertices.truncate(2);
            return;
        }

        // Vertex w2 region.
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.vertices[1].a = 1.0;
            self.vertices[0] = self.vertices[1];
            self.vertices.truncate(1);
            return;
        }

        // Vertex w3 region.
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.vertices[2].a = 1.0;
            self.vertices[0] = self.vertices[2];
            self.vertices.truncate(1);
            return;
        }

        // Edge w2-w3 region.
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv_d23 = 1.0 / (d23_1 + d23_2);
            self.vertices[1].a = d23_1 * inv_d23;
            self.vertices[2].a = d23_2 * inv_d23;
            self.vertices[0] = self.vertices[2];
            self.vertices.truncate(2);
            return;
        }

        // Interior: the simplex encloses the origin.
        let inv_d123 = 1.0 / (d123_1 + d123_2 + d123_3);
        self.vertices[0].a = d123_1 * inv_d123;
        self.vertices[1].a = d123_2 * inv_d123;
        self.vertices[2].a = d123_3 * inv_d123;
    }
}

/// Computes the closest points between two proxies, warm-started from
/// `cache` and updating it for the next call.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput<'_>) -> DistanceOutput {
    let proxy_a = input.proxy_a;
    let proxy_b = input.proxy_b;
    let xf_a = input.transform_a;
    let xf_b = input.transform_b;

    let mut simplex = Simplex::default();
    simplex.read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    let mut iterations = 0;
    let mut save_a = [0_usize; 3];
    let mut save_b = [0_usize; 3];

    while iterations < MAX_DISTANCE_ITERATIONS {
        let save_count = simplex.vertices.len();
        for i in 0..save_count {
            save_a[i] = simplex.vertices[i].index_a;
            save_b[i] = simplex.vertices[i].index_b;
        }

        match simplex.vertices.len() {
            1 => {}
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => unreachable!(),
        }

        // The simplex grew to enclose the origin: shapes overlap.
        if simplex.vertices.len() == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            // The origin sits on an edge or vertex of the simplex. Not
            // an overlap certificate, so leave without adding a vertex.
            break;
        }

        let index_a = proxy_a.support(xf_a.q.apply_inverse(-d));
        let index_b = proxy_b.support(xf_b.q.apply_inverse(d));
        let w_a = xf_a.apply(proxy_a.vertex(index_a));
        let w_b = xf_b.apply(proxy_b.vertex(index_b));

        iterations += 1;

        // A repeated support pair means no further progress.
        let mut duplicate = false;
        for i in 0..save_count {
            if index_a == save_a[i] && index_b == save_b[i] {
                duplicate = true;
                break;
            }
        }
        if duplicate {
            break;
        }

        simplex.vertices.push(SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        });
    }

    simplex.write_cache(cache);

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = (point_b - point_a).length();

    if input.use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;
        if dist > r_a + r_b && dist > f32::EPSILON {
            // Shapes are separated: pull witness points to the surface.
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalize();
            point_a += r_a * normal;
            point_b -= r_b * normal;
        } else {
            // Overlapping skins: collapse both witnesses to the midpoint.
            let p = 0.5 * (point_a + point_b);
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations,
    }
}

/// Whether two proxies overlap (skins included), within a small
/// numerical cushion.
pub fn test_overlap(
    proxy_a: &DistanceProxy,
    xf_a: Transform,
    proxy_b: &DistanceProxy,
    xf_b: Transform,
) -> bool {
    let mut cache = SimplexCache::default();
    let output = distance(
        &mut cache,
        &DistanceInput {
            proxy_a,
            proxy_b,
            transform_a: xf_a,
            transform_b: xf_b,
            use_radii: true,
        },
    );
    output.distance < 10.0 * f32::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shapes::Shape;
    use approx::assert_relative_eq;
    use glam::Vec2;

    fn query(shape_a: &Shape, xf_a: Transform, shape_b: &Shape, xf_b: Transform) -> DistanceOutput {
        let proxy_a = shape_a.proxy(0);
        let proxy_b = shape_b.proxy(0);
        let mut cache = SimplexCache::default();
        distance(
            &mut cache,
            &DistanceInput {
                proxy_a: &proxy_a,
                proxy_b: &proxy_b,
                transform_a: xf_a,
                transform_b: xf_b,
                use_radii: true,
            },
        )
    }

    #[test]
    fn separated_circles_report_gap() {
        let a = Shape::circle(1.0);
        let b = Shape::circle(1.0);
        let out = query(
            &a,
            Transform::new(Vec2::ZERO, 0.0),
            &b,
            Transform::new(Vec2::new(5.0, 0.0), 0.0),
        );
        assert_relative_eq!(out.distance, 3.0, epsilon = 1e-5);
        assert_relative_eq!(out.point_a.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(out.point_b.x, 4.0, epsilon = 1e-5);
    }

    #[test]
    fn overlapping_circles_report_zero() {
        let a = Shape::circle(1.0);
        let b = Shape::circle(1.0);
        let out = query(
            &a,
            Transform::new(Vec2::ZERO, 0.0),
            &b,
            Transform::new(Vec2::new(1.5, 0.0), 0.0),
        );
        assert_eq!(out.distance, 0.0);
    }

    #[test]
    fn box_to_box_face_distance() {
        let a = Shape::box_shape(1.0, 1.0);
        let b = Shape::box_shape(1.0, 1.0);
        let out = query(
            &a,
            Transform::new(Vec2::ZERO, 0.0),
            &b,
            Transform::new(Vec2::new(5.0, 0.0), 0.0),
        );
        // Faces at x = 1 and x = 4, minus both polygon skins.
        let skin = 2.0 * crate::config::POLYGON_RADIUS;
        assert_relative_eq!(out.distance, 3.0 - skin, epsilon = 1e-4);
    }

    #[test]
    fn warm_started_query_converges_immediately() {
        let a = Shape::box_shape(1.0, 1.0);
        let b = Shape::box_shape(1.0, 1.0);
        let proxy_a = a.proxy(0);
        let proxy_b = b.proxy(0);
        let mut cache = SimplexCache::default();
        let input = DistanceInput {
            proxy_a: &proxy_a,
            proxy_b: &proxy_b,
            transform_a: Transform::new(Vec2::ZERO, 0.0),
            transform_b: Transform::new(Vec2::new(4.0, 0.1), 0.0),
            use_radii: false,
        };
        let cold = distance(&mut cache, &input);
        let warm = distance(&mut cache, &input);
        assert!(warm.iterations <= cold.iterations);
        assert_relative_eq!(warm.distance, cold.distance, epsilon = 1e-6);
    }
}
