//! Time of impact between two swept proxies via the separating axis
//! theorem.
//!
//! The outer loop runs GJK at the current time to seed a separation
//! finder; the inner loop chases the earliest time the pair's separation
//! enters the target band using the secant method with bisection
//! fallback.

use glam::Vec2;

use crate::config::{
    LINEAR_SLOP, MAX_POLYGON_VERTICES, MAX_TOI_ITERATIONS, MAX_TOI_ROOT_ITERATIONS,
};
use crate::collision::distance::{distance, DistanceInput, SimplexCache};
use crate::core::shapes::DistanceProxy;
use crate::core::types::Sweep;

/// Tuning for a TOI query.
#[derive(Debug, Clone, Copy)]
pub struct ToiConf {
    pub t_max: f32,
    pub target_depth: f32,
    pub tolerance: f32,
    pub max_toi_iterations: usize,
    pub max_root_iterations: usize,
}

impl Default for ToiConf {
    fn default() -> Self {
        Self {
            t_max: 1.0,
            target_depth: 3.0 * LINEAR_SLOP,
            tolerance: LINEAR_SLOP / 4.0,
            max_toi_iterations: MAX_TOI_ITERATIONS,
            max_root_iterations: MAX_TOI_ROOT_ITERATIONS,
        }
    }
}

/// Outcome of a TOI query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToiState {
    /// Iteration caps hit without an answer.
    Failed,
    /// The pair was already deeper than the target at the start time.
    Overlapped,
    /// Separation entered the target band at time `t`.
    Touching,
    /// The pair stays separated through `t_max`.
    Separated,
}

#[derive(Debug, Clone, Copy)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f32,
    pub iterations: usize,
}

pub struct ToiInput<'a> {
    pub proxy_a: &'a DistanceProxy,
    pub sweep_a: Sweep,
    pub proxy_b: &'a DistanceProxy,
    pub sweep_b: Sweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationType {
    Points,
    FaceA,
    FaceB,
}

/// Separating axis extracted from a GJK simplex, re-evaluated at
/// arbitrary times along the sweeps.
struct SeparationFinder<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationType,
    axis: Vec2,
    local_point: Vec2,
}

impl<'a> SeparationFinder<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> Self {
        let count = cache.count as usize;
        debug_assert!(count == 1 || count == 2);

        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        if count == 1 {
            let local_point_a = proxy_a.vertex(cache.index_a[0] as usize);
            let local_point_b = proxy_b.vertex(cache.index_b[0] as usize);
            let point_a = xf_a.apply(local_point_a);
            let point_b = xf_b.apply(local_point_b);
            return Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationType::Points,
                axis: (point_b - point_a).normalize_or_zero(),
                local_point: Vec2::ZERO,
            };
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two support points on B: the axis is B's face normal.
            let local_point_b1 = proxy_b.vertex(cache.index_b[0] as usize);
            let local_point_b2 = proxy_b.vertex(cache.index_b[1] as usize);
            let d = local_point_b2 - local_point_b1;
            let mut axis = Vec2::new(d.y, -d.x).normalize_or_zero();
            let normal = xf_b.q.apply(axis);

            let local_point = 0.5 * (local_point_b1 + local_point_b2);
            let point_b = xf_b.apply(local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0] as usize));
            if (point_a - point_b).dot(normal) < 0.0 {
                axis = -axis;
            }
            Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationType::FaceB,
                axis,
                local_point,
            }
        } else {
            // Two support points on A: the axis is A's face normal.
            let local_point_a1 = proxy_a.vertex(cache.index_a[0] as usize);
            let local_point_a2 = proxy_a.vertex(cache.index_a[1] as usize);
            let d = local_point_a2 - local_point_a1;
            let mut axis = Vec2::new(d.y, -d.x).normalize_or_zero();
            let normal = xf_a.q.apply(axis);

            let local_point = 0.5 * (local_point_a1 + local_point_a2);
            let point_a = xf_a.apply(local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0] as usize));
            if (point_b - point_a).dot(normal) < 0.0 {
                axis = -axis;
            }
            Self {
                proxy_a,
                proxy_b,
                sweep_a,
                sweep_b,
                kind: SeparationType::FaceA,
                axis,
                local_point,
            }
        }
    }

    /// Deepest point pair along the axis at time `t`.
    fn find_min_separation(&self, t: f32) -> (f32, usize, usize) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationType::Points => {
                let axis_a = xf_a.q.apply_inverse(self.axis);
                let axis_b = xf_b.q.apply_inverse(-self.axis);
                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(self.axis), index_a, index_b)
            }
            SeparationType::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let axis_b = xf_b.q.apply_inverse(-normal);
                let index_b = self.proxy_b.support(axis_b);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(normal), usize::MAX, index_b)
            }
            SeparationType::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let axis_a = xf_a.q.apply_inverse(-normal);
                let index_a = self.proxy_a.support(axis_a);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                ((point_a - point_b).dot(normal), index_a, usize::MAX)
            }
        }
    }

    /// Separation of a fixed point pair at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationType::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationType::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationType::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Finds the earliest time in `[0, t_max]` at which the swept pair's
/// separation falls into the target band.
///
/// Both sweeps must share the same time origin (`alpha0`); `t` values are
/// normalized over the remaining interval.
pub fn time_of_impact(input: &ToiInput<'_>, conf: &ToiConf) -> ToiOutput {
    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = conf.t_max;
    let total_radius = input.proxy_a.radius + input.proxy_b.radius;
    let target = (total_radius - conf.target_depth).max(conf.tolerance);
    let tolerance = conf.tolerance;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0_f32;
    let mut iterations = 0;
    let mut cache = SimplexCache::default();

    loop {
        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        // Closest distance at the current time. Skins are handled via
        // `target`, so query the cores.
        let dist = distance(
            &mut cache,
            &DistanceInput {
                proxy_a: input.proxy_a,
                proxy_b: input.proxy_b,
                transform_a: xf_a,
                transform_b: xf_b,
                use_radii: false,
            },
        );

        if dist.distance <= target - tolerance {
            return ToiOutput {
                state: ToiState::Overlapped,
                t: t1,
                iterations,
            };
        }

        if dist.distance < target + tolerance {
            return ToiOutput {
                state: ToiState::Touching,
                t: t1,
                iterations,
            };
        }

        let finder = SeparationFinder::new(
            &cache,
            input.proxy_a,
            sweep_a,
            input.proxy_b,
            sweep_b,
            t1,
        );

        // Resolve each deepest point pair in turn, pushing t1 forward.
        let mut done = None;
        let mut t2 = t_max;
        let mut push_back_iterations = 0;

        loop {
            let (mut s2, index_a, index_b) = finder.find_min_separation(t2);

            if s2 > target + tolerance {
                // Victory: the pair stays clear through t_max.
                done = Some(ToiOutput {
                    state: ToiState::Separated,
                    t: t_max,
                    iterations,
                });
                break;
            }

            if s2 > target - tolerance {
                // This pair grazes the band at t2; advance and re-seed.
                t1 = t2;
                break;
            }

            let mut s1 = finder.evaluate(index_a, index_b, t1);

            if s1 < target - tolerance {
                done = Some(ToiOutput {
                    state: ToiState::Failed,
                    t: t1,
                    iterations,
                });
                break;
            }

            if s1 <= target + tolerance {
                done = Some(ToiOutput {
                    state: ToiState::Touching,
                    t: t1,
                    iterations,
                });
                break;
            }

            // Root-find the band crossing in [t1, t2]: secant steps with
            // bisection fallback.
            let mut root_iterations = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let t = if root_iterations & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iterations += 1;

                let s = finder.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iterations == conf.max_root_iterations {
                    break;
                }
            }

            push_back_iterations += 1;
            if push_back_iterations == MAX_POLYGON_VERTICES {
                break;
            }
        }

        if let Some(output) = done {
            return output;
        }

        iterations += 1;
        if iterations == conf.max_toi_iterations {
            return ToiOutput {
                state: ToiState::Failed,
                t: t1,
                iterations,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shapes::Shape;

    fn sweep_from_to(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            a0: 0.0,
            c: to,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn approaching_circles_touch_mid_sweep() {
        let shape = Shape::circle(1.0);
        let proxy = shape.proxy(0);
        let input = ToiInput {
            proxy_a: &proxy,
            sweep_a: sweep_from_to(Vec2::new(-10.0, 0.0), Vec2::new(0.0, 0.0)),
            proxy_b: &proxy,
            sweep_b: sweep_from_to(Vec2::new(10.0, 0.0), Vec2::new(0.0, 0.0)),
        };
        let output = time_of_impact(&input, &ToiConf::default());
        assert_eq!(output.state, ToiState::Touching);
        // Gap of 18 closes at 20 units per unit time; contact at
        // separation 2 minus the target depth.
        assert!((output.t - 0.9).abs() < 0.01, "t = {}", output.t);
    }

    #[test]
    fn parallel_motion_stays_separated() {
        let shape = Shape::circle(1.0);
        let proxy = shape.proxy(0);
        let input = ToiInput {
            proxy_a: &proxy,
            sweep_a: sweep_from_to(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)),
            proxy_b: &proxy,
            sweep_b: sweep_from_to(Vec2::new(0.0, 5.0), Vec2::new(10.0, 5.0)),
        };
        let output = time_of_impact(&input, &ToiConf::default());
        assert_eq!(output.state, ToiState::Separated);
        assert_eq!(output.t, 1.0);
    }

    #[test]
    fn initially_deep_overlap_is_reported() {
        let shape = Shape::circle(1.0);
        let proxy = shape.proxy(0);
        let input = ToiInput {
            proxy_a: &proxy,
            sweep_a: sweep_from_to(Vec2::ZERO, Vec2::ZERO),
            proxy_b: &proxy,
            sweep_b: sweep_from_to(Vec2::new(0.5, 0.0), Vec2::new(0.5, 0.0)),
        };
        let output = time_of_impact(&input, &ToiConf::default());
        assert_eq!(output.state, ToiState::Overlapped);
    }

    #[test]
    fn fast_bullet_against_thin_edge_does_not_miss() {
        let bullet = Shape::circle(0.1);
        let wall = Shape::edge(Vec2::new(0.0, -5.0), Vec2::new(0.0, 5.0));
        let bullet_proxy = bullet.proxy(0);
        let wall_proxy = wall.proxy(0);
        let input = ToiInput {
            proxy_a: &bullet_proxy,
            sweep_a: sweep_from_to(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)),
            proxy_b: &wall_proxy,
            sweep_b: sweep_from_to(Vec2::ZERO, Vec2::ZERO),
        };
        let output = time_of_impact(&input, &ToiConf::default());
        assert_eq!(output.state, ToiState::Touching);
        assert!(output.t < 0.5, "t = {}", output.t);
        assert!(output.t > 0.4, "t = {}", output.t);
    }
}
