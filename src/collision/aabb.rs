use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::collision::RayCastInput;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub lower: Vec2,
    pub upper: Vec2,
}

impl Aabb {
    pub fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    /// Smallest box containing both operands.
    pub fn combine(&self, other: &Aabb) -> Aabb {
        Aabb {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        let d1 = other.lower - self.upper;
        let d2 = self.lower - other.upper;
        d1.x <= 0.0 && d1.y <= 0.0 && d2.x <= 0.0 && d2.y <= 0.0
    }

    pub fn center(&self) -> Vec2 {
        0.5 * (self.lower + self.upper)
    }

    pub fn extents(&self) -> Vec2 {
        0.5 * (self.upper - self.lower)
    }

    /// Perimeter, the 2-D cost metric for tree surface area heuristics.
    pub fn perimeter(&self) -> f32 {
        let d = self.upper - self.lower;
        2.0 * (d.x + d.y)
    }

    /// Grows the box by `margin` on every side.
    pub fn fattened(&self, margin: f32) -> Aabb {
        let r = Vec2::splat(margin);
        Aabb {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    /// Grows the box in the direction of a displacement.
    pub fn displaced(&self, displacement: Vec2) -> Aabb {
        let mut out = *self;
        if displacement.x < 0.0 {
            out.lower.x += displacement.x;
        } else {
            out.upper.x += displacement.x;
        }
        if displacement.y < 0.0 {
            out.lower.y += displacement.y;
        } else {
            out.upper.y += displacement.y;
        }
        out
    }

    pub fn translated(&self, delta: Vec2) -> Aabb {
        Aabb {
            lower: self.lower + delta,
            upper: self.upper + delta,
        }
    }

    /// Segment intersection test (slab method). Returns the entry
    /// fraction along `p1 -> p2` when the segment hits the box within
    /// `input.max_fraction`.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<f32> {
        let mut tmin = f32::MIN;
        let mut tmax = f32::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;

        for axis in 0..2 {
            let (p_i, d_i, lo, hi) = if axis == 0 {
                (p.x, d.x, self.lower.x, self.upper.x)
            } else {
                (p.y, d.y, self.lower.y, self.upper.y)
            };

            if d_i.abs() < f32::EPSILON {
                if p_i < lo || hi < p_i {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d_i;
                let mut t1 = (lo - p_i) * inv_d;
                let mut t2 = (hi - p_i) * inv_d;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                tmin = tmin.max(t1);
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }
        Some(tmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_is_inclusive_of_touching_edges() {
        let a = Aabb::new(Vec2::ZERO, Vec2::ONE);
        let b = Aabb::new(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0));
        let c = Aabb::new(Vec2::new(1.1, 0.0), Vec2::new(2.0, 1.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn ray_cast_reports_entry_fraction() {
        let b = Aabb::new(Vec2::new(1.0, -1.0), Vec2::new(2.0, 1.0));
        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(4.0, 0.0),
            max_fraction: 1.0,
        };
        let t = b.ray_cast(&input).expect("segment crosses box");
        assert!((t - 0.25).abs() < 1e-6);

        let short = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(4.0, 0.0),
            max_fraction: 0.2,
        };
        assert!(b.ray_cast(&short).is_none());
    }
}
