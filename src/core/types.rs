use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Unit rotation stored as sine/cosine to avoid re-evaluating
/// trigonometric functions in inner loops.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Rot {
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// Unit vector along the rotated x-axis.
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// Unit vector along the rotated y-axis.
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotates a vector.
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotates a vector.
    pub fn apply_inverse(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Composition `self * other`.
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Composition `self^T * other`.
    pub fn mul_transpose(&self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rigid transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            p: position,
            q: Rot::from_angle(angle),
        }
    }

    /// Maps a point from local to world coordinates.
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.apply(v) + self.p
    }

    /// Maps a point from world to local coordinates.
    pub fn apply_inverse(&self, v: Vec2) -> Vec2 {
        self.q.apply_inverse(v - self.p)
    }

    /// Composition `self * other`.
    pub fn mul(&self, other: Transform) -> Transform {
        Transform {
            p: self.q.apply(other.p) + self.p,
            q: self.q.mul(other.q),
        }
    }

    /// Composition `self^-1 * other`; maps B's local frame into A's.
    pub fn mul_transpose(&self, other: Transform) -> Transform {
        Transform {
            p: self.q.apply_inverse(other.p - self.p),
            q: self.q.mul_transpose(other.q),
        }
    }
}

/// Center-of-mass position and angle of a body.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Linear and angular velocity of a body.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// Mass, center of mass, and rotational inertia computed from a shape.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    /// Rotational inertia about the shape origin.
    pub inertia: f32,
}

/// Motion of a body's center of mass over a step, used by the TOI
/// machinery to interpolate transforms at fractional times.
///
/// `c0`/`a0` hold the position at time factor `alpha0`; `c`/`a` hold the
/// position at the end of the step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Sweep {
    pub local_center: Vec2,
    pub c0: Vec2,
    pub a0: f32,
    pub c: Vec2,
    pub a: f32,
    pub alpha0: f32,
}

impl Sweep {
    /// Shape-origin transform at the normalized time `beta` in [0, 1],
    /// where 0 maps to `alpha0` and 1 to the end of the step.
    pub fn transform_at(&self, beta: f32) -> Transform {
        let c = self.c0.lerp(self.c, beta);
        let a = (1.0 - beta) * self.a0 + beta * self.a;
        let q = Rot::from_angle(a);
        Transform {
            p: c - q.apply(self.local_center),
            q,
        }
    }

    /// Advances the time origin to `alpha`, interpolating `c0`/`a0`
    /// forward so that the sweep still describes the same motion.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 = self.c0.lerp(self.c, beta);
        self.a0 = (1.0 - beta) * self.a0 + beta * self.a;
        self.alpha0 = alpha;
    }

    /// Normalizes the angles to (-pi, pi] to avoid unbounded growth.
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * std::f32::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rot_round_trips() {
        let q = Rot::from_angle(0.7);
        let v = Vec2::new(3.0, -2.0);
        let back = q.apply_inverse(q.apply(v));
        assert_relative_eq!(back.x, v.x, epsilon = 1e-6);
        assert_relative_eq!(back.y, v.y, epsilon = 1e-6);
    }

    #[test]
    fn transform_compose_matches_sequential_apply() {
        let a = Transform::new(Vec2::new(1.0, 2.0), 0.3);
        let b = Transform::new(Vec2::new(-4.0, 0.5), -1.1);
        let p = Vec2::new(0.25, 0.75);
        let composed = a.mul(b).apply(p);
        let sequential = a.apply(b.apply(p));
        assert_relative_eq!(composed.x, sequential.x, epsilon = 1e-5);
        assert_relative_eq!(composed.y, sequential.y, epsilon = 1e-5);
    }

    #[test]
    fn sweep_advance_preserves_interpolation() {
        let mut sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: Vec2::new(0.0, 0.0),
            a0: 0.0,
            c: Vec2::new(10.0, 0.0),
            a: 1.0,
            alpha0: 0.0,
        };
        // The transform at the midpoint of the whole motion must be
        // unchanged by re-basing the sweep onto [0.25, 1].
        let before = sweep.transform_at((0.5 - 0.0) / 1.0);
        sweep.advance(0.25);
        let after = sweep.transform_at((0.5 - 0.25) / (1.0 - 0.25));
        assert_relative_eq!(before.p.x, after.p.x, epsilon = 1e-5);
        assert_relative_eq!(before.q.angle(), after.q.angle(), epsilon = 1e-5);
        assert_relative_eq!(sweep.alpha0, 0.25);
    }
}
