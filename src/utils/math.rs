use glam::Vec2;

/// 2-D scalar cross product of two vectors.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar (angular rate about +z) with a vector.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Cross product of a vector with a scalar.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Solves `A * x = b` for a 2x2 matrix given as column vectors.
/// Returns zero when the matrix is singular.
#[inline]
pub fn solve22(col1: Vec2, col2: Vec2, b: Vec2) -> Vec2 {
    let det = col1.x * col2.y - col2.x * col1.y;
    if det == 0.0 {
        return Vec2::ZERO;
    }
    let inv_det = 1.0 / det;
    Vec2::new(
        inv_det * (col2.y * b.x - col2.x * b.y),
        inv_det * (col1.x * b.y - col1.y * b.x),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_identities() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, -1.0);
        assert_eq!(cross(a, b), -cross(b, a));
        assert!(cross_sv(2.0, a).dot(a).abs() < 1e-6);
    }

    #[test]
    fn solve22_inverts() {
        let col1 = Vec2::new(2.0, 1.0);
        let col2 = Vec2::new(0.0, 3.0);
        let x = solve22(col1, col2, Vec2::new(4.0, 11.0));
        assert!((col1 * x.x + col2 * x.y - Vec2::new(4.0, 11.0)).length() < 1e-6);
    }
}
