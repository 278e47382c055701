//! Compile-time dimension selection.
//!
//! Positions and velocities are `glam` double-precision vectors. The default
//! build simulates a plane; the `dim3` feature switches every vector to three
//! components.

#[cfg(not(feature = "dim3"))]
pub type Vector = glam::DVec2;
#[cfg(feature = "dim3")]
pub type Vector = glam::DVec3;

#[cfg(not(feature = "dim3"))]
pub const DIM: usize = 2;
#[cfg(feature = "dim3")]
pub const DIM: usize = 3;

/// Builds a vector whose first two components are `x` and `y` and whose
/// remaining components (if any) are zero.
#[inline]
pub fn planar(x: f64, y: f64) -> Vector {
    let mut v = Vector::ZERO;
    v[0] = x;
    v[1] = y;
    v
}

/// Rescales `v` to length `norm`. Returns `None` when `v` has zero (or
/// non-finite) length, so callers decide what a degenerate direction means.
#[inline]
pub fn rescale(v: Vector, norm: f64) -> Option<Vector> {
    let len2 = v.length_squared();
    if len2 > 0.0 && len2.is_finite() {
        Some(v * (norm / len2.sqrt()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_fills_first_two_axes() {
        let v = planar(3.0, -4.0);
        assert_eq!(v[0], 3.0);
        assert_eq!(v[1], -4.0);
        assert_eq!(v.length_squared(), 25.0);
    }

    #[test]
    fn rescale_sets_length() {
        let v = rescale(planar(3.0, 4.0), 2.0).unwrap();
        assert!((v.length() - 2.0).abs() < 1e-12);
        assert!((v[0] - 1.2).abs() < 1e-12);
    }

    #[test]
    fn rescale_rejects_zero_vector() {
        assert!(rescale(Vector::ZERO, 1.0).is_none());
    }
}
