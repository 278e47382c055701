//! Distance conventions of the simulation space.

use crate::vector::{Vector, DIM};

/// How displacements between two points are measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    /// Unbounded Cartesian space.
    Plain,
    /// Cartesian box of side `extent` with wrap-around on every axis.
    /// Displacements follow the minimum-image convention.
    PeriodicBox { extent: f64 },
}

impl Geometry {
    pub fn periodic(extent: f64) -> Self {
        Geometry::PeriodicBox { extent }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, Geometry::PeriodicBox { .. })
    }

    /// Displacement `d` such that `x1 = x0 + d` under this geometry.
    #[inline]
    pub fn displacement(&self, x0: Vector, x1: Vector) -> Vector {
        match *self {
            Geometry::Plain => x1 - x0,
            Geometry::PeriodicBox { extent } => {
                let mut d = x1 - x0;
                for i in 0..DIM {
                    // f64::round ties away from zero; either image is minimal at a tie.
                    d[i] -= (d[i] / extent).round() * extent;
                }
                d
            }
        }
    }

    /// Squared distance between `x0` and `x1`.
    #[inline]
    pub fn distance2(&self, x0: Vector, x1: Vector) -> f64 {
        self.displacement(x0, x1).length_squared()
    }

    #[inline]
    pub fn length2(&self, v: Vector) -> f64 {
        v.length_squared()
    }

    /// Folds a point back into `[0, extent)^D`. Identity for `Plain`.
    #[inline]
    pub fn wrap(&self, point: Vector) -> Vector {
        match *self {
            Geometry::Plain => point,
            Geometry::PeriodicBox { extent } => {
                let mut p = point;
                for i in 0..DIM {
                    let w = p[i].rem_euclid(extent);
                    // rem_euclid can round up to `extent` for tiny negative inputs
                    p[i] = if w >= extent { 0.0 } else { w };
                }
                p
            }
        }
    }
}
