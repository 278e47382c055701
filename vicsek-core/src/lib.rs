//! Leaf building blocks shared by every part of the simulation: the vector
//! type for the compiled dimension, the seeded random stream, the distance
//! conventions of the simulation space, and the error taxonomy.

pub mod error;
pub mod geometry;
pub mod random;
pub mod vector;

// Re-export key types for convenience
pub use error::{SimError, SimResult};
pub use geometry::Geometry;
pub use random::RandomEngine;
pub use vector::{planar, Vector, DIM};
