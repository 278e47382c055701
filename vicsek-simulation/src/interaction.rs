//! Neighbor-selection policies.
//!
//! An [`Interaction`] decides which candidates count as neighbors of a focal
//! entity. Candidates are slot indices into the population's position array;
//! they are either every live slot (full scan) or one grid cell's snapshot.

use crate::select::quickselect;
use vicsek_core::{Geometry, SimError, SimResult, Vector};

/// The closed set of neighbor policies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NeighborPolicy {
    /// Metric: every candidate within `radius2` (squared distance, inclusive).
    RadiusBased { radius2: f64 },
    /// Topological: the `k` nearest candidates, the focal entity included.
    /// Ties at the k-th distance are all kept, so the count is at least `k`.
    KNearest { k: usize },
    /// Nobody but the focal entity itself.
    Isolated,
}

/// Per-query buffers, owned by whoever runs the sensing pass.
///
/// Every worker that queries neighbors needs its own instance; results are
/// only meaningful until the next query that uses the same scratch.
#[derive(Debug, Clone, Default)]
pub struct NeighborScratch {
    pub(crate) neighbors: Vec<usize>,
    pub(crate) distances: Vec<f64>,
}

impl NeighborScratch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            neighbors: Vec::with_capacity(capacity),
            distances: Vec::with_capacity(capacity),
        }
    }

    /// Slots found by the most recent neighbor query.
    pub fn neighbors(&self) -> &[usize] {
        &self.neighbors
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    geometry: Geometry,
    policy: NeighborPolicy,
    /// Radius² primed by `look_around`; only read by `is_neighbor` for KNearest.
    effective_radius2: f64,
}

impl Interaction {
    pub fn radius_based(geometry: Geometry, radius: f64) -> SimResult<Self> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(SimError::invalid(format!("interaction radius must be positive, got {}", radius)));
        }
        let radius2 = radius * radius;
        Ok(Self {
            geometry,
            policy: NeighborPolicy::RadiusBased { radius2 },
            effective_radius2: radius2,
        })
    }

    pub fn k_nearest(geometry: Geometry, k: usize) -> SimResult<Self> {
        if k == 0 {
            return Err(SimError::invalid("k-nearest interaction needs k >= 1"));
        }
        Ok(Self {
            geometry,
            policy: NeighborPolicy::KNearest { k },
            effective_radius2: 0.0,
        })
    }

    pub fn isolated(geometry: Geometry) -> Self {
        Self {
            geometry,
            policy: NeighborPolicy::Isolated,
            effective_radius2: 0.0,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn policy(&self) -> NeighborPolicy {
        self.policy
    }

    pub fn effective_radius2(&self) -> f64 {
        self.effective_radius2
    }

    /// Whether `b` is a neighbor of `a`.
    ///
    /// For KNearest this compares against the radius primed by the last
    /// `look_around` call for `a`; the relation is not symmetric. Isolated
    /// always answers false even though `get_neighbors` returns the focal
    /// entity.
    pub fn is_neighbor(&self, a: Vector, b: Vector) -> bool {
        match self.policy {
            NeighborPolicy::RadiusBased { radius2 } => self.geometry.distance2(a, b) <= radius2,
            NeighborPolicy::KNearest { .. } => self.geometry.distance2(a, b) <= self.effective_radius2,
            NeighborPolicy::Isolated => false,
        }
    }

    /// Writes the neighbor slots of `focal` among `candidates` into
    /// `scratch.neighbors` and returns how many there are.
    pub fn get_neighbors(
        &self,
        focal: usize,
        candidates: &[usize],
        positions: &[Vector],
        scratch: &mut NeighborScratch,
    ) -> SimResult<usize> {
        let origin = *positions.get(focal).ok_or(SimError::SlotOutOfRange {
            slot: focal,
            live: positions.len(),
        })?;
        scratch.neighbors.clear();

        let radius2 = match self.policy {
            NeighborPolicy::Isolated => {
                scratch.neighbors.push(focal);
                return Ok(1);
            }
            NeighborPolicy::RadiusBased { radius2 } => {
                if candidates.is_empty() {
                    return Err(SimError::EmptyPopulation);
                }
                radius2
            }
            NeighborPolicy::KNearest { k } => {
                self.k_nearest_radius2(k, origin, candidates, positions, &mut scratch.distances)?
            }
        };

        for &slot in candidates {
            if self.geometry.distance2(origin, positions[slot]) <= radius2 {
                scratch.neighbors.push(slot);
            }
        }
        Ok(scratch.neighbors.len())
    }

    /// Primes the effective radius for later `is_neighbor` checks without
    /// collecting neighbors. Only KNearest has anything to prime.
    pub fn look_around(
        &mut self,
        focal: usize,
        candidates: &[usize],
        positions: &[Vector],
        distances: &mut Vec<f64>,
    ) -> SimResult<f64> {
        if let NeighborPolicy::KNearest { k } = self.policy {
            let origin = *positions.get(focal).ok_or(SimError::SlotOutOfRange {
                slot: focal,
                live: positions.len(),
            })?;
            self.effective_radius2 = self.k_nearest_radius2(k, origin, candidates, positions, distances)?;
        }
        Ok(self.effective_radius2)
    }

    /// Squared distance of the k-th nearest candidate. `k` larger than the
    /// candidate count is clamped, which selects every candidate.
    fn k_nearest_radius2(
        &self,
        k: usize,
        origin: Vector,
        candidates: &[usize],
        positions: &[Vector],
        distances: &mut Vec<f64>,
    ) -> SimResult<f64> {
        if candidates.is_empty() {
            return Err(SimError::EmptyPopulation);
        }
        distances.clear();
        distances.extend(candidates.iter().map(|&slot| self.geometry.distance2(origin, positions[slot])));
        let index = k.min(distances.len()) - 1;
        quickselect(distances, index)
    }
}
