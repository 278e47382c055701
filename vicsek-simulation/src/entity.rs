use crate::behavior::Behavior;
use crate::interaction::NeighborScratch;
use vicsek_core::{RandomEngine, SimResult, Vector};

/// Read-only view of a population's committed kinematic state.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    pub positions: &'a [Vector],
    pub velocities: &'a [Vector],
}

/// One entity of a population, addressed by slot.
///
/// Entities own nothing: position and velocity live in the population's
/// contiguous storage and the behavior is shared by the whole species. This
/// view only dispatches to that behavior and its interaction.
#[derive(Debug, Clone, Copy)]
pub struct Entity<'a> {
    slot: usize,
    state: StateView<'a>,
    behavior: &'a Behavior,
}

impl<'a> Entity<'a> {
    pub(crate) fn new(slot: usize, state: StateView<'a>, behavior: &'a Behavior) -> Self {
        Self { slot, state, behavior }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn position(&self) -> Vector {
        self.state.positions[self.slot]
    }

    pub fn velocity(&self) -> Vector {
        self.state.velocities[self.slot]
    }

    pub fn behavior(&self) -> &'a Behavior {
        self.behavior
    }

    /// Squared distance to `point` under the species' geometry.
    pub fn distance2(&self, point: Vector) -> f64 {
        self.behavior.interaction().geometry().distance2(self.position(), point)
    }

    /// Whether `other` is a neighbor of this entity. For KNearest the answer
    /// depends on the last `look_around` of this entity.
    pub fn is_neighbor(&self, other: &Entity<'_>) -> bool {
        self.behavior.interaction().is_neighbor(self.position(), other.position())
    }

    /// Collects this entity's neighbors among `candidates` into `scratch`.
    pub fn neighbors(&self, candidates: &[usize], scratch: &mut NeighborScratch) -> SimResult<usize> {
        self.behavior
            .interaction()
            .get_neighbors(self.slot, candidates, self.state.positions, scratch)
    }

    pub fn sense_velocity(&self, candidates: &[usize], scratch: &mut NeighborScratch) -> SimResult<Vector> {
        self.behavior.sense_velocity(self.slot, candidates, self.state, scratch)
    }

    pub fn sense_noisy_velocity(
        &self,
        candidates: &[usize],
        scratch: &mut NeighborScratch,
        rng: &mut RandomEngine,
    ) -> SimResult<Vector> {
        self.behavior
            .sense_noisy_velocity(self.slot, candidates, self.state, scratch, rng)
    }

    /// Flee velocity if a threat is within detection range, see
    /// [`Behavior::sense_danger`].
    pub fn sense_danger(&self, threats: &[Vector]) -> Option<Vector> {
        self.behavior.sense_danger(self.position(), threats)
    }
}
