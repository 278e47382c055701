//! Single-species population: flat position/velocity storage addressed by
//! slot, plus the synchronous step protocol.
//!
//! A step is `advance` (move, then rebuild the grid), a sensing pass that
//! writes every tentative velocity into a [`StepScratch`], and
//! `commit_velocities`. Sensing only reads committed state, so the visiting
//! order of entities never matters.

use crate::behavior::Behavior;
use crate::entity::{Entity, StateView};
use crate::grid::Grid;
use crate::interaction::{NeighborPolicy, NeighborScratch};
use rayon::prelude::*;
use vicsek_core::{Geometry, RandomEngine, SimError, SimResult, Vector};

/// Buffers for one sensing pass: the tentative velocities and the neighbor
/// query scratch.
#[derive(Debug, Clone, Default)]
pub struct StepScratch {
    pub(crate) velocities: Vec<Vector>,
    pub(crate) neighbors: NeighborScratch,
}

impl StepScratch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            velocities: vec![Vector::ZERO; capacity],
            neighbors: NeighborScratch::with_capacity(capacity),
        }
    }

    /// Tentative velocities of the last sensing pass.
    pub fn velocities(&self) -> &[Vector] {
        &self.velocities
    }

    pub fn capacity(&self) -> usize {
        self.velocities.len()
    }
}

/// Candidate slots for a query at `point`: one grid cell, or every live slot.
fn candidates<'a>(grid: Option<&'a Grid>, all: &'a [usize], point: Vector) -> &'a [usize] {
    match grid {
        Some(grid) => grid.neighborhood(point),
        None => all,
    }
}

#[derive(Debug, Clone)]
pub struct Population {
    positions: Vec<Vector>,
    velocities: Vec<Vector>,
    /// `0..live`, the full-scan candidate list.
    slots: Vec<usize>,
    box_extent: f64,
    behavior: Behavior,
    grid: Option<Grid>,
    /// Distance buffer for `look_around`.
    distances: Vec<f64>,
}

impl Population {
    /// Allocates `count` entities with positions uniform in
    /// `[0, box_extent)^D` and random headings at `speed`.
    pub fn build(
        count: usize,
        speed: f64,
        box_extent: f64,
        behavior: Behavior,
        rng: &mut RandomEngine,
    ) -> SimResult<Self> {
        if count == 0 {
            return Err(SimError::EmptyPopulation);
        }
        let mut population = Self::with_storage(
            vec![Vector::ZERO; count],
            vec![Vector::ZERO; count],
            box_extent,
            behavior,
        )?;
        population.randomize_positions(rng)?;
        population.randomize_directions(speed, rng)?;
        log::debug!(
            "Built population of {} (speed {}, box {})",
            count,
            speed,
            box_extent
        );
        Ok(population)
    }

    /// Wraps an explicit initial state. Velocities are taken as given.
    pub fn from_state(
        positions: Vec<Vector>,
        velocities: Vec<Vector>,
        box_extent: f64,
        behavior: Behavior,
    ) -> SimResult<Self> {
        if positions.is_empty() {
            return Err(SimError::EmptyPopulation);
        }
        if positions.len() != velocities.len() {
            return Err(SimError::invalid(format!(
                "{} positions but {} velocities",
                positions.len(),
                velocities.len()
            )));
        }
        Self::with_storage(positions, velocities, box_extent, behavior)
    }

    fn with_storage(
        positions: Vec<Vector>,
        velocities: Vec<Vector>,
        box_extent: f64,
        behavior: Behavior,
    ) -> SimResult<Self> {
        if !(box_extent > 0.0 && box_extent.is_finite()) {
            return Err(SimError::invalid(format!("box extent must be positive, got {}", box_extent)));
        }
        if let Geometry::PeriodicBox { extent } = behavior.interaction().geometry() {
            if extent != box_extent {
                return Err(SimError::invalid(format!(
                    "periodic geometry wraps at {} but the box extent is {}",
                    extent, box_extent
                )));
            }
        }
        let count = positions.len();
        Ok(Self {
            positions,
            velocities,
            slots: (0..count).collect(),
            box_extent,
            behavior,
            grid: None,
            distances: Vec::with_capacity(count),
        })
    }

    /// Number of live entities.
    pub fn live(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn box_extent(&self) -> f64 {
        self.box_extent
    }

    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    pub fn geometry(&self) -> Geometry {
        self.behavior.interaction().geometry()
    }

    pub fn positions(&self) -> &[Vector] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vector] {
        &self.velocities
    }

    /// Mutable kinematic state alongside the shared behavior.
    pub(crate) fn parts_mut(&mut self) -> (&mut [Vector], &mut [Vector], &Behavior) {
        (&mut self.positions, &mut self.velocities, &self.behavior)
    }

    pub fn state(&self) -> StateView<'_> {
        StateView {
            positions: &self.positions,
            velocities: &self.velocities,
        }
    }

    fn check_slot(&self, slot: usize) -> SimResult<()> {
        if slot < self.live() {
            Ok(())
        } else {
            Err(SimError::SlotOutOfRange { slot, live: self.live() })
        }
    }

    pub fn entity(&self, slot: usize) -> SimResult<Entity<'_>> {
        self.check_slot(slot)?;
        Ok(Entity::new(slot, self.state(), &self.behavior))
    }

    pub fn entities(&self) -> impl Iterator<Item = Entity<'_>> + '_ {
        let state = self.state();
        (0..self.live()).map(move |slot| Entity::new(slot, state, &self.behavior))
    }

    /// Scratch sized for this population.
    pub fn alloc_scratch(&self) -> StepScratch {
        StepScratch::with_capacity(self.live())
    }

    pub fn randomize_positions(&mut self, rng: &mut RandomEngine) -> SimResult<()> {
        for p in self.positions.iter_mut() {
            *p = rng.point_in_box(self.box_extent)?;
        }
        self.rebuild_grid();
        Ok(())
    }

    pub fn randomize_directions(&mut self, speed: f64, rng: &mut RandomEngine) -> SimResult<()> {
        for v in self.velocities.iter_mut() {
            *v = rng.random_vector(speed)?;
        }
        Ok(())
    }

    // ── Grid ───────────────────────────────────────────────────────────────

    /// Attaches a grid and fills it from the current positions. Later
    /// queries use it automatically.
    ///
    /// Under a metric interaction the cells must be at least as wide as the
    /// radius, otherwise [`SimError::GridTooFine`] is returned.
    pub fn attach_grid(&mut self, grid: Grid) -> SimResult<()> {
        if (grid.box_extent() - self.box_extent).abs() > f64::EPSILON * self.box_extent {
            return Err(SimError::invalid(format!(
                "grid spans a box of {} but the population lives in {}",
                grid.box_extent(),
                self.box_extent
            )));
        }
        if let NeighborPolicy::RadiusBased { radius2 } = self.behavior.interaction().policy() {
            let cell_size = grid.cell_size();
            // A single-cell lookup only covers one cell width around the focal entity.
            if radius2 > cell_size * cell_size * (1.0 + 1e-12) {
                return Err(SimError::GridTooFine {
                    cell_size,
                    radius: radius2.sqrt(),
                });
            }
        }
        if !self.geometry().is_periodic() {
            log::warn!(
                "Attaching a grid under non-periodic geometry: cells wrap at the box edges, \
                 so entities near opposite edges are offered as candidates"
            );
        }
        log::debug!("Attached grid with {} slots/axis", grid.nslots());
        self.grid = Some(grid);
        self.rebuild_grid();
        Ok(())
    }

    pub fn detach_grid(&mut self) -> Option<Grid> {
        self.grid.take()
    }

    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// Rebuilds the grid from the current positions. Every query until the
    /// next rebuild sees this snapshot.
    pub fn rebuild_grid(&mut self) {
        if let Some(grid) = self.grid.as_mut() {
            grid.fill(&self.positions);
        }
    }

    // ── Queries ────────────────────────────────────────────────────────────

    /// Collects the neighbors of `slot` into `scratch` and returns the count.
    pub fn neighbors(&self, slot: usize, scratch: &mut NeighborScratch) -> SimResult<usize> {
        self.check_slot(slot)?;
        let candidates = candidates(self.grid.as_ref(), &self.slots, self.positions[slot]);
        self.behavior
            .interaction()
            .get_neighbors(slot, candidates, &self.positions, scratch)
    }

    /// Primes the interaction's effective radius for `slot`, so that
    /// [`Population::is_neighbor`] answers from its point of view.
    pub fn look_around(&mut self, slot: usize) -> SimResult<f64> {
        self.check_slot(slot)?;
        let candidates = candidates(self.grid.as_ref(), &self.slots, self.positions[slot]);
        self.behavior
            .interaction_mut()
            .look_around(slot, candidates, &self.positions, &mut self.distances)
    }

    pub fn is_neighbor(&self, a: usize, b: usize) -> SimResult<bool> {
        Ok(self.entity(a)?.is_neighbor(&self.entity(b)?))
    }

    // ── Step protocol ──────────────────────────────────────────────────────

    /// Moves every entity by `dt·velocity`, folding back into the box under
    /// periodic geometry, then rebuilds the grid.
    pub fn advance(&mut self, dt: f64) {
        let geometry = self.geometry();
        for (p, v) in self.positions.iter_mut().zip(self.velocities.iter()) {
            *p = geometry.wrap(*p + *v * dt);
        }
        self.rebuild_grid();
    }

    fn check_scratch(&self, scratch: &StepScratch) -> SimResult<()> {
        if scratch.capacity() < self.live() {
            return Err(SimError::ScratchTooSmall {
                needed: self.live(),
                provided: scratch.capacity(),
            });
        }
        Ok(())
    }

    /// Noise-free consensus for every live entity, written to `scratch`.
    pub fn sense_velocities(&self, scratch: &mut StepScratch) -> SimResult<()> {
        self.check_scratch(scratch)?;
        let StepScratch { velocities, neighbors } = scratch;
        for entity in self.entities() {
            let candidates = candidates(self.grid.as_ref(), &self.slots, entity.position());
            velocities[entity.slot()] = entity.sense_velocity(candidates, neighbors)?;
        }
        Ok(())
    }

    /// Consensus plus noise for every live entity, written to `scratch`.
    /// Entities draw from `rng` in slot order.
    pub fn sense_noisy_velocities(&self, scratch: &mut StepScratch, rng: &mut RandomEngine) -> SimResult<()> {
        self.check_scratch(scratch)?;
        let StepScratch { velocities, neighbors } = scratch;
        for entity in self.entities() {
            let candidates = candidates(self.grid.as_ref(), &self.slots, entity.position());
            velocities[entity.slot()] = entity.sense_noisy_velocity(candidates, neighbors, rng)?;
        }
        Ok(())
    }

    /// Same as [`Population::sense_velocities`], split across the rayon pool.
    /// Each worker gets its own neighbor scratch.
    pub fn sense_velocities_par(&self, scratch: &mut StepScratch) -> SimResult<()> {
        self.check_scratch(scratch)?;
        let live = self.live();
        let state = self.state();
        scratch.velocities[..live]
            .par_iter_mut()
            .enumerate()
            .try_for_each_init(
                || NeighborScratch::with_capacity(live),
                |neighbors, (slot, out)| {
                    let entity = Entity::new(slot, state, &self.behavior);
                    let candidates = candidates(self.grid.as_ref(), &self.slots, entity.position());
                    *out = entity.sense_velocity(candidates, neighbors)?;
                    Ok(())
                },
            )
    }

    /// Copies the tentative velocities into live state in one pass.
    pub fn commit_velocities(&mut self, scratch: &StepScratch) -> SimResult<()> {
        self.check_scratch(scratch)?;
        let live = self.live();
        self.velocities.copy_from_slice(&scratch.velocities[..live]);
        Ok(())
    }

    // ── Removal ────────────────────────────────────────────────────────────

    /// Removes `slot` by moving the last live entity's state into it. Slot
    /// order is not preserved. Storage is kept, only the live count shrinks.
    pub fn remove(&mut self, slot: usize) -> SimResult<()> {
        self.check_slot(slot)?;
        self.positions.swap_remove(slot);
        self.velocities.swap_remove(slot);
        self.slots.pop();
        // The snapshot may list the slot that no longer exists.
        self.rebuild_grid();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::Interaction;
    use vicsek_core::planar;

    fn flock(radius: f64, noise: f64) -> Behavior {
        Behavior::angular(Interaction::radius_based(Geometry::periodic(10.0), radius).unwrap(), 1.0, noise)
            .unwrap()
    }

    #[test]
    fn build_places_entities_in_box_at_speed() {
        let mut rng = RandomEngine::seeded(3);
        let population = Population::build(64, 0.5, 10.0, flock(1.0, 0.1), &mut rng).unwrap();
        assert_eq!(population.live(), 64);
        for entity in population.entities() {
            let p = entity.position();
            assert!((0..vicsek_core::DIM).all(|i| (0.0..10.0).contains(&p[i])));
            assert!((entity.velocity().length() - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn build_requires_seeded_engine_and_entities() {
        let mut rng = RandomEngine::unseeded();
        assert_eq!(
            Population::build(4, 1.0, 10.0, flock(1.0, 0.0), &mut rng).unwrap_err(),
            SimError::Unseeded
        );
        let mut rng = RandomEngine::seeded(1);
        assert_eq!(
            Population::build(0, 1.0, 10.0, flock(1.0, 0.0), &mut rng).unwrap_err(),
            SimError::EmptyPopulation
        );
    }

    #[test]
    fn advance_wraps_into_box() {
        let mut population = Population::from_state(
            vec![planar(9.5, 0.2)],
            vec![planar(1.0, -1.0)],
            10.0,
            flock(1.0, 0.0),
        )
        .unwrap();
        population.advance(1.0);
        let p = population.positions()[0];
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 9.2).abs() < 1e-12);
    }

    #[test]
    fn sensing_does_not_touch_live_velocities() {
        let positions = vec![planar(1.0, 1.0), planar(1.5, 1.0), planar(2.0, 1.0)];
        let velocities = vec![planar(1.0, 0.0), planar(0.0, 1.0), planar(-1.0, 0.0)];
        let population = Population::from_state(positions, velocities.clone(), 10.0, flock(0.6, 0.0)).unwrap();
        let mut scratch = population.alloc_scratch();
        population.sense_velocities(&mut scratch).unwrap();
        assert_eq!(population.velocities(), &velocities[..]);
        // Slot 1 averages all three; slots 0 and 2 average with slot 1 only.
        assert!((scratch.velocities()[1] - planar(0.0, 1.0)).length() < 1e-12);
    }

    #[test]
    fn parallel_sensing_matches_serial() {
        let mut rng = RandomEngine::seeded(11);
        let population = Population::build(200, 1.0, 10.0, flock(1.5, 0.0), &mut rng).unwrap();
        let mut serial = population.alloc_scratch();
        let mut parallel = population.alloc_scratch();
        population.sense_velocities(&mut serial).unwrap();
        population.sense_velocities_par(&mut parallel).unwrap();
        assert_eq!(serial.velocities(), parallel.velocities());
    }

    #[test]
    fn short_scratch_is_rejected() {
        let mut rng = RandomEngine::seeded(5);
        let mut population = Population::build(8, 1.0, 10.0, flock(1.0, 0.0), &mut rng).unwrap();
        let mut scratch = StepScratch::with_capacity(4);
        assert_eq!(
            population.sense_velocities(&mut scratch).unwrap_err(),
            SimError::ScratchTooSmall { needed: 8, provided: 4 }
        );
        assert!(population.commit_velocities(&scratch).is_err());
    }

    #[test]
    fn remove_moves_last_entity_into_slot() {
        let positions = vec![planar(1.0, 1.0), planar(2.0, 2.0), planar(3.0, 3.0)];
        let velocities = vec![planar(1.0, 0.0), planar(0.0, 1.0), planar(-1.0, 0.0)];
        let mut population = Population::from_state(positions, velocities, 10.0, flock(1.0, 0.0)).unwrap();
        population.remove(0).unwrap();
        assert_eq!(population.live(), 2);
        assert_eq!(population.positions()[0], planar(3.0, 3.0));
        assert_eq!(population.velocities()[0], planar(-1.0, 0.0));
        assert!(matches!(population.remove(2), Err(SimError::SlotOutOfRange { slot: 2, live: 2 })));
    }

    #[test]
    fn grid_must_span_the_same_box() {
        let mut rng = RandomEngine::seeded(2);
        let mut population = Population::build(10, 1.0, 10.0, flock(1.0, 0.0), &mut rng).unwrap();
        assert!(population.attach_grid(Grid::new(5, 12.0, 10).unwrap()).is_err());
        assert!(population.attach_grid(Grid::new(5, 10.0, 10).unwrap()).is_ok());
        assert!(population.grid().is_some());
        assert!(population.detach_grid().is_some());
    }

    #[test]
    fn grid_finer_than_the_radius_is_rejected() {
        let mut rng = RandomEngine::seeded(9);
        let mut population = Population::build(50, 1.0, 10.0, flock(2.0, 0.0), &mut rng).unwrap();
        assert!(matches!(
            population.attach_grid(Grid::new(10, 10.0, 50).unwrap()),
            Err(SimError::GridTooFine { .. })
        ));
        assert!(population.grid().is_none());
        // Cells exactly as wide as the radius still see every neighbor.
        assert!(population.attach_grid(Grid::new(5, 10.0, 50).unwrap()).is_ok());
    }

    #[test]
    fn look_around_primes_topological_neighbors() {
        let geometry = Geometry::periodic(10.0);
        let behavior = Behavior::angular(Interaction::k_nearest(geometry, 2).unwrap(), 1.0, 0.0).unwrap();
        let positions = vec![planar(1.0, 1.0), planar(1.5, 1.0), planar(4.0, 1.0)];
        let velocities = vec![planar(1.0, 0.0); 3];
        let mut population = Population::from_state(positions, velocities, 10.0, behavior).unwrap();

        population.look_around(2).unwrap();
        assert!(population.is_neighbor(2, 1).unwrap());
        population.look_around(1).unwrap();
        assert!(!population.is_neighbor(1, 2).unwrap());
    }
}
