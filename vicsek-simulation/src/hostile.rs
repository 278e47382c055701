//! Predator-prey mode: a prey population that flees and a predator
//! population that chases and captures.

use crate::behavior::Behavior;
use crate::population::{Population, StepScratch};
use vicsek_core::{RandomEngine, SimError, SimResult, Vector};

/// What happens to a captured prey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePolicy {
    /// The prey leaves the population; the last live prey takes its slot.
    #[default]
    Remove,
    /// The prey reappears half a box away with a random heading.
    Respawn,
}

#[derive(Debug, Clone)]
pub struct MixedPopulation {
    prey: Population,
    predators: Population,
    capture: CapturePolicy,
}

impl MixedPopulation {
    /// Pairs two populations that share one box. Prey must carry a
    /// [`Behavior::Prey`] and predators a [`Behavior::Predator`].
    pub fn new(prey: Population, predators: Population) -> SimResult<Self> {
        if !matches!(prey.behavior(), Behavior::Prey { .. }) {
            return Err(SimError::invalid("prey population needs a prey behavior"));
        }
        if !matches!(predators.behavior(), Behavior::Predator { .. }) {
            return Err(SimError::invalid("predator population needs a predator behavior"));
        }
        if prey.box_extent() != predators.box_extent() {
            return Err(SimError::invalid(format!(
                "prey live in a box of {} but predators in {}",
                prey.box_extent(),
                predators.box_extent()
            )));
        }
        Ok(Self {
            prey,
            predators,
            capture: CapturePolicy::default(),
        })
    }

    /// Builds both species at random, each at its behavior's speed.
    pub fn build(
        prey_count: usize,
        predator_count: usize,
        box_extent: f64,
        prey_behavior: Behavior,
        predator_behavior: Behavior,
        rng: &mut RandomEngine,
    ) -> SimResult<Self> {
        let prey_speed = prey_behavior.speed();
        let predator_speed = predator_behavior.speed();
        let prey = Population::build(prey_count, prey_speed, box_extent, prey_behavior, rng)?;
        let predators = Population::build(predator_count, predator_speed, box_extent, predator_behavior, rng)?;
        Self::new(prey, predators)
    }

    pub fn with_capture(mut self, capture: CapturePolicy) -> Self {
        self.capture = capture;
        self
    }

    pub fn capture(&self) -> CapturePolicy {
        self.capture
    }

    pub fn prey(&self) -> &Population {
        &self.prey
    }

    pub fn prey_mut(&mut self) -> &mut Population {
        &mut self.prey
    }

    pub fn predators(&self) -> &Population {
        &self.predators
    }

    /// Noise-free prey consensus, then the flee override. Returns how many
    /// prey are fleeing.
    pub fn sense_velocities_danger(&self, scratch: &mut StepScratch) -> SimResult<usize> {
        self.prey.sense_velocities(scratch)?;
        Ok(self.flee(scratch))
    }

    /// Noisy prey consensus, then the flee override. Returns how many prey
    /// are fleeing.
    pub fn sense_noisy_velocities_danger(
        &self,
        scratch: &mut StepScratch,
        rng: &mut RandomEngine,
    ) -> SimResult<usize> {
        self.prey.sense_noisy_velocities(scratch, rng)?;
        Ok(self.flee(scratch))
    }

    /// Replaces sensed velocities with flee velocities where a predator is
    /// in range. The override wins outright.
    fn flee(&self, scratch: &mut StepScratch) -> usize {
        let threats = self.predators.positions();
        let mut fleeing = 0;
        for entity in self.prey.entities() {
            if let Some(away) = entity.sense_danger(threats) {
                scratch.velocities[entity.slot()] = away;
                fleeing += 1;
            }
        }
        fleeing
    }

    /// Every predator picks its nearest prey and hunts it, in predator slot
    /// order. Captured prey leave the population. Returns the number of
    /// captures.
    pub fn hunt_step(&mut self, dt: f64) -> SimResult<usize> {
        self.hunt_with(dt, |prey, victim| prey.remove(victim))
    }

    /// Like [`MixedPopulation::hunt_step`], but captured prey respawn.
    pub fn hunt_step_respawn(&mut self, dt: f64, rng: &mut RandomEngine) -> SimResult<usize> {
        self.hunt_with(dt, |prey, victim| replace_dead(prey, victim, rng))
    }

    fn hunt_with<F>(&mut self, dt: f64, mut on_capture: F) -> SimResult<usize>
    where
        F: FnMut(&mut Population, usize) -> SimResult<()>,
    {
        let mut captures = 0;
        let (positions, velocities, behavior) = self.predators.parts_mut();
        for (position, velocity) in positions.iter_mut().zip(velocities.iter_mut()) {
            if self.prey.is_empty() {
                break;
            }
            let victim = behavior.sense_victim_index(*position, self.prey.positions())?;
            let target = self.prey.positions()[victim];
            if behavior.hunt(position, velocity, target, dt) {
                log::trace!("Prey in slot {} captured at {:?}", victim, target);
                on_capture(&mut self.prey, victim)?;
                captures += 1;
            }
        }
        Ok(captures)
    }

    /// Runs the capture policy for one step.
    pub fn hunt(&mut self, dt: f64, rng: &mut RandomEngine) -> SimResult<usize> {
        match self.capture {
            CapturePolicy::Remove => self.hunt_step(dt),
            CapturePolicy::Respawn => self.hunt_step_respawn(dt, rng),
        }
    }

    pub fn replace_dead(&mut self, slot: usize, rng: &mut RandomEngine) -> SimResult<()> {
        replace_dead(&mut self.prey, slot, rng)
    }
}

/// Moves the prey in `slot` half a box away on every axis and gives it a
/// random heading. The live count is unchanged; the grid, if any, is rebuilt.
fn replace_dead(prey: &mut Population, slot: usize, rng: &mut RandomEngine) -> SimResult<()> {
    if slot >= prey.live() {
        return Err(SimError::SlotOutOfRange { slot, live: prey.live() });
    }
    let half = Vector::splat(0.5 * prey.box_extent());
    let geometry = prey.geometry();
    let (positions, velocities, behavior) = prey.parts_mut();
    positions[slot] = geometry.wrap(positions[slot] + half);
    velocities[slot] = behavior.randomize_velocity(rng)?;
    prey.rebuild_grid();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::interaction::{Interaction, NeighborScratch};
    use vicsek_core::{planar, Geometry};

    fn prey_behavior(detection: f64) -> Behavior {
        let interaction = Interaction::radius_based(Geometry::periodic(10.0), 1.0).unwrap();
        Behavior::prey(interaction, 1.0, 0.0, detection).unwrap()
    }

    fn predator_behavior(speed: f64) -> Behavior {
        Behavior::predator(Interaction::isolated(Geometry::periodic(10.0)), speed, 0.0).unwrap()
    }

    fn mixed(prey: Vec<Vector>, predators: Vec<Vector>, speed: f64) -> MixedPopulation {
        let prey_velocities = vec![planar(1.0, 0.0); prey.len()];
        let predator_velocities = vec![planar(0.0, speed); predators.len()];
        MixedPopulation::new(
            Population::from_state(prey, prey_velocities, 10.0, prey_behavior(2.0)).unwrap(),
            Population::from_state(predators, predator_velocities, 10.0, predator_behavior(speed)).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn behaviors_must_match_roles() {
        let prey = Population::from_state(vec![planar(1.0, 1.0)], vec![planar(1.0, 0.0)], 10.0, prey_behavior(1.0))
            .unwrap();
        assert!(MixedPopulation::new(prey.clone(), prey).is_err());
    }

    #[test]
    fn prey_in_range_flee() {
        let population = mixed(vec![planar(5.0, 5.0), planar(1.0, 1.0)], vec![planar(5.0, 6.0)], 1.0);
        let mut scratch = population.prey().alloc_scratch();
        let fleeing = population.sense_velocities_danger(&mut scratch).unwrap();
        assert_eq!(fleeing, 1);
        assert!((scratch.velocities()[0] - planar(0.0, -1.0)).length() < 1e-12);
        assert!((scratch.velocities()[1] - planar(1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn hunt_removes_captured_prey_and_keeps_the_rest() {
        let mut population = mixed(
            vec![planar(2.5, 2.0), planar(8.0, 8.0), planar(6.0, 2.0)],
            vec![planar(2.0, 2.0)],
            1.0,
        );
        assert_eq!(population.hunt_step(1.0).unwrap(), 1);
        assert_eq!(population.prey().live(), 2);
        assert_eq!(population.predators().positions()[0], planar(2.5, 2.0));
        // The last prey moved into the freed slot.
        assert_eq!(population.prey().positions()[0], planar(6.0, 2.0));
    }

    #[test]
    fn respawn_keeps_live_count() {
        let mut rng = RandomEngine::seeded(4);
        let mut population =
            mixed(vec![planar(2.5, 2.0)], vec![planar(2.0, 2.0)], 1.0).with_capture(CapturePolicy::Respawn);
        assert_eq!(population.hunt(1.0, &mut rng).unwrap(), 1);
        assert_eq!(population.prey().live(), 1);
        let respawned = population.prey().positions()[0];
        assert!((respawned[0] - 7.5).abs() < 1e-12);
        assert!((respawned[1] - 7.0).abs() < 1e-12);
        assert!((population.prey().velocities()[0].length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn respawned_prey_is_found_through_the_grid() {
        let mut rng = RandomEngine::seeded(6);
        let mut population = mixed(vec![planar(1.0, 1.0), planar(1.5, 1.0)], vec![planar(8.0, 8.0)], 1.0);
        population.prey_mut().attach_grid(Grid::new(5, 10.0, 2).unwrap()).unwrap();
        population.replace_dead(0, &mut rng).unwrap();

        let mut scratch = population.prey().alloc_scratch();
        let mut neighbors = NeighborScratch::default();
        assert_eq!(population.prey().neighbors(0, &mut neighbors).unwrap(), 1);
        population.sense_velocities_danger(&mut scratch).unwrap();
        for v in scratch.velocities() {
            assert!((v.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn hunting_an_empty_prey_population_is_a_no_op() {
        let mut population = mixed(vec![planar(2.2, 2.0)], vec![planar(2.0, 2.0), planar(2.1, 2.0)], 1.0);
        assert_eq!(population.hunt_step(1.0).unwrap(), 1);
        assert!(population.prey().is_empty());
        assert_eq!(population.hunt_step(1.0).unwrap(), 0);
    }
}
