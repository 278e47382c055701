//! Consensus protocols: how an entity turns its neighbors' velocities into
//! its own next velocity.
//!
//! Every protocol keeps the species speed `v0`: the sensed velocity is always
//! rescaled to that norm.

use crate::entity::StateView;
use crate::interaction::{Interaction, NeighborScratch};
use std::f64::consts::TAU;
use vicsek_core::vector::rescale;
use vicsek_core::{RandomEngine, SimError, SimResult, Vector};

/// Parameters shared by every protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    interaction: Interaction,
    v0: f64,
    noise: f64,
}

impl Consensus {
    pub fn new(interaction: Interaction, v0: f64, noise: f64) -> SimResult<Self> {
        if !(v0 > 0.0 && v0.is_finite()) {
            return Err(SimError::invalid(format!("speed must be positive, got {}", v0)));
        }
        if !(noise >= 0.0 && noise.is_finite()) {
            return Err(SimError::invalid(format!("noise must be non-negative, got {}", noise)));
        }
        Ok(Self { interaction, v0, noise })
    }

    /// Mean neighbor velocity rescaled to `v0`, with `seed` added to the sum
    /// before rescaling. Returns the number of neighbors alongside.
    fn align(
        &self,
        focal: usize,
        candidates: &[usize],
        state: StateView<'_>,
        scratch: &mut NeighborScratch,
        noise_vector: Option<&mut RandomEngine>,
    ) -> SimResult<Vector> {
        let count = self
            .interaction
            .get_neighbors(focal, candidates, state.positions, scratch)?;

        // Vectorial noise: random vector of norm noise·v0·n, added before rescaling.
        let seed = match noise_vector {
            Some(rng) => rng.random_vector(self.noise * self.v0 * count as f64)?,
            None => Vector::ZERO,
        };
        let sum = scratch
            .neighbors
            .iter()
            .fold(seed, |acc, &slot| acc + state.velocities[slot]);

        Ok(rescale(sum, self.v0).unwrap_or_else(|| {
            log::trace!("Velocities around slot {} cancel out, keeping previous heading", focal);
            state.velocities[focal]
        }))
    }

    /// Rotates `v` by a random angle in `[-noise·π, noise·π]`.
    fn rotate(&self, v: Vector, rng: &mut RandomEngine) -> SimResult<Vector> {
        let theta = self.noise * TAU * (rng.uniform()? - 0.5);
        rotate_by(v, theta, rng)
    }
}

#[cfg(not(feature = "dim3"))]
fn rotate_by(v: Vector, theta: f64, _rng: &mut RandomEngine) -> SimResult<Vector> {
    let (sin, cos) = theta.sin_cos();
    Ok(Vector::new(cos * v.x - sin * v.y, sin * v.x + cos * v.y))
}

/// Rotation within the plane spanned by `v` and a random direction
/// perpendicular to it.
#[cfg(feature = "dim3")]
fn rotate_by(v: Vector, theta: f64, rng: &mut RandomEngine) -> SimResult<Vector> {
    let len2 = v.length_squared();
    if len2 == 0.0 {
        return Ok(v);
    }
    loop {
        let axis = rng.random_vector(1.0)?;
        let perpendicular = axis - v * (axis.dot(v) / len2);
        if let Some(unit) = rescale(perpendicular, 1.0) {
            let (sin, cos) = theta.sin_cos();
            return Ok(v * cos + unit * (len2.sqrt() * sin));
        }
    }
}

/// The closed set of consensus protocols.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    /// Vicsek alignment; noise rotates the consensus heading.
    ConsensusAngular(Consensus),
    /// Chaté alignment; noise is a random vector added before rescaling.
    ConsensusVectorial(Consensus),
    /// Angular consensus that flees the first threat inside its detection
    /// radius.
    Prey { consensus: Consensus, detection_radius2: f64 },
    /// Angular consensus that can pick and chase a victim.
    Predator { consensus: Consensus },
}

impl Behavior {
    pub fn angular(interaction: Interaction, v0: f64, noise: f64) -> SimResult<Self> {
        Ok(Behavior::ConsensusAngular(Consensus::new(interaction, v0, noise)?))
    }

    pub fn vectorial(interaction: Interaction, v0: f64, noise: f64) -> SimResult<Self> {
        Ok(Behavior::ConsensusVectorial(Consensus::new(interaction, v0, noise)?))
    }

    pub fn prey(interaction: Interaction, v0: f64, noise: f64, detection_radius: f64) -> SimResult<Self> {
        if !(detection_radius >= 0.0 && detection_radius.is_finite()) {
            return Err(SimError::invalid(format!(
                "detection radius must be non-negative, got {}",
                detection_radius
            )));
        }
        Ok(Behavior::Prey {
            consensus: Consensus::new(interaction, v0, noise)?,
            detection_radius2: detection_radius * detection_radius,
        })
    }

    pub fn predator(interaction: Interaction, v0: f64, noise: f64) -> SimResult<Self> {
        Ok(Behavior::Predator {
            consensus: Consensus::new(interaction, v0, noise)?,
        })
    }

    pub fn consensus(&self) -> &Consensus {
        match self {
            Behavior::ConsensusAngular(c) | Behavior::ConsensusVectorial(c) => c,
            Behavior::Prey { consensus, .. } | Behavior::Predator { consensus } => consensus,
        }
    }

    fn consensus_mut(&mut self) -> &mut Consensus {
        match self {
            Behavior::ConsensusAngular(c) | Behavior::ConsensusVectorial(c) => c,
            Behavior::Prey { consensus, .. } | Behavior::Predator { consensus } => consensus,
        }
    }

    pub fn interaction(&self) -> &Interaction {
        &self.consensus().interaction
    }

    pub fn interaction_mut(&mut self) -> &mut Interaction {
        &mut self.consensus_mut().interaction
    }

    /// The species speed `v0`.
    pub fn speed(&self) -> f64 {
        self.consensus().v0
    }

    pub fn noise(&self) -> f64 {
        self.consensus().noise
    }

    /// Noise-free consensus: mean neighbor velocity rescaled to `v0`.
    pub fn sense_velocity(
        &self,
        focal: usize,
        candidates: &[usize],
        state: StateView<'_>,
        scratch: &mut NeighborScratch,
    ) -> SimResult<Vector> {
        self.consensus().align(focal, candidates, state, scratch, None)
    }

    /// Consensus plus this protocol's noise. Advances the random stream.
    pub fn sense_noisy_velocity(
        &self,
        focal: usize,
        candidates: &[usize],
        state: StateView<'_>,
        scratch: &mut NeighborScratch,
        rng: &mut RandomEngine,
    ) -> SimResult<Vector> {
        match self {
            Behavior::ConsensusVectorial(c) => c.align(focal, candidates, state, scratch, Some(rng)),
            _ => {
                let c = self.consensus();
                let heading = c.align(focal, candidates, state, scratch, None)?;
                c.rotate(heading, rng)
            }
        }
    }

    /// Scans `threats` in order and returns a velocity pointing straight away
    /// from the first one closer than the detection radius. Later threats are
    /// not looked at, even if nearer. `None` for non-prey behaviors or when no
    /// threat is in range.
    ///
    /// A threat sitting exactly on `position` has no away direction and is
    /// passed over.
    pub fn sense_danger(&self, position: Vector, threats: &[Vector]) -> Option<Vector> {
        let Behavior::Prey { consensus, detection_radius2 } = self else {
            return None;
        };
        let geometry = consensus.interaction.geometry();
        threats.iter().find_map(|&threat| {
            let away = geometry.displacement(threat, position);
            if away.length_squared() < *detection_radius2 {
                rescale(away, consensus.v0)
            } else {
                None
            }
        })
    }

    /// Index of the candidate nearest to `position`; the first one wins ties.
    pub fn sense_victim_index(&self, position: Vector, candidates: &[Vector]) -> SimResult<usize> {
        let geometry = self.interaction().geometry();
        let mut best: Option<(usize, f64)> = None;
        for (index, &candidate) in candidates.iter().enumerate() {
            let d2 = geometry.distance2(position, candidate);
            if best.map_or(true, |(_, min)| d2 < min) {
                best = Some((index, d2));
            }
        }
        best.map(|(index, _)| index).ok_or(SimError::EmptyPopulation)
    }

    /// Turns the hunter towards `prey` at speed `v0`. If the prey is within
    /// one step (`distance <= v0·dt`) the hunter lands on it and the capture
    /// is reported; otherwise it moves one step closer.
    pub fn hunt(&self, position: &mut Vector, velocity: &mut Vector, prey: Vector, dt: f64) -> bool {
        let geometry = self.interaction().geometry();
        let v0 = self.speed();
        let towards = geometry.displacement(*position, prey);
        if let Some(heading) = rescale(towards, v0) {
            *velocity = heading;
        }

        let reach = v0 * dt;
        if towards.length_squared() <= reach * reach {
            *position = prey;
            true
        } else {
            *position = geometry.wrap(*position + *velocity * dt);
            false
        }
    }

    /// Random heading at speed `v0`.
    pub fn randomize_velocity(&self, rng: &mut RandomEngine) -> SimResult<Vector> {
        rng.random_vector(self.speed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vicsek_core::{planar, Geometry};

    fn metric(radius: f64) -> Interaction {
        Interaction::radius_based(Geometry::periodic(20.0), radius).unwrap()
    }

    fn all(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    #[test]
    fn consensus_is_mean_heading_at_v0() {
        let behavior = Behavior::angular(metric(2.0), 2.0, 0.0).unwrap();
        let positions = vec![planar(1.0, 1.0), planar(1.5, 1.0)];
        let velocities = vec![planar(2.0, 0.0), planar(0.0, 2.0)];
        let state = StateView { positions: &positions, velocities: &velocities };
        let mut scratch = NeighborScratch::default();

        let v = behavior.sense_velocity(0, &all(2), state, &mut scratch).unwrap();
        let expected = 2.0 / 2f64.sqrt();
        assert!((v[0] - expected).abs() < 1e-12);
        assert!((v[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn noisy_protocols_keep_speed() {
        let mut rng = RandomEngine::seeded(9);
        let positions: Vec<Vector> = (0..10).map(|i| planar(i as f64 * 0.3, 1.0)).collect();
        let velocities: Vec<Vector> = (0..10)
            .map(|_| rng.random_vector(0.7))
            .collect::<SimResult<_>>()
            .unwrap();
        let state = StateView { positions: &positions, velocities: &velocities };
        let mut scratch = NeighborScratch::default();

        for behavior in [
            Behavior::angular(metric(1.0), 0.7, 0.4).unwrap(),
            Behavior::vectorial(metric(1.0), 0.7, 0.4).unwrap(),
        ] {
            for focal in 0..10 {
                let v = behavior
                    .sense_noisy_velocity(focal, &all(10), state, &mut scratch, &mut rng)
                    .unwrap();
                assert!((v.length() - 0.7).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn zero_noise_matches_noise_free_consensus() {
        let mut rng = RandomEngine::seeded(1);
        let positions = vec![planar(0.0, 0.0), planar(0.5, 0.5), planar(0.2, 0.9)];
        let velocities = vec![planar(1.0, 0.0), planar(0.6, 0.8), planar(0.0, -1.0)];
        let state = StateView { positions: &positions, velocities: &velocities };
        let mut scratch = NeighborScratch::default();

        let angular = Behavior::angular(metric(5.0), 1.0, 0.0).unwrap();
        let quiet = angular.sense_velocity(0, &all(3), state, &mut scratch).unwrap();
        let noisy = angular
            .sense_noisy_velocity(0, &all(3), state, &mut scratch, &mut rng)
            .unwrap();
        assert!((quiet - noisy).length() < 1e-12);

        let vectorial = Behavior::vectorial(metric(5.0), 1.0, 0.0).unwrap();
        let noisy = vectorial
            .sense_noisy_velocity(0, &all(3), state, &mut scratch, &mut rng)
            .unwrap();
        assert!((quiet - noisy).length() < 1e-12);
    }

    #[test]
    fn cancelling_neighbors_keep_previous_velocity() {
        let behavior = Behavior::angular(metric(1.0), 1.0, 0.0).unwrap();
        let positions = vec![planar(0.0, 0.0), planar(0.1, 0.0)];
        let velocities = vec![planar(1.0, 0.0), planar(-1.0, 0.0)];
        let state = StateView { positions: &positions, velocities: &velocities };
        let mut scratch = NeighborScratch::default();
        let v = behavior.sense_velocity(0, &all(2), state, &mut scratch).unwrap();
        assert_eq!(v, planar(1.0, 0.0));
        assert!(v.is_finite());
    }

    #[test]
    fn isolated_entity_keeps_its_own_heading() {
        let behavior = Behavior::angular(Interaction::isolated(Geometry::Plain), 1.0, 0.0).unwrap();
        let positions = vec![planar(0.0, 0.0), planar(0.1, 0.0)];
        let velocities = vec![planar(0.0, 1.0), planar(1.0, 0.0)];
        let state = StateView { positions: &positions, velocities: &velocities };
        let mut scratch = NeighborScratch::default();
        let v = behavior.sense_velocity(0, &all(2), state, &mut scratch).unwrap();
        assert!((v - planar(0.0, 1.0)).length() < 1e-12);
    }

    #[test]
    fn prey_flees_first_threat_in_range() {
        let prey = Behavior::prey(metric(1.0), 2.0, 0.0, 3.0).unwrap();
        let position = planar(5.0, 5.0);
        // First threat is farther than the second but both are in range.
        let threats = [planar(5.0, 7.5), planar(4.0, 5.0)];
        let v = prey.sense_danger(position, &threats).unwrap();
        assert!((v - planar(0.0, -2.0)).length() < 1e-12);

        let far = [planar(15.0, 15.0)];
        assert!(prey.sense_danger(position, &far).is_none());

        let flock = Behavior::angular(metric(1.0), 2.0, 0.0).unwrap();
        assert!(flock.sense_danger(position, &threats).is_none());
    }

    #[test]
    fn threat_on_top_of_prey_is_passed_over() {
        let prey = Behavior::prey(metric(1.0), 1.0, 0.0, 2.0).unwrap();
        let position = planar(5.0, 5.0);
        assert!(prey.sense_danger(position, &[position]).is_none());

        let v = prey.sense_danger(position, &[position, planar(6.0, 5.0)]).unwrap();
        assert!((v - planar(-1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn victim_is_nearest_and_first_wins_ties() {
        let predator = Behavior::predator(metric(1.0), 1.0, 0.0).unwrap();
        let candidates = [planar(4.0, 0.0), planar(1.0, 0.0), planar(0.0, 1.0), planar(3.0, 3.0)];
        assert_eq!(predator.sense_victim_index(planar(0.0, 0.0), &candidates).unwrap(), 1);
        assert_eq!(
            predator.sense_victim_index(planar(0.0, 0.0), &[]),
            Err(SimError::EmptyPopulation)
        );
    }

    #[test]
    fn hunt_captures_within_one_step() {
        let predator = Behavior::predator(metric(1.0), 1.0, 0.0).unwrap();
        let mut position = planar(2.0, 2.0);
        let mut velocity = Vector::ZERO;
        let prey = planar(2.5, 2.0);
        assert!(predator.hunt(&mut position, &mut velocity, prey, 0.5));
        assert_eq!(position, prey);
        assert!((velocity - planar(1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn hunt_moves_one_step_towards_distant_prey() {
        let predator = Behavior::predator(metric(1.0), 1.0, 0.0).unwrap();
        let mut position = planar(2.0, 2.0);
        let mut velocity = Vector::ZERO;
        let prey = planar(2.0, 6.0);
        assert!(!predator.hunt(&mut position, &mut velocity, prey, 0.5));
        assert!((position - planar(2.0, 2.5)).length() < 1e-12);
        assert!((velocity.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Behavior::angular(metric(1.0), 0.0, 0.1).is_err());
        assert!(Behavior::vectorial(metric(1.0), 1.0, -0.1).is_err());
        assert!(Behavior::prey(metric(1.0), 1.0, 0.1, f64::NAN).is_err());
    }
}
