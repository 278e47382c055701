//! Turns a run configuration into a ready-to-step simulation.

use std::time::{SystemTime, UNIX_EPOCH};
use vicsek_config::{Config, GeometryKind, InteractionConfig, NoiseModel};
use vicsek_core::{Geometry, RandomEngine, SimError, SimResult, DIM};
use vicsek_simulation::{
    Behavior, CapturePolicy, Grid, Interaction, MixedPopulation, Population, Scheduler, StepReport,
};

/// Outcome of the grid setup, reported in the output header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridStatus {
    Disabled,
    Using(usize),
    TooFewSlots(usize),
    /// Cells narrower than the metric radius would drop neighbors.
    TooFine(usize),
}

impl GridStatus {
    pub fn slots(self) -> Option<usize> {
        match self {
            GridStatus::Using(nslots) => Some(nslots),
            _ => None,
        }
    }
}

pub enum Simulation {
    Flock(Population),
    Hunt(MixedPopulation),
}

impl Simulation {
    /// The population whose order is measured (the prey in predator mode).
    pub fn flock(&self) -> &Population {
        match self {
            Simulation::Flock(population) => population,
            Simulation::Hunt(mixed) => mixed.prey(),
        }
    }

    fn flock_mut(&mut self) -> &mut Population {
        match self {
            Simulation::Flock(population) => population,
            Simulation::Hunt(mixed) => mixed.prey_mut(),
        }
    }

    pub fn is_hunt(&self) -> bool {
        matches!(self, Simulation::Hunt(_))
    }

    /// One step. Predators only hunt once `hunting` is set; before that the
    /// prey flock on their own.
    pub fn step(&mut self, scheduler: &mut Scheduler, rng: &mut RandomEngine, hunting: bool) -> SimResult<StepReport> {
        match self {
            Simulation::Hunt(mixed) if hunting => scheduler.execute_once(mixed, rng),
            Simulation::Hunt(mixed) => scheduler.execute_once(mixed.prey_mut(), rng),
            Simulation::Flock(population) => scheduler.execute_once(population, rng),
        }
    }
}

pub struct Setup {
    pub simulation: Simulation,
    pub box_extent: f64,
    pub grid: GridStatus,
}

/// Seed for runs that do not configure one.
pub fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

fn interaction(config: &Config, geometry: Geometry) -> SimResult<Interaction> {
    match config.interaction {
        InteractionConfig::Metric { radius } => Interaction::radius_based(geometry, radius),
        // `outdegree` counts the other entities; the nearest-k selection includes the focal one.
        InteractionConfig::Topological { outdegree } => Interaction::k_nearest(geometry, outdegree + 1),
        InteractionConfig::Isolated => Ok(Interaction::isolated(geometry)),
    }
}

pub fn build(config: &Config, rng: &mut RandomEngine) -> SimResult<Setup> {
    let box_extent = config.population.resolved_box_extent(DIM);
    let geometry = match config.geometry {
        GeometryKind::Periodic => Geometry::periodic(box_extent),
        GeometryKind::Plain => Geometry::Plain,
    };
    let interaction = interaction(config, geometry)?;
    let count = config.population.count;
    let speed = config.population.speed;
    let noise = config.behavior.noise;

    let mut simulation = match &config.predators {
        None => {
            let behavior = match config.behavior.noise_model {
                NoiseModel::Angular => Behavior::angular(interaction, speed, noise)?,
                NoiseModel::Vectorial => Behavior::vectorial(interaction, speed, noise)?,
            };
            Simulation::Flock(Population::build(count, speed, box_extent, behavior, rng)?)
        }
        Some(predators) => {
            if config.behavior.noise_model == NoiseModel::Vectorial {
                log::warn!("Prey and predators use angular noise; ignoring noise_model = vectorial");
            }
            let prey = Behavior::prey(interaction.clone(), speed, noise, predators.detection_radius)?;
            let hunter = Behavior::predator(interaction, predators.speed, noise)?;
            let capture = if predators.respawn {
                CapturePolicy::Respawn
            } else {
                CapturePolicy::Remove
            };
            let mixed = MixedPopulation::build(count, predators.count, box_extent, prey, hunter, rng)?
                .with_capture(capture);
            Simulation::Hunt(mixed)
        }
    };

    let grid = attach_grid(config, box_extent, simulation.flock_mut())?;
    Ok(Setup {
        simulation,
        box_extent,
        grid,
    })
}

fn attach_grid(config: &Config, box_extent: f64, population: &mut Population) -> SimResult<GridStatus> {
    let Some(nslots) = config.grid_slots(box_extent) else {
        return Ok(GridStatus::Disabled);
    };
    match Grid::new(nslots, box_extent, population.live()) {
        Ok(grid) => match population.attach_grid(grid) {
            Ok(()) => {
                log::info!("Using grid with {} slots/dim", nslots);
                Ok(GridStatus::Using(nslots))
            }
            Err(SimError::GridTooFine { cell_size, radius }) => {
                log::warn!(
                    "Grid with {} slots/dim has cells of {} below the radius {}, running without a grid",
                    nslots,
                    cell_size,
                    radius
                );
                Ok(GridStatus::TooFine(nslots))
            }
            Err(e) => Err(e),
        },
        Err(SimError::GridTooFewSlots { nslots }) => {
            log::info!("Too few slots per dimension ({}), running without a grid", nslots);
            Ok(GridStatus::TooFewSlots(nslots))
        }
        Err(e) => Err(e),
    }
}
