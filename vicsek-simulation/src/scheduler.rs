use crate::hostile::MixedPopulation;
use crate::population::{Population, StepScratch};
use serde::Serialize;
use vicsek_core::{RandomEngine, SimError, SimResult};

/// Anything the [`Scheduler`] can drive through one synchronous step.
pub trait Steppable {
    /// Moves the state forward by `dt` and rebuilds acceleration structures.
    /// Returns the number of captures, if the model has any.
    fn advance_step(&mut self, dt: f64, rng: &mut RandomEngine) -> SimResult<usize>;

    /// Writes tentative velocities into `scratch` without touching live
    /// state. `rng` is `None` for a noise-free pass. Returns the number of
    /// entities whose velocity was overridden by danger.
    fn sense_step(&self, scratch: &mut StepScratch, rng: Option<&mut RandomEngine>) -> SimResult<usize>;

    fn commit_step(&mut self, scratch: &StepScratch) -> SimResult<()>;

    /// Number of entities that take part in sensing.
    fn live(&self) -> usize;

    fn alloc_scratch(&self) -> StepScratch;
}

impl Steppable for Population {
    fn advance_step(&mut self, dt: f64, _rng: &mut RandomEngine) -> SimResult<usize> {
        self.advance(dt);
        Ok(0)
    }

    fn sense_step(&self, scratch: &mut StepScratch, rng: Option<&mut RandomEngine>) -> SimResult<usize> {
        match rng {
            Some(rng) => self.sense_noisy_velocities(scratch, rng)?,
            None => self.sense_velocities(scratch)?,
        }
        Ok(0)
    }

    fn commit_step(&mut self, scratch: &StepScratch) -> SimResult<()> {
        self.commit_velocities(scratch)
    }

    fn live(&self) -> usize {
        Population::live(self)
    }

    fn alloc_scratch(&self) -> StepScratch {
        Population::alloc_scratch(self)
    }
}

impl Steppable for MixedPopulation {
    /// Hunting comes first, so prey sense the predators where they ended up.
    fn advance_step(&mut self, dt: f64, rng: &mut RandomEngine) -> SimResult<usize> {
        let captures = self.hunt(dt, rng)?;
        self.prey_mut().advance(dt);
        Ok(captures)
    }

    fn sense_step(&self, scratch: &mut StepScratch, rng: Option<&mut RandomEngine>) -> SimResult<usize> {
        match rng {
            Some(rng) => self.sense_noisy_velocities_danger(scratch, rng),
            None => self.sense_velocities_danger(scratch),
        }
    }

    fn commit_step(&mut self, scratch: &StepScratch) -> SimResult<()> {
        self.prey_mut().commit_velocities(scratch)
    }

    fn live(&self) -> usize {
        self.prey().live()
    }

    fn alloc_scratch(&self) -> StepScratch {
        self.prey().alloc_scratch()
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: u64,
    pub captures: usize,
    pub fleeing: usize,
    pub live: usize,
}

/// Runs the step protocol: advance, sense into scratch, commit.
#[derive(Debug, Clone)]
pub struct Scheduler {
    dt: f64,
    noisy: bool,
    scratch: StepScratch,
    step: u64,
}

impl Scheduler {
    pub fn new(dt: f64) -> SimResult<Self> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(SimError::invalid(format!("time step must be positive, got {}", dt)));
        }
        Ok(Self {
            dt,
            noisy: true,
            scratch: StepScratch::default(),
            step: 0,
        })
    }

    /// Turns noise injection on or off for subsequent steps.
    pub fn with_noise(mut self, noisy: bool) -> Self {
        self.noisy = noisy;
        self
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn is_noisy(&self) -> bool {
        self.noisy
    }

    /// Steps executed so far.
    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// Executes one full step on `model`.
    pub fn execute_once<S: Steppable>(&mut self, model: &mut S, rng: &mut RandomEngine) -> SimResult<StepReport> {
        let captures = model.advance_step(self.dt, rng)?;

        // Live counts only shrink, so one allocation normally lasts the run.
        if self.scratch.capacity() < model.live() {
            self.scratch = model.alloc_scratch();
        }
        let noise = if self.noisy { Some(rng) } else { None };
        let fleeing = model.sense_step(&mut self.scratch, noise)?;
        model.commit_step(&self.scratch)?;

        self.step += 1;
        Ok(StepReport {
            step: self.step,
            captures,
            fleeing,
            live: model.live(),
        })
    }
}
