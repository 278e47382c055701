//! Run output: `#`-commented text in the classic column layout, or one JSON
//! record per line.

use crate::setup::{GridStatus, Setup};
use clap::ValueEnum;
use serde::Serialize;
use std::io::Write;
use vicsek_config::{Config, InteractionConfig};
use vicsek_core::SimError;
use vicsek_simulation::{CorrelationHistogram, Population, StepReport};

use crate::error::RunnerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Record<'a> {
    Header {
        seed: u64,
        box_extent: f64,
        grid_slots: Option<usize>,
        config: &'a Config,
    },
    Step {
        iteration: u64,
        order_parameter: f64,
        #[serde(flatten)]
        report: StepReport,
        correlation: Option<CorrelationHistogram>,
    },
    Capture {
        iteration: u64,
        avoidance_time: u64,
    },
}

pub struct Reporter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    fn emit(&mut self, record: &Record<'_>) -> Result<(), RunnerError> {
        serde_json::to_writer(&mut self.out, record)?;
        writeln!(self.out)?;
        Ok(())
    }

    pub fn header(&mut self, config: &Config, seed: u64, setup: &Setup) -> Result<(), RunnerError> {
        if self.format == OutputFormat::Json {
            return self.emit(&Record::Header {
                seed,
                box_extent: setup.box_extent,
                grid_slots: setup.grid.slots(),
                config,
            });
        }

        let out = &mut self.out;
        writeln!(out, "# Number of agents  {}", config.population.count)?;
        match config.interaction {
            InteractionConfig::Metric { radius } => writeln!(out, "# Metric radius     {:.6}", radius)?,
            InteractionConfig::Topological { outdegree } => writeln!(out, "# Outdegree         {}", outdegree)?,
            InteractionConfig::Isolated => writeln!(out, "# Isolated agents")?,
        }
        writeln!(out, "# Speed             {:.6}", config.population.speed)?;
        writeln!(out, "# Noise             {:.6}", config.behavior.noise)?;
        writeln!(out, "# Time step         {:.6}", config.schedule.dt)?;
        writeln!(out, "# Box size          {:.6}", setup.box_extent)?;
        writeln!(out, "# Random seed       {}", seed)?;
        if let Some(predators) = &config.predators {
            writeln!(out, "# Predators         {}", predators.count)?;
            writeln!(out, "# Predator speed    {:.6}", predators.speed)?;
            writeln!(out, "# Detection radius  {:.6}", predators.detection_radius)?;
        }
        writeln!(out)?;
        match setup.grid {
            GridStatus::Using(nslots) => writeln!(out, "# Using grid with {} slots/dim.", nslots)?,
            GridStatus::TooFewSlots(nslots) => writeln!(out, "# Too few slots per dimension ({}).", nslots)?,
            GridStatus::TooFine(nslots) => writeln!(out, "# Too many slots per dimension ({}).", nslots)?,
            GridStatus::Disabled => {}
        }
        Ok(())
    }

    /// Reports one measured step. `correlation_bins` adds the correlation
    /// histogram; it is skipped with a warning when the flock is perfectly
    /// aligned.
    pub fn step(
        &mut self,
        iteration: u64,
        report: &StepReport,
        flock: &Population,
        hunting: bool,
        correlation_bins: Option<usize>,
    ) -> Result<(), RunnerError> {
        let speed = flock.behavior().speed();
        let order_parameter = match flock.order_parameter(speed) {
            Ok(order) => order,
            Err(SimError::EmptyPopulation) => 0.0,
            Err(e) => return Err(e.into()),
        };
        let correlation = match correlation_bins {
            Some(bins) if !flock.is_empty() => match flock.correlation_histo(bins, speed) {
                Ok(histo) => Some(histo),
                Err(SimError::DegenerateCorrelation) => {
                    log::warn!("Iteration {}: flock fully aligned, correlation undefined", iteration);
                    None
                }
                Err(e) => return Err(e.into()),
            },
            _ => None,
        };

        if self.format == OutputFormat::Json {
            return self.emit(&Record::Step {
                iteration,
                order_parameter,
                report: *report,
                correlation,
            });
        }

        let out = &mut self.out;
        if hunting {
            writeln!(out, "#Iteration: {}\tNum agents: {}", iteration, report.live)?;
        } else {
            writeln!(out, "#Iteration: {}\tOrderpar: {:.6}", iteration, order_parameter)?;
        }
        if let Some(histo) = correlation {
            for (distance, sum, count) in histo.rows() {
                writeln!(out, "{:.6}\t{:.6}\t{}", distance, sum, count)?;
            }
            writeln!(out, "\n")?;
        }
        Ok(())
    }

    /// Steps survived by the prey since the previous capture.
    pub fn capture(&mut self, iteration: u64, avoidance_time: u64) -> Result<(), RunnerError> {
        match self.format {
            OutputFormat::Json => self.emit(&Record::Capture {
                iteration,
                avoidance_time,
            }),
            OutputFormat::Text => {
                writeln!(self.out, "{}", avoidance_time)?;
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> Result<(), RunnerError> {
        self.out.flush()?;
        Ok(())
    }
}
