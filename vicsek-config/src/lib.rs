use serde::{Deserialize, Serialize};
use std::path::Path;
use std::{fs, io};
use thiserror::Error;

// --- Error Type ---
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

// --- Enums for Choices ---
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    #[default]
    Periodic,
    Plain,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoiseModel {
    /// Rotate the consensus heading by a random angle.
    #[default]
    Angular,
    /// Add a random vector before rescaling.
    Vectorial,
}

/// Neighbor selection, tagged by `type`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InteractionConfig {
    Metric { radius: f64 },
    /// `outdegree` nearest entities, not counting the entity itself.
    Topological { outdegree: usize },
    Isolated,
}

// --- Configuration Sections ---

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PopulationConfig {
    pub count: usize,
    pub speed: f64,
    /// Side of the simulation box. Derived from `density` when absent.
    #[serde(default)]
    pub box_extent: Option<f64>,
    #[serde(default = "default_density")]
    pub density: f64,
}

fn default_density() -> f64 { 1.0 }

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BehaviorConfig {
    #[serde(default)]
    pub noise_model: NoiseModel,
    pub noise: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GridConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Explicit slots per axis; derived from the interaction when absent.
    #[serde(default)]
    pub nslots: Option<usize>,
    #[serde(default = "default_max_slots")]
    pub max_slots: usize,
}

// Above 50 slots there is little speed gain.
fn default_max_slots() -> usize { 50 }

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            nslots: None,
            max_slots: default_max_slots(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Steps run before any output.
    #[serde(default)]
    pub transient: u64,
    pub iterations: u64,
    #[serde(default = "default_output_every")]
    pub output_every: u64,
    #[serde(default = "default_noisy")]
    pub noisy: bool,
}

fn default_dt() -> f64 { 1.0 }
fn default_output_every() -> u64 { 10 }
fn default_noisy() -> bool { true }

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct DiagnosticsConfig {
    #[serde(default)]
    pub correlation_bins: Option<usize>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PredatorConfig {
    pub count: usize,
    pub speed: f64,
    /// Prey flee predators closer than this.
    pub detection_radius: f64,
    /// Captured prey reappear elsewhere instead of leaving.
    #[serde(default)]
    pub respawn: bool,
}

// --- Top-Level Config Struct ---

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub seed: Option<u64>,
    pub population: PopulationConfig,
    #[serde(default)]
    pub geometry: GeometryKind,
    pub interaction: InteractionConfig,
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub grid: GridConfig,
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub predators: Option<PredatorConfig>,
}

// --- Helper Methods ---

impl PopulationConfig {
    /// Box side for a `dim`-dimensional run: the configured extent, or the
    /// side that gives `density` entities per unit volume.
    pub fn resolved_box_extent(&self, dim: usize) -> f64 {
        self.box_extent
            .unwrap_or_else(|| (self.count as f64 / self.density).powf(1.0 / dim as f64))
    }
}

impl Config {
    /// Grid slots per axis for this run, or `None` to run without a grid.
    /// The result may still be too small for a grid to be built.
    pub fn grid_slots(&self, box_extent: f64) -> Option<usize> {
        if !self.grid.enabled {
            return None;
        }
        if let Some(nslots) = self.grid.nslots {
            return Some(nslots);
        }
        let derived = match self.interaction {
            InteractionConfig::Metric { radius } => (box_extent / radius) as usize,
            InteractionConfig::Topological { outdegree } => {
                (0.5 * self.population.count as f64 / outdegree as f64).sqrt() as usize
            }
            InteractionConfig::Isolated => return None,
        };
        Some(derived.min(self.grid.max_slots))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let population = &self.population;
        if population.count == 0 {
            return invalid("population count cannot be zero");
        }
        if !positive(population.speed) {
            return invalid("population speed must be positive");
        }
        if let Some(extent) = population.box_extent {
            if !positive(extent) {
                return invalid("box extent must be positive");
            }
        }
        if !positive(population.density) {
            return invalid("density must be positive");
        }

        match self.interaction {
            InteractionConfig::Metric { radius } if !positive(radius) => {
                return invalid("metric radius must be positive");
            }
            InteractionConfig::Topological { outdegree: 0 } => {
                return invalid("topological outdegree must be at least 1");
            }
            _ => {}
        }

        if !(0.0..=1.0).contains(&self.behavior.noise) {
            return invalid("noise must lie in [0, 1]");
        }
        if !positive(self.schedule.dt) {
            return invalid("time step must be positive");
        }
        if self.schedule.output_every == 0 {
            return invalid("output_every cannot be zero");
        }
        if self.grid.max_slots == 0 {
            return invalid("max_slots cannot be zero");
        }
        if self.diagnostics.correlation_bins == Some(0) {
            return invalid("correlation_bins cannot be zero");
        }

        if let Some(predators) = &self.predators {
            if predators.count == 0 {
                return invalid("predator count cannot be zero");
            }
            if !positive(predators.speed) {
                return invalid("predator speed must be positive");
            }
            if !(predators.detection_radius >= 0.0 && predators.detection_radius.is_finite()) {
                return invalid("detection radius cannot be negative");
            }
        }
        Ok(())
    }
}

fn positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Validation(message.to_string()))
}

// --- Loading Function ---

/// Reads and validates a run configuration. Files ending in `.toml` are
/// parsed as TOML, everything else as JSON.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    let config: Config = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    config.validate()?;
    Ok(config)
}
