//! Neighbor discovery and consensus updates for self-propelled particles.

pub mod behavior;
pub mod entity;
pub mod grid;
pub mod hostile;
pub mod interaction;
pub mod population;
pub mod scheduler;
pub mod select;
pub mod stats;

// Re-export key types for convenience
pub use behavior::{Behavior, Consensus};
pub use entity::{Entity, StateView};
pub use grid::Grid;
pub use hostile::{CapturePolicy, MixedPopulation};
pub use interaction::{Interaction, NeighborPolicy, NeighborScratch};
pub use population::{Population, StepScratch};
pub use scheduler::{Scheduler, StepReport, Steppable};
pub use select::quickselect;
pub use stats::CorrelationHistogram;
