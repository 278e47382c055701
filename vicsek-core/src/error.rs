use thiserror::Error;

/// Failures raised by the simulation core.
///
/// Precondition violations are reported here instead of degrading silently;
/// nothing in the core retries, so callers either handle the error or abort
/// the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("random engine used before a seed was set")]
    Unseeded,

    #[error("random engine seed can only be set once")]
    AlreadySeeded,

    #[error("grid needs more than 3 slots per axis, got {nslots}")]
    GridTooFewSlots { nslots: usize },

    #[error("grid cells of {cell_size} are narrower than the interaction radius {radius}")]
    GridTooFine { cell_size: f64, radius: f64 },

    #[error("query against an empty population")]
    EmptyPopulation,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("scratch buffer holds {provided} entries but {needed} are required")]
    ScratchTooSmall { needed: usize, provided: usize },

    #[error("slot {slot} is outside the live range 0..{live}")]
    SlotOutOfRange { slot: usize, live: usize },

    #[error("correlation is undefined when the mean speed equals v0")]
    DegenerateCorrelation,
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Shorthand for building an `InvalidParameter` from anything printable.
    pub fn invalid(msg: impl Into<String>) -> Self {
        SimError::InvalidParameter(msg.into())
    }
}
