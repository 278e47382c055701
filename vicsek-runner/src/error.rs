use thiserror::Error;
use vicsek_config::ConfigError;
use vicsek_core::SimError;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("simulation failed: {0}")]
    Simulation(#[from] SimError),
    #[error("cannot install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("cannot create timing histogram: {0}")]
    Timing(#[from] hdrhistogram::CreationError),
    #[error("cannot write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("cannot encode output: {0}")]
    Encode(#[from] serde_json::Error),
}
