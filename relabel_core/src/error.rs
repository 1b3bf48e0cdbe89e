// Error types shared by every stage of a training run
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelabelError {
    /// Invalid settings detected before or while wiring up the run.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A caller handed over data that breaks an established schema.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("failed to load reward model: {0}")]
    ModelLoad(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Torch(#[from] tch::TchError),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelabelError>;
