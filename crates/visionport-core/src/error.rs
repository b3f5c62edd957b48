use thiserror::Error;

/// Failure taxonomy for a single classification run.
///
/// `Resource` is the only non-fatal kind: callers degrade (empty label table)
/// instead of aborting.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to parse model: {0}")]
    Parse(String),

    #[error("engine compilation failed: {0}")]
    Compilation(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("resource unavailable: {0}")]
    Resource(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

impl PipelineError {
    /// Whether the run must stop. Everything except `Resource` is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Resource(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
