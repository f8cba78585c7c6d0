use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NoiseError {
    #[error("noise needs at least one octave")]
    ZeroOctaves,
    #[error("noise scale must be positive and finite, got {0}")]
    InvalidScale(f64),
    #[error("noise parameter `{0}` is not finite")]
    NonFiniteParameter(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("patch resolution must be at least 1")]
    ZeroResolution,
    #[error("patch extent must be positive, got {width} x {height}")]
    InvalidExtent { width: f32, height: f32 },
    #[error("planet radius must be positive, got {0}")]
    InvalidRadius(f32),
    #[error(transparent)]
    Noise(#[from] NoiseError),
    #[error("build request transport failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl From<bincode::Error> for BuildError {
    fn from(error: bincode::Error) -> Self {
        BuildError::Transport(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access terrain config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed terrain config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid terrain config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Noise(#[from] NoiseError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("job {job} ({operation}) panicked: {message}")]
    Panicked {
        job: u64,
        operation: String,
        message: String,
    },
    #[error("failed to spawn terrain worker: {0}")]
    Spawn(String),
    #[error("terrain worker pool has shut down")]
    Stopped,
}
