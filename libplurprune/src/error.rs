//! Error types for Plurprune

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PruneError>;

#[derive(Error, Debug)]
pub enum PruneError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PruneError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PruneError::InvalidInput(_) => 3,
            PruneError::Config(_) => 3,
            PruneError::Platform(PlatformError::Authentication(_)) => 2,
            PruneError::Platform(_) => 1,
            PruneError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("No pruning threshold given: set a maximum age, a cutoff date, or both")]
    NoThreshold,

    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("Invalid date '{0}': use a Unix timestamp, YYYY-MM-DD, or RFC 3339")]
    InvalidDate(String),

    #[error("Unknown platform kind '{0}'")]
    UnknownPlatformKind(String),

    #[error("Unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}
