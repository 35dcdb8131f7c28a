use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Not enough bars yet for a rolling computation. Callers treat this as
    /// "no signal this bar", never as a failure.
    #[error("Insufficient history: need {needed} bars, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid bar data: {0}")]
    InvalidData(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn insufficient(needed: usize, available: usize) -> Self {
        Error::InsufficientHistory { needed, available }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
