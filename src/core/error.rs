//! Error types for the terrain pipeline

use thiserror::Error;

/// Main error type for the pipeline
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Generation error: {0}")]
    Generation(String),
}
