//! # Map Errors

use thiserror::Error;

/// Errors raised while building or rendering maps
#[derive(Error, Debug)]
pub enum MapError {
    #[error("Nothing to draw on map '{0}'")]
    Empty(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for map operations
pub type Result<T> = std::result::Result<T, MapError>;
