//! Error types for layer construction and configuration

use thiserror::Error;

/// Errors raised while building masks, blocks and networks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("kernel size must be odd and >= 1, got {0}")]
    InvalidKernel(usize),

    #[error("input_dim must be >= 1, got {0}")]
    InvalidInputDim(usize),

    #[error("latent_dim must be >= 1, got {0}")]
    InvalidLatentDim(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("normalization layer is already initialized")]
    AlreadyInitialized,

    #[error("normalization layer used before initialization")]
    NotInitialized,
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, LayerError>;
