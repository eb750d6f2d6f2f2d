//! Error types for drydock-core

use thiserror::Error;

/// Core engine error type
#[derive(Debug, Error)]
pub enum Error {
    /// Model provider error
    #[error("provider error: {0}")]
    Provider(#[from] drydock_llm::Error),

    /// Tool error
    #[error("tool error: {0}")]
    Tool(#[from] drydock_tools::Error),

    /// Agent loop exceeded its wall-clock timeout
    #[error("agent loop timed out after {0}s")]
    LoopTimeout(u64),

    /// Deployment failed (classified)
    #[error("deployment failed: {0}")]
    Deployment(#[from] crate::deploy::DeploymentError),

    /// Invalid state transition or configuration
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Event channel closed
    #[error("progress channel closed")]
    ChannelClosed,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
