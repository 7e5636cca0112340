//! Errors raised while binding action names to provider handles

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    /// The configured action set is unknown to the provider
    #[error("Unknown action set: {0}")]
    UnresolvedActionSet(String),

    #[error("Unknown analog action: {0}")]
    UnresolvedAnalogAction(&'static str),

    #[error("Unknown digital action: {0}")]
    UnresolvedDigitalAction(&'static str),
}
