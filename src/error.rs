//! Error types for MargaNav

use thiserror::Error;

use crate::position::PositionError;
use crate::route::ProviderError;

/// MargaNav error type
#[derive(Error, Debug)]
pub enum NavError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("Directions provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid route plan: {0}")]
    InvalidPlan(String),

    #[error("Announcement failed: {0}")]
    AnnouncementFailure(String),

    #[error("No route proposal pending")]
    NoPendingProposal,

    #[error("No active navigation session")]
    NotActive,

    #[error("Navigation loop stopped")]
    LoopStopped,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<PositionError> for NavError {
    fn from(e: PositionError) -> Self {
        match e {
            PositionError::PermissionDenied => NavError::PermissionDenied,
            other => NavError::PositionUnavailable(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for NavError {
    fn from(e: toml::de::Error) -> Self {
        NavError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
