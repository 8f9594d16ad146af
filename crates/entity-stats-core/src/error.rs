use std::time::Duration;

use thiserror::Error;

use crate::types::EntityReference;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(EntityReference),

    #[error("fetch timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("hierarchy cycle through {0}")]
    Cycle(EntityReference),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StatsError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::UnknownEntity(_) => 404,
            Self::Timeout(_) => 504,
            Self::Cycle(_) => 409,
            Self::Internal(_) => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;
