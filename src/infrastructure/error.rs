use crate::application::auto_placement::AutoPlaceError;
use crate::application::interaction::InteractionError;
use crate::application::schedule_store::ScheduleError;
use crate::domain::time_grid::GridError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Planning service error: {0}")]
    Planning(String),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Interaction(#[from] InteractionError),
    #[error(transparent)]
    AutoPlace(#[from] AutoPlaceError),
}

impl InfraError {
    pub fn is_placement_rejection(&self) -> bool {
        match self {
            Self::Schedule(error) | Self::Interaction(InteractionError::Store(error)) => {
                error.rejection().is_some()
            }
            _ => false,
        }
    }
}
