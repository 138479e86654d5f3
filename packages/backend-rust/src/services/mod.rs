pub mod achievements;
pub mod hooks;
pub mod progress;
pub mod quests;

use thiserror::Error;

use crate::response::AppError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => AppError::validation(message),
            ServiceError::NotFound(message) => AppError::not_found(message),
            ServiceError::Database(err) => AppError::internal(err.to_string()),
        }
    }
}
