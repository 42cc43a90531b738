// error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::poll::ValidationError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Poll not found")]
    NotFound,

    #[error("Poll has expired")]
    Expired,

    #[error("Invalid option")]
    InvalidOption,

    #[error("Invalid input")]
    InvalidInput(String),

    #[error("You have already voted on this poll")]
    AlreadyVoted,

    #[error("Too many votes. Please try again later.")]
    RateLimited,

    #[error("Storage failure")]
    StorageFailure,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Expired => StatusCode::GONE,
            AppError::InvalidOption | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyVoted => StatusCode::FORBIDDEN,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AppError::AlreadyVoted,
            StoreError::PollNotFound(_) => AppError::NotFound,
            StoreError::UnknownOption { .. } => AppError::InvalidOption,
            other => {
                error!(error = %other, "Storage operation failed");
                AppError::StorageFailure
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match &self {
            AppError::InvalidInput(details) => json!({
                "success": false,
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "success": false, "error": self.to_string() }),
        };

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Expired.status(), StatusCode::GONE);
        assert_eq!(AppError::InvalidOption.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AlreadyVoted.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::StorageFailure.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn raced_duplicate_becomes_already_voted() {
        assert!(matches!(
            AppError::from(StoreError::Duplicate),
            AppError::AlreadyVoted
        ));
        assert!(matches!(
            AppError::from(StoreError::TokenExhausted),
            AppError::StorageFailure
        ));
    }
}
