use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::services::{CheckoutError, DataError};

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    InternalServerError(String),
    DatabaseError(sqlx::Error),
    ConfigError(config::ConfigError),
    IoError(std::io::Error),
    MigrateError(sqlx::migrate::MigrateError),
    ValidationError(String),
    Checkout(CheckoutError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {}", msg),
            AppError::DatabaseError(err) => write!(f, "Database error: {}", err),
            AppError::ConfigError(err) => write!(f, "Configuration error: {}", err),
            AppError::IoError(err) => write!(f, "IO error: {}", err),
            AppError::MigrateError(err) => write!(f, "Migration error: {}", err),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Checkout(err) => write!(f, "Checkout failed: {}", err),
        }
    }
}

impl std::error::Error for AppError {}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::EmptyCart
        | CheckoutError::MissingTripDates
        | CheckoutError::InvalidTripDates { .. }
        | CheckoutError::PriceOutOfRange
        | CheckoutError::Payment(_) => StatusCode::BAD_REQUEST,
        CheckoutError::Authentication(_) => StatusCode::UNAUTHORIZED,
        CheckoutError::CheckoutInProgress => StatusCode::CONFLICT,
        CheckoutError::OrderCreation(_)
        | CheckoutError::OrderItemsWrite(_)
        | CheckoutError::NotificationWrite(_)
        | CheckoutError::Commit(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::DatabaseError(ref err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::ConfigError(ref err) => {
                tracing::error!("Config error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error occurred".to_string(),
                )
            }
            AppError::IoError(ref err) => {
                tracing::error!("IO error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO error occurred".to_string(),
                )
            }
            AppError::MigrateError(ref err) => {
                tracing::error!("Migration error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Migration error occurred".to_string(),
                )
            }
            AppError::Checkout(err) => {
                let status = checkout_status(&err);
                if status.is_server_error() {
                    tracing::error!("Checkout error: {}", err);
                }
                (status, err.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::MigrateError(err)
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        AppError::Checkout(err)
    }
}

impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Unauthenticated | DataError::SessionExpired => {
                AppError::Unauthorized(err.to_string())
            }
            DataError::Database(err) => AppError::DatabaseError(err),
            DataError::Decode(msg) => AppError::InternalServerError(msg),
            DataError::Closed => AppError::InternalServerError(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_errors_map_to_statuses() {
        let cases = [
            (CheckoutError::EmptyCart, StatusCode::BAD_REQUEST),
            (CheckoutError::MissingTripDates, StatusCode::BAD_REQUEST),
            (CheckoutError::PriceOutOfRange, StatusCode::BAD_REQUEST),
            (
                CheckoutError::Authentication("no session".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (CheckoutError::CheckoutInProgress, StatusCode::CONFLICT),
            (
                CheckoutError::OrderItemsWrite("fk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn missing_session_is_unauthorized() {
        let response = AppError::from(DataError::Unauthenticated).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
