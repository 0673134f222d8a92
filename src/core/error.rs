// Centralized error handling for the check-in service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::error;

use crate::models::kiosk::ErrorResponse;

/// Errors raised by the core operations (resolver, registration, pins)
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

/// Malformed user input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name must not be empty")]
    EmptyName,

    #[error("Id number {sid} is not a valid id (must be at least {min})")]
    SidOutOfRange { sid: i64, min: i64 },

    #[error("PIN must not be empty")]
    EmptyPin,

    #[error("PIN must be at most {max} characters")]
    PinTooLong { max: usize },

    #[error("PIN must only contain digits")]
    PinNotNumeric,

    #[error("Card {card} is already registered to someone else")]
    CardInUse { card: i64 },

    #[error("Id number {sid} is already registered here")]
    AlreadyRegistered { sid: i64 },
}

/// Errors returned by the public kiosk endpoints
#[derive(Error, Debug)]
pub enum KioskError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid location secret")]
    InvalidSecret,

    #[error("No waiver is pending for this user; tap your card again")]
    WaiverNotPending,

    #[error("Internal server error")]
    Internal,
}

impl From<CoreError> for KioskError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(what) => KioskError::NotFound(what),
            CoreError::Validation(e) => KioskError::Validation(e.to_string()),
            CoreError::PermissionDenied(why) => KioskError::Validation(why),
            CoreError::Persistence(e) => {
                error!(error = %format!("{e:#}"), "Persistence failure");
                KioskError::Internal
            }
        }
    }
}

impl IntoResponse for KioskError {
    fn into_response(self) -> Response {
        let status = match &self {
            KioskError::NotFound(_) => StatusCode::NOT_FOUND,
            KioskError::Validation(_) => StatusCode::BAD_REQUEST,
            KioskError::InvalidSecret => StatusCode::UNAUTHORIZED,
            KioskError::WaiverNotPending => StatusCode::FORBIDDEN,
            KioskError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Errors returned by the admin endpoints
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Missing or expired admin session")]
    InvalidSession,

    #[error("A PIN must be set before using admin functions")]
    PinSetupRequired,

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("Insufficient permission: {0}")]
    PermissionDenied(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal,
}

impl From<CoreError> for AdminError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(what) => AdminError::NotFound(what),
            CoreError::PermissionDenied(why) => AdminError::PermissionDenied(why),
            CoreError::Validation(e) => AdminError::Validation(e.to_string()),
            CoreError::Persistence(e) => {
                error!(error = %format!("{e:#}"), "Persistence failure");
                AdminError::Internal
            }
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::InvalidSession => StatusCode::UNAUTHORIZED,
            AdminError::PinSetupRequired => StatusCode::FORBIDDEN,
            AdminError::InvalidPin => StatusCode::UNAUTHORIZED,
            AdminError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Validation(_) => StatusCode::BAD_REQUEST,
            AdminError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
