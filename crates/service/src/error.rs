//! Error handling with Sentry integration.
//!
//! `AppError` captures server-side failures to Sentry before responding to
//! the client. All route handlers return `Result<T, AppError>`.
//! `StartupError` covers the boot sequence in [`crate::server`].

use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::bus::BusError;
use crate::store::StoreError;

/// Request-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Store read failed on a cache miss.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Store(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        };

        // Don't expose internal error details to clients
        let error = match &self {
            Self::Store(_) => "Internal server error".to_string(),
            Self::NotFound(_) => self.to_string(),
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Why the service could not start or stopped abnormally.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The store could not be reached or hydration failed.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The bus could not be reached or subscribed to.
    #[error("message bus unavailable: {0}")]
    Bus(#[from] BusError),

    /// The HTTP listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server failed while running.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The ingestion task panicked.
    #[error("ingestion task failed: {0}")]
    Ingestion(#[from] tokio::task::JoinError),
}
