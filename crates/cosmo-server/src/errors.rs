//! Error types for the relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Startup and listener failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error("metrics recorder: {0}")]
    Metrics(String),
}

/// Why a single frame could not be queued for a client.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("send queue full")]
    QueueFull,
}

/// Failures talking to the transport layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("transport layer returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("timed out")]
    Timeout,
    #[error("forward queue full")]
    QueueFull,
    #[error("outbound bridge stopped")]
    Stopped,
    #[error("cannot build client: {0}")]
    Client(String),
}

impl TransportError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Status { .. } => "status",
            Self::Timeout => "timeout",
            Self::QueueFull => "queue_full",
            Self::Stopped => "stopped",
            Self::Client(_) => "client",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Failures of `POST /receive`, mapped onto the documented response bodies.
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
    message: &'static str,
}

impl ReceiveError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidFormat(_) => "Invalid message format",
            Self::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for ReceiveError {
    fn into_response(self) -> Response {
        let body = StatusBody {
            status: "error",
            message: self.public_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
