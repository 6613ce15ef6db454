//! Translates every crate's error kind into the JSON-RPC-style envelope
//! of spec §7, grounded on `control::error::AppError`'s
//! `IntoResponse` pattern but collecting across this workspace's several
//! `thiserror` enums instead of one crate's.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use modelgate_types::{ErrorEnvelope, Kind};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Forward(#[from] modelgate_proxy::Error),
    #[error(transparent)]
    Coordinator(#[from] modelgate_coordinator::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn kind(&self) -> Kind {
        match self {
            AppError::Forward(inner) => inner.kind(),
            AppError::Coordinator(inner) => inner.kind(),
            AppError::InvalidInput(_) => Kind::InvalidInput,
            AppError::NotFound(_) => Kind::NotFound,
            AppError::Unauthorized => Kind::Unauthorized,
            AppError::Internal(_) => Kind::Internal,
        }
    }

    /// `Cancelled` maps to 499 if the client is known to have hung up,
    /// 204 if the server initiated the cancellation while the client was
    /// still connected (spec §7). Callers that know which applies should
    /// use this explicitly rather than relying on `IntoResponse`.
    pub fn status_for_cancellation(client_disconnected: bool) -> StatusCode {
        if client_disconnected {
            StatusCode::from_u16(499).unwrap()
        } else {
            StatusCode::NO_CONTENT
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let envelope = ErrorEnvelope::new(kind, self.to_string());
        (status, Json(envelope)).into_response()
    }
}
