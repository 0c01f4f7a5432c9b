//! Gateway-facing errors and their HTTP mapping.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("no file is stored under that message id")]
    NotFound,

    #[error("authorization with the backend failed: {0}")]
    AuthFailed(#[from] msgstore_client::AuthError),

    #[error("backend is unavailable: {0}")]
    BackendUnavailable(Arc<msgstore_client::Error>),

    #[error("the cached file reference is stale and was evicted, retry the request")]
    StaleReference,

    #[error("malformed range header")]
    BadRange,

    #[error("configuration error: {0}")]
    Config(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a startup-time error (credentials/worker file loading) for
    /// `main`'s `expect`-free error path.
    pub fn init_error<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config(Arc::new(e))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = match &self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AuthFailed(_) | Self::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::StaleReference => StatusCode::CONFLICT,
            Self::BadRange => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (code, self.to_string()).into_response()
    }
}
