//! Errors surfaced by the MsgStore client.

use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// An error from a single backend RPC call.
///
/// This is the unit the retry logic in [`crate::session`] and
/// [`crate::transport`] reasons about; it does not yet know whether the
/// caller should retry, fail the stream, or fail the whole request — that
/// policy lives in the session pool and chunk fetcher.
#[derive(Error, Debug)]
pub enum Error {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to decode response ({status}): {error}")]
    Decode {
        status: StatusCode,
        bytes: Bytes,
        error: serde_json::Error,
    },

    #[error("backend returned an error ({status}): {message}")]
    Backend { status: StatusCode, message: String },

    #[error("flood control: retry after {0:?}")]
    FloodWait(Duration),

    #[error("auth bytes invalid")]
    AuthBytesInvalid,

    #[error("unexpected response type, expected {expected}")]
    UnexpectedResponse { expected: &'static str },

    #[error("invalid init value: {0}")]
    InitError(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn init_error<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::InitError(Box::new(e))
    }
}

/// Errors exposed across the `(worker, dc_id)` session pool boundary.
#[derive(Error, Debug, Clone)]
pub enum AuthError {
    #[error("exhausted {attempts} attempts importing authorization for dc {dc_id}: {source}")]
    Exhausted {
        dc_id: i32,
        attempts: u32,
        #[source]
        source: std::sync::Arc<Error>,
    },

    #[error("transport error while authenticating for dc {dc_id}: {source}")]
    Transport {
        dc_id: i32,
        #[source]
        source: std::sync::Arc<Error>,
    },
}
