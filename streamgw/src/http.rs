//! The HTTP surface: a single streaming endpoint that resolves a message id
//! to a file and serves it, honoring `Range` requests.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Extension, Path};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::engine::Engine;
use crate::error::{Error, Result};

pub type State = Arc<Engine>;

pub fn get_router() -> Router {
    Router::new()
        .route("/stream/:message_id", get(stream_file))
        .route("/healthz", get(healthz))
}

async fn healthz() -> &'static str {
    "ok"
}

#[tracing::instrument(skip(state, headers))]
async fn stream_file(
    Extension(state): Extension<State>,
    Path(message_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response> {
    let locator = state.resolve(message_id).await?;

    // The file's total size isn't tracked by this gateway (spec §6: out of
    // scope). Without it an open-ended `Range: bytes=N-` request has no end
    // to compute against, so it is rejected rather than guessed at.
    let (range_start, range_end, status) = match headers.get(header::RANGE) {
        None => (0i64, i64::MAX, StatusCode::OK),
        Some(value) => {
            let (start, end) = parse_byte_range(value)?;
            (start, end, StatusCode::PARTIAL_CONTENT)
        }
    };

    let worker_index = state.select_worker();
    let byte_stream = state
        .clone()
        .stream(locator, worker_index, range_start, range_end);

    let mut response = Response::builder()
        .status(status)
        .header(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"))
        .body(Body::from_stream(byte_stream))
        .expect("building a streaming response cannot fail");

    if status == StatusCode::PARTIAL_CONTENT {
        response.headers_mut().insert(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes {range_start}-{range_end}/*"))
                .map_err(|_| Error::BadRange)?,
        );
    }

    Ok(response.into_response())
}

/// Parses a single-range `bytes=start-end` header, the only form this
/// gateway supports. Multi-range (`bytes=0-10,20-30`) requests are rejected.
fn parse_byte_range(value: &HeaderValue) -> Result<(i64, i64)> {
    let value = value.to_str().map_err(|_| Error::BadRange)?;
    let spec = value.strip_prefix("bytes=").ok_or(Error::BadRange)?;
    if spec.contains(',') {
        return Err(Error::BadRange);
    }

    let (start, end) = spec.split_once('-').ok_or(Error::BadRange)?;
    let start: i64 = start.parse().map_err(|_| Error::BadRange)?;
    let end: i64 = if end.is_empty() {
        return Err(Error::BadRange);
    } else {
        end.parse().map_err(|_| Error::BadRange)?
    };

    if start > end {
        return Err(Error::BadRange);
    }

    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_range() {
        let value = HeaderValue::from_static("bytes=500-3145727");
        assert_eq!(parse_byte_range(&value).unwrap(), (500, 3_145_727));
    }

    #[test]
    fn rejects_open_ended_range() {
        let value = HeaderValue::from_static("bytes=500-");
        assert!(parse_byte_range(&value).is_err());
    }

    #[test]
    fn rejects_multi_range() {
        let value = HeaderValue::from_static("bytes=0-10,20-30");
        assert!(parse_byte_range(&value).is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        let value = HeaderValue::from_static("bytes=100-10");
        assert!(parse_byte_range(&value).is_err());
    }
}
