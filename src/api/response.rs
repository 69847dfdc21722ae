//! Helpers for building handler responses.
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderValue, Response, StatusCode};
use serde::Serialize;

/// Error code the chat API uses when a resource does not exist.
pub const UNKNOWN_RESOURCE: u32 = 10_000;

/// The error envelope the chat API wraps failed requests in.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: u32,
    pub message: String,
}

/// A response carrying `value` encoded as JSON.
///
/// Serialization failures end in a 500 with the error as body; the handler is a test helper
/// and the client under test will surface the status.
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Bytes> {
    match serde_json::to_vec(value) {
        Ok(body) => json_bytes(status, Bytes::from(body)),
        Err(err) => {
            tracing::error!("cannot serialize response body: {}", err);
            raw(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                format!("cannot serialize response body: {}", err),
            )
        }
    }
}

/// A response with an already encoded JSON body.
pub fn json_bytes(status: StatusCode, body: Bytes) -> Response<Bytes> {
    raw(status, "application/json", body)
}

/// A response with an arbitrary body and content type.
pub fn raw<B: Into<Bytes>>(
    status: StatusCode,
    content_type: &'static str,
    body: B,
) -> Response<Bytes> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// `204 No Content`.
pub fn no_content() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// A response carrying the chat API's error envelope.
pub fn api_error<S: Into<String>>(status: StatusCode, code: u32, message: S) -> Response<Bytes> {
    json(
        status,
        &ApiError {
            code,
            message: message.into(),
        },
    )
}
