use crate::error::HttpError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

/// Maximum body preview size for error messages (8KB).
///
/// When a response has a non-2xx status, the body is included in the error
/// for debugging. This limits how much of it is copied into the error.
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Buffered HTTP response
///
/// The body has already been read in full (within the configured
/// `max_body_size`) by the time a caller sees this value, so the connection
/// that produced it may be closed without losing data.
///
/// - `resp.error_for_status()?` - Check status
/// - `resp.bytes()` - Raw bytes
/// - `resp.text()` - Lossy UTF-8 text
/// - `resp.json::<T>()?` - Parse as JSON with status check
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpResponse {
    /// Assemble a response from already-read parts.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Borrow the response body
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Response body as text, without status check
    ///
    /// Invalid UTF-8 sequences are replaced with the Unicode replacement character.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Consume the response into its parts
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }

    /// Check status and return error for non-2xx responses
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` with a body preview of at most
    /// [`ERROR_BODY_PREVIEW_LIMIT`] bytes if the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_success() {
            return Ok(self);
        }

        let content_type = self
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let preview = &self.body[..self.body.len().min(ERROR_BODY_PREVIEW_LIMIT)];

        Err(HttpError::HttpStatus {
            status: self.status,
            body_preview: String::from_utf8_lossy(preview).into_owned(),
            content_type,
        })
    }

    /// Parse response body as JSON with status check
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::Json` if parsing fails.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let response = self.error_for_status()?;
        let value = serde_json::from_slice(&response.body)?;
        Ok(value)
    }
}

/// Read a response body into memory, failing once it grows past `limit`.
pub(crate) async fn read_body_limited<B>(body: B, limit: usize) -> Result<Bytes, HttpError>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| HttpError::Transport(e.into()))?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
