use std::io;
use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
///
/// # Example
///
/// ```ignore
/// match &err {
///     ConnectionError::InvalidUri { kind, .. } => match kind {
///         InvalidUriKind::ParseError => println!("Malformed URL syntax"),
///         InvalidUriKind::MissingAuthority => println!("URL needs a host"),
///         InvalidUriKind::MissingScheme => println!("URL needs http:// or https://"),
///         _ => println!("Other URI error"),
///     },
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Failure to produce a [`Connection`](crate::Connection) from a
/// [`ConnectionFactory`](crate::ConnectionFactory).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionError {
    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// URL scheme has no transport behind it
    #[error("URL scheme '{scheme}' not supported: only http:// and https:// are supported")]
    UnsupportedScheme {
        /// The URL scheme that was rejected
        scheme: String,
    },

    /// Proxy descriptor cannot be used to route a connection
    #[error("Invalid proxy '{host}:{port}': {reason}")]
    InvalidProxy {
        /// Proxy host as given by the caller
        host: String,
        /// Proxy port as given by the caller
        port: u16,
        /// Why the descriptor was rejected
        reason: String,
    },
}

/// The single error type returned by this crate.
///
/// Every failure that crosses [`execute`](crate::execute) is one of these
/// variants. Wrapping variants keep the underlying error reachable through
/// [`std::error::Error::source`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Connection could not be created
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Connect or read step did not finish within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, protocol)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Raw I/O failure raised while running an operation
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    /// Cleanup step failed after the operation itself succeeded
    #[error("Cleanup failed: {0}")]
    Cleanup(#[source] io::Error),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

/// Failure of an operation's `run` step.
///
/// `run` may fail either with an error that is already an [`HttpError`]
/// (passed to the caller unchanged) or with a raw [`io::Error`] that the
/// executor wraps into [`HttpError::Io`]. Both convert with `?`.
#[derive(Error, Debug)]
pub enum OperationError {
    /// Already normalized failure (e.g. a status check done by the caller)
    #[error(transparent)]
    Request(#[from] HttpError),

    /// Raw I/O failure from the underlying transport
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl OperationError {
    /// Convert into the normalized taxonomy.
    #[must_use]
    pub fn normalize(self) -> HttpError {
        match self {
            OperationError::Request(err) => err,
            OperationError::Io(err) => HttpError::Io(err),
        }
    }
}
