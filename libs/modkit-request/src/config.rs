use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-request/", env!("CARGO_PKG_VERSION"));

/// Default maximum buffered response body size (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Per-connection request configuration
///
/// Timeouts decorate the transport calls only; they never change the order in
/// which an operation's `run` and `done` steps execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Timeout for opening the transport, including proxy tunnelling and TLS
    /// (default: 30 seconds, `None` = wait indefinitely)
    pub connect_timeout: Option<Duration>,

    /// Timeout for receiving the response head, and separately for reading the
    /// response body (default: 30 seconds, `None` = wait indefinitely)
    pub read_timeout: Option<Duration>,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value, used when the caller did not set one
    pub user_agent: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            read_timeout: Some(Duration::from_secs(30)),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl RequestConfig {
    /// Create minimal configuration (short timeouts, small bodies)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
            read_timeout: Some(Duration::from_secs(10)),
            max_body_size: 1024 * 1024, // 1 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Create configuration without connect or read timeouts
    ///
    /// Calls run until the peer answers or the transport fails.
    #[must_use]
    pub fn no_timeouts() -> Self {
        Self {
            connect_timeout: None,
            read_timeout: None,
            ..Self::default()
        }
    }
}
