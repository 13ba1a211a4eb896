use crate::error::ConnectionError;
use std::fmt;

/// HTTP proxy a [`Connection`](crate::Connection) is routed through.
///
/// Immutable once constructed. Only the syntax of the descriptor is checked
/// here; whether the host resolves is only known once the connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proxy {
    host: String,
    port: u16,
    uri: http::Uri,
}

impl Proxy {
    /// Create a proxy descriptor for `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidProxy`] if the host is empty, the port
    /// is `0`, or `host:port` is not a valid URI authority.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ConnectionError> {
        let host = host.into();
        let invalid = |reason: &str| ConnectionError::InvalidProxy {
            host: host.clone(),
            port,
            reason: reason.to_owned(),
        };

        if host.trim().is_empty() {
            return Err(invalid("host is empty"));
        }
        if port == 0 {
            return Err(invalid("port must be in 1..=65535"));
        }

        let uri = http::Uri::builder()
            .scheme(http::uri::Scheme::HTTP)
            .authority(format_authority(&host, port))
            .path_and_query("/")
            .build()
            .map_err(|_| invalid("not a valid host"))?;

        Ok(Self { host, port, uri })
    }

    /// Proxy host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Proxy port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://host:port` form used to dial the proxy.
    #[must_use]
    pub fn uri(&self) -> &http::Uri {
        &self.uri
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_authority(&self.host, self.port))
    }
}

/// IPv6 literals need brackets inside an authority.
fn format_authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
