use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::proxy::Proxy;

/// Creates [`Connection`]s for URLs.
///
/// Implementations must not keep per-connection state: a factory is shared
/// across threads and called for every request. Supply a custom
/// implementation to a [`Request`](crate::Request) to inject test doubles or
/// custom transport behavior.
pub trait ConnectionFactory: Send + Sync {
    /// Create a connection for `url` using the direct route.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the URL is malformed or its scheme is
    /// not supported.
    fn create(&self, url: &str) -> Result<Connection, ConnectionError>;

    /// Create a connection for `url` routed through `proxy`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the URL is malformed, its scheme is not
    /// supported, or the proxy cannot be used.
    fn create_with_proxy(&self, url: &str, proxy: &Proxy) -> Result<Connection, ConnectionError>;
}

/// Factory backed by the built-in hyper transport.
///
/// Stateless; use the shared [`DEFAULT_CONNECTION_FACTORY`] instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnectionFactory;

/// Process-wide default factory.
pub static DEFAULT_CONNECTION_FACTORY: DefaultConnectionFactory = DefaultConnectionFactory;

impl ConnectionFactory for DefaultConnectionFactory {
    fn create(&self, url: &str) -> Result<Connection, ConnectionError> {
        let connection = Connection::new(url, None)?;
        tracing::debug!(url = %connection.url(), "created connection");
        Ok(connection)
    }

    fn create_with_proxy(&self, url: &str, proxy: &Proxy) -> Result<Connection, ConnectionError> {
        let connection = Connection::new(url, Some(proxy.clone()))?;
        tracing::debug!(url = %connection.url(), proxy = %proxy, "created proxied connection");
        Ok(connection)
    }
}
