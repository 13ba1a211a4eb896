//! TLS wrapping for connection transports.
//!
//! Every connection verifies servers against Mozilla's root certificates
//! (webpki-roots); there is no per-connection TLS configuration.

use crate::error::HttpError;
use hyper_rustls::HttpsConnector;
use std::sync::Arc;

/// Get the crypto provider for TLS connections.
///
/// 1. Check if a default provider is already installed globally
/// 2. If yes, use that (respects user configuration)
/// 3. If no, create a new aws-lc-rs provider without installing it globally
pub fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Wrap a plain connector so that `https` destinations are upgraded to TLS.
///
/// `http` destinations pass through untouched. Only HTTP/1.1 is advertised
/// via ALPN since connections are driven by `hyper::client::conn::http1`.
///
/// # Errors
///
/// Returns `HttpError::Tls` if the crypto provider rejects the default
/// protocol versions.
pub fn https_connector<C>(inner: C) -> Result<HttpsConnector<C>, HttpError> {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(get_crypto_provider())
        .map_err(|e| HttpError::Tls(Box::new(e)))?
        .https_or_http()
        .enable_http1()
        .wrap_connector(inner);
    Ok(connector)
}
