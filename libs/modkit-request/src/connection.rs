use crate::config::RequestConfig;
use crate::error::{ConnectionError, HttpError, InvalidUriKind};
use crate::proxy::Proxy;
use crate::response::{HttpResponse, read_body_limited};
use crate::tls;
use bytes::Bytes;
use http::header::{HOST, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use http_body_util::Full;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::connect::proxy::Tunnel;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::ServiceExt;

type Sender = SendRequest<Full<Bytes>>;

/// How the transport reaches the target.
#[derive(Debug, Clone, Copy)]
enum Route<'a> {
    /// TCP (+ TLS for https) straight to the target
    Direct,
    /// `CONNECT` tunnel through the proxy, then TLS to the target
    Tunnel(&'a Proxy),
    /// Plain HTTP to the proxy with an absolute-form request target
    Forward(&'a Proxy),
}

#[derive(Debug)]
enum Transport {
    Idle,
    Open { sender: Sender, driver: JoinHandle<()> },
    Closed,
}

/// Single-use HTTP connection bound to one URL and an optional proxy.
///
/// Created by a [`ConnectionFactory`](crate::ConnectionFactory). The transport
/// is opened lazily by [`connect`](Self::connect) or [`send`](Self::send), and
/// released by [`disconnect`](Self::disconnect). A connection carries exactly
/// one request/response exchange and is never reused afterwards.
///
/// # Example
///
/// ```ignore
/// let mut conn = DEFAULT_CONNECTION_FACTORY.create("https://example.com/api")?;
/// conn.set_request_method(http::Method::POST);
/// conn.set_request_property("content-type", "application/json")?;
/// let response = conn.send(Bytes::from_static(b"{}")).await?;
/// conn.disconnect().await?;
/// ```
#[derive(Debug)]
pub struct Connection {
    url: http::Uri,
    proxy: Option<Proxy>,
    method: http::Method,
    headers: HeaderMap,
    config: RequestConfig,
    transport: Transport,
    exchanged: bool,
}

impl Connection {
    /// Create an unopened connection for `url`, optionally routed through `proxy`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::InvalidUri`] if the URL is malformed or not
    /// absolute, and [`ConnectionError::UnsupportedScheme`] for schemes other
    /// than `http` and `https`.
    pub fn new(url: &str, proxy: Option<Proxy>) -> Result<Self, ConnectionError> {
        let url = parse_url(url)?;
        Ok(Self {
            url,
            proxy,
            method: http::Method::GET,
            headers: HeaderMap::new(),
            config: RequestConfig::default(),
            transport: Transport::Idle,
            exchanged: false,
        })
    }

    /// Target URL
    #[must_use]
    pub fn url(&self) -> &http::Uri {
        &self.url
    }

    /// Proxy this connection is routed through, if any
    #[must_use]
    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    /// Whether the connection is routed through a proxy
    #[must_use]
    pub fn using_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Request method (default: `GET`)
    #[must_use]
    pub fn method(&self) -> &http::Method {
        &self.method
    }

    /// Request headers set so far
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Connection configuration
    #[must_use]
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Whether the transport is currently open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.transport, Transport::Open { .. })
    }

    /// Set the request method
    pub fn set_request_method(&mut self, method: http::Method) {
        self.method = method;
    }

    /// Set a request header, replacing any previous values for `name`
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName` or `HttpError::InvalidHeaderValue`.
    pub fn set_request_property(&mut self, name: &str, value: &str) -> Result<(), HttpError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append a request header, keeping previous values for `name`
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderName` or `HttpError::InvalidHeaderValue`.
    pub fn add_request_property(&mut self, name: &str, value: &str) -> Result<(), HttpError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Replace the connection configuration
    pub fn set_config(&mut self, config: RequestConfig) {
        self.config = config;
    }

    /// Open the transport if it is not open yet.
    ///
    /// # Errors
    ///
    /// - `HttpError::Timeout` if `connect_timeout` expires
    /// - `HttpError::Transport` if the target or proxy cannot be reached, the
    ///   proxy refuses the tunnel, TLS fails, or the connection was closed
    pub async fn connect(&mut self) -> Result<(), HttpError> {
        match self.transport {
            Transport::Open { .. } => return Ok(()),
            Transport::Closed => return Err(not_connected("connection is closed")),
            Transport::Idle => {}
        }

        tracing::debug!(
            url = %self.url,
            proxy = ?self.proxy.as_ref().map(ToString::to_string),
            "opening connection"
        );

        let (sender, driver) = with_timeout(self.config.connect_timeout, self.open()).await?;
        self.transport = Transport::Open { sender, driver };
        Ok(())
    }

    /// Send the request with `body` and read the full response.
    ///
    /// Connects first if needed. Adds `Host` and, unless already set, the
    /// configured `User-Agent`.
    ///
    /// # Errors
    ///
    /// - Any error from [`connect`](Self::connect)
    /// - `HttpError::Transport` if this connection already carried a request
    /// - `HttpError::Timeout` if `read_timeout` expires
    /// - `HttpError::BodyTooLarge` if the body exceeds `max_body_size`
    pub async fn send(&mut self, body: Bytes) -> Result<HttpResponse, HttpError> {
        if self.exchanged {
            return Err(not_connected("connection already carried a request"));
        }
        self.connect().await?;

        let request = self.build_request(body)?;
        let Transport::Open { sender, .. } = &mut self.transport else {
            return Err(not_connected("connection is closed"));
        };
        self.exchanged = true;

        tracing::debug!(method = %self.method, url = %self.url, "sending request");

        let response = with_timeout(self.config.read_timeout, async {
            sender.ready().await?;
            Ok::<_, HttpError>(sender.send_request(request).await?)
        })
        .await?;

        let (parts, incoming) = response.into_parts();
        let body = with_timeout(
            self.config.read_timeout,
            read_body_limited(incoming, self.config.max_body_size),
        )
        .await?;

        tracing::debug!(
            status = parts.status.as_u16(),
            body_len = body.len(),
            "received response"
        );

        Ok(HttpResponse::new(parts.status, parts.headers, body))
    }

    /// Close the transport.
    ///
    /// Idempotent. After this call the connection is released and any further
    /// `connect`/`send` fails.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the connection driver task panicked.
    pub async fn disconnect(&mut self) -> io::Result<()> {
        let previous = std::mem::replace(&mut self.transport, Transport::Closed);
        let Transport::Open { sender, driver } = previous else {
            return Ok(());
        };

        tracing::debug!(url = %self.url, "closing connection");

        drop(sender);
        driver.abort();
        match driver.await {
            Err(err) if err.is_panic() => {
                tracing::warn!(url = %self.url, "connection driver panicked");
                Err(io::Error::other(err))
            }
            Ok(()) | Err(_) => Ok(()),
        }
    }

    fn route(&self) -> Route<'_> {
        match &self.proxy {
            None => Route::Direct,
            Some(proxy) if self.url.scheme() == Some(&http::uri::Scheme::HTTPS) => {
                Route::Tunnel(proxy)
            }
            Some(proxy) => Route::Forward(proxy),
        }
    }

    async fn open(&self) -> Result<(Sender, JoinHandle<()>), HttpError> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);

        match self.route() {
            Route::Direct => {
                let io = tls::https_connector(http)?
                    .oneshot(self.url.clone())
                    .await
                    .map_err(HttpError::Transport)?;
                handshake(io).await
            }
            Route::Tunnel(proxy) => {
                let tunnel = Tunnel::new(proxy.uri().clone(), http);
                let io = tls::https_connector(tunnel)?
                    .oneshot(self.url.clone())
                    .await
                    .map_err(HttpError::Transport)?;
                handshake(io).await
            }
            Route::Forward(proxy) => {
                let io = http
                    .oneshot(proxy.uri().clone())
                    .await
                    .map_err(|e| HttpError::Transport(Box::new(e)))?;
                handshake(io).await
            }
        }
    }

    fn build_request(&self, body: Bytes) -> Result<http::Request<Full<Bytes>>, HttpError> {
        // Forward proxies need the absolute URL, everything else gets origin-form
        let target = match self.route() {
            Route::Forward(_) => self.url.clone(),
            Route::Direct | Route::Tunnel(_) => {
                let mut parts = http::uri::Parts::default();
                parts.path_and_query = Some(
                    self.url
                        .path_and_query()
                        .cloned()
                        .unwrap_or_else(|| http::uri::PathAndQuery::from_static("/")),
                );
                http::Uri::from_parts(parts).map_err(http::Error::from)?
            }
        };

        let mut request = http::Request::builder()
            .method(self.method.clone())
            .uri(target)
            .body(Full::new(body))?;

        let headers = request.headers_mut();
        headers.clone_from(&self.headers);
        if !headers.contains_key(HOST) {
            headers.insert(HOST, host_header(&self.url)?);
        }
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_str(&self.config.user_agent)?);
        }

        Ok(request)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Transport::Open { driver, .. } = &self.transport {
            driver.abort();
        }
    }
}

/// Parse and validate an absolute `http`/`https` URL.
fn parse_url(url: &str) -> Result<http::Uri, ConnectionError> {
    let uri: http::Uri =
        url.parse()
            .map_err(|e: http::uri::InvalidUri| ConnectionError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            })?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => {
            return Err(ConnectionError::UnsupportedScheme {
                scheme: scheme.to_owned(),
            });
        }
        None => {
            return Err(ConnectionError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            });
        }
    }

    if uri.host().is_none_or(str::is_empty) {
        return Err(ConnectionError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    Ok(uri)
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HttpError> {
    let name = HeaderName::try_from(name)?;
    let value = HeaderValue::try_from(value)?;
    Ok((name, value))
}

/// `Host` value without any userinfo the URL may carry.
fn host_header(url: &http::Uri) -> Result<HeaderValue, HttpError> {
    let host = url.host().unwrap_or_default();
    let value = match url.port_u16() {
        Some(port) => HeaderValue::try_from(format!("{host}:{port}"))?,
        None => HeaderValue::from_str(host)?,
    };
    Ok(value)
}

fn not_connected(reason: &'static str) -> HttpError {
    HttpError::Transport(Box::new(io::Error::new(io::ErrorKind::NotConnected, reason)))
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, HttpError>>,
) -> Result<T, HttpError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| HttpError::Timeout(limit))?,
        None => fut.await,
    }
}

async fn handshake<I>(io: I) -> Result<(Sender, JoinHandle<()>), HttpError>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(io).await?;
    let driver = tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "connection driver finished with error");
        }
    });
    Ok((sender, driver))
}
