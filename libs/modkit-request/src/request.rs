use crate::config::RequestConfig;
use crate::connection::Connection;
use crate::error::{HttpError, OperationError};
use crate::factory::{ConnectionFactory, DEFAULT_CONNECTION_FACTORY};
use crate::operation::{Operation, execute};
use crate::proxy::Proxy;
use crate::response::HttpResponse;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Body type for the request builder
#[derive(Clone, Debug)]
enum BodyKind {
    /// Empty body
    Empty,
    /// Raw bytes body
    Bytes(Bytes),
    /// JSON-serialized body (stored as bytes after serialization)
    Json(Bytes),
    /// Form URL-encoded body (stored as bytes after serialization)
    Form(Bytes),
}

/// One-shot HTTP request with a fluent API
///
/// Every call to [`send()`](Request::send) creates a fresh [`Connection`]
/// through the configured [`ConnectionFactory`], performs a single exchange
/// and always disconnects afterwards, whatever the outcome.
///
/// Builder errors (bad header, bad proxy, serialization failure) are captured
/// and returned by `send()`, so chains never need intermediate `?`.
///
/// # Example
///
/// ```ignore
/// use modkit_request::Request;
///
/// // Plain GET, body as text
/// let html = Request::get("https://example.com").body().await?;
///
/// // Through a proxy
/// let html = Request::get("https://google.com")
///     .use_proxy("23.106.138.59", 443)
///     .body()
///     .await?;
///
/// // POST with JSON body, parsed JSON response
/// let user: User = Request::post("https://api.example.com/users")
///     .header("x-request-id", "123")
///     .json(&NewUser { name: "Alice" })
///     .json_response()
///     .await?;
/// ```
#[must_use = "Request does nothing until .send() is called"]
pub struct Request {
    method: http::Method,
    url: String,
    proxy: Option<Proxy>,
    factory: Option<Arc<dyn ConnectionFactory>>,
    config: RequestConfig,
    headers: HeaderMap,
    body: BodyKind,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
}

impl Request {
    /// Create a request with an explicit method
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            proxy: None,
            factory: None,
            config: RequestConfig::default(),
            headers: HeaderMap::new(),
            body: BodyKind::Empty,
            error: None,
        }
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(http::Method::POST, url)
    }

    /// Create a PUT request
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(http::Method::PUT, url)
    }

    /// Create a PATCH request
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(http::Method::PATCH, url)
    }

    /// Create a DELETE request
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(http::Method::DELETE, url)
    }

    /// Create a HEAD request
    pub fn head(url: impl Into<String>) -> Self {
        Self::new(http::Method::HEAD, url)
    }

    /// Add a single header to the request
    ///
    /// Repeated names are appended, not replaced.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) => {
                self.error = Some(HttpError::InvalidHeaderName(e));
            }
            (_, Err(e)) => {
                self.error = Some(HttpError::InvalidHeaderValue(e));
            }
        }
        self
    }

    /// Add multiple headers to the request
    ///
    /// # Example
    ///
    /// ```ignore
    /// let resp = Request::get("https://api.example.com")
    ///     .headers([("authorization", "Bearer token"), ("x-request-id", "abc123")])
    ///     .send()
    ///     .await?;
    /// ```
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self = self.header(name.as_ref(), value.as_ref());
            if self.error.is_some() {
                break;
            }
        }
        self
    }

    /// Route the request through the proxy at `host:port`
    ///
    /// `https` targets are tunnelled with `CONNECT`; `http` targets are
    /// forwarded to the proxy in absolute form.
    pub fn use_proxy(mut self, host: &str, port: u16) -> Self {
        if self.error.is_some() {
            return self;
        }

        match Proxy::new(host, port) {
            Ok(proxy) => self.proxy = Some(proxy),
            Err(e) => self.error = Some(e.into()),
        }
        self
    }

    /// Route the request through an already validated proxy
    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Create the connection with `factory` instead of
    /// [`DEFAULT_CONNECTION_FACTORY`]
    pub fn connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Replace the whole connection configuration
    pub fn config(mut self, config: RequestConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the connect timeout (`None` = wait indefinitely)
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the read timeout (`None` = wait indefinitely)
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the User-Agent sent when no `user-agent` header is given
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set request body as JSON
    ///
    /// Sets Content-Type to `application/json` unless a Content-Type header
    /// was already provided. A serialization failure is reported by `send()`
    /// as `HttpError::Json`.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        if self.error.is_some() {
            return self;
        }

        match serde_json::to_vec(body) {
            Ok(bytes) => self.body = BodyKind::Json(Bytes::from(bytes)),
            Err(e) => self.error = Some(e.into()),
        }
        self
    }

    /// Set request body as form URL-encoded
    ///
    /// Sets Content-Type to `application/x-www-form-urlencoded` unless a
    /// Content-Type header was already provided. An encoding failure is
    /// reported by `send()` as `HttpError::FormEncode`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let resp = Request::post("https://auth.example.com/token")
    ///     .form(&[("grant_type", "client_credentials"), ("client_id", "my-app")])
    ///     .send()
    ///     .await?;
    /// ```
    pub fn form<T: Serialize + ?Sized>(mut self, fields: &T) -> Self {
        if self.error.is_some() {
            return self;
        }

        match serde_urlencoded::to_string(fields) {
            Ok(encoded) => self.body = BodyKind::Form(Bytes::from(encoded)),
            Err(e) => self.error = Some(e.into()),
        }
        self
    }

    /// Set request body as raw bytes
    pub fn body_bytes(mut self, body: Bytes) -> Self {
        self.body = BodyKind::Bytes(body);
        self
    }

    /// Set request body as a string
    pub fn body_string(mut self, body: String) -> Self {
        self.body = BodyKind::Bytes(Bytes::from(body));
        self
    }

    /// Send the request and return the buffered response
    ///
    /// The connection is disconnected before this returns, on success and on
    /// failure alike.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if:
    /// - Request building failed (invalid header, proxy, or body)
    /// - The factory rejected the URL or proxy
    /// - Network/transport error or timeout
    /// - The exchange succeeded but closing the connection failed (`Cleanup`)
    pub async fn send(self) -> Result<HttpResponse, HttpError> {
        let Self {
            method,
            url,
            proxy,
            factory,
            config,
            mut headers,
            body,
            error,
        } = self;

        if let Some(e) = error {
            return Err(e);
        }

        let factory: &dyn ConnectionFactory =
            factory.as_deref().unwrap_or(&DEFAULT_CONNECTION_FACTORY);
        let mut connection = match &proxy {
            Some(proxy) => factory.create_with_proxy(&url, proxy)?,
            None => factory.create(&url)?,
        };

        // Add default Content-Type only if caller didn't supply one
        if !headers.contains_key(CONTENT_TYPE) {
            match &body {
                BodyKind::Json(_) => {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                BodyKind::Form(_) => {
                    headers.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("application/x-www-form-urlencoded"),
                    );
                }
                BodyKind::Empty | BodyKind::Bytes(_) => {}
            }
        }

        let body = match body {
            BodyKind::Empty => Bytes::new(),
            BodyKind::Bytes(b) | BodyKind::Json(b) | BodyKind::Form(b) => b,
        };

        connection.set_request_method(method);
        connection.set_config(config);
        connection.headers_mut().extend(headers);

        tracing::debug!(
            method = %connection.method(),
            url = %connection.url(),
            proxy = ?proxy.as_ref().map(ToString::to_string),
            "executing request"
        );

        execute(Exchange { connection, body }).await
    }

    /// Send the request and return the body as text, whatever the status
    ///
    /// # Errors
    ///
    /// Same as [`send()`](Request::send).
    pub async fn body(self) -> Result<String, HttpError> {
        Ok(self.send().await?.text())
    }

    /// Send the request and return the raw body, whatever the status
    ///
    /// # Errors
    ///
    /// Same as [`send()`](Request::send).
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        let (_, _, body) = self.send().await?.into_parts();
        Ok(body)
    }

    /// Send the request and return only the status code
    ///
    /// # Errors
    ///
    /// Same as [`send()`](Request::send).
    pub async fn status(self) -> Result<http::StatusCode, HttpError> {
        Ok(self.send().await?.status())
    }

    /// Send the request and parse a 2xx response body as JSON
    ///
    /// # Errors
    ///
    /// Any error from [`send()`](Request::send), plus `HttpError::HttpStatus`
    /// for non-2xx responses and `HttpError::Json` if parsing fails.
    pub async fn json_response<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        self.send().await?.json()
    }
}

/// One request/response exchange over a connection it owns.
struct Exchange {
    connection: Connection,
    body: Bytes,
}

impl Operation for Exchange {
    type Output = HttpResponse;

    async fn run(&mut self) -> Result<HttpResponse, OperationError> {
        let body = std::mem::take(&mut self.body);
        Ok(self.connection.send(body).await?)
    }

    async fn done(&mut self) -> io::Result<()> {
        self.connection.disconnect().await
    }
}
