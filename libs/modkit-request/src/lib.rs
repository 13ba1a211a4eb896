#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Connection factory and run/done operation lifecycle for `ModKit`
//!
//! This crate provides:
//! - A [`ConnectionFactory`] that turns a URL (and optional [`Proxy`]) into an
//!   unopened, single-use [`Connection`]
//! - An [`Operation`] executor with `try`/`finally` semantics: `done` always
//!   runs after `run`, and the `run` failure wins when both fail
//! - A thin [`Request`] facade combining the two for one-shot HTTP calls
//!
//! Every failure reaches the caller as a single [`HttpError`].
//!
//! # Example
//!
//! ```ignore
//! use modkit_request::Request;
//!
//! let html = Request::get("https://google.com")
//!     .use_proxy("23.106.138.59", 443)
//!     .body()
//!     .await?;
//! ```
//!
//! Custom operations over a raw connection:
//!
//! ```ignore
//! use bytes::Bytes;
//! use modkit_request::{ConnectionFactory, DEFAULT_CONNECTION_FACTORY, OperationError, execute_with};
//!
//! let connection = DEFAULT_CONNECTION_FACTORY.create("https://example.com")?;
//! let status = execute_with(
//!     connection,
//!     |conn| Box::pin(async move { Ok::<_, OperationError>(conn.send(Bytes::new()).await?.status()) }),
//!     |conn| Box::pin(conn.disconnect()),
//! )
//! .await?;
//! ```

mod config;
mod connection;
mod error;
mod factory;
mod operation;
mod proxy;
mod request;
mod response;
mod tls;

pub use config::{DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, RequestConfig};
pub use connection::Connection;
pub use error::{ConnectionError, HttpError, InvalidUriKind, OperationError};
pub use factory::{ConnectionFactory, DEFAULT_CONNECTION_FACTORY, DefaultConnectionFactory};
pub use operation::{Operation, execute, execute_with};
pub use proxy::Proxy;
pub use request::Request;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse};
