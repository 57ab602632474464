//! Callback-driven HTTP client core.
//!
//! # Overview
//! `HttpClient` builds `RequestHandle`s from a URL, optional headers, optional
//! parameters, a method and a body serializer. A handle does nothing until
//! `start()`; the exchange then runs on the client's background runtime and
//! its outcome is delivered exactly once, on the client's callback thread.
//!
//! # Design
//! - Building a request never fails. Bad input is reported through the
//!   callback when the handle starts, so every request has one delivery point.
//! - `cancel()` is honoured in any non-terminal state and always delivers
//!   `RequestError::Cancelled`, including before `start()`.
//! - GET and DELETE put parameters in the query string; POST, PUT and PATCH
//!   form-encode them or send them as JSON, per `SerializerType`.
//! - The network layer sits behind the `Transport` trait; `UreqTransport`
//!   is the default.

pub mod client;
pub mod config;
mod dispatch;
pub mod encode;
pub mod error;
pub mod handle;
pub mod http;
pub mod transport;

pub use client::{Headers, HttpClient, Params, RequestSpec};
pub use config::ClientConfig;
pub use error::RequestError;
pub use handle::{Completion, Outcome, RequestHandle, RequestId, RequestLifecycle, RequestState};
pub use http::{HttpMethod, HttpResponse, PreparedRequest, SerializerType};
pub use tokio_util::sync::CancellationToken;
pub use transport::{Transport, UreqTransport, DEFAULT_BODY_LIMIT};
