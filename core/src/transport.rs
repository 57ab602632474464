//! The network layer behind the client.
//!
//! # Design
//! `Transport` is a blocking, synchronous seam: it takes a fully prepared
//! request and returns whatever the server said, including non-2xx statuses.
//! The client runs it on tokio's blocking pool and owns timeouts and status
//! interpretation, so a transport never has to.
//!
//! The client cancels the exchange's `CancellationToken` when the request is
//! cancelled, times out or its client shuts down. A transport should check it
//! at every point where it can stop early and return
//! `RequestError::Cancelled`; whatever it returns after that is discarded.

use std::io::{self, Read};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::RequestError;
use crate::http::{HttpMethod, HttpResponse, PreparedRequest};

/// Largest response body `UreqTransport` reads unless configured otherwise.
pub const DEFAULT_BODY_LIMIT: u64 = 64 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

/// Executes prepared requests.
pub trait Transport: Send + Sync + 'static {
    /// Perform one exchange, honouring `timeout` and `cancel` where the
    /// transport can.
    ///
    /// Returns `Ok` for any response the server produced, whatever its
    /// status; `Err` only for failures below HTTP.
    fn execute(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, RequestError>;
}

/// `Transport` backed by a `ureq` agent.
///
/// The agent keeps a connection pool, so it is reused for as long as the
/// requested timeout stays the same. Connecting and sending cannot be
/// interrupted; cancellation is observed before the request is sent, once
/// the response head arrives and between body chunks.
pub struct UreqTransport {
    agent: Mutex<Option<(Duration, ureq::Agent)>>,
    body_limit: u64,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::with_body_limit(DEFAULT_BODY_LIMIT)
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail responses whose body is longer than `limit` bytes with
    /// `RequestError::BodyTooLarge`.
    pub fn with_body_limit(limit: u64) -> Self {
        Self {
            agent: Mutex::new(None),
            body_limit: limit,
        }
    }

    pub fn body_limit(&self) -> u64 {
        self.body_limit
    }

    fn agent(&self, timeout: Duration) -> ureq::Agent {
        let mut cached = self.agent.lock();
        if let Some((t, agent)) = cached.as_ref() {
            if *t == timeout {
                return agent.clone();
            }
        }
        // Status codes are data here; the client decides what counts as an error.
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        *cached = Some((timeout, agent.clone()));
        agent
    }
}

impl Transport for UreqTransport {
    fn execute(
        &self,
        request: &PreparedRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, RequestError> {
        if cancel.is_cancelled() {
            return Err(RequestError::Cancelled);
        }
        let agent = self.agent(timeout);
        let url = request.url.as_str();
        let headers = &request.headers;
        let body = request.body.as_deref();

        tracing::trace!(
            target: "courier_core::transport",
            "{} {} ({} headers, body: {})",
            request.method,
            url,
            headers.len(),
            body.map_or(0, str::len)
        );

        let result = match request.method {
            HttpMethod::Get => with_headers(agent.get(url), headers).call(),
            HttpMethod::Delete => with_headers(agent.delete(url), headers).call(),
            HttpMethod::Post => send(with_headers(agent.post(url), headers), body),
            HttpMethod::Put => send(with_headers(agent.put(url), headers), body),
            HttpMethod::Patch => send(with_headers(agent.patch(url), headers), body),
        };
        let mut response = result?;
        if cancel.is_cancelled() {
            return Err(RequestError::Cancelled);
        }

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = read_body(response.body_mut().as_reader(), self.body_limit, cancel)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Read `reader` to the end in chunks, stopping early on cancellation or
/// once more than `limit` bytes have arrived.
fn read_body(mut reader: impl Read, limit: u64, cancel: &CancellationToken) -> Result<Vec<u8>, RequestError> {
    let mut body = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if cancel.is_cancelled() {
            return Err(RequestError::Cancelled);
        }
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(body),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(RequestError::Timeout),
            Err(e) => return Err(RequestError::Transport(format!("reading response body: {e}"))),
        };
        if (body.len() + n) as u64 > limit {
            return Err(RequestError::BodyTooLarge { limit });
        }
        body.extend_from_slice(&chunk[..n]);
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&str>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}
