//! The process-wide HTTP client.
//!
//! # Design
//! `HttpClient` turns a `RequestSpec` into a `RequestHandle` and nothing
//! more: building a request never touches the network, never fails and never
//! fires the callback. Problems found while building (bad URL, unencodable
//! params) are kept on the handle and delivered when it is started.
//!
//! Each client owns a small tokio runtime for exchanges and one callback
//! thread. `HttpClient` is a cheap clone of shared state, so the FFI layer
//! and tests can hold independent clients while application code uses
//! `HttpClient::shared()`.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::encode;
use crate::error::RequestError;
use crate::handle::{Callback, Completion, Launch, Outcome, RequestHandle};
use crate::http::{HttpMethod, SerializerType};
use crate::transport::{Transport, UreqTransport};

/// Header name to value.
pub type Headers = BTreeMap<String, String>;

/// Request parameters as a JSON object.
pub type Params = serde_json::Map<String, Value>;

static SHARED: OnceLock<HttpClient> = OnceLock::new();

/// Everything that describes one request. Consumed by `HttpClient::request_spec`.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub(crate) url: Result<String, RequestError>,
    pub(crate) headers: Headers,
    pub(crate) params: Result<Option<Params>, RequestError>,
    pub(crate) method: HttpMethod,
    pub(crate) serializer: SerializerType,
}

impl RequestSpec {
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Self::with_url(Ok(url.into()), method)
    }

    /// Build from a URL given as raw bytes.
    ///
    /// Bytes that are not UTF-8 are reported as
    /// `RequestError::InvalidArgument` when the request starts.
    pub fn from_url_bytes(url: &[u8], method: HttpMethod) -> Self {
        let url = std::str::from_utf8(url)
            .map(str::to_string)
            .map_err(|e| RequestError::InvalidArgument(format!("url is not valid UTF-8: {e}")));
        Self::with_url(url, method)
    }

    fn with_url(url: Result<String, RequestError>, method: HttpMethod) -> Self {
        Self {
            url,
            headers: Headers::new(),
            params: Ok(None),
            method,
            serializer: SerializerType::Default,
        }
    }

    /// The URL as given, or `None` if it was not valid UTF-8.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().ok()
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = Ok(Some(params));
        self
    }

    /// Use any serializable value that serializes to a JSON object.
    ///
    /// Anything else is reported as `RequestError::Serialization` when the
    /// request starts.
    pub fn params_from<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        self.params = serde_json::to_value(params)
            .map_err(|e| RequestError::Serialization(e.to_string()))
            .and_then(into_params);
        self
    }

    /// Parse parameters from JSON text holding an object.
    pub fn params_json(mut self, json: impl AsRef<[u8]>) -> Self {
        self.params = serde_json::from_slice::<Value>(json.as_ref())
            .map_err(|e| RequestError::Serialization(e.to_string()))
            .and_then(into_params);
        self
    }

    pub fn serializer(mut self, serializer: SerializerType) -> Self {
        self.serializer = serializer;
        self
    }
}

fn into_params(value: Value) -> Result<Option<Params>, RequestError> {
    match value {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(RequestError::Serialization(format!(
            "params must be an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

struct ClientInner {
    config: RwLock<ClientConfig>,
    transport: Arc<dyn Transport>,
    runtime: Option<tokio::runtime::Runtime>,
    runtime_handle: tokio::runtime::Handle,
    dispatcher: Dispatcher,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // Safe from async contexts, unlike dropping the runtime directly.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Builds requests and runs them on a background runtime.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    /// The process-wide client, configured from the environment on first use.
    ///
    /// # Panics
    ///
    /// Panics on first use if the runtime or callback thread cannot be
    /// spawned.
    pub fn shared() -> &'static HttpClient {
        SHARED.get_or_init(|| {
            HttpClient::new(ClientConfig::from_env()).expect("failed to start the shared HTTP client")
        })
    }

    /// An independent client using `ureq` for transport.
    pub fn new(config: ClientConfig) -> Result<Self, RequestError> {
        Self::with_transport(config, Arc::new(UreqTransport::new()))
    }

    /// An independent client using `transport` for every exchange.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, RequestError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("courier-io")
            .enable_all()
            .build()
            .map_err(|e| RequestError::Transport(format!("failed to start runtime: {e}")))?;
        let dispatcher = Dispatcher::spawn("courier-callbacks")
            .map_err(|e| RequestError::Transport(format!("failed to start callback thread: {e}")))?;

        tracing::debug!(
            target: "courier_core::client",
            "HTTP client ready (timeout {:?}, base url {:?})",
            config.timeout,
            config.base_url
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config: RwLock::new(config),
                transport,
                runtime_handle: runtime.handle().clone(),
                runtime: Some(runtime),
                dispatcher,
            }),
        })
    }

    /// Timeout applied to requests constructed from now on.
    pub fn timeout(&self) -> Duration {
        self.inner.config.read().timeout
    }

    /// Change the timeout for requests constructed after this call.
    /// Requests already built keep theirs.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.config.write().timeout = timeout;
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ClientConfig {
        self.inner.config.read().clone()
    }

    /// Replace the configuration for requests constructed from now on.
    pub fn set_config(&self, config: ClientConfig) {
        *self.inner.config.write() = config;
    }

    /// Build a request with no extra headers and the default serializer.
    pub fn request<F>(&self, url: &str, params: Option<Params>, method: HttpMethod, callback: F) -> RequestHandle
    where
        F: FnOnce(&RequestHandle, Outcome) + Send + 'static,
    {
        self.request_with_serializer(url, None, params, method, SerializerType::Default, callback)
    }

    /// Build a request with extra headers and the default serializer.
    pub fn request_with_headers<F>(
        &self,
        url: &str,
        headers: Option<Headers>,
        params: Option<Params>,
        method: HttpMethod,
        callback: F,
    ) -> RequestHandle
    where
        F: FnOnce(&RequestHandle, Outcome) + Send + 'static,
    {
        self.request_with_serializer(url, headers, params, method, SerializerType::Default, callback)
    }

    /// Build a request with every option spelled out.
    pub fn request_with_serializer<F>(
        &self,
        url: &str,
        headers: Option<Headers>,
        params: Option<Params>,
        method: HttpMethod,
        serializer: SerializerType,
        callback: F,
    ) -> RequestHandle
    where
        F: FnOnce(&RequestHandle, Outcome) + Send + 'static,
    {
        let mut spec = RequestSpec::new(url, method)
            .headers(headers.unwrap_or_default())
            .serializer(serializer);
        if let Some(params) = params {
            spec = spec.params(params);
        }
        self.request_spec(spec, callback)
    }

    /// Build a request from a `RequestSpec`.
    ///
    /// The handle is returned in `Created` unless the client is configured
    /// with `auto_start`.
    pub fn request_spec<F>(&self, spec: RequestSpec, callback: F) -> RequestHandle
    where
        F: FnOnce(&RequestHandle, Outcome) + Send + 'static,
    {
        self.build(spec, Box::new(callback))
    }

    /// Build a request whose outcome arrives through a `Completion` instead
    /// of a callback.
    pub fn request_pending(&self, spec: RequestSpec) -> (RequestHandle, Completion) {
        let (callback, completion) = Completion::channel();
        (self.build(spec, callback), completion)
    }

    fn build(&self, spec: RequestSpec, callback: Callback) -> RequestHandle {
        let config = self.config();
        let request = encode::prepare(spec, &config);

        let launch = Launch {
            request,
            timeout: config.timeout,
            transport: Arc::clone(&self.inner.transport),
            runtime: self.inner.runtime_handle.clone(),
        };
        let handle = RequestHandle::new(launch, callback, self.inner.dispatcher.clone());

        if config.auto_start {
            handle.start();
        }
        handle
    }

    /// Whether two clients share the same state.
    pub fn ptr_eq(&self, other: &HttpClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &*self.inner.config.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    struct Login<'a> {
        user: &'a str,
        remember: bool,
    }

    #[test]
    fn params_from_struct() {
        let spec = RequestSpec::new("/login", HttpMethod::Post).params_from(&Login {
            user: "ann",
            remember: true,
        });
        let params = spec.params.unwrap().unwrap();
        assert_eq!(params["user"], "ann");
        assert_eq!(params["remember"], true);
    }

    #[test]
    fn params_from_non_object_is_a_serialization_error() {
        let spec = RequestSpec::new("/login", HttpMethod::Post).params_from(&vec![1, 2, 3]);
        assert!(matches!(spec.params, Err(RequestError::Serialization(_))));
    }

    #[test]
    fn params_from_map_with_non_string_keys_fails() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "pair");
        let spec = RequestSpec::new("/x", HttpMethod::Post).params_from(&map);
        assert!(matches!(spec.params, Err(RequestError::Serialization(_))));
    }

    #[test]
    fn params_json_null_means_no_params() {
        let spec = RequestSpec::new("/x", HttpMethod::Get).params_json("null");
        assert!(matches!(spec.params, Ok(None)));
    }

    #[test]
    fn params_json_invalid_text_fails() {
        let spec = RequestSpec::new("/x", HttpMethod::Get).params_json("{not json");
        assert!(matches!(spec.params, Err(RequestError::Serialization(_))));
    }

    #[test]
    fn spec_builder_collects_headers() {
        let spec = RequestSpec::new("/x", HttpMethod::Get)
            .header("X-One", "1")
            .header("X-Two", "2")
            .params(json!({"a": 1}).as_object().cloned().unwrap());
        assert_eq!(spec.headers.len(), 2);
        assert_eq!(spec.url(), Some("/x"));
        assert_eq!(spec.method(), HttpMethod::Get);
    }

    #[test]
    fn non_utf8_url_is_reported_as_such() {
        let spec = RequestSpec::from_url_bytes(b"items/\xff", HttpMethod::Get);
        assert_eq!(spec.url(), None);
        let err = crate::encode::prepare(spec, &ClientConfig::default()).unwrap_err();
        match err {
            RequestError::InvalidArgument(msg) => assert!(msg.contains("UTF-8"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn params_json_accepts_bytes() {
        let spec = RequestSpec::new("/x", HttpMethod::Post).params_json(br#"{"a":1}"#);
        assert_eq!(spec.params.unwrap().unwrap()["a"], 1);

        let spec = RequestSpec::new("/x", HttpMethod::Post).params_json(b"{\"a\":\"\xff\"}");
        assert!(matches!(spec.params, Err(RequestError::Serialization(_))));
    }
}
