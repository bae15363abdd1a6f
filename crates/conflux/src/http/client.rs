//! The client surface: configuration, request building, and dispatch.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::config::Config;
use crate::error::{RequestError, Result};
use crate::payload::PayloadSource;
use crate::runtime;
use crate::wire::{marshal, Codec, CodecRegistry, WireObject};
use super::executor::{Executor, Outcome};
use super::registry::Registry;
use super::request::{Method, Request, RetryDecision, Validator};
use super::response::Response;
use super::stack::{Callbacks, InlineSink, NotificationSink, Subscriber};

/// Builder for creating a client with custom configuration.
pub struct ClientBuilder {
    config: Config,
    codecs: CodecRegistry,
    sink: Arc<dyn NotificationSink>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            codecs: CodecRegistry::new(),
            sink: Arc::new(InlineSink),
        }
    }

    /// Add a header sent with every request (request headers win).
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(name, value);
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the default read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the buffer size used when streaming payload bodies.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size.max(1);
        self
    }

    /// Add a validator run against every final response.
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.config.default_validators.push(validator);
        self
    }

    /// Disable redirect following.
    pub fn no_redirects(mut self) -> Self {
        self.config.follow_redirects = false;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Register a codec under its canonical content type.
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codecs.register(codec);
        self
    }

    /// Set where subscriber notifications are delivered. Defaults to
    /// inline delivery on the worker.
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the client.
    pub fn build(mut self) -> Result<Client> {
        self.config.codecs = Arc::new(self.codecs);
        let config = Arc::new(self.config);
        let executor = Executor::new(config.clone())?;
        Ok(Client {
            inner: Arc::new(ClientInner {
                config,
                executor,
                registry: Registry::new(self.sink),
            }),
        })
    }
}

struct ClientInner {
    config: Arc<Config>,
    executor: Executor,
    registry: Registry,
}

/// The request engine's client.
///
/// Cheap to clone; clones share the transport, configuration, and the
/// fingerprint registry, so identical concurrent callback requests
/// coalesce across clones.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a client with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The client's configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Start building a request.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url)
    }

    /// Start building a GET request.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::Get, url)
    }

    /// Start building a POST request.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::Post, url)
    }

    /// Start building a PUT request.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::Put, url)
    }

    /// Start building a DELETE request.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder {
        self.request(Method::Delete, url)
    }

    /// Execute a request to completion, returning the final response or
    /// the classified error. No de-duplication applies on this path.
    pub async fn execute(&self, mut request: Request) -> Result<Arc<Response>> {
        let mut progress = |_: u64, _: Option<u64>| {};
        self.inner
            .executor
            .execute(&mut request, &mut progress)
            .await
            .into_result()
    }

    /// Execute a request from a synchronous context, blocking on the
    /// global runtime. Must not be called from within an async context.
    pub fn execute_blocking(&self, request: Request) -> Result<Arc<Response>> {
        runtime::block_on(self.execute(request))
    }

    /// Submit a request on the callback path.
    ///
    /// Requests with the same fingerprint coalesce: the first submission
    /// starts one exchange, later ones only attach their subscriber.
    /// Every subscriber receives the shared outcome once. Returns the
    /// descriptor, which shares the in-flight cancellation flag and so
    /// doubles as a cancellation handle.
    pub fn submit(&self, request: Request, subscriber: Arc<dyn Subscriber>) -> Request {
        if self.inner.registry.subscribe(&request, subscriber) {
            let inner = self.inner.clone();
            let mut driver = request.clone();
            let fingerprint = request.fingerprint();
            runtime::spawn(async move {
                let outcome = {
                    let registry = &inner.registry;
                    let fingerprint = fingerprint.as_str();
                    let mut progress = |current: u64, total: Option<u64>| {
                        registry.progress(fingerprint, current, total);
                    };
                    inner.executor.execute(&mut driver, &mut progress).await
                };
                if outcome.is_success() {
                    // Transfers with an unknown total report 0 until the
                    // end; close them out at 100.
                    inner.registry.progress(&fingerprint, 1, Some(1));
                }
                inner.registry.complete(&fingerprint, outcome);
            });
        }
        request
    }

    /// Cancel the in-flight request matching `request`'s fingerprint.
    /// Returns `true` when its stack was fully retired.
    pub fn cancel(&self, request: &Request, force: bool) -> bool {
        self.inner
            .registry
            .cancel(&request.fingerprint(), None, force)
    }

    /// Cancel subscribers across all in-flight requests by tag (all
    /// subscribers, when `tag` is `None`). Returns the number of stacks
    /// fully retired.
    pub fn cancel_all(&self, tag: Option<&str>, force: bool) -> usize {
        self.inner.registry.cancel_all(tag, force)
    }

    /// Cancel in-flight requests whose method matches (if given) and
    /// whose URL matches the pattern. Returns the number of stacks
    /// fully retired.
    pub fn cancel_matching(
        &self,
        method: Option<Method>,
        url_pattern: &regex::Regex,
        force: bool,
    ) -> usize {
        self.inner.registry.cancel_matching(method, url_pattern, force)
    }

    /// Number of in-flight coalesced requests.
    pub fn in_flight(&self) -> usize {
        self.inner.registry.in_flight()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("in_flight", &self.inner.registry.in_flight())
            .finish()
    }
}

/// Fluent builder for a single request, bound to a client.
pub struct RequestBuilder {
    client: Client,
    request: Request,
    error: Option<RequestError>,
}

impl RequestBuilder {
    fn new(client: Client, method: Method, url: impl Into<String>) -> Self {
        Self {
            client,
            request: Request::new(method, url),
            error: None,
        }
    }

    /// Set a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.set_header(name, value);
        self
    }

    /// Set a raw byte body.
    pub fn body(mut self, bytes: impl Into<Bytes>) -> Self {
        self.request.set_body(bytes);
        self
    }

    /// Set a JSON body, serializing `value` and setting the
    /// Content-Type header.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.request.set_header("Content-Type", "application/json");
                self.request.set_body(bytes);
            }
            Err(err) => self.error = Some(err.into()),
        }
        self
    }

    /// Set a wire object body: marshals the object into a document,
    /// applies its header-bound fields to the request headers, and
    /// encodes it with the codec for the request's content type
    /// (defaulting to JSON).
    pub fn object(mut self, object: &dyn WireObject) -> Self {
        let mut headers = self.request.headers().clone();
        let encoded = marshal(object, &mut headers).map_err(RequestError::from).and_then(|doc| {
            let codec = self
                .client
                .config()
                .codecs
                .for_content_type(headers.get_ignore_case("Content-Type"));
            let bytes = codec.encode(&doc)?;
            Ok((bytes, codec.content_type()))
        });
        match encoded {
            Ok((bytes, content_type)) => {
                if headers.get_ignore_case("Content-Type").is_none() {
                    headers.insert("Content-Type", content_type);
                }
                *self.request.headers_mut() = headers;
                self.request.set_body(bytes);
            }
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Set a streaming payload body.
    pub fn payload(mut self, payload: Box<dyn PayloadSource>) -> Self {
        self.request.set_payload(payload);
        self
    }

    /// Override the read timeout for this request.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.request.set_read_timeout(timeout);
        self
    }

    /// Tag the request for selective cancellation.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.request.set_tag(tag);
        self
    }

    /// Opt out of non-forced cancellation.
    pub fn not_cancellable(mut self) -> Self {
        self.request.set_cancellable(false);
        self
    }

    /// Retry failures up to `count` times, sleeping `spacing` between
    /// attempts.
    pub fn retries(mut self, count: u32, spacing: Duration) -> Self {
        self.request.set_retry_policy(count, spacing);
        self
    }

    /// Consult `decision` before each retry.
    pub fn retry_decision(mut self, decision: Arc<dyn RetryDecision>) -> Self {
        self.request.set_retry_decision(decision);
        self
    }

    /// Add a validator for this request only.
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.request.add_validator(validator);
        self
    }

    /// Return non-success statuses as plain responses instead of
    /// errors.
    pub fn allow_failure_status(mut self) -> Self {
        self.request.set_throw_on_failure(false);
        self
    }

    /// Finish building, returning the descriptor.
    pub fn build(self) -> Result<Request> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.request),
        }
    }

    /// Execute the request, returning the final response.
    pub async fn send(self) -> Result<Arc<Response>> {
        let client = self.client.clone();
        let request = self.build()?;
        client.execute(request).await
    }

    /// Execute the request from a synchronous context.
    pub fn send_blocking(self) -> Result<Arc<Response>> {
        let client = self.client.clone();
        let request = self.build()?;
        client.execute_blocking(request)
    }

    /// Submit on the callback path with a subscriber. Returns the
    /// descriptor as a cancellation handle.
    pub fn submit(self, subscriber: Arc<dyn Subscriber>) -> Result<Request> {
        let client = self.client.clone();
        let request = self.build()?;
        Ok(client.submit(request, subscriber))
    }

    /// Submit on the callback path with a completion closure.
    pub fn callback(
        self,
        complete: impl Fn(&Outcome) + Send + Sync + 'static,
    ) -> Result<Request> {
        self.submit(Arc::new(Callbacks::new(complete)))
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("request", &self.request)
            .field("error", &self.error)
            .finish()
    }
}
