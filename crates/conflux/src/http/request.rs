//! Request descriptors and the contracts they carry.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::RequestError;
use crate::headers::Headers;
use crate::payload::PayloadSource;
use super::response::Response;

/// HTTP request methods supported by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET method.
    Get,
    /// HTTP PUT method.
    Put,
    /// HTTP POST method.
    Post,
    /// HTTP DELETE method.
    Delete,
}

impl Method {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Put => reqwest::Method::PUT,
            Self::Post => reqwest::Method::POST,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Put => write!(f, "PUT"),
            Self::Post => write!(f, "POST"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// The body of a request: raw bytes or a payload source, never both.
pub enum Body {
    /// No body.
    Empty,
    /// Raw bytes.
    Bytes(Bytes),
    /// A streaming payload source.
    Payload(Arc<Mutex<Box<dyn PayloadSource>>>),
}

impl Body {
    /// The body length in bytes, or `None` if unknown.
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Payload(payload) => payload.lock().content_length(),
        }
    }

    /// Whether no body is present.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// A stable fingerprint of the body content.
    fn content_hash(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Bytes(bytes) => Some(hex::encode(Sha256::digest(bytes))),
            Self::Payload(payload) => Some(payload.lock().hash()),
        }
    }
}

impl Clone for Body {
    fn clone(&self) -> Self {
        match self {
            Self::Empty => Self::Empty,
            Self::Bytes(bytes) => Self::Bytes(bytes.clone()),
            Self::Payload(payload) => Self::Payload(payload.clone()),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Bytes(bytes) => write!(f, "Bytes(len={})", bytes.len()),
            Self::Payload(payload) => {
                write!(f, "Payload(len={:?})", payload.lock().content_length())
            }
        }
    }
}

/// A response validator, run after redirect chasing against the final
/// response.
pub trait Validator: Send + Sync {
    /// The validator's identifier, carried in rejection errors.
    fn id(&self) -> &str;

    /// Validate the response. Returning `Ok(false)` rejects it; returning
    /// `Err` wraps the cause in a validator-errored failure.
    fn validate(&self, response: &Response)
        -> std::result::Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Decides whether a failed exchange should be re-attempted.
pub trait RetryDecision: Send + Sync {
    /// Called before each re-attempt with the previous response (if any),
    /// the classified error, and the descriptor about to be re-run.
    /// Returning `false` stops retrying.
    fn on_will_retry(
        &self,
        previous: Option<&Response>,
        error: &RequestError,
        next: &Request,
    ) -> bool;
}

/// A request descriptor.
///
/// Created once per logical call; immutable except for the URL and
/// redirect count during redirect chaining and the retry count during
/// retry chaining. The cancellation flag is shared by all clones, so
/// cancelling a descriptor held by the registry is observed by the
/// executor running its clone.
#[derive(Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: Headers,
    body: Body,
    read_timeout: Option<Duration>,
    cancellable: bool,
    cancelled: Arc<AtomicBool>,
    tag: Option<String>,
    retries: u32,
    retry_spacing: Duration,
    retry_decision: Option<Arc<dyn RetryDecision>>,
    validators: Vec<Arc<dyn Validator>>,
    throw_on_failure: bool,
    redirect_count: u32,
    retry_count: u32,
}

impl Request {
    /// Create a new request descriptor.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: Body::Empty,
            read_timeout: None,
            cancellable: true,
            cancelled: Arc::new(AtomicBool::new(false)),
            tag: None,
            retries: 0,
            retry_spacing: Duration::ZERO,
            retry_decision: None,
            validators: Vec::new(),
            throw_on_failure: true,
            redirect_count: 0,
            retry_count: 0,
        }
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The current URL (rewritten during redirect chaining).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Set a header (last-write-wins).
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// The request body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Set a raw byte body, clearing any payload source.
    pub fn set_body(&mut self, bytes: impl Into<Bytes>) {
        self.body = Body::Bytes(bytes.into());
    }

    /// Set a payload source body, clearing any raw bytes.
    pub fn set_payload(&mut self, payload: Box<dyn PayloadSource>) {
        self.body = Body::Payload(Arc::new(Mutex::new(payload)));
    }

    /// Clear the body.
    pub fn clear_body(&mut self) {
        self.body = Body::Empty;
    }

    /// The per-request read timeout override.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Set the per-request read timeout.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = Some(timeout);
    }

    /// Whether this request opts in to (non-forced) cancellation.
    pub fn cancellable(&self) -> bool {
        self.cancellable
    }

    /// Opt this request out of non-forced cancellation.
    pub fn set_cancellable(&mut self, cancellable: bool) {
        self.cancellable = cancellable;
    }

    /// Set the cancellation flag, observed cooperatively by the executor.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// The opaque tag, used for selective cancellation.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Set the opaque tag.
    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = Some(tag.into());
    }

    /// The retry budget.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The spacing slept between retry attempts.
    pub fn retry_spacing(&self) -> Duration {
        self.retry_spacing
    }

    /// Configure the retry budget and spacing.
    pub fn set_retry_policy(&mut self, retries: u32, spacing: Duration) {
        self.retries = retries;
        self.retry_spacing = spacing;
    }

    /// The retry-decision callback, if any.
    pub fn retry_decision(&self) -> Option<&Arc<dyn RetryDecision>> {
        self.retry_decision.as_ref()
    }

    /// Set the retry-decision callback.
    pub fn set_retry_decision(&mut self, decision: Arc<dyn RetryDecision>) {
        self.retry_decision = Some(decision);
    }

    /// The per-request validators.
    pub fn validators(&self) -> &[Arc<dyn Validator>] {
        &self.validators
    }

    /// Append a validator.
    pub fn add_validator(&mut self, validator: Arc<dyn Validator>) {
        self.validators.push(validator);
    }

    /// Whether a non-success status surfaces as an error.
    pub fn throw_on_failure(&self) -> bool {
        self.throw_on_failure
    }

    /// Control whether a non-success status surfaces as an error.
    pub fn set_throw_on_failure(&mut self, throw: bool) {
        self.throw_on_failure = throw;
    }

    /// How many redirects this request has followed.
    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    /// How many retries this request has consumed.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Rewrite the URL while following a redirect.
    pub(crate) fn redirect_to(&mut self, url: String) {
        self.url = url;
        self.redirect_count += 1;
    }

    pub(crate) fn bump_retry_count(&mut self) {
        self.retry_count += 1;
        // Each retry gets a fresh redirect budget.
        self.redirect_count = 0;
    }

    /// The de-duplication key for this request.
    ///
    /// Derived from the method, the scheme-stripped URL, and the body
    /// length; POST and PUT additionally mix in a content hash so that
    /// distinct payloads to the same URL never coalesce. Only the
    /// asynchronous callback path consults this key.
    pub fn fingerprint(&self) -> String {
        let location = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let length = self
            .body
            .len()
            .map(|len| len.to_string())
            .unwrap_or_else(|| "?".to_string());

        let mut key = format!("{}:{}:{}", self.method, location, length);
        if matches!(self.method, Method::Post | Method::Put) {
            if let Some(hash) = self.body.content_hash() {
                key.push(':');
                key.push_str(&hash);
            }
        }
        key
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("tag", &self.tag)
            .field("cancellable", &self.cancellable)
            .field("retries", &self.retries)
            .field("redirect_count", &self.redirect_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::BytesPayload;

    #[test]
    fn fingerprint_is_stable_for_identical_requests() {
        let mut a = Request::new(Method::Post, "http://example.com/post");
        a.set_body(&b"{\"name\":\"Aidan\"}"[..]);
        let mut b = Request::new(Method::Post, "http://example.com/post");
        b.set_body(&b"{\"name\":\"Aidan\"}"[..]);

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_scheme() {
        let a = Request::new(Method::Get, "http://example.com/get");
        let b = Request::new(Method::Get, "https://example.com/get");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_method_url_and_body() {
        let base = Request::new(Method::Get, "http://example.com/a");

        let other_url = Request::new(Method::Get, "http://example.com/b");
        assert_ne!(base.fingerprint(), other_url.fingerprint());

        let other_method = Request::new(Method::Delete, "http://example.com/a");
        assert_ne!(base.fingerprint(), other_method.fingerprint());

        let mut with_body = Request::new(Method::Post, "http://example.com/a");
        with_body.set_body(&b"x"[..]);
        let mut other_body = Request::new(Method::Post, "http://example.com/a");
        other_body.set_body(&b"y"[..]);
        assert_ne!(with_body.fingerprint(), other_body.fingerprint());
    }

    #[test]
    fn post_fingerprint_uses_payload_hash() {
        let mut a = Request::new(Method::Post, "http://example.com/upload");
        a.set_payload(Box::new(BytesPayload::new(
            &b"content"[..],
            "application/octet-stream",
        )));
        let mut b = Request::new(Method::Post, "http://example.com/upload");
        b.set_body(&b"content"[..]);

        // Raw bytes and a payload with identical content share a key.
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn body_and_payload_are_mutually_exclusive() {
        let mut request = Request::new(Method::Post, "http://example.com");
        request.set_payload(Box::new(BytesPayload::new(&b"p"[..], "text/plain")));
        request.set_body(&b"b"[..]);
        assert!(matches!(request.body(), Body::Bytes(_)));

        request.set_payload(Box::new(BytesPayload::new(&b"p"[..], "text/plain")));
        assert!(matches!(request.body(), Body::Payload(_)));
    }

    #[test]
    fn cancellation_flag_is_shared_across_clones() {
        let request = Request::new(Method::Get, "http://example.com");
        let clone = request.clone();
        clone.cancel();
        assert!(request.is_cancelled());
    }
}
