//! Response snapshots.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{RequestError, Result};
use crate::headers::Headers;
use crate::wire::{unmarshal, CodecRegistry, WireObject};

/// An immutable snapshot of a completed exchange.
///
/// The status, reason, final URL, headers, and raw body bytes are fixed at
/// construction. Decompression and document parsing are lazy and cached,
/// so a response fanned out to many subscribers decodes its body once.
pub struct Response {
    status: i32,
    reason: String,
    url: String,
    headers: Headers,
    raw: Bytes,
    redirect_count: u32,
    codecs: Arc<CodecRegistry>,
    body: Mutex<Option<Bytes>>,
    document: Mutex<Option<Arc<Value>>>,
}

impl Response {
    /// Construct a response snapshot from its parts.
    pub fn new(
        status: i32,
        reason: impl Into<String>,
        url: impl Into<String>,
        headers: Headers,
        raw: impl Into<Bytes>,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            url: url.into(),
            headers,
            raw: raw.into(),
            redirect_count: 0,
            codecs,
            body: Mutex::new(None),
            document: Mutex::new(None),
        }
    }

    /// Record how many redirects were followed to reach this response.
    pub fn with_redirects(mut self, count: u32) -> Self {
        self.redirect_count = count;
        self
    }

    /// Whether at least one redirect was followed.
    pub fn did_redirect(&self) -> bool {
        self.redirect_count > 0
    }

    /// How many redirects were followed.
    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    /// The HTTP status code, or `-1` when no status was received.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// The status reason phrase, empty if none was sent.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The final URL after redirect chasing.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Whether this response counts as a success.
    ///
    /// Statuses 200 through 303 are successes (redirect statuses that
    /// reach the caller were deliberately left unchased), as is the
    /// sentinel `-1` recorded when no status line was received.
    pub fn is_success(&self) -> bool {
        self.status == -1 || (200..=303).contains(&self.status)
    }

    /// The Content-Type header value, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_ignore_case("Content-Type")
    }

    /// The raw body bytes as received, before any decompression.
    pub fn raw_bytes(&self) -> &Bytes {
        &self.raw
    }

    /// The body bytes, decompressed per the Content-Encoding header.
    ///
    /// Decompression happens on first access and is cached.
    pub fn bytes(&self) -> Result<Bytes> {
        let mut cache = self.body.lock();
        if let Some(body) = cache.as_ref() {
            return Ok(body.clone());
        }

        let encoding = self
            .headers
            .get_ignore_case("Content-Encoding")
            .map(|e| e.trim().to_ascii_lowercase());
        let body = match encoding.as_deref() {
            Some("gzip") => {
                let mut out = Vec::new();
                GzDecoder::new(&self.raw[..])
                    .read_to_end(&mut out)
                    .map_err(|e| RequestError::Io(format!("gzip decode failed: {e}")))?;
                Bytes::from(out)
            }
            Some("deflate") => {
                let mut out = Vec::new();
                ZlibDecoder::new(&self.raw[..])
                    .read_to_end(&mut out)
                    .map_err(|e| RequestError::Io(format!("deflate decode failed: {e}")))?;
                Bytes::from(out)
            }
            _ => self.raw.clone(),
        };

        *cache = Some(body.clone());
        Ok(body)
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| RequestError::Unparseable(format!("body is not valid UTF-8: {e}")))
    }

    /// The body parsed as a wire document via the codec registered for
    /// the response's content type. Parsed once and cached.
    pub fn document(&self) -> Result<Arc<Value>> {
        let bytes = self.bytes()?;
        let mut cache = self.document.lock();
        if let Some(doc) = cache.as_ref() {
            return Ok(doc.clone());
        }

        let codec = self.codecs.for_content_type(self.content_type());
        let doc = Arc::new(codec.decode(&bytes)?);
        *cache = Some(doc.clone());
        Ok(doc)
    }

    /// Look up a (possibly dotted) path in the document. Returns `None`
    /// when any segment is missing.
    pub fn field(&self, path: &str) -> Result<Option<Value>> {
        let doc = self.document()?;
        let mut current: &Value = &doc;
        for segment in path.split('.') {
            match current.as_object().and_then(|map| map.get(segment)) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current.clone()))
    }

    /// Unmarshal the document (plus response headers) into a wire object.
    pub fn unmarshal<T>(&self) -> Result<T>
    where
        T: WireObject + Default + 'static,
    {
        let doc = self.document()?;
        Ok(unmarshal(&doc, &self.headers)?)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("raw_len", &self.raw.len())
            .finish()
    }
}
