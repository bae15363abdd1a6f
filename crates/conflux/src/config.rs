//! Client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::headers::Headers;
use crate::http::request::Validator;
use crate::wire::CodecRegistry;

/// Configuration shared by every request a client issues.
///
/// Per-request settings override their config counterparts; the config
/// supplies the defaults.
#[derive(Clone)]
pub struct Config {
    /// Headers merged into every request (request headers win).
    pub default_headers: Headers,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Default read timeout, overridable per request.
    pub read_timeout: Duration,
    /// Buffer size for streaming payload bodies.
    pub buffer_size: usize,
    /// Validators run against every final response.
    pub default_validators: Vec<Arc<dyn Validator>>,
    /// Whether redirect responses are chased at all.
    pub follow_redirects: bool,
    /// Maximum redirect hops before the request fails.
    pub max_redirects: u32,
    /// The User-Agent header value.
    pub user_agent: String,
    /// Codecs for response body decoding, keyed by content type.
    pub codecs: Arc<CodecRegistry>,
}

impl Default for Config {
    fn default() -> Self {
        let mut default_headers = Headers::new();
        default_headers.insert("Accept-Encoding", "gzip, deflate");
        Self {
            default_headers,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            buffer_size: 8 * 1024,
            default_validators: Vec::new(),
            follow_redirects: true,
            max_redirects: 10,
            user_agent: concat!("conflux/", env!("CARGO_PKG_VERSION")).to_string(),
            codecs: Arc::new(CodecRegistry::new()),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("default_headers", &self.default_headers)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("buffer_size", &self.buffer_size)
            .field("validators", &self.default_validators.len())
            .field("follow_redirects", &self.follow_redirects)
            .field("max_redirects", &self.max_redirects)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
