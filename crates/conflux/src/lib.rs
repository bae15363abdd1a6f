//! A client-side HTTP request engine with callback coalescing and
//! schema-driven marshalling.
//!
//! Conflux issues requests, drives their lifecycle (connect, send body,
//! receive body, redirect, retry, validate), and converts application
//! objects to and from wire documents. Concurrent callback-path requests
//! that are byte-for-byte identical coalesce into one network exchange
//! whose result fans out to every subscriber.
//!
//! # Making requests
//!
//! ```ignore
//! use conflux::Client;
//!
//! let client = Client::new()?;
//!
//! // Direct (awaited) execution.
//! let response = client.get("https://api.example.com/users/1")
//!     .header("Accept", "application/json")
//!     .send()
//!     .await?;
//! let name = response.field("name")?;
//!
//! // Callback path: identical in-flight requests coalesce.
//! let handle = client.get("https://api.example.com/users/1")
//!     .callback(|outcome| {
//!         if let Some(response) = &outcome.response {
//!             println!("status {}", response.status());
//!         }
//!     })?;
//!
//! // Cancel via the returned handle.
//! client.cancel(&handle, false);
//! ```
//!
//! # Wire objects
//!
//! Deriving [`WireObject`] gives a type a static schema describing how
//! its fields map onto a wire document (dotted paths, header-bound
//! fields, nested objects):
//!
//! ```ignore
//! use conflux::WireObject;
//!
//! #[derive(WireObject, Default)]
//! struct User {
//!     name: Option<String>,
//!     #[wire(name = "address.zip")]
//!     zip: Option<String>,
//!     #[wire(header = "X-Request-Id")]
//!     request_id: Option<String>,
//! }
//!
//! let user: User = response.unmarshal()?;
//! client.post("https://api.example.com/users").object(&user).send().await?;
//! ```

// Derive-generated code names this crate by its package name; make that
// path resolve inside the crate itself.
extern crate self as conflux;

pub mod config;
mod error;
mod headers;
pub mod http;
pub mod payload;
pub mod runtime;
pub mod wire;

pub use config::Config;
pub use error::{RequestError, Result};
pub use headers::Headers;
pub use payload::{BytesPayload, FilePayload, PayloadSource};

// Re-export commonly used types at the crate root.
pub use http::{
    Body, Callbacks, Client, ClientBuilder, Method, NotificationSink, Outcome, Request,
    RequestBuilder, Response, RetryDecision, Subscriber, Validator,
};
pub use wire::{ConvertError, WireObject};

/// Derive a wire schema for a struct. See the [`wire`] module docs.
pub use conflux_macros::WireObject;

/// Commonly used imports.
pub mod prelude {
    pub use crate::error::{RequestError, Result};
    pub use crate::headers::Headers;
    pub use crate::http::{
        Callbacks, Client, Method, Outcome, Request, Response, Subscriber,
    };
    pub use crate::payload::{BytesPayload, FilePayload, PayloadSource};
    pub use crate::wire::{self, WireObject};
    pub use conflux_macros::WireObject;
}
