//! The request engine: descriptors, execution, coalescing, and
//! responses.

pub mod client;
pub mod executor;
pub mod registry;
pub mod request;
pub mod response;
pub mod stack;

pub use client::{Client, ClientBuilder, RequestBuilder};
pub use executor::{Executor, Outcome, ProgressFn};
pub use registry::Registry;
pub use request::{Body, Method, Request, RetryDecision, Validator};
pub use response::Response;
pub use stack::{CallbackStack, Callbacks, InlineSink, NotificationSink, Subscriber};
