//! Backend transport for the chat client.
//!
//! The backend is an opaque form-encoded HTTP service; this crate turns a
//! [`SendRequest`] into one POST and the JSON reply into transcript messages.

pub mod http;
pub mod transport;

pub use http::HttpTransport;
pub use transport::{selectable_models, SendRequest, Transport, TransportError};
