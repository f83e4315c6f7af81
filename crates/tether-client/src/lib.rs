//! Async client for the Tether control-plane service
//!
//! A thin outbound HTTP(S) client that reaches the control plane over
//! TCP, TLS, or a local Unix-domain socket. One [`Request`] is one
//! exchange: the builder accumulates target, method, path, headers,
//! body, and timeout, and the terminal [`Request::send`] dials a fresh
//! connection, issues the request, and buffers the response into a
//! [`Response`]. There is no pooling, retrying, or redirect handling;
//! callers that need more than a single buffered exchange sit above this
//! crate.
//!
//! ```ignore
//! use tether_client::Request;
//!
//! let status = Request::new()
//!     .tcp("http://127.0.0.1:9700")?
//!     .get("/status")
//!     .send()
//!     .await?;
//! println!("{}", status.text());
//!
//! let created = Request::new()
//!     .unix_socket("/run/tether.sock")
//!     .post("/profiles")
//!     .json(&profile)
//!     .send()
//!     .await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
mod request;
mod response;
mod transport;

pub use error::{Error, Result};
pub use request::Request;
pub use response::Response;
