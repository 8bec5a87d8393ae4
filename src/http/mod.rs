//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Dequeued connection
//!     → parser.rs (read head and body under the read timeout)
//!     → request.rs (method, target, ordered headers, body)
//!     → server.rs (rate limit → route → authorize → gate → CSRF)
//!     → handlers.rs (relay controller, stats, pages.rs)
//!     → response.rs (serialize, Connection: close)
//!     → Send to client, close socket
//! ```

pub mod handlers;
pub mod pages;
pub mod parser;
pub mod request;
pub mod response;
pub mod server;

pub use request::{Method, Request};
pub use response::Response;
pub use server::HttpServer;
