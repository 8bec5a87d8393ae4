//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request (method, path)
//!     → router.rs resolve: Route | NotFound | MethodNotAllowed
//!     → security gate produces a Verdict
//!     → router.rs gate: allow | LoginRedirect | Unauthorized
//! ```

pub mod router;

pub use router::{Access, Route, Router};
