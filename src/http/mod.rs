//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, trace span)
//!     → [routing core picks backend]
//!     → forward.rs (rewrite URI, strip hop-by-hop, send upstream)
//!     → Send upstream response to client
//! ```

pub mod forward;
pub mod request;
pub mod server;

pub use forward::HttpForwarder;
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
