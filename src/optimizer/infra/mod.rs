//! Infrastructure: structured logging and the HTTP surface.

pub mod http;
pub mod logging;

pub use http::{router, serve, ApiError, DEFAULT_CONTEXT};
pub use logging::{init_logging, LogConfig, LogFormat};
