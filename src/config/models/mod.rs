//! Configuration data models
//!
//! Router-facing settings (deployments, policy) live in `core::router`;
//! this module holds the infrastructure settings around them.

pub mod logging;
pub mod storage;

pub use logging::*;
pub use storage::*;

/// Default log level filter
pub fn default_log_level() -> String {
    "info".to_string()
}

/// Default Redis URL
pub fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

/// Default connection timeout in seconds
pub fn default_connection_timeout() -> u64 {
    5
}

pub fn default_true() -> bool {
    true
}
