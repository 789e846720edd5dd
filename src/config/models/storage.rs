//! Shared counter store configuration

use super::*;
use serde::{Deserialize, Serialize};

/// Redis configuration
///
/// Routers pointing at the same Redis with the same `router_id` share usage
/// limits, cooldowns and budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Enable Redis (if false, use the in-memory store)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            enabled: true,
            connection_timeout: default_connection_timeout(),
        }
    }
}
