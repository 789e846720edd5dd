//! Storage configuration validators
//!
//! This module provides validation implementations for the shared counter
//! store configuration.

use super::trait_def::Validate;
use crate::config::models::*;
use tracing::debug;
use url::Url;

impl Validate for RedisConfig {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating redis configuration");

        if !self.enabled {
            return Ok(());
        }

        if self.url.is_empty() {
            return Err("Redis URL cannot be empty".to_string());
        }

        let url = Url::parse(&self.url).map_err(|e| format!("Invalid Redis URL: {}", e))?;
        if !matches!(url.scheme(), "redis" | "rediss" | "unix" | "redis+unix") {
            return Err(format!(
                "Redis URL must use redis://, rediss:// or unix://, got: {}",
                url.scheme()
            ));
        }

        if self.connection_timeout == 0 {
            return Err("Redis connection timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
