//! # LiteLLM Router
//!
//! Model-group routing core: pick one deployment of a model group per
//! request, admit it against shared usage limits and spend budgets, and
//! drive retries, fallbacks and cooldowns when calls fail.
//!
//! ## Features
//!
//! - **Routing strategies**: simple shuffle, least busy, latency, usage and cost based
//! - **Admission control**: tpm/rpm/tpd/rpd windows, parallel request caps
//! - **Cooldowns**: per-error-kind failure thresholds
//! - **Budgets**: per-deployment and per-provider spend windows
//! - **Failover**: per-kind retry policies, general, context-window and content-policy fallbacks
//! - **Shared state**: in-memory or Redis counter store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use litellm_router::{Config, RequestContext, Router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config/router.yaml").await?;
//!     litellm_router::utils::logging::init_logging(&config.logging)?;
//!
//!     let router = Router::from_config(&config).await?;
//!     let selection = router
//!         .select_deployment("gpt-4", &RequestContext::new().with_estimated_tokens(500))
//!         .await?;
//!     println!("Routing to {}", selection.deployment.id());
//!     router.release_deployment(selection.deployment.id());
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod utils;

// Re-export main types
pub use config::Config;
pub use utils::error::{GatewayError, Result};

pub use core::providers::{ProviderAdapter, ProviderError, ProviderResponse, TokenUsage};
pub use core::router::{
    Deployment, ErrorKind, ExecutionResult, FallbackMap, FallbackType, LitellmParams, ModelGroupInfo,
    ModelInfo, RequestContext, Router, RouterConfig, RouterError, RoutingStrategy, Selection,
};

// Version information
/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
