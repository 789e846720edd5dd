//! Common test utilities for litellm-router
//!
//! This module provides shared test infrastructure for all tests:
//! - Deployment factories with sensible defaults
//! - A provider adapter with per-deployment failures
//! - Custom assertions and helpers

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use fixtures::{DeploymentFactory, TestAdapter, TestRequest};
