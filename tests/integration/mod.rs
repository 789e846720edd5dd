//! Integration tests for litellm-router
//!
//! These tests drive the public API and check real system behavior with an
//! in-process adapter standing in for providers.

pub mod concurrency_tests;
pub mod config_tests;
pub mod router_tests;
