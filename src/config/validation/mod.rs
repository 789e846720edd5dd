//! Configuration validation
//!
//! This module provides validation logic for all configuration structures.
//!
//! The validation is organized into several submodules:
//! - `trait_def`: Core Validate trait definition
//! - `router_validators`: Router settings and deployment validators
//! - `storage_validators`: Counter store validators
//! - `logging_validators`: Logging validators
//! - `tests`: Test suite for all validators

mod logging_validators;
mod router_validators;
mod storage_validators;
mod tests;
mod trait_def;

pub use trait_def::Validate;
