//! Core functionality for the router
//!
//! This module contains the provider contract and the routing engine.

pub mod providers;
pub mod router;
