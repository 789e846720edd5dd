//! Router tests module
//!
//! Unit tests for selection, admission, cooldown, budgets and the
//! retry/fallback executor. Shared fixtures live in `router_tests`.

mod selection_tests;
mod store_error_tests;
