//! Utility modules shared by the router and its configuration layer
//!
//! - **error**: infrastructure error type
//! - **logging**: tracing subscriber setup
//! - **time**: injectable wall clock
//! - **duration**: LiteLLM duration strings

pub mod duration;
pub mod error;
pub mod logging;
pub mod time;

pub use duration::parse_duration;
pub use error::{GatewayError, Result};
pub use time::{Clock, ManualClock, SystemClock};
