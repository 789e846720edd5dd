//! Parsing of LiteLLM-style duration strings (`"30s"`, `"10m"`, `"24h"`, `"7d"`, `"1mo"`)

use crate::utils::error::{GatewayError, Result};
use std::time::Duration;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;
/// Months are fixed 30-day periods
const SECS_PER_MONTH: u64 = 30 * SECS_PER_DAY;

/// Parse a duration such as `"30s"`, `"10m"`, `"24h"`, `"7d"` or `"1mo"`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| GatewayError::validation(format!("Duration '{}' has no unit", input)))?;
    let (digits, unit) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| GatewayError::validation(format!("Invalid duration '{}'", input)))?;

    let unit_secs = match unit {
        "s" => 1,
        "m" => SECS_PER_MINUTE,
        "h" => SECS_PER_HOUR,
        "d" => SECS_PER_DAY,
        "mo" => SECS_PER_MONTH,
        other => {
            return Err(GatewayError::validation(format!(
                "Unknown duration unit '{}' in '{}'",
                other, input
            )));
        }
    };

    if value == 0 {
        return Err(GatewayError::validation(format!(
            "Duration '{}' must be positive",
            input
        )));
    }

    Ok(Duration::from_secs(value.saturating_mul(unit_secs)))
}
