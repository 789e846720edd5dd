//! Typed counter keys
//!
//! Every key the router writes to the shared counter store is produced here.
//! Callers pass structured arguments and get back an opaque [`CounterKey`],
//! so two components can never drift apart on a key format.
//!
//! Layout: `{scope}:{router_id}:{subject}:{kind}:{bucket}`

use super::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const USAGE_SCOPE: &str = "global_router";
const FAILURE_SCOPE: &str = "failures";
const COOLDOWN_SCOPE: &str = "cooldown";
const BUDGET_SCOPE: &str = "budget";

const MINUTE_SECS: u64 = 60;
const DAY_SECS: u64 = 86_400;

/// Usage window kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Tokens per minute
    Tpm,
    /// Requests per minute
    Rpm,
    /// Tokens per day
    Tpd,
    /// Requests per day
    Rpd,
}

impl WindowKind {
    pub const ALL: [WindowKind; 4] = [
        WindowKind::Tpm,
        WindowKind::Rpm,
        WindowKind::Tpd,
        WindowKind::Rpd,
    ];

    /// Window length
    pub fn duration(self) -> Duration {
        match self {
            WindowKind::Tpm | WindowKind::Rpm => Duration::from_secs(MINUTE_SECS),
            WindowKind::Tpd | WindowKind::Rpd => Duration::from_secs(DAY_SECS),
        }
    }

    /// Whether this window counts tokens (as opposed to requests)
    pub fn counts_tokens(self) -> bool {
        matches!(self, WindowKind::Tpm | WindowKind::Tpd)
    }

    /// Bucket id for `now_secs`: epoch minute or epoch day
    pub fn bucket(self, now_secs: u64) -> u64 {
        now_secs / self.duration().as_secs()
    }

    /// Time until the bucket containing `now_millis` rolls over
    pub fn remaining_in_bucket(self, now_millis: u64) -> Duration {
        let len_ms = self.duration().as_millis() as u64;
        Duration::from_millis(len_ms - now_millis % len_ms)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WindowKind::Tpm => "tpm",
            WindowKind::Rpm => "rpm",
            WindowKind::Tpd => "tpd",
            WindowKind::Rpd => "rpd",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque counter store key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey(String);

impl CounterKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Usage counter for one deployment window bucket
pub fn usage_key(router_id: &str, deployment_id: &str, window: WindowKind, bucket: u64) -> CounterKey {
    CounterKey(format!(
        "{}:{}:{}:{}:{}",
        USAGE_SCOPE, router_id, deployment_id, window, bucket
    ))
}

/// Failure counter for one error kind in one minute bucket
pub fn failure_key(router_id: &str, deployment_id: &str, kind: ErrorKind, bucket: u64) -> CounterKey {
    CounterKey(format!(
        "{}:{}:{}:{}:{}",
        FAILURE_SCOPE, router_id, deployment_id, kind, bucket
    ))
}

/// Active cooldown marker; the stored value is the expiry in epoch millis
pub fn cooldown_key(router_id: &str, deployment_id: &str) -> CounterKey {
    CounterKey(format!("{}:{}:{}:until", COOLDOWN_SCOPE, router_id, deployment_id))
}

/// Accumulated spend for a budget subject (`deployment:<id>` or `provider:<name>`)
pub fn budget_spend_key(router_id: &str, subject: &str) -> CounterKey {
    CounterKey(format!("{}:{}:{}:spend", BUDGET_SCOPE, router_id, subject))
}

/// Window start timestamp for a budget subject
pub fn budget_start_key(router_id: &str, subject: &str) -> CounterKey {
    CounterKey(format!("{}:{}:{}:start_time", BUDGET_SCOPE, router_id, subject))
}

/// Prefix of every usage counter belonging to one deployment
pub fn usage_prefix(router_id: &str, deployment_id: &str) -> String {
    format!("{}:{}:{}:", USAGE_SCOPE, router_id, deployment_id)
}

/// Prefixes of every failure counter and cooldown marker belonging to one deployment
pub fn cooldown_prefixes(router_id: &str, deployment_id: &str) -> [String; 2] {
    [
        format!("{}:{}:{}:", FAILURE_SCOPE, router_id, deployment_id),
        format!("{}:{}:{}:", COOLDOWN_SCOPE, router_id, deployment_id),
    ]
}

/// Prefix of the spend and start keys of one budget subject
pub fn budget_prefix(router_id: &str, subject: &str) -> String {
    format!("{}:{}:{}:", BUDGET_SCOPE, router_id, subject)
}
