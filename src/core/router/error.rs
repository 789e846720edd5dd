//! Router error types
//!
//! This module defines the error taxonomy used for retry/cooldown/fallback
//! decisions and the errors the router surfaces to callers.

use super::deployment::DeploymentId;
use super::keys::WindowKind;
use super::model_group::Capability;
use crate::core::providers::ProviderError;
use crate::utils::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Failure classification
///
/// Every adapter failure maps to exactly one kind. Retry counts and
/// allowed-fails thresholds are configured per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    Authentication,
    Timeout,
    RateLimit,
    ContentPolicyViolation,
    InternalServerError,
    Other,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::BadRequest,
        ErrorKind::Authentication,
        ErrorKind::Timeout,
        ErrorKind::RateLimit,
        ErrorKind::ContentPolicyViolation,
        ErrorKind::InternalServerError,
        ErrorKind::Other,
    ];

    /// Map an HTTP status code to a kind
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 404 | 413 | 422 => ErrorKind::BadRequest,
            401 | 403 => ErrorKind::Authentication,
            408 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimit,
            500..=599 => ErrorKind::InternalServerError,
            _ => ErrorKind::Other,
        }
    }

    /// Kinds that may succeed when simply tried again
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::RateLimit
                | ErrorKind::InternalServerError
                | ErrorKind::Other
        )
    }

    /// Stable identifier used in counter keys and logs
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ContentPolicyViolation => "content_policy_violation",
            ErrorKind::InternalServerError => "internal_server_error",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a deployment was left out of a candidate set
#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    /// Deployment is serving a cooldown
    CoolingDown { remaining: Duration },
    /// A usage window would overflow its limit
    RateLimited {
        window: WindowKind,
        limit: u64,
        current: u64,
        retry_after: Duration,
    },
    /// `max_parallel_requests` calls already in flight
    ParallelLimit { max: u32 },
    /// Deployment spend reached `max_budget` in the current window
    BudgetExceeded { spent: f64, max_budget: f64 },
    /// Provider spend reached its configured budget
    ProviderBudgetExceeded {
        provider: String,
        spent: f64,
        max_budget: f64,
    },
    /// Request tags did not match
    TagMismatch,
    /// Deployment belongs to another team
    TeamMismatch,
    /// Deployment lacks a capability the request needs
    MissingCapability(Capability),
}

impl ExclusionReason {
    /// How long until this exclusion lifts on its own, if it is time-bound
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ExclusionReason::CoolingDown { remaining } => Some(*remaining),
            ExclusionReason::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::CoolingDown { remaining } => {
                write!(f, "cooling down for {:.1}s", remaining.as_secs_f64())
            }
            ExclusionReason::RateLimited {
                window,
                limit,
                current,
                retry_after,
            } => write!(
                f,
                "{} limit {} reached (current {}), resets in {:.1}s",
                window,
                limit,
                current,
                retry_after.as_secs_f64()
            ),
            ExclusionReason::ParallelLimit { max } => {
                write!(f, "{} parallel requests in flight", max)
            }
            ExclusionReason::BudgetExceeded { spent, max_budget } => {
                write!(f, "budget exceeded ({:.4}/{:.4})", spent, max_budget)
            }
            ExclusionReason::ProviderBudgetExceeded {
                provider,
                spent,
                max_budget,
            } => write!(
                f,
                "provider {} budget exceeded ({:.4}/{:.4})",
                provider, spent, max_budget
            ),
            ExclusionReason::TagMismatch => f.write_str("tags do not match"),
            ExclusionReason::TeamMismatch => f.write_str("not available to this team"),
            ExclusionReason::MissingCapability(capability) => {
                write!(f, "missing capability {}", capability)
            }
        }
    }
}

/// An excluded deployment and the reason it was excluded
#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub deployment_id: DeploymentId,
    pub reason: ExclusionReason,
}

/// One dispatched attempt in a request's retry/fallback chain
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub model_group: String,
    pub deployment_id: DeploymentId,
    pub error_kind: ErrorKind,
}

/// Router error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouterError {
    /// Model group is not configured
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Deployment id is absent from the registry
    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    /// A deployment with this id is already registered
    #[error("Duplicate deployment id: {0}")]
    DuplicateDeploymentId(String),

    /// Every deployment of the group was excluded
    #[error("{}", format_no_deployments(.model, .excluded, .retry_after))]
    NoDeploymentsAvailable {
        model: String,
        excluded: Vec<Exclusion>,
        /// Earliest moment a time-bound exclusion lifts
        retry_after: Option<Duration>,
    },

    /// Retries and fallbacks are exhausted
    #[error("{}", format_exhausted(.model, .attempts, .last_error))]
    Exhausted {
        model: String,
        #[source]
        last_error: ProviderError,
        attempts: Vec<AttemptRecord>,
    },

    /// Invalid router configuration
    #[error("Invalid router configuration: {0}")]
    Config(String),

    /// Shared counter store failure
    #[error("Counter store error: {0}")]
    Store(String),
}

impl From<GatewayError> for RouterError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Config(msg) | GatewayError::Validation(msg) => RouterError::Config(msg),
            other => RouterError::Store(other.to_string()),
        }
    }
}

fn format_no_deployments(
    model: &str,
    excluded: &[Exclusion],
    retry_after: &Option<Duration>,
) -> String {
    let mut message = format!("No deployments available for selected model {}", model);
    if let Some(wait) = retry_after {
        message.push_str(&format!(", try again in {:.1} seconds", wait.as_secs_f64()));
    }
    if !excluded.is_empty() {
        let reasons: Vec<String> = excluded
            .iter()
            .map(|e| format!("{}: {}", e.deployment_id, e.reason))
            .collect();
        message.push_str(&format!(". Excluded: [{}]", reasons.join("; ")));
    }
    message
}

fn format_exhausted(model: &str, attempts: &[AttemptRecord], last_error: &ProviderError) -> String {
    let chain: Vec<String> = attempts
        .iter()
        .map(|a| format!("{}/{}", a.model_group, a.deployment_id))
        .collect();
    format!(
        "All attempts failed for model {} after {} attempts [{}]: {}",
        model,
        attempts.len(),
        chain.join(" -> "),
        last_error
    )
}
