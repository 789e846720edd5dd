//! Per-request routing context

use super::model_group::Capability;
use std::time::Duration;
use tokio::time::Instant;

/// Tag matched by deployments that serve requests no other tag claims
pub const DEFAULT_TAG: &str = "default";

/// Caller-supplied routing inputs for one logical request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Token estimate counted against tpm/tpd at admission
    pub estimated_tokens: u64,
    /// Overall deadline across every attempt
    pub deadline: Option<Instant>,
    /// Request tags for tag routing
    pub tags: Vec<String>,
    /// Team making the request
    pub team_id: Option<String>,
    /// Capabilities every chosen deployment must have
    pub required_capabilities: Vec<Capability>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token estimate (builder pattern)
    pub fn with_estimated_tokens(mut self, tokens: u64) -> Self {
        self.estimated_tokens = tokens;
        self
    }

    /// Set an absolute deadline (builder pattern)
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now (builder pattern)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Add a routing tag (builder pattern)
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the calling team (builder pattern)
    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Require a capability (builder pattern)
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.required_capabilities.push(capability);
        self
    }

    /// Time left before the deadline, `None` without a deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
