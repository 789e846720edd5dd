//! Retry/fallback state machine
//!
//! [`next_step`] is the single transition table for what happens after a
//! failed attempt. [`AttemptState`] carries what the table needs: the group
//! currently being served, retries spent per error kind in that group, and
//! the groups already visited. The executor only dispatches and applies the
//! returned [`Step`].

use super::config::RouterConfig;
use super::error::ErrorKind;
use super::fallback::FallbackType;
use crate::core::providers::ProviderError;
use std::collections::HashMap;

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Dispatch again within the current group, spending one retry of this kind
    Retry(ErrorKind),
    /// Move to another model group with a fresh retry budget
    Fallback {
        model_group: String,
        fallback_type: FallbackType,
    },
    /// Surface the error
    Fail,
}

/// Progress of one logical request through its retry/fallback chain
#[derive(Debug, Clone)]
pub struct AttemptState {
    original_group: String,
    current_group: String,
    retries_used: HashMap<ErrorKind, u32>,
    visited: Vec<String>,
    fallback_hops: u32,
    attempts: u32,
    max_attempts: u32,
}

impl AttemptState {
    pub fn new(model_group: &str, config: &RouterConfig) -> Self {
        Self {
            original_group: model_group.to_string(),
            current_group: model_group.to_string(),
            retries_used: HashMap::new(),
            visited: vec![model_group.to_string()],
            fallback_hops: 0,
            attempts: 0,
            max_attempts: attempt_ceiling(model_group, config),
        }
    }

    pub fn original_group(&self) -> &str {
        &self.original_group
    }

    pub fn current_group(&self) -> &str {
        &self.current_group
    }

    /// Attempts dispatched so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Upper bound on dispatched attempts for the whole chain
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn used_fallback(&self) -> bool {
        self.fallback_hops > 0
    }

    pub fn retries_used(&self, kind: ErrorKind) -> u32 {
        self.retries_used.get(&kind).copied().unwrap_or(0)
    }

    /// Count a dispatched attempt
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Whether another dispatch would break the attempt ceiling
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Move the state along a step returned by [`next_step`]
    pub fn apply(&mut self, step: &Step) {
        match step {
            Step::Retry(kind) => {
                *self.retries_used.entry(*kind).or_insert(0) += 1;
            }
            Step::Fallback { model_group, .. } => {
                self.current_group = model_group.clone();
                self.visited.push(model_group.clone());
                self.retries_used.clear();
                self.fallback_hops += 1;
            }
            Step::Fail => {}
        }
    }

    /// First unvisited fallback of `fallback_type`, honoring `max_fallbacks`
    pub fn next_fallback(&self, config: &RouterConfig, fallback_type: FallbackType) -> Option<String> {
        if self.fallback_hops >= config.max_fallbacks {
            return None;
        }
        config
            .fallbacks_for(&self.original_group, fallback_type)
            .iter()
            .find(|group| !self.visited.contains(group))
            .cloned()
    }

    fn fallback(&self, config: &RouterConfig, fallback_type: FallbackType) -> Option<Step> {
        self.next_fallback(config, fallback_type)
            .map(|model_group| Step::Fallback {
                model_group,
                fallback_type,
            })
    }
}

/// Kind a failure is counted as for retries and cooldown
///
/// Malformed responses count as server errors whatever their variant says.
pub fn failure_kind(error: &ProviderError) -> ErrorKind {
    if error.is_malformed_response() {
        ErrorKind::InternalServerError
    } else {
        error.kind()
    }
}

/// Transition table for a failed attempt
///
/// | Failure | Step |
/// |------|------|
/// | context window exceeded | next context-window fallback, else as below |
/// | content policy violation | next content-policy fallback, else as below |
/// | malformed response | general fallback (never retried) |
/// | retries of this kind left in the group | retry |
/// | otherwise | next general fallback, else fail |
///
/// Nothing but `Fail` is returned once the attempt ceiling is reached.
pub fn next_step(state: &AttemptState, error: &ProviderError, config: &RouterConfig) -> Step {
    if state.is_exhausted() {
        return Step::Fail;
    }

    if error.is_context_window_exceeded() {
        if let Some(step) = state.fallback(config, FallbackType::ContextWindow) {
            return step;
        }
    }

    let kind = failure_kind(error);
    if kind == ErrorKind::ContentPolicyViolation {
        if let Some(step) = state.fallback(config, FallbackType::ContentPolicy) {
            return step;
        }
    }

    if !error.is_malformed_response()
        && state.retries_used(kind) < config.retries_for(&state.current_group, kind)
    {
        return Step::Retry(kind);
    }

    state
        .fallback(config, FallbackType::General)
        .unwrap_or(Step::Fail)
}

/// Σ (retries of every kind + 1) over the original group and every fallback it can reach
fn attempt_ceiling(model_group: &str, config: &RouterConfig) -> u32 {
    let mut chain = vec![model_group.to_string()];
    for fallback_type in [
        FallbackType::ContextWindow,
        FallbackType::ContentPolicy,
        FallbackType::General,
    ] {
        for group in config.fallbacks_for(model_group, fallback_type) {
            if !chain.contains(group) {
                chain.push(group.clone());
            }
        }
    }
    chain
        .iter()
        .map(|group| config.total_retries_for(group).saturating_add(1))
        .fold(0u32, u32::saturating_add)
}
