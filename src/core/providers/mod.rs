//! Provider adapter seam
//!
//! The router does not speak any vendor wire format. A host plugs in a
//! [`ProviderAdapter`] that turns its own request type into a call against
//! one concrete [`Deployment`] and reports either a response with token
//! usage or a classified [`ProviderError`].

pub mod unified_provider;

pub use unified_provider::ProviderError;

use crate::core::router::deployment::Deployment;
use async_trait::async_trait;
use std::collections::HashSet;

/// Token usage reported by a completed call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Successful adapter result
#[derive(Debug, Clone)]
pub struct ProviderResponse<T> {
    pub body: T,
    pub usage: TokenUsage,
}

impl<T> ProviderResponse<T> {
    pub fn new(body: T, usage: TokenUsage) -> Self {
        Self { body, usage }
    }
}

/// Executes requests against concrete deployments
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Caller-side request type
    type Request: Send + Sync;
    /// Caller-side response type
    type Response: Send;

    /// Perform one call against `deployment`
    async fn execute(
        &self,
        deployment: &Deployment,
        request: &Self::Request,
    ) -> Result<ProviderResponse<Self::Response>, ProviderError>;

    /// Params the adapter understands for `model`, used by config validation
    fn supported_params(&self, model: &str) -> HashSet<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total(), 150);
        assert_eq!(TokenUsage::default().total(), 0);
    }
}
