//! Test fixtures and data factories
//!
//! Provides factory methods for creating test data with sensible defaults.

use async_trait::async_trait;
use litellm_router::{Deployment, ProviderAdapter, ProviderError, ProviderResponse, TokenUsage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Factory for creating test deployments
pub struct DeploymentFactory;

impl DeploymentFactory {
    /// Create an unlimited OpenAI deployment
    pub fn create(id: &str, model_group: &str) -> Deployment {
        Deployment::new(model_group, format!("openai/{}", model_group)).with_id(id)
    }

    /// Create a deployment with a requests-per-minute limit
    pub fn with_rpm(id: &str, model_group: &str, rpm: u64) -> Deployment {
        let mut deployment = Self::create(id, model_group);
        deployment.litellm_params.rpm = Some(rpm);
        deployment
    }

    /// Create a deployment capped at `max` concurrent calls
    pub fn with_max_parallel(id: &str, model_group: &str, max: u32) -> Deployment {
        let mut deployment = Self::create(id, model_group);
        deployment.litellm_params.max_parallel_requests = Some(max);
        deployment
    }
}

/// Chat-style request carried through the router untouched
#[derive(Debug, Clone, Default)]
pub struct TestRequest {
    pub prompt: String,
}

impl TestRequest {
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
        }
    }
}

/// Adapter that fails listed deployments and echoes the rest
///
/// Tracks calls per deployment and the peak number of concurrent calls.
#[derive(Debug, Default)]
pub struct TestAdapter {
    failures: HashMap<String, ProviderError>,
    latency: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl TestAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `deployment_id` fail with `error`
    pub fn failing(mut self, deployment_id: &str, error: ProviderError) -> Self {
        self.failures.insert(deployment_id.to_string(), error);
        self
    }

    /// Delay every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, deployment_id: &str) -> usize {
        self.calls.lock().iter().filter(|id| *id == deployment_id).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for TestAdapter {
    type Request = TestRequest;
    type Response = String;

    async fn execute(
        &self,
        deployment: &Deployment,
        request: &TestRequest,
    ) -> Result<ProviderResponse<String>, ProviderError> {
        self.calls.lock().push(deployment.id().to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.failures.get(deployment.id()) {
            return Err(error.clone());
        }
        let prompt_tokens = request.prompt.split_whitespace().count() as u64;
        Ok(ProviderResponse::new(
            format!("{}: {}", deployment.id(), request.prompt),
            TokenUsage::new(prompt_tokens, 5),
        ))
    }

    fn supported_params(&self, model: &str) -> HashSet<String> {
        let mut params: HashSet<String> = ["temperature", "max_tokens", "stream"]
            .into_iter()
            .map(String::from)
            .collect();
        if model.starts_with("openai/") {
            params.insert("seed".to_string());
        }
        params
    }
}
