//! Fallback configuration and execution result types
//!
//! This module defines fallback mappings for error handling
//! and execution result metadata.

use super::deployment::DeploymentId;
use super::error::AttemptRecord;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Group name that supplies fallbacks for any group without its own entry
pub const WILDCARD_GROUP: &str = "*";

/// Fallback type enumeration
///
/// Each type corresponds to a specific error condition and has its own
/// fallback mapping.
///
/// ## Fallback Priority
///
/// 1. Context-window errors use context-window fallbacks
/// 2. Content-policy violations use content-policy fallbacks
/// 3. Everything else, once retries are exhausted, uses general fallbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackType {
    /// General fallback once retries are exhausted
    General,
    /// Context window exceeded - model cannot handle the input size
    ContextWindow,
    /// Content policy violation - content was filtered/rejected
    ContentPolicy,
}

/// Model group -> ordered fallback groups
///
/// Deserializes from the LiteLLM list-of-maps form
/// (`[{"gpt-4": ["gpt-3.5-turbo"]}]`) or a plain map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackMap {
    entries: HashMap<String, Vec<String>>,
}

impl FallbackMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add fallback groups for a model group (builder pattern)
    pub fn with(mut self, model_group: &str, fallbacks: Vec<String>) -> Self {
        self.insert(model_group, fallbacks);
        self
    }

    pub fn insert(&mut self, model_group: &str, fallbacks: Vec<String>) {
        self.entries.insert(model_group.to_string(), fallbacks);
    }

    /// Fallbacks for `model_group`, else the wildcard entry, else none
    pub fn for_group(&self, model_group: &str) -> &[String] {
        self.entries
            .get(model_group)
            .or_else(|| self.entries.get(WILDCARD_GROUP))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FallbackRepr {
    List(Vec<HashMap<String, Vec<String>>>),
    Map(HashMap<String, Vec<String>>),
}

impl<'de> Deserialize<'de> for FallbackMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = match Option::<FallbackRepr>::deserialize(deserializer)? {
            None => HashMap::new(),
            Some(FallbackRepr::Map(map)) => map,
            Some(FallbackRepr::List(list)) => list.into_iter().flatten().collect(),
        };
        Ok(Self { entries })
    }
}

impl Serialize for FallbackMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut groups: Vec<_> = self.entries.iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        let list: Vec<HashMap<&String, &Vec<String>>> = groups
            .into_iter()
            .map(|(group, fallbacks)| HashMap::from([(group, fallbacks)]))
            .collect();
        list.serialize(serializer)
    }
}

/// Execution result with metadata
///
/// # Type Parameters
///
/// * `T` - The type of the result value
#[derive(Debug, Clone)]
pub struct ExecutionResult<T> {
    /// The successful result value
    pub result: T,
    /// The deployment ID that successfully handled the request
    pub deployment_id: DeploymentId,
    /// Total number of dispatched attempts across all retries and fallbacks
    pub attempts: u32,
    /// The model group that served the request (may differ from the requested one)
    pub model_used: String,
    /// Whether a fallback model group was used
    pub used_fallback: bool,
    /// Total execution latency in microseconds (including retries)
    pub latency_us: u64,
    /// Failed attempts that preceded the successful one
    pub failed_attempts: Vec<AttemptRecord>,
}
