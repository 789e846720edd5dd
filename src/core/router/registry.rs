//! Deployment registry
//!
//! Readers load an immutable [`Snapshot`] through `ArcSwap` and never block.
//! Writers serialize on a mutex, build the next snapshot from the current
//! one and publish it in a single store, so a reader sees either the old or
//! the new deployment set, never a half-applied change.

use super::deployment::{Deployment, DeploymentId, DeploymentPatch};
use super::error::RouterError;
use super::model_group::ModelGroupInfo;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Point-in-time view of all registered deployments
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    by_id: HashMap<DeploymentId, Arc<Deployment>>,
    /// Group name -> deployments in registration order
    by_group: HashMap<String, Vec<Arc<Deployment>>>,
    /// Group names in first-registration order
    groups: Vec<String>,
}

impl Snapshot {
    fn from_deployments(deployments: Vec<Deployment>) -> Result<Self, RouterError> {
        let mut snapshot = Snapshot::default();
        for deployment in deployments {
            snapshot.insert(Arc::new(deployment))?;
        }
        Ok(snapshot)
    }

    fn insert(&mut self, deployment: Arc<Deployment>) -> Result<(), RouterError> {
        let id = deployment.id().to_string();
        if self.by_id.contains_key(&id) {
            return Err(RouterError::DuplicateDeploymentId(id));
        }
        let group = deployment.model_name.clone();
        if !self.by_group.contains_key(&group) {
            self.groups.push(group.clone());
        }
        self.by_group
            .entry(group)
            .or_default()
            .push(deployment.clone());
        self.by_id.insert(id, deployment);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Option<Arc<Deployment>> {
        let removed = self.by_id.remove(id)?;
        let group = &removed.model_name;
        let now_empty = match self.by_group.get_mut(group) {
            Some(members) => {
                members.retain(|d| d.id() != id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_group.remove(group);
            self.groups.retain(|g| g != group);
        }
        Some(removed)
    }

    /// Replace a deployment in place, keeping its position within its group
    fn replace(&mut self, updated: Arc<Deployment>) {
        let id = updated.id().to_string();
        let same_group = self
            .by_id
            .get(&id)
            .is_some_and(|old| old.model_name == updated.model_name);

        if same_group {
            if let Some(members) = self.by_group.get_mut(&updated.model_name) {
                for slot in members.iter_mut() {
                    if slot.id() == id {
                        *slot = updated.clone();
                    }
                }
            }
            self.by_id.insert(id, updated);
        } else {
            self.remove(&id);
            // Cannot collide: the id was just removed
            let _ = self.insert(updated);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Deployment>> {
        self.by_id.get(id)
    }

    pub fn group(&self, model_group: &str) -> &[Arc<Deployment>] {
        self.by_group
            .get(model_group)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Registry of deployments keyed by id and grouped by model name
#[derive(Debug)]
pub struct DeploymentRegistry {
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
}

impl Default for DeploymentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            write_lock: Mutex::new(()),
        }
    }

    /// Build a registry from a model list, rejecting duplicate ids
    pub fn from_deployments(deployments: Vec<Deployment>) -> Result<Self, RouterError> {
        let snapshot = Snapshot::from_deployments(deployments)?;
        Ok(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            write_lock: Mutex::new(()),
        })
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Register a deployment
    pub fn add(&self, deployment: Deployment) -> Result<Arc<Deployment>, RouterError> {
        let _guard = self.write_lock.lock();
        let mut next = Snapshot::clone(&self.snapshot.load());
        let deployment = Arc::new(deployment);
        next.insert(deployment.clone())?;
        self.snapshot.store(Arc::new(next));

        info!(
            "Added deployment {} to model group {}",
            deployment.id(),
            deployment.model_name
        );
        Ok(deployment)
    }

    /// Apply a structural patch to a registered deployment
    pub fn update(&self, id: &str, patch: DeploymentPatch) -> Result<Arc<Deployment>, RouterError> {
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load();
        let existing = current
            .get(id)
            .ok_or_else(|| RouterError::DeploymentNotFound(id.to_string()))?;

        let mut updated = Deployment::clone(existing);
        updated.apply_patch(patch);
        let updated = Arc::new(updated);

        let mut next = Snapshot::clone(&current);
        next.replace(updated.clone());
        self.snapshot.store(Arc::new(next));

        debug!("Updated deployment {}", id);
        Ok(updated)
    }

    /// Unregister a deployment
    pub fn remove(&self, id: &str) -> Result<Arc<Deployment>, RouterError> {
        let _guard = self.write_lock.lock();
        let mut next = Snapshot::clone(&self.snapshot.load());
        let removed = next
            .remove(id)
            .ok_or_else(|| RouterError::DeploymentNotFound(id.to_string()))?;
        self.snapshot.store(Arc::new(next));

        info!(
            "Removed deployment {} from model group {}",
            id, removed.model_name
        );
        Ok(removed)
    }

    /// Replace the whole model list atomically
    ///
    /// Returns the ids that were registered before but are absent now.
    pub fn set_model_list(&self, deployments: Vec<Deployment>) -> Result<Vec<DeploymentId>, RouterError> {
        let next = Snapshot::from_deployments(deployments)?;
        let _guard = self.write_lock.lock();
        let kept: HashSet<&DeploymentId> = next.by_id.keys().collect();
        let dropped = self
            .snapshot
            .load()
            .by_id
            .keys()
            .filter(|id| !kept.contains(id))
            .cloned()
            .collect();
        self.snapshot.store(Arc::new(next));
        Ok(dropped)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Deployment>> {
        self.snapshot.load().get(id).cloned()
    }

    /// Deployments serving `model_group`, in registration order
    pub fn deployments_for_group(&self, model_group: &str) -> Vec<Arc<Deployment>> {
        self.snapshot.load().group(model_group).to_vec()
    }

    /// Deployments a team reaches through its public model name
    pub fn deployments_for_team_model(&self, team_id: &str, public_name: &str) -> Vec<Arc<Deployment>> {
        let snapshot = self.snapshot.load();
        snapshot
            .groups()
            .iter()
            .flat_map(|group| snapshot.group(group))
            .filter(|d| {
                d.model_info.team_id.as_deref() == Some(team_id)
                    && d.model_info.team_public_model_name.as_deref() == Some(public_name)
            })
            .cloned()
            .collect()
    }

    /// Model group names in registration order
    pub fn list_groups(&self) -> Vec<String> {
        self.snapshot.load().groups().to_vec()
    }

    /// All deployments, grouped in registration order
    pub fn list_deployments(&self) -> Vec<Arc<Deployment>> {
        let snapshot = self.snapshot.load();
        snapshot
            .groups()
            .iter()
            .flat_map(|group| snapshot.group(group).iter().cloned())
            .collect()
    }

    pub fn contains_group(&self, model_group: &str) -> bool {
        !self.snapshot.load().group(model_group).is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Aggregate info for a model group, `None` if it has no deployments
    pub fn group_info(&self, model_group: &str) -> Option<ModelGroupInfo> {
        let snapshot = self.snapshot.load();
        let members = snapshot.group(model_group);
        if members.is_empty() {
            return None;
        }
        Some(ModelGroupInfo::from_deployments(
            model_group,
            members.iter().map(|d| d.as_ref()),
        ))
    }
}
