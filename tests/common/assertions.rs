//! Custom assertions for router errors

use litellm_router::RouterError;
use litellm_router::core::router::ExclusionReason;

/// Assert that `err` is `NoDeploymentsAvailable` and return its exclusion reasons
pub fn assert_no_deployments(err: RouterError) -> Vec<ExclusionReason> {
    match err {
        RouterError::NoDeploymentsAvailable { excluded, .. } => {
            excluded.into_iter().map(|e| e.reason).collect()
        }
        other => panic!("expected NoDeploymentsAvailable, got: {}", other),
    }
}

/// Assert that `err` is `Exhausted` and return the number of failed attempts
pub fn assert_exhausted(err: RouterError) -> usize {
    match err {
        RouterError::Exhausted { attempts, .. } => attempts.len(),
        other => panic!("expected Exhausted, got: {}", other),
    }
}
