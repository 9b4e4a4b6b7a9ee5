//! # Finalizer Protocol
//!
//! Resources owning external state carry a named finalizer; while present the
//! orchestrator will not delete the record. Mutators call [`handle`] at the
//! top of every pass and short-circuit when it consumed the event. Cleanup
//! closures must be idempotent and treat external `NotFound` as success: the
//! kernel may re-enter between cleanup and finalizer removal.

use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use tracing::info;

use super::error::{ReconcilerError, TagError};
use crate::constants::{API_GROUP, FIELD_MANAGER};

/// Finalizer string for a kind, e.g. `stack.fstack.dev/authscope`.
pub fn finalizer_name(kind: &str) -> String {
    format!("{API_GROUP}/{}", kind.to_lowercase())
}

/// What [`handle`] does for a resource, decided from its metadata alone.
#[derive(Debug, PartialEq)]
enum DeletionStep {
    /// Not being deleted; reconcile normally.
    Reconcile,
    /// Being deleted with the finalizer still present: run cleanup, then
    /// patch the finalizer list down to `remaining`.
    CleanupThenRemove { remaining: Vec<String> },
    /// Being deleted, finalizer already gone; cleanup ran on an earlier
    /// pass and must not run again.
    Consumed,
}

fn deletion_step<K>(obj: &K, finalizer: &str) -> DeletionStep
where
    K: Resource<DynamicType = ()>,
{
    if obj.meta().deletion_timestamp.is_none() {
        return DeletionStep::Reconcile;
    }
    if obj.finalizers().iter().any(|f| f == finalizer) {
        DeletionStep::CleanupThenRemove {
            remaining: obj
                .finalizers()
                .iter()
                .filter(|f| f.as_str() != finalizer)
                .cloned()
                .collect(),
        }
    } else {
        DeletionStep::Consumed
    }
}

/// If the resource is being deleted, run `cleanup`, remove the finalizer,
/// and return `true` so the mutator short-circuits. Otherwise `false`.
/// A cleanup error keeps the finalizer in place for the retry.
pub async fn handle<K, F, Fut>(
    api: &Api<K>,
    obj: &K,
    finalizer: &str,
    cleanup: F,
) -> Result<bool, ReconcilerError>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), ReconcilerError>>,
{
    match deletion_step(obj, finalizer) {
        DeletionStep::Reconcile => Ok(false),
        DeletionStep::Consumed => Ok(true),
        DeletionStep::CleanupThenRemove { remaining } => {
            cleanup().await?;

            let patch = serde_json::json!({ "metadata": { "finalizers": remaining } });
            api.patch(
                &obj.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(patch),
            )
            .await
            .tag("Removing finalizer")?;
            info!(resource = %obj.name_any(), finalizer, "external cleanup done, finalizer removed");
            Ok(true)
        }
    }
}

/// Add the finalizer if absent.
pub async fn ensure_installed<K>(
    api: &Api<K>,
    obj: &K,
    finalizer: &str,
) -> Result<(), ReconcilerError>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    if obj.finalizers().iter().any(|f| f == finalizer) {
        return Ok(());
    }

    let mut finalizers = obj.finalizers().to_vec();
    finalizers.push(finalizer.to_string());
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(
        &obj.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await
    .tag("Installing finalizer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::oauth::{AuthScope, AuthScopeSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn scope(deleting: bool, finalizers: Vec<&str>) -> AuthScope {
        let mut scope = AuthScope::new("read-ledger", AuthScopeSpec::default());
        if deleting {
            scope.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
        }
        scope.meta_mut().finalizers =
            Some(finalizers.into_iter().map(str::to_string).collect());
        scope
    }

    #[test]
    fn finalizer_names_are_prefixed_and_lowercase() {
        assert_eq!(finalizer_name("AuthScope"), "stack.fstack.dev/authscope");
        assert_eq!(finalizer_name("BenthosStream"), "stack.fstack.dev/benthosstream");
    }

    #[test]
    fn live_resource_reconciles_normally() {
        let finalizer = finalizer_name("AuthScope");
        let obj = scope(false, vec![&finalizer]);
        assert_eq!(deletion_step(&obj, &finalizer), DeletionStep::Reconcile);
    }

    #[test]
    fn deletion_cleans_up_then_drops_only_our_entry() {
        let finalizer = finalizer_name("AuthScope");
        let obj = scope(true, vec!["other.io/keep", &finalizer]);
        assert_eq!(
            deletion_step(&obj, &finalizer),
            DeletionStep::CleanupThenRemove {
                remaining: vec!["other.io/keep".to_string()],
            }
        );
    }

    #[test]
    fn reentry_after_removal_skips_cleanup() {
        // The kernel may re-deliver the deletion event after the patch
        // landed; without the finalizer the pass is consumed untouched.
        let finalizer = finalizer_name("AuthScope");
        let obj = scope(true, vec!["other.io/keep"]);
        assert_eq!(deletion_step(&obj, &finalizer), DeletionStep::Consumed);
    }
}
