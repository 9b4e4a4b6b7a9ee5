//! # Reconciliation Kernel
//!
//! Generic driver for every kind the operator owns. On each event it
//! re-fetches the target, deep-copies it into a working copy, invokes the
//! mutator, and persists the status only when the conditions actually
//! changed. The status write happens after the mutator's side effects, so a
//! status never claims more than what was materialised before the write.

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

use super::error::{ReconcilerError, TagError};
use crate::constants::FIELD_MANAGER;
use crate::crd::condition::{conditions_changed, ConditionHolder};
use crate::observability::metrics;

/// Per-kind plug-in advancing a resource toward its spec.
#[async_trait]
pub trait Mutator: Send + Sync {
    type Resource: Resource<DynamicType = ()>
        + ConditionHolder
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static;

    /// Name used in logs and metrics labels.
    fn name(&self) -> &'static str;

    /// Declare owned child kinds and cross-kind watches on the controller
    /// builder. Default: no children.
    fn register(&self, controller: Controller<Self::Resource>) -> Controller<Self::Resource> {
        controller
    }

    /// Advance `obj` toward its spec, mutating `obj.status` and issuing side
    /// effects. Returning `Some(action)` overrides the kernel's re-queue
    /// decision; `None` means re-queue only on error.
    async fn mutate(&self, obj: &mut Self::Resource) -> Result<Option<Action>, ReconcilerError>;
}

/// Drive a single event through the mutator.
///
/// The mutator's error, if any, is returned after the status write so the
/// conditions it recorded are not lost; the controller's error policy turns
/// it into a requeue.
pub async fn reconcile<M: Mutator>(
    api: &Api<M::Resource>,
    mutator: &M,
    obj: Arc<M::Resource>,
) -> Result<Action, ReconcilerError> {
    metrics::increment_reconciliations(mutator.name());

    // Re-fetch by name; absence is a deletion race and succeeds silently.
    let name = obj.name_any();
    let Some(actual) = api.get_opt(&name).await.tag("Fetching resource")? else {
        debug!(controller = mutator.name(), resource = %name, "resource gone, skipping");
        return Ok(Action::await_change());
    };

    let mut updated = actual.clone();
    let outcome = mutator.mutate(&mut updated).await;

    if conditions_changed(actual.conditions(), updated.conditions()) {
        let value = serde_json::to_value(&updated)?;
        if let Some(status) = value.get("status") {
            api.patch_status(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(serde_json::json!({ "status": status })),
            )
            .await
            .tag("Writing status")?;
            metrics::increment_status_writes(mutator.name());
        }
    } else {
        debug!(
            controller = mutator.name(),
            resource = %name,
            "conditions unchanged, skipping status write"
        );
    }

    // Explicit re-queue directive from the mutator wins; otherwise re-queue
    // iff the mutator returned an error.
    match outcome {
        Ok(Some(action)) => Ok(action),
        Ok(None) => Ok(Action::await_change()),
        Err(err) => Err(err),
    }
}
