//! # Error Policy
//!
//! Requeue decision for failed reconciliations. Every error requeues after a
//! fixed delay; there is no dead-letter. Permanent errors stay visible on
//! the resource's conditions between attempts.

use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::time::Duration;
use tracing::warn;

use crate::constants::DEFAULT_ERROR_REQUEUE_SECS;
use crate::controller::ReconcilerError;
use crate::observability::metrics;

pub fn handle_reconciliation_error<K>(
    controller: &'static str,
    obj: &K,
    error: &ReconcilerError,
) -> Action
where
    K: Resource<DynamicType = ()>,
{
    warn!(
        controller,
        resource = %obj.name_any(),
        namespace = obj.meta().namespace.as_deref().unwrap_or(""),
        error = %error,
        "reconciliation failed, requeueing"
    );
    metrics::increment_reconciliation_errors(controller);
    Action::requeue(Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS))
}
