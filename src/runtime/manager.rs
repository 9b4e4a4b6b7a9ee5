//! # Controller Manager
//!
//! Builds one controller per owned kind and runs them to completion. All
//! controllers share a single Kubernetes client; the Stack controller also
//! receives a reflector-backed cache of Stacks so Configuration edits fan
//! out to every Stack referencing the edited seed.

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::runtime::controller::Controller;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error_policy::handle_reconciliation_error;
use crate::controller::benthos::{BenthosServerMutator, BenthosStreamMutator};
use crate::controller::components::{
    AuthMutator, ControlMutator, LedgerMutator, PaymentsMutator, SearchMutator, WebhooksMutator,
};
use crate::controller::ingester::IngesterMutator;
use crate::controller::kernel::{self, Mutator};
use crate::controller::oauth::{AuthClientMutator, AuthScopeMutator};
use crate::controller::stack::StackMutator;
use crate::crd::stack::Stack;
use crate::observability::server::ServerState;

struct Ctx<M: Mutator> {
    client: Client,
    mutator: M,
}

/// Run a controller for a cluster-scoped kind until shutdown.
async fn run_cluster_scoped<M>(client: Client, mutator: M)
where
    M: Mutator + 'static,
{
    let name = mutator.name();
    let api: Api<M::Resource> = Api::all(client.clone());
    let controller = mutator.register(Controller::new(api, watcher::Config::default()));
    let ctx = Arc::new(Ctx { client, mutator });

    controller
        .shutdown_on_signal()
        .run(
            |obj, ctx: Arc<Ctx<M>>| async move {
                let api: Api<M::Resource> = Api::all(ctx.client.clone());
                kernel::reconcile(&api, &ctx.mutator, obj).await
            },
            |obj, err, ctx: Arc<Ctx<M>>| {
                handle_reconciliation_error(ctx.mutator.name(), obj.as_ref(), err)
            },
            ctx,
        )
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(controller = name, resource = %obj, "reconciled"),
                Err(err) => warn!(controller = name, error = %err, "controller stream error"),
            }
        })
        .await;
    info!(controller = name, "controller stream terminated");
}

/// Run a controller for a namespaced kind until shutdown. Events are watched
/// across all namespaces; each reconcile scopes its API to the object's own
/// namespace.
async fn run_namespaced<M>(client: Client, mutator: M)
where
    M: Mutator + 'static,
    M::Resource: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    let name = mutator.name();
    let api: Api<M::Resource> = Api::all(client.clone());
    let controller = mutator.register(Controller::new(api, watcher::Config::default()));
    let ctx = Arc::new(Ctx { client, mutator });

    controller
        .shutdown_on_signal()
        .run(
            |obj, ctx: Arc<Ctx<M>>| async move {
                let namespace = obj.namespace().unwrap_or_default();
                let api: Api<M::Resource> = Api::namespaced(ctx.client.clone(), &namespace);
                kernel::reconcile(&api, &ctx.mutator, obj).await
            },
            |obj, err, ctx: Arc<Ctx<M>>| {
                handle_reconciliation_error(ctx.mutator.name(), obj.as_ref(), err)
            },
            ctx,
        )
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!(controller = name, resource = %obj, "reconciled"),
                Err(err) => warn!(controller = name, error = %err, "controller stream error"),
            }
        })
        .await;
    info!(controller = name, "controller stream terminated");
}

/// Run every controller until the process receives a shutdown signal.
pub async fn run(client: Client, server_state: Arc<ServerState>) -> Result<()> {
    // Reflector-backed Stack cache feeding the Configuration watch mapper.
    // The reflector stream must be polled for the store to fill, so it runs
    // as its own task alongside the controllers.
    let (stacks, writer) = reflector::store::<Stack>();
    let stack_cache = reflector::reflector(
        writer,
        watcher(Api::<Stack>::all(client.clone()), watcher::Config::default()),
    )
    .default_backoff()
    .applied_objects()
    .for_each(|res| async move {
        if let Err(err) = res {
            warn!(error = %err, "stack cache stream error");
        }
    });
    tokio::spawn(stack_cache);

    info!("Starting controllers");
    server_state.is_ready.store(true, Ordering::Relaxed);

    tokio::join!(
        run_cluster_scoped(client.clone(), StackMutator::new(client.clone(), stacks)),
        run_namespaced(client.clone(), AuthMutator::new(client.clone())),
        run_namespaced(client.clone(), LedgerMutator::new(client.clone())),
        run_namespaced(client.clone(), PaymentsMutator::new(client.clone())),
        run_namespaced(client.clone(), SearchMutator::new(client.clone())),
        run_namespaced(client.clone(), WebhooksMutator::new(client.clone())),
        run_namespaced(client.clone(), ControlMutator::new(client.clone())),
        run_namespaced(client.clone(), BenthosServerMutator::new(client.clone())),
        run_namespaced(client.clone(), BenthosStreamMutator::new(client.clone())),
        run_namespaced(client.clone(), IngesterMutator::new(client.clone())),
        run_namespaced(client.clone(), AuthScopeMutator::new(client.clone())),
        run_namespaced(client.clone(), AuthClientMutator::new(client.clone())),
    );

    Ok(())
}
