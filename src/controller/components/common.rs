//! Shared reconciliation steps for the service components: workload,
//! service endpoint, optional ingress, optional autoscaler. Each step
//! records its outcome on the component's conditions; a failed step stops
//! the template since the later steps depend on it.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Client;

use crate::controller::error::ReconcilerError;
use crate::controller::ingress::{delete_ingress, reconcile_ingress, resolve_ingress};
use crate::controller::workload::{reconcile_deployment, reconcile_hpa, reconcile_service, WorkloadSpec};
use crate::crd::condition::{remove_condition, set_condition, types, Condition};
use crate::crd::shared::{IngressSpec, ScalingSpec};

pub struct BaseReconcile<'a> {
    pub client: &'a Client,
    pub owner: OwnerReference,
    pub generation: Option<i64>,
    pub workload: WorkloadSpec,
    pub ingress: Option<&'a IngressSpec>,
}

/// Run the workload / service / ingress steps, recording per-step
/// conditions. Returns the condition types that must be `True` for the
/// component to aggregate `Ready`.
pub async fn reconcile_base(
    base: BaseReconcile<'_>,
    conditions: &mut Vec<Condition>,
) -> Result<Vec<&'static str>, ReconcilerError> {
    let generation = base.generation;
    let name = base.workload.name.clone();
    let namespace = base.workload.namespace.clone();
    let mut required = vec![types::DEPLOYMENT_READY, types::SERVICE_READY];

    set_condition(
        conditions,
        Condition::satisfied(types::PROGRESSING, generation),
    );

    if let Err(err) = reconcile_deployment(base.client, &base.workload, base.owner.clone()).await {
        set_condition(
            conditions,
            Condition::failed(types::DEPLOYMENT_READY, generation, err.to_string()),
        );
        return Err(err);
    }
    set_condition(
        conditions,
        Condition::satisfied(types::DEPLOYMENT_READY, generation),
    );

    if let Err(err) =
        reconcile_service(base.client, &name, &namespace, base.owner.clone()).await
    {
        set_condition(
            conditions,
            Condition::failed(types::SERVICE_READY, generation, err.to_string()),
        );
        return Err(err);
    }
    set_condition(
        conditions,
        Condition::satisfied(types::SERVICE_READY, generation),
    );

    match resolve_ingress(base.ingress, &namespace, "/") {
        Some(resolved) => {
            required.push(types::INGRESS_READY);
            if let Err(err) =
                reconcile_ingress(base.client, &name, &namespace, &resolved, base.owner).await
            {
                set_condition(
                    conditions,
                    Condition::failed(types::INGRESS_READY, generation, err.to_string()),
                );
                return Err(err);
            }
            set_condition(
                conditions,
                Condition::satisfied(types::INGRESS_READY, generation),
            );
        }
        None => {
            delete_ingress(base.client, &name, &namespace).await?;
            remove_condition(conditions, types::INGRESS_READY);
        }
    }

    Ok(required)
}

/// Autoscaler step for the components that scale. Disabled scaling removes
/// the condition so `Ready` does not depend on it.
pub async fn reconcile_scaling(
    client: &Client,
    name: &str,
    namespace: &str,
    scaling: Option<&ScalingSpec>,
    owner: OwnerReference,
    generation: Option<i64>,
    conditions: &mut Vec<Condition>,
    required: &mut Vec<&'static str>,
) -> Result<(), ReconcilerError> {
    match scaling {
        Some(scaling) if scaling.enabled => {
            required.push(types::HPA_READY);
            if let Err(err) = reconcile_hpa(client, name, namespace, scaling, owner).await {
                set_condition(
                    conditions,
                    Condition::failed(types::HPA_READY, generation, err.to_string()),
                );
                return Err(err);
            }
            set_condition(conditions, Condition::satisfied(types::HPA_READY, generation));
        }
        _ => remove_condition(conditions, types::HPA_READY),
    }
    Ok(())
}

/// SearchIngester child owned by the producer components. Present iff the
/// stack runs a search service; the topic is the producer's collector topic.
#[allow(clippy::too_many_arguments)]
pub async fn sync_ingester(
    client: &Client,
    name: &str,
    namespace: &str,
    search_reference: Option<&String>,
    topic: String,
    pipeline: serde_json::Value,
    owner: OwnerReference,
    generation: Option<i64>,
    conditions: &mut Vec<Condition>,
    required: &mut Vec<&'static str>,
) -> Result<(), ReconcilerError> {
    use crate::controller::apply::{apply, delete_if_present};
    use crate::crd::ingester::{SearchIngester, SearchIngesterSpec};
    use kube::api::Api;
    use kube::Resource;

    let ingesters: Api<SearchIngester> = Api::namespaced(client.clone(), namespace);
    match search_reference {
        Some(reference) => {
            required.push(types::INGESTION_STREAM_READY);
            let mut ingester = SearchIngester::new(
                name,
                SearchIngesterSpec {
                    reference: reference.clone(),
                    topic,
                    pipeline,
                },
            );
            ingester.meta_mut().namespace = Some(namespace.to_string());
            ingester.meta_mut().owner_references = Some(vec![owner]);
            match apply(&ingesters, &ingester, "Reconciling search ingester").await {
                Ok(_) => set_condition(
                    conditions,
                    Condition::satisfied(types::INGESTION_STREAM_READY, generation),
                ),
                Err(err) => {
                    set_condition(
                        conditions,
                        Condition::failed(types::INGESTION_STREAM_READY, generation, err.to_string()),
                    );
                    return Err(err);
                }
            }
        }
        None => {
            delete_if_present(&ingesters, name, "Deleting search ingester").await?;
            remove_condition(conditions, types::INGESTION_STREAM_READY);
        }
    }
    Ok(())
}

/// Final step of every component mutator: clear `Progressing` and derive
/// `Ready` from the required sub-conditions.
pub fn finish(
    conditions: &mut Vec<Condition>,
    required: &[&'static str],
    generation: Option<i64>,
) {
    set_condition(
        conditions,
        Condition::new(
            types::PROGRESSING,
            crate::crd::condition::ConditionStatus::False,
            generation,
        ),
    );
    crate::crd::condition::aggregate_ready(conditions, required, generation);
}
