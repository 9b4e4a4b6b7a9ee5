//! # Payments Component Mutator
//!
//! Document-store backed payments service; publishes its events to the
//! message bus and owns the SearchIngester forwarding them into search.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use serde_json::json;

use crate::controller::apply::owner_reference;
use crate::controller::components::common::{
    finish, reconcile_base, sync_ingester, BaseReconcile,
};
use crate::controller::components::ledger::collector_env;
use crate::controller::env::{env, mongodb_env, monitoring_env};
use crate::controller::error::ReconcilerError;
use crate::controller::kernel::Mutator;
use crate::controller::workload::{workload_name, WorkloadSpec};
use crate::crd::components::PaymentsComponent;
use crate::crd::condition::ConditionHolder;
use crate::crd::ingester::SearchIngester;

pub struct PaymentsMutator {
    client: Client,
}

impl PaymentsMutator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Pipeline fragment mapping a raw bus event into the search document shape.
pub fn event_pipeline(kind: &str) -> serde_json::Value {
    json!({
        "processors": [{
            "bloblang": format!(
                "root = {{\"kind\": \"{kind}\", \"ledger\": this.ledger, \"when\": this.date, \"data\": this.payload, \"indexed\": this.payload}}"
            )
        }]
    })
}

#[async_trait]
impl Mutator for PaymentsMutator {
    type Resource = PaymentsComponent;

    fn name(&self) -> &'static str {
        "payments"
    }

    fn register(&self, controller: Controller<PaymentsComponent>) -> Controller<PaymentsComponent> {
        controller
            .owns(
                Api::<Deployment>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<Service>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<SearchIngester>::all(self.client.clone()),
                watcher::Config::default(),
            )
    }

    async fn mutate(&self, obj: &mut PaymentsComponent) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let service_name = workload_name(&namespace, &name);
        let spec = obj.spec.clone();

        let mut vars = mongodb_env("", &spec.mongodb);
        if let Some(client) = &spec.auth_client {
            vars.push(env("AUTH_CLIENT_ID", client.client_id.clone()));
            vars.push(env("AUTH_CLIENT_SECRET", client.client_secret.clone()));
        }
        if let Some(collector) = &spec.collector {
            vars.extend(collector_env(collector));
        }
        vars.extend(monitoring_env(spec.monitoring.as_ref()));

        let workload = WorkloadSpec {
            name: service_name,
            namespace: namespace.clone(),
            image: spec.image.image.clone(),
            env: vars,
            image_pull_secrets: spec.image.image_pull_secrets.clone(),
            init_containers: Vec::new(),
            replicas: None,
        };

        let owner = owner_reference(obj);
        let mut conditions = std::mem::take(obj.conditions_mut());
        let result = async {
            let mut required = reconcile_base(
                BaseReconcile {
                    client: &self.client,
                    owner: owner.clone(),
                    generation,
                    workload,
                    ingress: spec.ingress.as_ref(),
                },
                &mut conditions,
            )
            .await?;

            let topic = spec
                .collector
                .as_ref()
                .map(|c| c.topic.clone())
                .unwrap_or_else(|| name.clone());
            sync_ingester(
                &self.client,
                &name,
                &namespace,
                spec.search_reference.as_ref(),
                topic,
                event_pipeline("payments"),
                owner.clone(),
                generation,
                &mut conditions,
                &mut required,
            )
            .await?;

            finish(&mut conditions, &required, generation);
            Ok(None)
        }
        .await;
        *obj.conditions_mut() = conditions;
        result
    }
}
