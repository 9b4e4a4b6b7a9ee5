//! # Control Component Mutator
//!
//! The operator console UI. Thin workload fed the public and in-cluster API
//! endpoints plus the static OAuth client it authenticates with.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};

use crate::controller::apply::owner_reference;
use crate::controller::components::common::{
    finish, reconcile_base, reconcile_scaling, BaseReconcile,
};
use crate::controller::env::{env, monitoring_env};
use crate::controller::error::ReconcilerError;
use crate::controller::kernel::Mutator;
use crate::controller::workload::{workload_name, WorkloadSpec};
use crate::crd::components::ControlComponent;
use crate::crd::condition::ConditionHolder;

pub struct ControlMutator {
    client: Client,
}

impl ControlMutator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Mutator for ControlMutator {
    type Resource = ControlComponent;

    fn name(&self) -> &'static str {
        "control"
    }

    fn register(&self, controller: Controller<ControlComponent>) -> Controller<ControlComponent> {
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
                Api::<HorizontalPodAutoscaler>::all(self.client.clone()),
                watcher::Config::default(),
            )
    }

    async fn mutate(&self, obj: &mut ControlComponent) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let service_name = workload_name(&namespace, &name);
        let spec = obj.spec.clone();

        let mut vars = vec![
            env("API_URL", spec.api_url_front.clone()),
            env("API_URL_BACK", spec.api_url_back.clone()),
            env("CLIENT_ID", spec.auth_client_id.clone()),
            env("CLIENT_SECRET", spec.auth_client_secret.clone()),
        ];
        for (key, value) in &spec.env {
            vars.push(env(key.clone(), value.clone()));
        }
        vars.extend(monitoring_env(spec.monitoring.as_ref()));

        let workload = WorkloadSpec {
            name: service_name.clone(),
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
            reconcile_scaling(
                &self.client,
                &service_name,
                &namespace,
                spec.scaling.as_ref(),
                owner,
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
