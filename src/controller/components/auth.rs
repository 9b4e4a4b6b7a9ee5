//! # Auth Component Mutator
//!
//! Deploys the OAuth/OIDC service: Postgres-backed workload with the issuer
//! base URL, signing key, delegated upstream OIDC, and the static clients
//! serialized into its environment.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};

use crate::controller::apply::owner_reference;
use crate::controller::components::common::{finish, reconcile_base, BaseReconcile};
use crate::controller::env::{env, monitoring_env, postgres_uri};
use crate::controller::error::ReconcilerError;
use crate::controller::kernel::Mutator;
use crate::controller::workload::{create_database_init_container, workload_name, WorkloadSpec};
use crate::crd::components::AuthComponent;
use crate::crd::condition::ConditionHolder;

pub struct AuthMutator {
    client: Client,
}

impl AuthMutator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Mutator for AuthMutator {
    type Resource = AuthComponent;

    fn name(&self) -> &'static str {
        "auth"
    }

    fn register(&self, controller: Controller<AuthComponent>) -> Controller<AuthComponent> {
        controller
            .owns(
                Api::<Deployment>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<Service>::all(self.client.clone()),
                watcher::Config::default(),
            )
    }

    async fn mutate(&self, obj: &mut AuthComponent) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let service_name = workload_name(&namespace, &name);
        let spec = obj.spec.clone();

        let mut vars = vec![
            env("POSTGRES_URI", postgres_uri(&spec.postgres, &spec.database)),
            env("BASE_URL", spec.base_url.clone()),
        ];
        if let Some(key) = &spec.signing_key {
            vars.push(env("SIGNING_KEY", key.clone()));
        }
        if let Some(oidc) = &spec.delegated_oidc {
            vars.push(env("DELEGATED_ISSUER", oidc.issuer.clone()));
            vars.push(env("DELEGATED_CLIENT_ID", oidc.client_id.clone()));
            vars.push(env("DELEGATED_CLIENT_SECRET", oidc.client_secret.clone()));
        }
        if !spec.static_clients.is_empty() {
            vars.push(env(
                "STATIC_CLIENTS",
                serde_json::to_string(&spec.static_clients)?,
            ));
        }
        if spec.dev_mode {
            vars.push(env("DEBUG", "true"));
        }
        vars.extend(monitoring_env(spec.monitoring.as_ref()));

        let init_containers = if spec.postgres.create_database {
            vec![create_database_init_container(&spec.postgres, &spec.database)]
        } else {
            Vec::new()
        };

        let workload = WorkloadSpec {
            name: service_name,
            namespace: namespace.clone(),
            image: spec.image.image.clone(),
            env: vars,
            image_pull_secrets: spec.image.image_pull_secrets.clone(),
            init_containers,
            replicas: None,
        };

        let mut conditions = std::mem::take(obj.conditions_mut());
        let outcome = reconcile_base(
            BaseReconcile {
                client: &self.client,
                owner: owner_reference(obj),
                generation,
                workload,
                ingress: spec.ingress.as_ref(),
            },
            &mut conditions,
        )
        .await;
        let result = match outcome {
            Ok(required) => {
                finish(&mut conditions, &required, generation);
                Ok(None)
            }
            Err(err) => Err(err),
        };
        *obj.conditions_mut() = conditions;
        result
    }
}
