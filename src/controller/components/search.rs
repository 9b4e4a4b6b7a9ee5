//! # Search Component Mutator
//!
//! Deploys the search API, installs the index template on the backing
//! search engine, and owns the Benthos server every ingestion stream of the
//! stack runs on.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};

use crate::controller::apply::{apply, owner_reference};
use crate::controller::components::common::{
    finish, reconcile_base, reconcile_scaling, BaseReconcile,
};
use crate::controller::env::{env, monitoring_env};
use crate::controller::error::ReconcilerError;
use crate::controller::kernel::Mutator;
use crate::controller::workload::{workload_name, WorkloadSpec};
use crate::crd::benthos::{BenthosServer, BenthosServerSpec};
use crate::crd::components::SearchComponent;
use crate::crd::condition::{set_condition, types, Condition, ConditionHolder};
use crate::crd::shared::ImageSpec;
use crate::external::search::SearchBackend;

const DEFAULT_BENTHOS_IMAGE: &str = "jeffail/benthos:4.24";

/// Name of the Benthos server child for a given search component.
pub fn benthos_server_name(search: &str) -> String {
    format!("{search}-benthos")
}

pub struct SearchMutator {
    client: Client,
}

impl SearchMutator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Mutator for SearchMutator {
    type Resource = SearchComponent;

    fn name(&self) -> &'static str {
        "search"
    }

    fn register(&self, controller: Controller<SearchComponent>) -> Controller<SearchComponent> {
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
                Api::<BenthosServer>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<HorizontalPodAutoscaler>::all(self.client.clone()),
                watcher::Config::default(),
            )
    }

    async fn mutate(&self, obj: &mut SearchComponent) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let service_name = workload_name(&namespace, &name);
        let spec = obj.spec.clone();

        let mut vars = vec![
            env("ELASTICSEARCH_ENDPOINT", spec.elastic_search.endpoint()),
            env("ELASTICSEARCH_INDEX", spec.index.clone()),
        ];
        if let Some(auth) = &spec.elastic_search.basic_auth {
            vars.push(env("ELASTICSEARCH_USERNAME", auth.username.clone()));
            vars.push(env("ELASTICSEARCH_PASSWORD", auth.password.clone()));
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

            // Index template and Benthos server share a condition: the
            // ingestion plane is not usable until both exist.
            required.push(types::BENTHOS_READY);
            let backend = SearchBackend::new(&spec.elastic_search);
            if let Err(err) = backend.put_index_template(&spec.index).await {
                set_condition(
                    &mut conditions,
                    Condition::failed(types::BENTHOS_READY, generation, err.to_string()),
                );
                return Err(ReconcilerError::External {
                    context: "Installing index template".to_string(),
                    source: err,
                });
            }

            let servers: Api<BenthosServer> = Api::namespaced(self.client.clone(), &namespace);
            let mut server = BenthosServer::new(
                &benthos_server_name(&name),
                BenthosServerSpec {
                    image: ImageSpec {
                        image: spec
                            .benthos_image
                            .clone()
                            .unwrap_or_else(|| DEFAULT_BENTHOS_IMAGE.to_string()),
                        image_pull_secrets: spec.image.image_pull_secrets.clone(),
                    },
                    port: None,
                },
            );
            server.meta_mut().namespace = Some(namespace.clone());
            server.meta_mut().owner_references = Some(vec![owner.clone()]);
            match apply(&servers, &server, "Reconciling benthos server").await {
                Ok(_) => set_condition(
                    &mut conditions,
                    Condition::satisfied(types::BENTHOS_READY, generation),
                ),
                Err(err) => {
                    set_condition(
                        &mut conditions,
                        Condition::failed(types::BENTHOS_READY, generation, err.to_string()),
                    );
                    return Err(err);
                }
            }

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
