//! # Benthos Server Mutator
//!
//! Runs the stream-processing engine in streams mode: a deployment plus a
//! service exposing the admin HTTP port the stream mutator talks to.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, LocalObjectReference, PodSpec, PodTemplateSpec,
    Probe, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};

use crate::controller::apply::{apply, owner_reference};
use crate::controller::error::ReconcilerError;
use crate::controller::kernel::Mutator;
use crate::controller::workload::{image_pull_policy, selector_labels};
use crate::crd::benthos::BenthosServer;
use crate::crd::condition::{aggregate_ready, set_condition, types, Condition, ConditionHolder};

pub struct BenthosServerMutator {
    client: Client,
}

impl BenthosServerMutator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn build_deployment(server: &BenthosServer, owner: OwnerReference) -> Deployment {
    let name = server.name_any();
    let port = i32::from(server.spec.admin_port());
    let image = server.spec.image.image.clone();

    let container = Container {
        name: "benthos".to_string(),
        image: Some(image.clone()),
        image_pull_policy: Some(image_pull_policy(&image).to_string()),
        args: Some(vec!["streams".to_string()]),
        ports: Some(vec![ContainerPort {
            name: Some("admin".to_string()),
            container_port: port,
            ..Default::default()
        }]),
        liveness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/ping".to_string()),
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: server.namespace(),
            labels: Some(selector_labels(&name)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels(&name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    image_pull_secrets: if server.spec.image.image_pull_secrets.is_empty() {
                        None
                    } else {
                        Some(
                            server
                                .spec
                                .image
                                .image_pull_secrets
                                .iter()
                                .map(|s| LocalObjectReference {
                                    name: s.name.clone(),
                                })
                                .collect(),
                        )
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

fn build_service(server: &BenthosServer, owner: OwnerReference) -> Service {
    let name = server.name_any();
    let port = i32::from(server.spec.admin_port());
    Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: server.namespace(),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(&name)),
            ports: Some(vec![ServicePort {
                name: Some("admin".to_string()),
                port,
                target_port: Some(IntOrString::String("admin".to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

#[async_trait]
impl Mutator for BenthosServerMutator {
    type Resource = BenthosServer;

    fn name(&self) -> &'static str {
        "benthos-server"
    }

    fn register(&self, controller: Controller<BenthosServer>) -> Controller<BenthosServer> {
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

    async fn mutate(&self, obj: &mut BenthosServer) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let namespace = obj.namespace().unwrap_or_default();
        let owner = owner_reference(obj);

        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        let deployment = build_deployment(obj, owner.clone());
        let services: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let service = build_service(obj, owner);

        let mut conditions = std::mem::take(obj.conditions_mut());
        let result = async {
            match apply(&deployments, &deployment, "Reconciling benthos deployment").await {
                Ok(_) => set_condition(
                    &mut conditions,
                    Condition::satisfied(types::DEPLOYMENT_READY, generation),
                ),
                Err(err) => {
                    set_condition(
                        &mut conditions,
                        Condition::failed(types::DEPLOYMENT_READY, generation, err.to_string()),
                    );
                    return Err(err);
                }
            }
            match apply(&services, &service, "Reconciling benthos service").await {
                Ok(_) => set_condition(
                    &mut conditions,
                    Condition::satisfied(types::SERVICE_READY, generation),
                ),
                Err(err) => {
                    set_condition(
                        &mut conditions,
                        Condition::failed(types::SERVICE_READY, generation, err.to_string()),
                    );
                    return Err(err);
                }
            }
            aggregate_ready(
                &mut conditions,
                &[types::DEPLOYMENT_READY, types::SERVICE_READY],
                generation,
            );
            Ok(None)
        }
        .await;
        *obj.conditions_mut() = conditions;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::benthos::BenthosServerSpec;
    use crate::crd::shared::ImageSpec;

    fn server() -> BenthosServer {
        let mut server = BenthosServer::new(
            "search-benthos",
            BenthosServerSpec {
                image: ImageSpec {
                    image: "jeffail/benthos:4.24".to_string(),
                    image_pull_secrets: Vec::new(),
                },
                port: None,
            },
        );
        server.meta_mut().namespace = Some("acme".to_string());
        server
    }

    #[test]
    fn deployment_runs_streams_mode_on_admin_port() {
        let server = server();
        let deployment = build_deployment(&server, owner_reference(&server));
        let container = &deployment.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.args.as_deref(), Some(&["streams".to_string()][..]));
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 4195);
    }

    #[test]
    fn service_targets_the_admin_port() {
        let server = server();
        let service = build_service(&server, owner_reference(&server));
        let port = &service.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.port, 4195);
    }
}
