//! # Workload Builders
//!
//! Shared construction of the primitives every component mutator owns:
//! versioned deployment, stable service endpoint, and horizontal autoscaler.
//! Component mutators feed a [`WorkloadSpec`] in and record the outcome on
//! their conditions.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    MetricSpec, MetricTarget, ResourceMetricSource,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HTTPGetAction, LocalObjectReference, PodSpec,
    PodTemplateSpec, Probe, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::Api;
use kube::Client;
use std::collections::BTreeMap;

use super::apply::apply;
use super::env::postgres_uri_without_database;
use super::error::ReconcilerError;
use crate::constants::{HEALTHCHECK_PATH, SERVICE_PORT};
use crate::crd::shared::{ImagePullSecretRef, PostgresConfig, ScalingSpec};

/// Name of a component's deployment, service, and autoscaler inside the
/// stack's namespace. Cluster-local service URLs derive from it, so the
/// prefix here and the host in [`crate::external::oauth::auth_server_url`]
/// must agree.
pub fn workload_name(namespace: &str, component: &str) -> String {
    format!("{namespace}-{component}")
}

/// Everything a component needs materialised as a workload.
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub env: Vec<EnvVar>,
    pub image_pull_secrets: Vec<ImagePullSecretRef>,
    pub init_containers: Vec<Container>,
    pub replicas: Option<i32>,
}

/// `:latest` images are always pulled; anything pinned is pulled if absent.
pub fn image_pull_policy(image: &str) -> &'static str {
    if image.ends_with(":latest") || !image.contains(':') {
        "Always"
    } else {
        "IfNotPresent"
    }
}

pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app.kubernetes.io/name".to_string(), name.to_string())])
}

/// Init container running `CREATE DATABASE IF NOT EXISTS` against the
/// component's Postgres server before the service starts.
pub fn create_database_init_container(postgres: &PostgresConfig, database: &str) -> Container {
    let script = format!(
        "psql -Atx \"$POSTGRES_NO_DATABASE_URI\" -c \"SELECT 1 FROM pg_database WHERE datname = '{database}'\" | grep -q 1 || psql -Atx \"$POSTGRES_NO_DATABASE_URI\" -c \"CREATE DATABASE \\\"{database}\\\"\""
    );
    Container {
        name: "init-create-database".to_string(),
        image: Some("postgres:15-alpine".to_string()),
        command: Some(vec!["sh".to_string(), "-c".to_string(), script]),
        env: Some(vec![EnvVar {
            name: "POSTGRES_NO_DATABASE_URI".to_string(),
            value: Some(postgres_uri_without_database(postgres)),
            value_from: None,
        }]),
        ..Default::default()
    }
}

fn pod_template(workload: &WorkloadSpec) -> PodTemplateSpec {
    let container = Container {
        name: workload.name.clone(),
        image: Some(workload.image.clone()),
        image_pull_policy: Some(image_pull_policy(&workload.image).to_string()),
        env: Some(workload.env.clone()),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: i32::from(SERVICE_PORT),
            ..Default::default()
        }]),
        liveness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(HEALTHCHECK_PATH.to_string()),
                port: IntOrString::Int(i32::from(SERVICE_PORT)),
                ..Default::default()
            }),
            initial_delay_seconds: Some(1),
            period_seconds: Some(10),
            ..Default::default()
        }),
        ..Default::default()
    };

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(selector_labels(&workload.name)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            init_containers: if workload.init_containers.is_empty() {
                None
            } else {
                Some(workload.init_containers.clone())
            },
            image_pull_secrets: if workload.image_pull_secrets.is_empty() {
                None
            } else {
                Some(
                    workload
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
    }
}

pub fn build_deployment(workload: &WorkloadSpec, owner: OwnerReference) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(workload.name.clone()),
            namespace: Some(workload.namespace.clone()),
            labels: Some(selector_labels(&workload.name)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: workload.replicas,
            selector: LabelSelector {
                match_labels: Some(selector_labels(&workload.name)),
                ..Default::default()
            },
            template: pod_template(workload),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn build_service(name: &str, namespace: &str, owner: OwnerReference) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(name)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: i32::from(SERVICE_PORT),
                target_port: Some(IntOrString::String("http".to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn build_hpa(
    name: &str,
    namespace: &str,
    scaling: &ScalingSpec,
    owner: OwnerReference,
) -> HorizontalPodAutoscaler {
    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: name.to_string(),
            },
            min_replicas: scaling.min_replicas,
            max_replicas: scaling.max_replicas.unwrap_or(1),
            metrics: scaling.cpu.map(|cpu| {
                vec![MetricSpec {
                    type_: "Resource".to_string(),
                    resource: Some(ResourceMetricSource {
                        name: "cpu".to_string(),
                        target: MetricTarget {
                            type_: "Utilization".to_string(),
                            average_utilization: Some(cpu),
                            ..Default::default()
                        },
                    }),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        }),
        status: None,
    }
}

pub async fn reconcile_deployment(
    client: &Client,
    workload: &WorkloadSpec,
    owner: OwnerReference,
) -> Result<(), ReconcilerError> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), &workload.namespace);
    let deployment = build_deployment(workload, owner);
    apply(&api, &deployment, "Reconciling deployment").await?;
    Ok(())
}

pub async fn reconcile_service(
    client: &Client,
    name: &str,
    namespace: &str,
    owner: OwnerReference,
) -> Result<(), ReconcilerError> {
    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
    let service = build_service(name, namespace, owner);
    apply(&api, &service, "Reconciling service").await?;
    Ok(())
}

pub async fn reconcile_hpa(
    client: &Client,
    name: &str,
    namespace: &str,
    scaling: &ScalingSpec,
    owner: OwnerReference,
) -> Result<(), ReconcilerError> {
    let api: Api<HorizontalPodAutoscaler> = Api::namespaced(client.clone(), namespace);
    let hpa = build_hpa(name, namespace, scaling, owner);
    apply(&api, &hpa, "Reconciling autoscaler").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_tag_always_pulls() {
        assert_eq!(image_pull_policy("ghcr.io/org/ledger:latest"), "Always");
        assert_eq!(image_pull_policy("ghcr.io/org/ledger"), "Always");
        assert_eq!(image_pull_policy("ghcr.io/org/ledger:v1.2.3"), "IfNotPresent");
    }

    #[test]
    fn deployment_carries_probe_and_policy() {
        let workload = WorkloadSpec {
            name: "ledger".to_string(),
            namespace: "acme".to_string(),
            image: "ghcr.io/org/ledger:v1".to_string(),
            env: vec![],
            image_pull_secrets: vec![],
            init_containers: vec![],
            replicas: None,
        };
        let deployment = build_deployment(&workload, OwnerReference::default());
        let container = &deployment.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.image_pull_policy.as_deref(), Some("IfNotPresent"));
        let probe = container.liveness_probe.as_ref().unwrap();
        assert_eq!(
            probe.http_get.as_ref().unwrap().path.as_deref(),
            Some("/_healthcheck")
        );
    }

    #[test]
    fn init_container_guards_create_database() {
        let postgres = PostgresConfig {
            host: "pg".to_string(),
            port: 5432,
            ..Default::default()
        };
        let container = create_database_init_container(&postgres, "acme-ledger");
        let script = &container.command.unwrap()[2];
        assert!(script.contains("pg_database WHERE datname = 'acme-ledger'"));
        assert!(script.contains("CREATE DATABASE"));
    }

    #[test]
    fn service_name_is_the_auth_server_url_host() {
        let name = workload_name("acme", "auth");
        let service = build_service(&name, "acme", OwnerReference::default());
        let url = crate::external::oauth::auth_server_url("acme", "auth");
        let host = url
            .trim_start_matches("http://")
            .split('.')
            .next()
            .unwrap();
        assert_eq!(service.metadata.name.as_deref(), Some(host));
    }

    #[test]
    fn hpa_targets_deployment_with_cpu_metric() {
        let scaling = ScalingSpec {
            enabled: true,
            min_replicas: Some(1),
            max_replicas: Some(10),
            cpu: Some(80),
        };
        let hpa = build_hpa("search", "acme", &scaling, OwnerReference::default());
        let spec = hpa.spec.unwrap();
        assert_eq!(spec.max_replicas, 10);
        assert_eq!(spec.scale_target_ref.name, "search");
    }
}
