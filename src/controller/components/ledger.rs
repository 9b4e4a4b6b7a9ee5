//! # Ledger Component Mutator
//!
//! Postgres-backed ledger workload with optional Redis locking, an event
//! collector topic on the message bus, and an autoscaler.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{EnvVar, Service};
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};

use crate::controller::apply::owner_reference;
use crate::controller::components::common::{
    finish, reconcile_base, reconcile_scaling, BaseReconcile,
};
use crate::controller::env::{env, monitoring_env, postgres_uri};
use crate::controller::error::ReconcilerError;
use crate::controller::kernel::Mutator;
use crate::controller::workload::{create_database_init_container, workload_name, WorkloadSpec};
use crate::crd::components::LedgerComponent;
use crate::crd::condition::ConditionHolder;
use crate::crd::shared::CollectorConfig;

pub struct LedgerMutator {
    client: Client,
}

impl LedgerMutator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Env block shared by every service publishing to the message bus.
pub fn collector_env(collector: &CollectorConfig) -> Vec<EnvVar> {
    let mut vars = vec![
        env("PUBLISHER_KAFKA_ENABLED", "true"),
        env("PUBLISHER_KAFKA_BROKER", collector.kafka.brokers.join(",")),
        env("PUBLISHER_TOPIC", collector.topic.clone()),
    ];
    if collector.kafka.tls {
        vars.push(env("PUBLISHER_KAFKA_TLS_ENABLED", "true"));
    }
    if let Some(sasl) = &collector.kafka.sasl {
        vars.push(env("PUBLISHER_KAFKA_SASL_ENABLED", "true"));
        vars.push(env("PUBLISHER_KAFKA_SASL_USERNAME", sasl.username.clone()));
        vars.push(env("PUBLISHER_KAFKA_SASL_PASSWORD", sasl.password.clone()));
        if let Some(mechanism) = &sasl.mechanism {
            vars.push(env("PUBLISHER_KAFKA_SASL_MECHANISM", mechanism.clone()));
        }
    }
    vars
}

#[async_trait]
impl Mutator for LedgerMutator {
    type Resource = LedgerComponent;

    fn name(&self) -> &'static str {
        "ledger"
    }

    fn register(&self, controller: Controller<LedgerComponent>) -> Controller<LedgerComponent> {
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

    async fn mutate(&self, obj: &mut LedgerComponent) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let service_name = workload_name(&namespace, &name);
        let spec = obj.spec.clone();

        let mut vars = vec![env(
            "POSTGRES_URI",
            postgres_uri(&spec.postgres, &spec.database),
        )];
        match &spec.locking {
            Some(redis) => {
                vars.push(env("LOCK_STRATEGY", "redis"));
                vars.push(env("LOCK_STRATEGY_REDIS_URL", redis.uri.clone()));
                if redis.tls {
                    vars.push(env("LOCK_STRATEGY_REDIS_TLS_ENABLED", "true"));
                }
            }
            None => vars.push(env("LOCK_STRATEGY", "memory")),
        }
        if let Some(client) = &spec.auth_client {
            vars.push(env("AUTH_CLIENT_ID", client.client_id.clone()));
            vars.push(env("AUTH_CLIENT_SECRET", client.client_secret.clone()));
        }
        if let Some(collector) = &spec.collector {
            vars.extend(collector_env(collector));
        }
        if let Some(index) = &spec.search_index {
            vars.push(env("SEARCH_INDEX", index.clone()));
        }
        vars.extend(monitoring_env(spec.monitoring.as_ref()));

        let init_containers = if spec.postgres.create_database {
            vec![create_database_init_container(&spec.postgres, &spec.database)]
        } else {
            Vec::new()
        };

        let workload = WorkloadSpec {
            name: service_name.clone(),
            namespace: namespace.clone(),
            image: spec.image.image.clone(),
            env: vars,
            image_pull_secrets: spec.image.image_pull_secrets.clone(),
            init_containers,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::shared::{KafkaConfig, KafkaSaslConfig};

    #[test]
    fn collector_env_carries_brokers_topic_and_sasl() {
        let collector = CollectorConfig {
            kafka: KafkaConfig {
                brokers: vec!["k-0:9092".to_string(), "k-1:9092".to_string()],
                tls: true,
                sasl: Some(KafkaSaslConfig {
                    username: "svc".to_string(),
                    password: "pw".to_string(),
                    mechanism: Some("SCRAM-SHA-512".to_string()),
                }),
            },
            topic: "acme-ledger".to_string(),
        };
        let vars = collector_env(&collector);
        let value = |name: &str| {
            vars.iter()
                .find(|v| v.name == name)
                .and_then(|v| v.value.clone())
                .unwrap_or_default()
        };
        assert_eq!(value("PUBLISHER_KAFKA_BROKER"), "k-0:9092,k-1:9092");
        assert_eq!(value("PUBLISHER_TOPIC"), "acme-ledger");
        assert_eq!(value("PUBLISHER_KAFKA_TLS_ENABLED"), "true");
        assert_eq!(value("PUBLISHER_KAFKA_SASL_MECHANISM"), "SCRAM-SHA-512");
    }
}
