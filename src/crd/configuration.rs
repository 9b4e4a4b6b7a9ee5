//! # Configuration CRD
//!
//! Cluster-scoped shared "seed" referenced by Stacks. Holds the services
//! catalogue, monitoring defaults, global ingress defaults, and message-bus
//! coordinates. Stacks override any field via a partial spec of the same
//! shape; the merge rules live in `controller::stack::merge`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::shared::{
    ElasticSearchConfig, ImageSpec, IngressGlobalSpec, IngressSpec, KafkaConfig, MongoDbConfig,
    MonitoringSpec, PostgresConfig, RedisConfig, ScalingSpec, StaticClient,
};

/// Configuration Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: stack.fstack.dev/v1beta1
/// kind: Configuration
/// metadata:
///   name: default
/// spec:
///   services:
///     ledger:
///       image: ghcr.io/org/ledger:v1.9.0
///       postgres:
///         host: postgres.infra.svc
///         port: 5432
///         createDatabase: true
///   kafka:
///     brokers: ["kafka-0.infra.svc:9092"]
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Configuration",
    group = "stack.fstack.dev",
    version = "v1beta1",
    status = "ConfigurationStatus",
    shortname = "cfg",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSpec {
    /// Default trace exporter settings propagated to every workload
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
    /// Services catalogue: a service absent here (and not added by a Stack
    /// override) is not deployed
    #[serde(default)]
    pub services: ServicesSpec,
    /// Cluster-wide ingress defaults merged under per-service overrides
    #[serde(default)]
    pub ingress: Option<IngressGlobalSpec>,
    /// Message-bus coordinates shared by every collector
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicesSpec {
    #[serde(default)]
    pub auth: Option<AuthSpec>,
    #[serde(default)]
    pub ledger: Option<LedgerSpec>,
    #[serde(default)]
    pub payments: Option<PaymentsSpec>,
    #[serde(default)]
    pub search: Option<SearchSpec>,
    #[serde(default)]
    pub webhooks: Option<WebhooksSpec>,
    #[serde(default)]
    pub control: Option<ControlSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    #[serde(default)]
    pub postgres: PostgresConfig,
    /// Key used to sign issued tokens
    #[serde(default)]
    pub signing_key: Option<String>,
    /// Delegated upstream OIDC issuer
    #[serde(default)]
    pub delegated_oidc: Option<DelegatedOidcSpec>,
    /// Static OAuth clients; index 1 is the control UI client by convention
    #[serde(default)]
    pub static_clients: Vec<StaticClient>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedOidcSpec {
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    #[serde(default)]
    pub postgres: PostgresConfig,
    /// Optional Redis-backed distributed locking
    #[serde(default)]
    pub locking: Option<RedisConfig>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub scaling: Option<ScalingSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentsSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    #[serde(default)]
    pub mongodb: MongoDbConfig,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    /// Image for the Benthos stream-processing engine the search service owns
    #[serde(default)]
    pub benthos_image: Option<String>,
    #[serde(default)]
    pub elastic_search: ElasticSearchConfig,
    #[serde(default)]
    pub batching: Option<BatchingSpec>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub scaling: Option<ScalingSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchingSpec {
    #[serde(default)]
    pub count: Option<i32>,
    /// Flush period, Benthos duration string (e.g. "1s")
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhooksSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    #[serde(default)]
    pub mongodb: MongoDbConfig,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub scaling: Option<ScalingSpec>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
