//! # Component CRDs
//!
//! One custom resource per managed service (auth, ledger, payments, search,
//! webhooks, control). All are namespaced, owned by exactly one Stack, and
//! derived entirely by the Stack mutator; users do not edit them directly.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::Condition;
use super::configuration::{BatchingSpec, DelegatedOidcSpec};
use super::shared::{
    AuthClientCoordinates, CollectorConfig, ElasticSearchConfig, ImageSpec, IngressSpec,
    KafkaConfig, MongoDbConfig, MonitoringSpec, PostgresConfig, RedisConfig, ScalingSpec,
    StaticClient,
};

/// Status shared by every component: conditions only, all observed data is
/// carried by the conditions themselves.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "AuthComponent",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthComponentSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    pub postgres: PostgresConfig,
    /// Database name, `<stack>-auth`
    pub database: String,
    /// Public issuer URL, `<scheme>://<host>/api/auth`
    pub base_url: String,
    #[serde(default)]
    pub signing_key: Option<String>,
    #[serde(default)]
    pub delegated_oidc: Option<DelegatedOidcSpec>,
    #[serde(default)]
    pub static_clients: Vec<StaticClient>,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "LedgerComponent",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LedgerComponentSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    pub postgres: PostgresConfig,
    /// Database name, `<stack>-ledger`
    pub database: String,
    #[serde(default)]
    pub locking: Option<RedisConfig>,
    #[serde(default)]
    pub auth_client: Option<AuthClientCoordinates>,
    /// Topic `<stack>-ledger` when a message bus is configured
    #[serde(default)]
    pub collector: Option<CollectorConfig>,
    /// Search index events are ingested into; the stack name
    #[serde(default)]
    pub search_index: Option<String>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
    #[serde(default)]
    pub scaling: Option<ScalingSpec>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "PaymentsComponent",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PaymentsComponentSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    pub mongodb: MongoDbConfig,
    #[serde(default)]
    pub auth_client: Option<AuthClientCoordinates>,
    /// Topic `<stack>-payments`
    #[serde(default)]
    pub collector: Option<CollectorConfig>,
    /// Name of the SearchComponent the generated ingester targets
    #[serde(default)]
    pub search_reference: Option<String>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "SearchComponent",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SearchComponentSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    #[serde(default)]
    pub benthos_image: Option<String>,
    pub elastic_search: ElasticSearchConfig,
    pub kafka: KafkaConfig,
    /// Index name; the stack name
    pub index: String,
    #[serde(default)]
    pub batching: Option<BatchingSpec>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
    #[serde(default)]
    pub scaling: Option<ScalingSpec>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "WebhooksComponent",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WebhooksComponentSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    pub mongodb: MongoDbConfig,
    /// Topic `<stack>-webhooks`
    #[serde(default)]
    pub collector: Option<CollectorConfig>,
    #[serde(default)]
    pub search_reference: Option<String>,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ControlComponent",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "ComponentStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ControlComponentSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    /// Browser-facing API endpoint
    pub api_url_front: String,
    /// In-cluster API endpoint
    pub api_url_back: String,
    /// Static OAuth client the UI authenticates with; secret comes from
    /// the second static client on the effective auth spec
    pub auth_client_id: String,
    pub auth_client_secret: String,
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    #[serde(default)]
    pub monitoring: Option<MonitoringSpec>,
    #[serde(default)]
    pub scaling: Option<ScalingSpec>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}
