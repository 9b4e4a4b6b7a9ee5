//! # Shared Spec Fragments
//!
//! Building blocks reused across the Configuration, Stack, and component
//! resources: images, scaling, backing-store coordinates, ingress shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to an image pull secret by name
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImagePullSecretRef {
    pub name: String,
}

/// Container image plus pull secrets
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Full image reference, tag included (e.g. `ghcr.io/org/ledger:v1.2.3`)
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_pull_secrets: Vec<ImagePullSecretRef>,
}

/// Horizontal scaling bounds fed into the generated autoscaler
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScalingSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_replicas: Option<i32>,
    #[serde(default)]
    pub max_replicas: Option<i32>,
    /// Target average CPU utilization percentage
    #[serde(default)]
    pub cpu: Option<i32>,
}

/// Per-service ingress override
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub tls: Option<IngressTls>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressTls {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub secret_name: Option<String>,
}

/// Cluster-wide ingress defaults carried on the Configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressGlobalSpec {
    #[serde(default)]
    pub tls: Option<IngressTls>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Postgres coordinates for a component's backing database
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostgresConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// When set, an init container creates the database if it does not exist
    #[serde(default)]
    pub create_database: bool,
}

/// Document-store coordinates (payments and webhooks)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongoDbConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    /// Use a `mongodb+srv://` DNS seed-list URI instead of host:port
    #[serde(default)]
    pub use_srv: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: String,
}

/// Message-bus coordinates
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConfig {
    #[serde(default)]
    pub brokers: Vec<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub sasl: Option<KafkaSaslConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaSaslConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub mechanism: Option<String>,
}

/// Message-bus topic a component publishes its events to
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectorConfig {
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub topic: String,
}

/// Search backend coordinates
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElasticSearchConfig {
    /// `http` or `https`
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub basic_auth: Option<ElasticSearchBasicAuth>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElasticSearchBasicAuth {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl ElasticSearchConfig {
    pub fn endpoint(&self) -> String {
        let scheme = if self.scheme.is_empty() {
            "http"
        } else {
            self.scheme.as_str()
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Trace exporter defaults shared by every workload
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    #[serde(default)]
    pub traces: Option<TracesSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TracesSpec {
    #[serde(default)]
    pub otlp: Option<OtlpSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpec {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub insecure: bool,
    /// `grpc` or `http`
    #[serde(default)]
    pub mode: Option<String>,
}

/// Static OAuth client declared on the Configuration or Stack
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaticClient {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Redis coordinates used by the ledger's distributed lock
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub tls: bool,
}

/// Coordinates of the OAuth client a component authenticates with
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthClientCoordinates {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

/// Map of `{namespace, name}` stamped on every remote OAuth object, used to
/// recover server ids after a crash between side effect and status write.
pub fn identity_metadata(namespace: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("namespace".to_string(), namespace.to_string()),
        ("name".to_string(), name.to_string()),
    ])
}
