//! # Stack CRD
//!
//! Cluster-scoped, user-facing bundle: names a Configuration seed, a target
//! namespace and a public host, and optionally overrides any Configuration
//! field through a partial spec of the same shape.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::configuration::ConfigurationSpec;
use super::shared::StaticClient;

/// Stack Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: stack.fstack.dev/v1beta1
/// kind: Stack
/// metadata:
///   name: acme
/// spec:
///   seed: default
///   namespace: acme
///   host: acme.example.com
///   scheme: https
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Stack",
    group = "stack.fstack.dev",
    version = "v1beta1",
    status = "StackStatus",
    shortname = "stk",
    printcolumn = r#"{"name":"Seed", "type":"string", "jsonPath":".spec.seed"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    /// Name of the Configuration this Stack derives from
    pub seed: String,
    /// Namespace every derived child lives in; owned by the Stack
    pub namespace: String,
    /// Public host for all generated ingresses
    #[serde(default)]
    pub host: String,
    /// `http` or `https`; defaults to `https`
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Propagated to services as their dev-mode flag
    #[serde(default)]
    pub debug: bool,
    /// Partial Configuration overriding the seed field-by-field
    /// (scalars replace, arrays concatenate, maps union)
    #[serde(default)]
    pub overrides: Option<ConfigurationSpec>,
    /// Extra static OAuth clients appended to the seed's list
    #[serde(default)]
    pub static_clients: Vec<StaticClient>,
}

fn default_scheme() -> String {
    "https".to_string()
}

impl StackSpec {
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Issuer URL of the stack's auth service, also stamped on the routing
    /// middleware.
    pub fn auth_issuer(&self) -> String {
        format!("{}/api/auth", self.base_url())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
