//! # Benthos CRDs
//!
//! `BenthosServer` is a long-running stream-processing engine instance owned
//! by a SearchComponent; it exposes an HTTP admin API on which
//! `BenthosStream` definitions are created, updated, and deleted.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::shared::ImageSpec;

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "BenthosServer",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "BenthosServerStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BenthosServerSpec {
    #[serde(flatten)]
    pub image: ImageSpec,
    /// Admin API port, defaults to 4195
    #[serde(default)]
    pub port: Option<u16>,
}

impl BenthosServerSpec {
    pub fn admin_port(&self) -> u16 {
        self.port.unwrap_or(crate::constants::BENTHOS_ADMIN_PORT)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenthosServerStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A named stream definition pushed to a running Benthos server.
///
/// The config document is opaque to the operator; equality against the
/// remote config is decided on parsed JSON trees, never on serialized bytes.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "BenthosStream",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "BenthosStreamStatus",
    printcolumn = r#"{"name":"Server", "type":"string", "jsonPath":".spec.reference"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BenthosStreamSpec {
    /// Name of the BenthosServer in the same namespace
    pub reference: String,
    /// Opaque pipeline config document
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::arbitrary_object_schema")]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BenthosStreamStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
