//! # SearchIngester CRD
//!
//! Declarative pipeline forwarding a producer service's events from the
//! message bus into the search backend. Owned by the producer component;
//! materializes a BenthosStream on the Search component's Benthos server.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "SearchIngester",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "SearchIngesterStatus",
    printcolumn = r#"{"name":"Search", "type":"string", "jsonPath":".spec.reference"}, {"name":"Topic", "type":"string", "jsonPath":".spec.topic"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SearchIngesterSpec {
    /// Name of the SearchComponent in the same namespace
    pub reference: String,
    /// Message-bus topic consumed by the generated stream
    pub topic: String,
    /// User-supplied pipeline fragment, embedded verbatim between the
    /// generated input and output sections
    #[serde(default)]
    #[schemars(schema_with = "crate::crd::arbitrary_object_schema")]
    pub pipeline: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchIngesterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
