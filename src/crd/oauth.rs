//! # AuthScope and AuthClient CRDs
//!
//! OAuth scopes and clients mirrored to a remote auth server. Spec references
//! between them are by name; server-assigned ids live only in status. A
//! non-empty `status.authServerId` means the object exists (or existed) on
//! the remote server; clearing it forces a re-creation attempt.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::condition::Condition;

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "AuthScope",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "AuthScopeStatus",
    printcolumn = r#"{"name":"Label", "type":"string", "jsonPath":".spec.label"}, {"name":"Server ID", "type":"string", "jsonPath":".status.authServerId"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthScopeSpec {
    /// Human-readable scope label, kept in sync on the remote server
    pub label: String,
    /// Names of peer AuthScope resources automatically granted to holders
    /// of this scope
    #[serde(default)]
    pub transient: Vec<String>,
    /// Name of the AuthComponent whose server holds the remote record
    pub auth_server_reference: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthScopeStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Server-assigned id; empty until the remote scope exists
    #[serde(default)]
    pub auth_server_id: Option<String>,
    /// Registered transient grants, keyed by peer scope name
    #[serde(default)]
    pub transient: BTreeMap<String, TransientRef>,
}

/// Record of a transient grant registered on the server
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransientRef {
    /// Peer scope's server-assigned id
    pub auth_server_id: String,
    /// Generation of this scope when the grant was registered
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// When the grant was registered (RFC3339)
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "AuthClient",
    group = "stack.fstack.dev",
    version = "v1beta1",
    namespaced,
    status = "AuthClientStatus",
    printcolumn = r#"{"name":"Server ID", "type":"string", "jsonPath":".status.authServerId"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthClientSpec {
    /// Public (no secret) client
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    /// Names of AuthScope resources to attach; each must have a server id
    /// before attachment proceeds
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Name of the AuthComponent whose server holds the remote record
    pub auth_server_reference: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthClientStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Server-assigned id; empty until the remote client exists
    #[serde(default)]
    pub auth_server_id: Option<String>,
    /// Attached scopes, name of the local AuthScope to its server id
    #[serde(default)]
    pub scopes: BTreeMap<String, String>,
}
