//! # Traefik Middleware
//!
//! Minimal typed view of `traefik.io/v1alpha1` Middleware, enough to emit the
//! per-stack `auth-middleware` object the routing mesh consumes. The mesh
//! itself is an external collaborator.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Middleware",
    group = "traefik.io",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareSpec {
    /// Plugin entries keyed by plugin name; the operator emits a single
    /// `auth` entry carrying the stack's issuer URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<BTreeMap<String, serde_json::Value>>,
}

impl MiddlewareSpec {
    /// Body of the per-stack auth plugin: `{"Issuer": "<scheme>://<host>/api/auth"}`.
    pub fn auth_plugin(issuer: &str) -> Self {
        let mut plugin = BTreeMap::new();
        plugin.insert(
            "auth".to_string(),
            serde_json::json!({ "Issuer": issuer }),
        );
        Self {
            plugin: Some(plugin),
        }
    }
}
