//! # Custom Resource Definitions
//!
//! All resource types driven by the operator. `Configuration` and `Stack`
//! are cluster-scoped; everything else lives in the stack's namespace.
//! Conditions and the `ConditionHolder` seam the kernel diffs on are in
//! [`condition`].

pub mod benthos;
pub mod components;
pub mod condition;
pub mod configuration;
pub mod ingester;
pub mod middleware;
pub mod oauth;
pub mod shared;
pub mod stack;

pub use benthos::{
    BenthosServer, BenthosServerSpec, BenthosServerStatus, BenthosStream, BenthosStreamSpec,
    BenthosStreamStatus,
};
pub use components::{
    AuthComponent, AuthComponentSpec, ComponentStatus, ControlComponent, ControlComponentSpec,
    LedgerComponent, LedgerComponentSpec, PaymentsComponent, PaymentsComponentSpec,
    SearchComponent, SearchComponentSpec, WebhooksComponent, WebhooksComponentSpec,
};
pub use condition::{Condition, ConditionHolder, ConditionStatus};
pub use configuration::{Configuration, ConfigurationSpec, ConfigurationStatus, ServicesSpec};
pub use ingester::{SearchIngester, SearchIngesterSpec, SearchIngesterStatus};
pub use middleware::{Middleware, MiddlewareSpec};
pub use oauth::{
    AuthClient, AuthClientSpec, AuthClientStatus, AuthScope, AuthScopeSpec, AuthScopeStatus,
    TransientRef,
};
pub use stack::{Stack, StackSpec, StackStatus};

use schemars::{Schema, SchemaGenerator};

/// Structural schema for opaque JSON documents carried on a spec
/// (Benthos stream configs, ingester pipeline fragments).
pub fn arbitrary_object_schema(_gen: &mut SchemaGenerator) -> Schema {
    let schema_value = serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    });
    Schema::try_from(schema_value).expect("Failed to create arbitrary object schema")
}

macro_rules! impl_condition_holder {
    ($($resource:ty),+ $(,)?) => {$(
        impl ConditionHolder for $resource {
            fn conditions(&self) -> &[Condition] {
                self.status
                    .as_ref()
                    .map(|s| s.conditions.as_slice())
                    .unwrap_or(&[])
            }

            fn conditions_mut(&mut self) -> &mut Vec<Condition> {
                &mut self.status.get_or_insert_with(Default::default).conditions
            }
        }
    )+};
}

impl_condition_holder!(
    Configuration,
    Stack,
    AuthComponent,
    LedgerComponent,
    PaymentsComponent,
    SearchComponent,
    WebhooksComponent,
    ControlComponent,
    BenthosServer,
    BenthosStream,
    SearchIngester,
    AuthScope,
    AuthClient,
);
