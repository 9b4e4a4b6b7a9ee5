//! # Resource Upserts
//!
//! Server-side apply and tolerant delete for the child resources mutators
//! derive. Typed objects don't serialize `apiVersion`/`kind`, so the apply
//! helper injects them before patching.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use super::error::{ReconcilerError, TagError};
use crate::constants::FIELD_MANAGER;

/// Strong owner reference: deletion of the owner blocks on the child, and
/// this controller is the managing controller.
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Upsert via server-side apply with this operator as field manager.
pub async fn apply<K>(api: &Api<K>, obj: &K, context: &str) -> Result<K, ReconcilerError>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = obj.name_any();
    let mut value = serde_json::to_value(obj)?;
    value["apiVersion"] = serde_json::Value::String(K::api_version(&()).into_owned());
    value["kind"] = serde_json::Value::String(K::kind(&()).into_owned());

    api.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&value),
    )
    .await
    .tag(context)
}

/// Delete a child by name; absence is success.
pub async fn delete_if_present<K>(
    api: &Api<K>,
    name: &str,
    context: &str,
) -> Result<(), ReconcilerError>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await.tag(context) {
        Ok(_) => Ok(()),
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err),
    }
}
