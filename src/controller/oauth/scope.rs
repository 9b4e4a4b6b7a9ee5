//! # Auth Scope Mutator
//!
//! Mirrors a scope to the remote auth server. The server id lives only in
//! status; when it is missing the mutator first searches the server by the
//! stamped `{namespace, name}` metadata and adopts a hit, so a crash between
//! side effect and status write never creates a duplicate.

use async_trait::async_trait;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::DEFAULT_PENDING_REQUEUE_SECS;
use crate::controller::error::{ReconcilerError, TagError};
use crate::controller::finalizer;
use crate::controller::kernel::Mutator;
use crate::crd::condition::{
    aggregate_ready, set_condition, types, Condition, ConditionHolder, ConditionStatus,
};
use crate::crd::oauth::{AuthScope, AuthScopeStatus, TransientRef};
use crate::crd::shared::identity_metadata;
use crate::external::oauth::{auth_server_url, AuthServerApi, HttpAuthServer, ScopeRecord};
use crate::external::ExternalError;

pub type ConnectFn = Arc<dyn Fn(&str) -> Arc<dyn AuthServerApi> + Send + Sync>;

pub struct AuthScopeMutator {
    client: Client,
    connect: ConnectFn,
}

impl AuthScopeMutator {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            connect: Arc::new(|url| Arc::new(HttpAuthServer::new(url))),
        }
    }

    pub fn with_connect(client: Client, connect: ConnectFn) -> Self {
        Self { client, connect }
    }
}

/// Delete the remote scope for a resource being torn down. A lost status id
/// is resolved by metadata first; an already-absent remote record counts as
/// success so finalizer retries converge.
pub async fn teardown_scope(
    api: &dyn AuthServerApi,
    id: Option<String>,
    metadata: &BTreeMap<String, String>,
) -> Result<(), ExternalError> {
    let id = match id.filter(|id| !id.is_empty()) {
        Some(id) => Some(id),
        None => match api.read_scope_by_metadata(metadata).await {
            Ok(remote) => Some(remote.id),
            Err(ExternalError::NotFound) => None,
            Err(err) => return Err(err),
        },
    };
    if let Some(id) = id {
        match api.delete_scope(&id).await {
            Ok(()) | Err(ExternalError::NotFound) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Make sure the remote scope exists and matches the label, adopting by
/// metadata when the status id is missing and re-creating when the remote
/// record was deleted out-of-band.
pub async fn ensure_scope(
    api: &dyn AuthServerApi,
    label: &str,
    metadata: &BTreeMap<String, String>,
    status: &mut AuthScopeStatus,
) -> Result<ScopeRecord, ExternalError> {
    if let Some(id) = status.auth_server_id.clone().filter(|id| !id.is_empty()) {
        match api.read_scope(&id).await {
            Ok(mut remote) => {
                if remote.label != label {
                    api.update_scope(&id, label, metadata).await?;
                    remote.label = label.to_string();
                }
                return Ok(remote);
            }
            // Deleted out-of-band; drop the id and re-enter the create path.
            Err(ExternalError::NotFound) => status.auth_server_id = None,
            Err(err) => return Err(err),
        }
    }

    let remote = match api.read_scope_by_metadata(metadata).await {
        Ok(mut remote) => {
            debug!(id = %remote.id, "adopted scope by metadata");
            if remote.label != label {
                api.update_scope(&remote.id, label, metadata).await?;
                remote.label = label.to_string();
            }
            remote
        }
        Err(ExternalError::NotFound) => api.create_scope(label, metadata).await?,
        Err(err) => return Err(err),
    };
    status.auth_server_id = Some(remote.id.clone());
    Ok(remote)
}

/// Converge the transient grants of an existing remote scope.
///
/// `peers` maps each desired peer name to its server id, when the peer has
/// one. A peer without an id cannot be granted yet; the caller requeues.
pub async fn sync_transients(
    api: &dyn AuthServerApi,
    remote: &ScopeRecord,
    peers: &BTreeMap<String, Option<String>>,
    status: &mut AuthScopeStatus,
    generation: Option<i64>,
) -> Result<bool, ExternalError> {
    let mut need_requeue = false;
    let mut desired_ids = Vec::new();

    for (name, peer_id) in peers {
        let Some(peer_id) = peer_id.as_ref().filter(|id| !id.is_empty()) else {
            need_requeue = true;
            continue;
        };
        desired_ids.push(peer_id.clone());
        if !remote.transient.contains(peer_id) {
            api.add_transient_scope(&remote.id, peer_id).await?;
        }
        status.transient.insert(
            name.clone(),
            TransientRef {
                auth_server_id: peer_id.clone(),
                observed_generation: generation,
                date: Some(chrono::Utc::now().to_rfc3339()),
            },
        );
    }

    for transient in &remote.transient {
        if !desired_ids.contains(transient) {
            api.remove_transient_scope(&remote.id, transient).await?;
        }
    }
    status.transient.retain(|name, _| peers.contains_key(name));

    Ok(need_requeue)
}

#[async_trait]
impl Mutator for AuthScopeMutator {
    type Resource = AuthScope;

    fn name(&self) -> &'static str {
        "auth-scope"
    }

    async fn mutate(&self, obj: &mut AuthScope) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let spec = obj.spec.clone();

        let scopes: Api<AuthScope> = Api::namespaced(self.client.clone(), &namespace);
        let remote_api =
            (self.connect)(&auth_server_url(&namespace, &spec.auth_server_reference));
        let metadata = identity_metadata(&namespace, &name);

        let finalizer = finalizer::finalizer_name("AuthScope");
        let cleanup_api = remote_api.clone();
        let cleanup_id = obj
            .status
            .as_ref()
            .and_then(|s| s.auth_server_id.clone())
            .filter(|id| !id.is_empty());
        let cleanup_metadata = metadata.clone();
        let consumed = finalizer::handle(&scopes, obj, &finalizer, || async move {
            teardown_scope(cleanup_api.as_ref(), cleanup_id, &cleanup_metadata)
                .await
                .map_err(|err| ReconcilerError::External {
                    context: "Deleting remote scope".to_string(),
                    source: err,
                })
        })
        .await?;
        if consumed {
            return Ok(Some(Action::await_change()));
        }
        finalizer::ensure_installed(&scopes, obj, &finalizer).await?;

        // Gather peer server ids locally; unresolved peers requeue below.
        let mut peers: BTreeMap<String, Option<String>> = BTreeMap::new();
        for peer_name in &spec.transient {
            let peer = scopes
                .get_opt(peer_name)
                .await
                .tag("Loading transient peer scope")?;
            peers.insert(
                peer_name.clone(),
                peer.and_then(|p| p.status.and_then(|s| s.auth_server_id)),
            );
        }

        let mut status = obj.status.clone().unwrap_or_default();
        let sync = async {
            let remote = ensure_scope(remote_api.as_ref(), &spec.label, &metadata, &mut status)
                .await?;
            sync_transients(remote_api.as_ref(), &remote, &peers, &mut status, generation).await
        }
        .await;

        let need_requeue = match sync {
            Ok(need_requeue) => need_requeue,
            Err(err) => {
                status.conditions = {
                    let mut conditions = status.conditions;
                    set_condition(
                        &mut conditions,
                        Condition::failed(types::SCOPES_SYNCHRONIZED, generation, err.to_string()),
                    );
                    conditions
                };
                obj.status = Some(status);
                return Err(ReconcilerError::External {
                    context: "Synchronizing scope".to_string(),
                    source: err,
                });
            }
        };

        set_condition(
            &mut status.conditions,
            Condition::new(
                types::PROGRESSING,
                if need_requeue {
                    ConditionStatus::True
                } else {
                    ConditionStatus::False
                },
                generation,
            ),
        );
        set_condition(
            &mut status.conditions,
            Condition::new(
                types::SCOPES_SYNCHRONIZED,
                if need_requeue {
                    ConditionStatus::False
                } else {
                    ConditionStatus::True
                },
                generation,
            ),
        );
        aggregate_ready(&mut status.conditions, &[types::SCOPES_SYNCHRONIZED], generation);
        obj.status = Some(status);

        if need_requeue {
            debug!(scope = %name, "transient peers pending, requeueing");
            Ok(Some(Action::requeue(Duration::from_secs(
                DEFAULT_PENDING_REQUEUE_SECS,
            ))))
        } else {
            info!(scope = %name, "scope converged");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::oauth::InMemoryAuthServer;

    fn metadata() -> BTreeMap<String, String> {
        identity_metadata("acme", "ledger-read")
    }

    #[tokio::test]
    async fn creates_scope_and_records_id() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthScopeStatus::default();
        let remote = ensure_scope(&server, "ledger:read", &metadata(), &mut status)
            .await
            .unwrap();
        assert_eq!(status.auth_server_id.as_deref(), Some(remote.id.as_str()));
        assert_eq!(server.scope_count(), 1);
    }

    #[tokio::test]
    async fn adopts_existing_scope_by_metadata() {
        let server = InMemoryAuthServer::new();
        // Simulates a crash after the create side effect, before the status
        // write: the remote scope exists but the status carries no id.
        let existing = server.create_scope("ledger:read", &metadata()).await.unwrap();
        let mut status = AuthScopeStatus::default();
        let remote = ensure_scope(&server, "ledger:read", &metadata(), &mut status)
            .await
            .unwrap();
        assert_eq!(remote.id, existing.id);
        assert_eq!(server.scope_count(), 1);
    }

    #[tokio::test]
    async fn recreates_after_external_delete() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthScopeStatus::default();
        let first = ensure_scope(&server, "ledger:read", &metadata(), &mut status)
            .await
            .unwrap();
        server.delete_scope(&first.id).await.unwrap();
        let second = ensure_scope(&server, "ledger:read", &metadata(), &mut status)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(status.auth_server_id.as_deref(), Some(second.id.as_str()));
    }

    #[tokio::test]
    async fn label_drift_triggers_update() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthScopeStatus::default();
        ensure_scope(&server, "old-label", &metadata(), &mut status)
            .await
            .unwrap();
        let remote = ensure_scope(&server, "new-label", &metadata(), &mut status)
            .await
            .unwrap();
        assert_eq!(remote.label, "new-label");
        let id = status.auth_server_id.clone().unwrap();
        assert_eq!(server.read_scope(&id).await.unwrap().label, "new-label");
    }

    #[tokio::test]
    async fn missing_peer_requeues_then_converges() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthScopeStatus::default();
        let remote = ensure_scope(&server, "parent", &metadata(), &mut status)
            .await
            .unwrap();

        let mut peers = BTreeMap::from([("child".to_string(), None)]);
        let requeue = sync_transients(&server, &remote, &peers, &mut status, Some(1))
            .await
            .unwrap();
        assert!(requeue);
        assert!(status.transient.is_empty());

        let child = server
            .create_scope("child", &identity_metadata("acme", "child"))
            .await
            .unwrap();
        peers.insert("child".to_string(), Some(child.id.clone()));
        let remote = server.read_scope(&remote.id).await.unwrap();
        let requeue = sync_transients(&server, &remote, &peers, &mut status, Some(1))
            .await
            .unwrap();
        assert!(!requeue);
        assert_eq!(status.transient["child"].auth_server_id, child.id);
        let remote = server.read_scope(&remote.id).await.unwrap();
        assert!(remote.transient.contains(&child.id));
    }

    #[tokio::test]
    async fn teardown_resolves_a_lost_id_by_metadata() {
        let server = InMemoryAuthServer::new();
        server.create_scope("ledger:read", &metadata()).await.unwrap();
        // Status id lost, as after a crash before the status write.
        teardown_scope(&server, None, &metadata()).await.unwrap();
        assert_eq!(server.scope_count(), 0);
    }

    #[tokio::test]
    async fn teardown_of_an_absent_scope_succeeds() {
        let server = InMemoryAuthServer::new();
        let remote = server.create_scope("ledger:read", &metadata()).await.unwrap();
        teardown_scope(&server, Some(remote.id.clone()), &metadata())
            .await
            .unwrap();
        // A retried finalizer pass finds nothing and still succeeds.
        teardown_scope(&server, Some(remote.id), &metadata())
            .await
            .unwrap();
        teardown_scope(&server, None, &metadata()).await.unwrap();
        assert_eq!(server.scope_count(), 0);
    }

    #[tokio::test]
    async fn removed_peer_revokes_the_grant() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthScopeStatus::default();
        let parent = ensure_scope(&server, "parent", &metadata(), &mut status)
            .await
            .unwrap();
        let child = server
            .create_scope("child", &identity_metadata("acme", "child"))
            .await
            .unwrap();

        let peers = BTreeMap::from([("child".to_string(), Some(child.id.clone()))]);
        let parent_remote = server.read_scope(&parent.id).await.unwrap();
        sync_transients(&server, &parent_remote, &peers, &mut status, Some(1))
            .await
            .unwrap();

        let parent_remote = server.read_scope(&parent.id).await.unwrap();
        sync_transients(&server, &parent_remote, &BTreeMap::new(), &mut status, Some(2))
            .await
            .unwrap();
        let parent_remote = server.read_scope(&parent.id).await.unwrap();
        assert!(parent_remote.transient.is_empty());
        assert!(status.transient.is_empty());
    }
}
