//! # Auth Client Mutator
//!
//! Mirrors an OAuth client to the remote auth server and converges its
//! scope attachments. Scope references are by local AuthScope name; a
//! referenced scope without a server id yet causes a requeue, not an error.

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
use crate::controller::oauth::scope::ConnectFn;
use crate::crd::condition::{
    aggregate_ready, set_condition, types, Condition, ConditionHolder, ConditionStatus,
};
use crate::crd::oauth::{AuthClient, AuthClientSpec, AuthClientStatus, AuthScope};
use crate::crd::shared::identity_metadata;
use crate::external::oauth::{
    auth_server_url, AuthServerApi, ClientOptions, ClientRecord, HttpAuthServer,
};
use crate::external::ExternalError;

pub struct AuthClientMutator {
    client: Client,
    connect: ConnectFn,
}

impl AuthClientMutator {
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

fn desired_options(
    name: &str,
    spec: &AuthClientSpec,
    metadata: &BTreeMap<String, String>,
) -> ClientOptions {
    ClientOptions {
        public: spec.public,
        name: name.to_string(),
        description: spec.description.clone(),
        redirect_uris: spec.redirect_uris.clone(),
        post_logout_redirect_uris: spec.post_logout_redirect_uris.clone(),
        metadata: metadata.clone(),
    }
}

/// Remote-vs-desired match. Redirect arrays are order-insensitive: both
/// sides are sorted before comparing.
pub fn client_matches(remote: &ClientRecord, desired: &ClientOptions) -> bool {
    let sorted = |uris: &[String]| {
        let mut uris = uris.to_vec();
        uris.sort();
        uris
    };
    remote.public == desired.public
        && remote.name == desired.name
        && remote.description == desired.description
        && sorted(&remote.redirect_uris) == sorted(&desired.redirect_uris)
        && sorted(&remote.post_logout_redirect_uris) == sorted(&desired.post_logout_redirect_uris)
}

/// Delete the remote client for a resource being torn down. Mirrors
/// [`crate::controller::oauth::scope::teardown_scope`]: metadata lookup
/// covers a lost status id, absence counts as success.
pub async fn teardown_client(
    api: &dyn AuthServerApi,
    id: Option<String>,
    metadata: &BTreeMap<String, String>,
) -> Result<(), ExternalError> {
    let id = match id.filter(|id| !id.is_empty()) {
        Some(id) => Some(id),
        None => match api.read_client_by_metadata(metadata).await {
            Ok(remote) => Some(remote.id),
            Err(ExternalError::NotFound) => None,
            Err(err) => return Err(err),
        },
    };
    if let Some(id) = id {
        match api.delete_client(&id).await {
            Ok(()) | Err(ExternalError::NotFound) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Make sure the remote client exists and matches the desired options.
/// Returns the remote record and whether an update was issued.
pub async fn ensure_client(
    api: &dyn AuthServerApi,
    desired: &ClientOptions,
    status: &mut AuthClientStatus,
) -> Result<(ClientRecord, bool), ExternalError> {
    if let Some(id) = status.auth_server_id.clone().filter(|id| !id.is_empty()) {
        match api.read_client(&id).await {
            Ok(remote) => {
                if client_matches(&remote, desired) {
                    return Ok((remote, false));
                }
                api.update_client(&id, desired).await?;
                return Ok((api.read_client(&id).await?, true));
            }
            Err(ExternalError::NotFound) => status.auth_server_id = None,
            Err(err) => return Err(err),
        }
    }

    let remote = match api.read_client_by_metadata(&desired.metadata).await {
        Ok(remote) => {
            debug!(id = %remote.id, "adopted client by metadata");
            if client_matches(&remote, desired) {
                remote
            } else {
                api.update_client(&remote.id, desired).await?;
                api.read_client(&remote.id).await?
            }
        }
        Err(ExternalError::NotFound) => api.create_client(desired).await?,
        Err(err) => return Err(err),
    };
    status.auth_server_id = Some(remote.id.clone());
    Ok((remote, false))
}

/// Converge scope attachments. `scopes` maps each desired local scope name
/// to its server id when it has one; names without an id requeue.
pub async fn sync_client_scopes(
    api: &dyn AuthServerApi,
    remote: &ClientRecord,
    scopes: &BTreeMap<String, Option<String>>,
    status: &mut AuthClientStatus,
) -> Result<bool, ExternalError> {
    let mut need_requeue = false;
    let mut desired_ids = Vec::new();

    for (name, scope_id) in scopes {
        let Some(scope_id) = scope_id.as_ref().filter(|id| !id.is_empty()) else {
            need_requeue = true;
            continue;
        };
        desired_ids.push(scope_id.clone());
        if !remote.scopes.contains(scope_id) {
            api.add_scope_to_client(&remote.id, scope_id).await?;
        }
        status.scopes.insert(name.clone(), scope_id.clone());
    }

    for attached in &remote.scopes {
        if !desired_ids.contains(attached) {
            api.delete_scope_from_client(&remote.id, attached).await?;
        }
    }
    status.scopes.retain(|name, _| scopes.contains_key(name));

    Ok(need_requeue)
}

#[async_trait]
impl Mutator for AuthClientMutator {
    type Resource = AuthClient;

    fn name(&self) -> &'static str {
        "auth-client"
    }

    async fn mutate(&self, obj: &mut AuthClient) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let spec = obj.spec.clone();

        let clients: Api<AuthClient> = Api::namespaced(self.client.clone(), &namespace);
        let scopes: Api<AuthScope> = Api::namespaced(self.client.clone(), &namespace);
        let remote_api =
            (self.connect)(&auth_server_url(&namespace, &spec.auth_server_reference));
        let metadata = identity_metadata(&namespace, &name);

        let finalizer = finalizer::finalizer_name("AuthClient");
        let cleanup_api = remote_api.clone();
        let cleanup_id = obj
            .status
            .as_ref()
            .and_then(|s| s.auth_server_id.clone())
            .filter(|id| !id.is_empty());
        let cleanup_metadata = metadata.clone();
        let consumed = finalizer::handle(&clients, obj, &finalizer, || async move {
            teardown_client(cleanup_api.as_ref(), cleanup_id, &cleanup_metadata)
                .await
                .map_err(|err| ReconcilerError::External {
                    context: "Deleting remote client".to_string(),
                    source: err,
                })
        })
        .await?;
        if consumed {
            return Ok(Some(Action::await_change()));
        }
        finalizer::ensure_installed(&clients, obj, &finalizer).await?;

        let mut scope_ids: BTreeMap<String, Option<String>> = BTreeMap::new();
        for scope_name in &spec.scopes {
            let scope = scopes
                .get_opt(scope_name)
                .await
                .tag("Loading referenced scope")?;
            scope_ids.insert(
                scope_name.clone(),
                scope.and_then(|s| s.status.and_then(|s| s.auth_server_id)),
            );
        }

        let desired = desired_options(&name, &spec, &metadata);
        let mut status = obj.status.clone().unwrap_or_default();
        let sync = async {
            let (remote, updated) =
                ensure_client(remote_api.as_ref(), &desired, &mut status).await?;
            let requeue =
                sync_client_scopes(remote_api.as_ref(), &remote, &scope_ids, &mut status).await?;
            Ok::<(bool, bool), ExternalError>((updated, requeue))
        }
        .await;

        let (updated, need_requeue) = match sync {
            Ok(outcome) => outcome,
            Err(err) => {
                set_condition(
                    &mut status.conditions,
                    Condition::failed(types::CLIENT_CREATED, generation, err.to_string()),
                );
                obj.status = Some(status);
                return Err(ReconcilerError::External {
                    context: "Synchronizing client".to_string(),
                    source: err,
                });
            }
        };

        set_condition(
            &mut status.conditions,
            Condition::satisfied(types::CLIENT_CREATED, generation),
        );
        if updated {
            set_condition(
                &mut status.conditions,
                Condition::satisfied(types::CLIENT_UPDATED, generation),
            );
        }
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
        aggregate_ready(
            &mut status.conditions,
            &[types::CLIENT_CREATED, types::SCOPES_SYNCHRONIZED],
            generation,
        );
        obj.status = Some(status);

        if need_requeue {
            debug!(client = %name, "referenced scopes pending, requeueing");
            Ok(Some(Action::requeue(Duration::from_secs(
                DEFAULT_PENDING_REQUEUE_SECS,
            ))))
        } else {
            info!(client = %name, "client converged");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::oauth::InMemoryAuthServer;

    fn desired(name: &str) -> ClientOptions {
        ClientOptions {
            public: false,
            name: name.to_string(),
            description: Some("service client".to_string()),
            redirect_uris: vec!["https://b".to_string(), "https://a".to_string()],
            post_logout_redirect_uris: vec![],
            metadata: identity_metadata("acme", name),
        }
    }

    #[tokio::test]
    async fn creates_client_and_records_id() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthClientStatus::default();
        let (remote, updated) = ensure_client(&server, &desired("ledger"), &mut status)
            .await
            .unwrap();
        assert!(!updated);
        assert_eq!(status.auth_server_id.as_deref(), Some(remote.id.as_str()));
        assert_eq!(server.client_count(), 1);
    }

    #[tokio::test]
    async fn match_ignores_redirect_uri_order() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthClientStatus::default();
        let (_, _) = ensure_client(&server, &desired("ledger"), &mut status)
            .await
            .unwrap();

        let mut reordered = desired("ledger");
        reordered.redirect_uris = vec!["https://a".to_string(), "https://b".to_string()];
        let (_, updated) = ensure_client(&server, &reordered, &mut status).await.unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn divergence_triggers_update() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthClientStatus::default();
        ensure_client(&server, &desired("ledger"), &mut status)
            .await
            .unwrap();

        let mut changed = desired("ledger");
        changed.redirect_uris.push("https://c".to_string());
        let (remote, updated) = ensure_client(&server, &changed, &mut status).await.unwrap();
        assert!(updated);
        assert!(remote.redirect_uris.contains(&"https://c".to_string()));
    }

    #[tokio::test]
    async fn missing_scope_requeues_then_attaches() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthClientStatus::default();
        let (remote, _) = ensure_client(&server, &desired("ledger"), &mut status)
            .await
            .unwrap();

        // Scope "S1" referenced but not yet created on the server.
        let mut scopes = BTreeMap::from([("S1".to_string(), None)]);
        let requeue = sync_client_scopes(&server, &remote, &scopes, &mut status)
            .await
            .unwrap();
        assert!(requeue);
        assert!(status.scopes.is_empty());

        let s1 = server
            .create_scope("S1", &identity_metadata("acme", "S1"))
            .await
            .unwrap();
        scopes.insert("S1".to_string(), Some(s1.id.clone()));
        let remote = server.read_client(&remote.id).await.unwrap();
        let requeue = sync_client_scopes(&server, &remote, &scopes, &mut status)
            .await
            .unwrap();
        assert!(!requeue);
        assert_eq!(status.scopes["S1"], s1.id);
        let remote = server.read_client(&remote.id).await.unwrap();
        assert!(remote.scopes.contains(&s1.id));
    }

    #[tokio::test]
    async fn teardown_tolerates_lost_id_and_absence() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthClientStatus::default();
        ensure_client(&server, &desired("ledger"), &mut status)
            .await
            .unwrap();

        let metadata = identity_metadata("acme", "ledger");
        teardown_client(&server, None, &metadata).await.unwrap();
        assert_eq!(server.client_count(), 0);
        // Retried pass with the stale status id still succeeds.
        teardown_client(&server, status.auth_server_id, &metadata)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn detached_scope_is_removed() {
        let server = InMemoryAuthServer::new();
        let mut status = AuthClientStatus::default();
        let (remote, _) = ensure_client(&server, &desired("ledger"), &mut status)
            .await
            .unwrap();
        let s1 = server
            .create_scope("S1", &identity_metadata("acme", "S1"))
            .await
            .unwrap();
        let scopes = BTreeMap::from([("S1".to_string(), Some(s1.id.clone()))]);
        sync_client_scopes(&server, &remote, &scopes, &mut status)
            .await
            .unwrap();

        let remote = server.read_client(&remote.id).await.unwrap();
        sync_client_scopes(&server, &remote, &BTreeMap::new(), &mut status)
            .await
            .unwrap();
        let remote = server.read_client(&remote.id).await.unwrap();
        assert!(remote.scopes.is_empty());
        assert!(status.scopes.is_empty());
    }
}
