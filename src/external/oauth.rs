//! # OAuth Admin API
//!
//! Adapter for the auth server's admin REST surface: scopes, clients, scope
//! attachment, and transient-scope grants. Remote objects carry a
//! `{namespace, name}` metadata map stamped by the operator, used to recover
//! a lost server id after a crash between side effect and status write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::ExternalError;

/// A scope as the auth server reports it
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScopeRecord {
    pub id: String,
    pub label: String,
    /// Server ids of transient scopes granted with this one
    #[serde(default)]
    pub transient: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A client as the auth server reports it
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClientRecord {
    pub id: String,
    pub public: bool,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    /// Server ids of attached scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Desired client shape sent on create and update
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientOptions {
    pub public: bool,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Admin operations on the remote auth server.
///
/// 404 surfaces as [`ExternalError::NotFound`]; every other non-2xx is
/// wrapped. All operations are idempotent from the caller's perspective.
#[async_trait]
pub trait AuthServerApi: Send + Sync {
    async fn list_scopes(&self) -> Result<Vec<ScopeRecord>, ExternalError>;
    async fn create_scope(
        &self,
        label: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ScopeRecord, ExternalError>;
    async fn read_scope(&self, id: &str) -> Result<ScopeRecord, ExternalError>;
    /// Look up a scope by its stamped `{namespace, name}` metadata
    async fn read_scope_by_metadata(
        &self,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ScopeRecord, ExternalError>;
    async fn update_scope(
        &self,
        id: &str,
        label: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ExternalError>;
    async fn delete_scope(&self, id: &str) -> Result<(), ExternalError>;
    async fn add_transient_scope(&self, scope: &str, transient: &str)
        -> Result<(), ExternalError>;
    async fn remove_transient_scope(
        &self,
        scope: &str,
        transient: &str,
    ) -> Result<(), ExternalError>;

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, ExternalError>;
    async fn create_client(&self, options: &ClientOptions) -> Result<ClientRecord, ExternalError>;
    async fn read_client(&self, id: &str) -> Result<ClientRecord, ExternalError>;
    async fn read_client_by_metadata(
        &self,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ClientRecord, ExternalError>;
    async fn update_client(
        &self,
        id: &str,
        options: &ClientOptions,
    ) -> Result<(), ExternalError>;
    async fn delete_client(&self, id: &str) -> Result<(), ExternalError>;
    async fn add_scope_to_client(&self, client: &str, scope: &str) -> Result<(), ExternalError>;
    async fn delete_scope_from_client(
        &self,
        client: &str,
        scope: &str,
    ) -> Result<(), ExternalError>;
}

/// In-cluster URL of the auth server for a given component reference. The
/// host is the referenced component's service name.
pub fn auth_server_url(namespace: &str, reference: &str) -> String {
    format!(
        "http://{}.{namespace}.{}:{}",
        crate::controller::workload::workload_name(namespace, reference),
        crate::constants::CLUSTER_DOMAIN,
        crate::constants::SERVICE_PORT
    )
}

/// Production adapter over the auth server's admin REST API.
#[derive(Debug, Clone)]
pub struct HttpAuthServer {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAuthServer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn expect_ok(response: reqwest::Response) -> Result<reqwest::Response, ExternalError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ExternalError::from_response(response).await)
        }
    }
}

#[async_trait]
impl AuthServerApi for HttpAuthServer {
    async fn list_scopes(&self) -> Result<Vec<ScopeRecord>, ExternalError> {
        let response = self.http.get(self.url("/scopes")).send().await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    async fn create_scope(
        &self,
        label: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ScopeRecord, ExternalError> {
        let body = serde_json::json!({ "label": label, "metadata": metadata });
        let response = self
            .http
            .post(self.url("/scopes"))
            .json(&body)
            .send()
            .await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    async fn read_scope(&self, id: &str) -> Result<ScopeRecord, ExternalError> {
        let response = self.http.get(self.url(&format!("/scopes/{id}"))).send().await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    async fn read_scope_by_metadata(
        &self,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ScopeRecord, ExternalError> {
        // The admin API has no metadata filter; list and match locally.
        let scopes = self.list_scopes().await?;
        scopes
            .into_iter()
            .find(|s| s.metadata == *metadata)
            .ok_or(ExternalError::NotFound)
    }

    async fn update_scope(
        &self,
        id: &str,
        label: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ExternalError> {
        let body = serde_json::json!({ "label": label, "metadata": metadata });
        let response = self
            .http
            .put(self.url(&format!("/scopes/{id}")))
            .json(&body)
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    async fn delete_scope(&self, id: &str) -> Result<(), ExternalError> {
        let response = self
            .http
            .delete(self.url(&format!("/scopes/{id}")))
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    async fn add_transient_scope(
        &self,
        scope: &str,
        transient: &str,
    ) -> Result<(), ExternalError> {
        let response = self
            .http
            .put(self.url(&format!("/scopes/{scope}/transient/{transient}")))
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    async fn remove_transient_scope(
        &self,
        scope: &str,
        transient: &str,
    ) -> Result<(), ExternalError> {
        let response = self
            .http
            .delete(self.url(&format!("/scopes/{scope}/transient/{transient}")))
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, ExternalError> {
        let response = self.http.get(self.url("/clients")).send().await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    async fn create_client(&self, options: &ClientOptions) -> Result<ClientRecord, ExternalError> {
        let response = self
            .http
            .post(self.url("/clients"))
            .json(options)
            .send()
            .await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    async fn read_client(&self, id: &str) -> Result<ClientRecord, ExternalError> {
        let response = self
            .http
            .get(self.url(&format!("/clients/{id}")))
            .send()
            .await?;
        Ok(Self::expect_ok(response).await?.json().await?)
    }

    async fn read_client_by_metadata(
        &self,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ClientRecord, ExternalError> {
        let clients = self.list_clients().await?;
        clients
            .into_iter()
            .find(|c| c.metadata == *metadata)
            .ok_or(ExternalError::NotFound)
    }

    async fn update_client(
        &self,
        id: &str,
        options: &ClientOptions,
    ) -> Result<(), ExternalError> {
        let response = self
            .http
            .put(self.url(&format!("/clients/{id}")))
            .json(options)
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    async fn delete_client(&self, id: &str) -> Result<(), ExternalError> {
        let response = self
            .http
            .delete(self.url(&format!("/clients/{id}")))
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    async fn add_scope_to_client(&self, client: &str, scope: &str) -> Result<(), ExternalError> {
        let response = self
            .http
            .put(self.url(&format!("/clients/{client}/scopes/{scope}")))
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }

    async fn delete_scope_from_client(
        &self,
        client: &str,
        scope: &str,
    ) -> Result<(), ExternalError> {
        let response = self
            .http
            .delete(self.url(&format!("/clients/{client}/scopes/{scope}")))
            .send()
            .await?;
        Self::expect_ok(response).await.map(|_| ())
    }
}

/// In-memory auth server used by the test suite.
///
/// Holds a mutex around its maps; semantics mirror the production server,
/// including 404 on unknown ids.
#[derive(Debug, Default)]
pub struct InMemoryAuthServer {
    state: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    scopes: HashMap<String, ScopeRecord>,
    clients: HashMap<String, ClientRecord>,
    next_id: u64,
}

impl InMemoryState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("id-{}", self.next_id)
    }
}

impl InMemoryAuthServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of scopes currently on the server (test assertions).
    pub fn scope_count(&self) -> usize {
        self.lock().scopes.len()
    }

    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }
}

#[async_trait]
impl AuthServerApi for InMemoryAuthServer {
    async fn list_scopes(&self) -> Result<Vec<ScopeRecord>, ExternalError> {
        Ok(self.lock().scopes.values().cloned().collect())
    }

    async fn create_scope(
        &self,
        label: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ScopeRecord, ExternalError> {
        let mut state = self.lock();
        let id = state.allocate_id();
        let record = ScopeRecord {
            id: id.clone(),
            label: label.to_string(),
            transient: Vec::new(),
            metadata: metadata.clone(),
        };
        state.scopes.insert(id, record.clone());
        Ok(record)
    }

    async fn read_scope(&self, id: &str) -> Result<ScopeRecord, ExternalError> {
        self.lock().scopes.get(id).cloned().ok_or(ExternalError::NotFound)
    }

    async fn read_scope_by_metadata(
        &self,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ScopeRecord, ExternalError> {
        self.lock()
            .scopes
            .values()
            .find(|s| s.metadata == *metadata)
            .cloned()
            .ok_or(ExternalError::NotFound)
    }

    async fn update_scope(
        &self,
        id: &str,
        label: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), ExternalError> {
        let mut state = self.lock();
        let scope = state.scopes.get_mut(id).ok_or(ExternalError::NotFound)?;
        scope.label = label.to_string();
        scope.metadata = metadata.clone();
        Ok(())
    }

    async fn delete_scope(&self, id: &str) -> Result<(), ExternalError> {
        self.lock()
            .scopes
            .remove(id)
            .map(|_| ())
            .ok_or(ExternalError::NotFound)
    }

    async fn add_transient_scope(
        &self,
        scope: &str,
        transient: &str,
    ) -> Result<(), ExternalError> {
        let mut state = self.lock();
        if !state.scopes.contains_key(transient) {
            return Err(ExternalError::NotFound);
        }
        let record = state.scopes.get_mut(scope).ok_or(ExternalError::NotFound)?;
        if !record.transient.iter().any(|t| t == transient) {
            record.transient.push(transient.to_string());
        }
        Ok(())
    }

    async fn remove_transient_scope(
        &self,
        scope: &str,
        transient: &str,
    ) -> Result<(), ExternalError> {
        let mut state = self.lock();
        let record = state.scopes.get_mut(scope).ok_or(ExternalError::NotFound)?;
        record.transient.retain(|t| t != transient);
        Ok(())
    }

    async fn list_clients(&self) -> Result<Vec<ClientRecord>, ExternalError> {
        Ok(self.lock().clients.values().cloned().collect())
    }

    async fn create_client(&self, options: &ClientOptions) -> Result<ClientRecord, ExternalError> {
        let mut state = self.lock();
        let id = state.allocate_id();
        let record = ClientRecord {
            id: id.clone(),
            public: options.public,
            name: options.name.clone(),
            description: options.description.clone(),
            redirect_uris: options.redirect_uris.clone(),
            post_logout_redirect_uris: options.post_logout_redirect_uris.clone(),
            scopes: Vec::new(),
            metadata: options.metadata.clone(),
        };
        state.clients.insert(id, record.clone());
        Ok(record)
    }

    async fn read_client(&self, id: &str) -> Result<ClientRecord, ExternalError> {
        self.lock()
            .clients
            .get(id)
            .cloned()
            .ok_or(ExternalError::NotFound)
    }

    async fn read_client_by_metadata(
        &self,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ClientRecord, ExternalError> {
        self.lock()
            .clients
            .values()
            .find(|c| c.metadata == *metadata)
            .cloned()
            .ok_or(ExternalError::NotFound)
    }

    async fn update_client(
        &self,
        id: &str,
        options: &ClientOptions,
    ) -> Result<(), ExternalError> {
        let mut state = self.lock();
        let client = state.clients.get_mut(id).ok_or(ExternalError::NotFound)?;
        client.public = options.public;
        client.name = options.name.clone();
        client.description = options.description.clone();
        client.redirect_uris = options.redirect_uris.clone();
        client.post_logout_redirect_uris = options.post_logout_redirect_uris.clone();
        client.metadata = options.metadata.clone();
        Ok(())
    }

    async fn delete_client(&self, id: &str) -> Result<(), ExternalError> {
        self.lock()
            .clients
            .remove(id)
            .map(|_| ())
            .ok_or(ExternalError::NotFound)
    }

    async fn add_scope_to_client(&self, client: &str, scope: &str) -> Result<(), ExternalError> {
        let mut state = self.lock();
        if !state.scopes.contains_key(scope) {
            return Err(ExternalError::NotFound);
        }
        let record = state.clients.get_mut(client).ok_or(ExternalError::NotFound)?;
        if !record.scopes.iter().any(|s| s == scope) {
            record.scopes.push(scope.to_string());
        }
        Ok(())
    }

    async fn delete_scope_from_client(
        &self,
        client: &str,
        scope: &str,
    ) -> Result<(), ExternalError> {
        let mut state = self.lock();
        let record = state.clients.get_mut(client).ok_or(ExternalError::NotFound)?;
        record.scopes.retain(|s| s != scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::shared::identity_metadata;

    #[tokio::test]
    async fn in_memory_server_round_trips_scopes() {
        let server = InMemoryAuthServer::new();
        let metadata = identity_metadata("ns", "read-ledger");
        let created = server.create_scope("ledger:read", &metadata).await.unwrap();
        assert!(!created.id.is_empty());

        let by_metadata = server.read_scope_by_metadata(&metadata).await.unwrap();
        assert_eq!(by_metadata.id, created.id);

        server.delete_scope(&created.id).await.unwrap();
        assert!(matches!(
            server.read_scope(&created.id).await,
            Err(ExternalError::NotFound)
        ));
    }

    #[tokio::test]
    async fn transient_grants_require_existing_peer() {
        let server = InMemoryAuthServer::new();
        let scope = server
            .create_scope("a", &identity_metadata("ns", "a"))
            .await
            .unwrap();
        assert!(matches!(
            server.add_transient_scope(&scope.id, "missing").await,
            Err(ExternalError::NotFound)
        ));

        let peer = server
            .create_scope("b", &identity_metadata("ns", "b"))
            .await
            .unwrap();
        server.add_transient_scope(&scope.id, &peer.id).await.unwrap();
        let read = server.read_scope(&scope.id).await.unwrap();
        assert_eq!(read.transient, vec![peer.id]);
    }

    #[test]
    fn auth_server_url_shape() {
        assert_eq!(
            auth_server_url("acme", "auth"),
            "http://acme-auth.acme.svc.cluster.local:8080"
        );
    }
}
