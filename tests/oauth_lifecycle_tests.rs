//! # OAuth Record Lifecycle Tests
//!
//! End-to-end flows against the in-memory auth server: scope and client
//! creation, transient grants between peers, adoption after a simulated
//! crash, and finalizer-style teardown.

use std::collections::BTreeMap;

use stack_operator::controller::oauth::client::{ensure_client, sync_client_scopes, teardown_client};
use stack_operator::controller::oauth::scope::{ensure_scope, sync_transients, teardown_scope};
use stack_operator::crd::oauth::{AuthClientStatus, AuthScopeStatus};
use stack_operator::crd::shared::identity_metadata;
use stack_operator::external::oauth::{AuthServerApi, ClientOptions, InMemoryAuthServer};

fn client_options(name: &str) -> ClientOptions {
    ClientOptions {
        public: false,
        name: name.to_string(),
        description: Some(format!("{name} service client")),
        redirect_uris: vec![format!("https://acme.example.com/api/{name}/callback")],
        post_logout_redirect_uris: vec![],
        metadata: identity_metadata("acme", name),
    }
}

#[tokio::test]
async fn scopes_client_and_grants_converge_together() {
    let server = InMemoryAuthServer::new();

    // Two scopes, ledger granting payments a transient scope.
    let mut ledger_status = AuthScopeStatus::default();
    let ledger = ensure_scope(
        &server,
        "ledger",
        &identity_metadata("acme", "ledger"),
        &mut ledger_status,
    )
    .await
    .unwrap();
    let mut payments_status = AuthScopeStatus::default();
    let payments = ensure_scope(
        &server,
        "payments",
        &identity_metadata("acme", "payments"),
        &mut payments_status,
    )
    .await
    .unwrap();

    let peers = BTreeMap::from([("payments".to_string(), Some(payments.id.clone()))]);
    let requeue = sync_transients(&server, &ledger, &peers, &mut ledger_status, Some(1))
        .await
        .unwrap();
    assert!(!requeue);

    // A client attached to the ledger scope.
    let mut client_status = AuthClientStatus::default();
    let (client, _) = ensure_client(&server, &client_options("control"), &mut client_status)
        .await
        .unwrap();
    let scopes = BTreeMap::from([("ledger".to_string(), Some(ledger.id.clone()))]);
    let requeue = sync_client_scopes(&server, &client, &scopes, &mut client_status)
        .await
        .unwrap();
    assert!(!requeue);

    let remote_ledger = server.read_scope(&ledger.id).await.unwrap();
    assert!(remote_ledger.transient.contains(&payments.id));
    let remote_client = server.read_client(&client.id).await.unwrap();
    assert!(remote_client.scopes.contains(&ledger.id));
    assert_eq!(server.scope_count(), 2);
    assert_eq!(server.client_count(), 1);
}

#[tokio::test]
async fn restart_with_lost_status_adopts_instead_of_duplicating() {
    let server = InMemoryAuthServer::new();

    let mut scope_status = AuthScopeStatus::default();
    let scope = ensure_scope(
        &server,
        "ledger",
        &identity_metadata("acme", "ledger"),
        &mut scope_status,
    )
    .await
    .unwrap();
    let mut client_status = AuthClientStatus::default();
    let (client, _) = ensure_client(&server, &client_options("control"), &mut client_status)
        .await
        .unwrap();

    // Fresh statuses, as after a crash between side effect and status write.
    let mut scope_status = AuthScopeStatus::default();
    let adopted_scope = ensure_scope(
        &server,
        "ledger",
        &identity_metadata("acme", "ledger"),
        &mut scope_status,
    )
    .await
    .unwrap();
    let mut client_status = AuthClientStatus::default();
    let (adopted_client, _) = ensure_client(&server, &client_options("control"), &mut client_status)
        .await
        .unwrap();

    assert_eq!(adopted_scope.id, scope.id);
    assert_eq!(adopted_client.id, client.id);
    assert_eq!(server.scope_count(), 1);
    assert_eq!(server.client_count(), 1);
}

#[tokio::test]
async fn teardown_is_idempotent() {
    let server = InMemoryAuthServer::new();
    let scope_metadata = identity_metadata("acme", "ledger");
    let client_metadata = identity_metadata("acme", "control");

    let mut scope_status = AuthScopeStatus::default();
    ensure_scope(&server, "ledger", &scope_metadata, &mut scope_status)
        .await
        .unwrap();
    let mut client_status = AuthClientStatus::default();
    ensure_client(&server, &client_options("control"), &mut client_status)
        .await
        .unwrap();

    // First deletion pass removes the remote records; a retried pass (the
    // kernel re-delivering the deletion event) must succeed on nothing.
    teardown_client(&server, client_status.auth_server_id.clone(), &client_metadata)
        .await
        .unwrap();
    teardown_client(&server, client_status.auth_server_id, &client_metadata)
        .await
        .unwrap();
    teardown_scope(&server, scope_status.auth_server_id.clone(), &scope_metadata)
        .await
        .unwrap();
    teardown_scope(&server, None, &scope_metadata).await.unwrap();
    assert_eq!(server.scope_count(), 0);
    assert_eq!(server.client_count(), 0);
}
