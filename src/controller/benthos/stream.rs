//! # Benthos Stream Mutator
//!
//! Keeps a named stream on a running Benthos server converged with the
//! spec's config document. Comparison is structural, on parsed JSON, never
//! on serialized bytes. Deletion runs through the finalizer so the remote
//! stream is removed before the record goes away.

use async_trait::async_trait;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::info;

use crate::controller::error::ReconcilerError;
use crate::controller::finalizer;
use crate::controller::kernel::Mutator;
use crate::crd::benthos::{BenthosServer, BenthosStream};
use crate::crd::condition::{set_condition, types, Condition, ConditionHolder};
use crate::external::benthos::{benthos_url, BenthosApi, HttpBenthos};
use crate::external::ExternalError;

type ConnectFn = Arc<dyn Fn(&str) -> Arc<dyn BenthosApi> + Send + Sync>;

pub struct BenthosStreamMutator {
    client: Client,
    connect: ConnectFn,
}

impl BenthosStreamMutator {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            connect: Arc::new(|url| Arc::new(HttpBenthos::new(url))),
        }
    }

    /// Swap the admin-API constructor; used by tests to inject the
    /// in-memory server.
    pub fn with_connect(client: Client, connect: ConnectFn) -> Self {
        Self { client, connect }
    }
}

/// Converge one remote stream: update on config drift, create when absent
/// (a 400 on create means someone else already created it), no-op otherwise.
pub async fn sync_stream(
    api: &dyn BenthosApi,
    id: &str,
    config: &serde_json::Value,
) -> Result<(), ExternalError> {
    match api.get_stream(id).await {
        Ok(detail) => {
            if detail.config != *config {
                api.update_stream(id, config).await?;
            }
            Ok(())
        }
        Err(ExternalError::NotFound) => match api.create_stream(id, config).await {
            Ok(()) | Err(ExternalError::AlreadyExists) => Ok(()),
            Err(err) => Err(err),
        },
        Err(err) => Err(err),
    }
}

#[async_trait]
impl Mutator for BenthosStreamMutator {
    type Resource = BenthosStream;

    fn name(&self) -> &'static str {
        "benthos-stream"
    }

    async fn mutate(&self, obj: &mut BenthosStream) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let reference = obj.spec.reference.clone();

        let streams: Api<BenthosStream> = Api::namespaced(self.client.clone(), &namespace);
        let servers: Api<BenthosServer> = Api::namespaced(self.client.clone(), &namespace);
        let server = match servers.get_opt(&reference).await {
            Ok(server) => server,
            Err(err) => {
                return Err(ReconcilerError::Kube {
                    context: "Loading benthos server".to_string(),
                    source: err,
                })
            }
        };
        let remote = server.as_ref().map(|server| {
            (self.connect)(&benthos_url(
                &namespace,
                &reference,
                server.spec.admin_port(),
            ))
        });

        let finalizer = finalizer::finalizer_name("BenthosStream");
        let cleanup_api = remote.clone();
        let cleanup_name = name.clone();
        let consumed = finalizer::handle(&streams, obj, &finalizer, || async move {
            // The server going away first takes its streams with it.
            let Some(api) = cleanup_api else { return Ok(()) };
            match api.delete_stream(&cleanup_name).await {
                Ok(()) | Err(ExternalError::NotFound) => Ok(()),
                Err(err) => Err(ReconcilerError::External {
                    context: "Deleting remote stream".to_string(),
                    source: err,
                }),
            }
        })
        .await?;
        if consumed {
            return Ok(Some(Action::await_change()));
        }
        finalizer::ensure_installed(&streams, obj, &finalizer).await?;

        let Some(remote) = remote else {
            set_condition(
                obj.conditions_mut(),
                Condition::failed(
                    types::READY,
                    generation,
                    format!("benthos server '{reference}' not found"),
                ),
            );
            return Err(ReconcilerError::transient(
                "Loading benthos server",
                anyhow::anyhow!("benthos server '{reference}' not found in '{namespace}'"),
            ));
        };

        if let Err(err) = sync_stream(remote.as_ref(), &name, &obj.spec.config).await {
            set_condition(
                obj.conditions_mut(),
                Condition::failed(types::READY, generation, err.to_string()),
            );
            return Err(ReconcilerError::External {
                context: "Synchronizing stream".to_string(),
                source: err,
            });
        }

        info!(stream = %name, server = %reference, "stream converged");
        set_condition(
            obj.conditions_mut(),
            Condition::satisfied(types::READY, generation),
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::benthos::InMemoryBenthos;
    use serde_json::json;

    #[tokio::test]
    async fn creates_absent_stream() {
        let benthos = InMemoryBenthos::new();
        sync_stream(&benthos, "ledger", &json!({"a": 1})).await.unwrap();
        assert_eq!(benthos.stream_config("ledger"), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn updates_on_config_drift() {
        let benthos = InMemoryBenthos::new();
        sync_stream(&benthos, "ledger", &json!({"a": 1})).await.unwrap();
        sync_stream(&benthos, "ledger", &json!({"a": 2})).await.unwrap();
        assert_eq!(benthos.stream_config("ledger"), Some(json!({"a": 2})));
        assert_eq!(benthos.stream_count(), 1);
    }

    #[tokio::test]
    async fn equal_config_is_a_no_op() {
        let benthos = InMemoryBenthos::new();
        sync_stream(&benthos, "ledger", &json!({"a": [1, 2]})).await.unwrap();
        // Second pass sees an equal parsed tree and issues nothing.
        sync_stream(&benthos, "ledger", &json!({"a": [1, 2]})).await.unwrap();
        assert_eq!(benthos.stream_count(), 1);
    }

    #[tokio::test]
    async fn recreates_after_external_delete() {
        let benthos = InMemoryBenthos::new();
        sync_stream(&benthos, "ledger", &json!({"a": 1})).await.unwrap();
        benthos.delete_stream("ledger").await.unwrap();
        sync_stream(&benthos, "ledger", &json!({"a": 1})).await.unwrap();
        assert_eq!(benthos.stream_config("ledger"), Some(json!({"a": 1})));
    }
}
