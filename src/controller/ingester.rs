//! # Search Ingester Mutator
//!
//! Materializes a BenthosStream from an ingester: message-bus consumer in,
//! the user's pipeline fragment verbatim, fan-out to stdout and the search
//! backend's bulk endpoint out.

use async_trait::async_trait;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use serde_json::json;

use super::apply::{apply, owner_reference};
use super::components::search::benthos_server_name;
use super::error::{ReconcilerError, TagError};
use super::kernel::Mutator;
use crate::constants::{SEARCH_CHECKPOINT_LIMIT, SEARCH_CONSUMER_GROUP};
use crate::crd::benthos::{BenthosStream, BenthosStreamSpec};
use crate::crd::components::SearchComponent;
use crate::crd::condition::{aggregate_ready, set_condition, types, Condition, ConditionHolder};
use crate::crd::configuration::BatchingSpec;
use crate::crd::ingester::SearchIngester;
use crate::crd::shared::{ElasticSearchConfig, KafkaConfig};

/// Full stream config document for one ingester.
pub fn stream_config(
    kafka: &KafkaConfig,
    topic: &str,
    pipeline: &serde_json::Value,
    elastic: &ElasticSearchConfig,
    batching: Option<&BatchingSpec>,
) -> serde_json::Value {
    let mut input = json!({
        "addresses": kafka.brokers,
        "topics": [topic],
        "consumer_group": SEARCH_CONSUMER_GROUP,
        "checkpoint_limit": SEARCH_CHECKPOINT_LIMIT,
    });
    if kafka.tls {
        input["tls"] = json!({ "enabled": true });
    }
    if let Some(sasl) = &kafka.sasl {
        input["sasl"] = json!({
            "mechanism": sasl.mechanism.clone().unwrap_or_else(|| "PLAIN".to_string()),
            "user": sasl.username,
            "password": sasl.password,
        });
    }

    let mut bulk = json!({
        "url": format!("{}/_bulk", elastic.endpoint()),
        "verb": "POST",
        "headers": { "Content-Type": "application/x-ndjson" },
    });
    if let Some(auth) = &elastic.basic_auth {
        bulk["basic_auth"] = json!({
            "enabled": true,
            "username": auth.username,
            "password": auth.password,
        });
    }
    if let Some(batching) = batching {
        bulk["batching"] = json!({
            "count": batching.count.unwrap_or(0),
            "period": batching.period.clone().unwrap_or_default(),
        });
    }

    json!({
        "input": { "kafka": input },
        "pipeline": pipeline,
        "output": {
            "broker": {
                "pattern": "fan_out",
                "outputs": [
                    { "stdout": {} },
                    { "http_client": bulk },
                ],
            },
        },
    })
}

pub struct IngesterMutator {
    client: Client,
}

impl IngesterMutator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Mutator for IngesterMutator {
    type Resource = SearchIngester;

    fn name(&self) -> &'static str {
        "search-ingester"
    }

    fn register(&self, controller: Controller<SearchIngester>) -> Controller<SearchIngester> {
        controller.owns(
            Api::<BenthosStream>::all(self.client.clone()),
            watcher::Config::default(),
        )
    }

    async fn mutate(&self, obj: &mut SearchIngester) -> Result<Option<Action>, ReconcilerError> {
        let generation = obj.meta().generation;
        let name = obj.name_any();
        let namespace = obj.namespace().unwrap_or_default();
        let spec = obj.spec.clone();

        let searches: Api<SearchComponent> = Api::namespaced(self.client.clone(), &namespace);
        let Some(search) = searches
            .get_opt(&spec.reference)
            .await
            .tag("Loading search component")?
        else {
            let message = format!("search component '{}' not found", spec.reference);
            set_condition(
                obj.conditions_mut(),
                Condition::failed(types::INGESTION_STREAM_READY, generation, message.clone()),
            );
            return Err(ReconcilerError::transient(
                "Loading search component",
                anyhow::anyhow!(message),
            ));
        };

        let config = stream_config(
            &search.spec.kafka,
            &spec.topic,
            &spec.pipeline,
            &search.spec.elastic_search,
            search.spec.batching.as_ref(),
        );

        let streams: Api<BenthosStream> = Api::namespaced(self.client.clone(), &namespace);
        let mut stream = BenthosStream::new(
            &name,
            BenthosStreamSpec {
                reference: benthos_server_name(&search.name_any()),
                config,
            },
        );
        stream.meta_mut().namespace = Some(namespace.clone());
        stream.meta_mut().owner_references = Some(vec![owner_reference(obj)]);

        let result = apply(&streams, &stream, "Reconciling benthos stream").await;
        match result {
            Ok(_) => {
                set_condition(
                    obj.conditions_mut(),
                    Condition::satisfied(types::INGESTION_STREAM_READY, generation),
                );
                aggregate_ready(
                    obj.conditions_mut(),
                    &[types::INGESTION_STREAM_READY],
                    generation,
                );
                Ok(None)
            }
            Err(err) => {
                set_condition(
                    obj.conditions_mut(),
                    Condition::failed(types::INGESTION_STREAM_READY, generation, err.to_string()),
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::shared::ElasticSearchBasicAuth;

    #[test]
    fn config_wires_consumer_group_and_bulk_endpoint() {
        let kafka = KafkaConfig {
            brokers: vec!["kafka-0:9092".to_string()],
            ..Default::default()
        };
        let elastic = ElasticSearchConfig {
            scheme: "https".to_string(),
            host: "es.infra.svc".to_string(),
            port: 9200,
            basic_auth: Some(ElasticSearchBasicAuth {
                username: "search".to_string(),
                password: "pw".to_string(),
            }),
        };
        let pipeline = json!({"processors": [{"bloblang": "root = this"}]});
        let config = stream_config(&kafka, "acme-ledger", &pipeline, &elastic, None);

        assert_eq!(config["input"]["kafka"]["consumer_group"], "search");
        assert_eq!(config["input"]["kafka"]["checkpoint_limit"], 1024);
        assert_eq!(config["input"]["kafka"]["topics"][0], "acme-ledger");
        assert_eq!(config["pipeline"], pipeline);
        let outputs = &config["output"]["broker"]["outputs"];
        assert_eq!(
            outputs[1]["http_client"]["url"],
            "https://es.infra.svc:9200/_bulk"
        );
        assert_eq!(outputs[1]["http_client"]["basic_auth"]["username"], "search");
    }

    #[test]
    fn batching_flows_into_the_bulk_output() {
        let config = stream_config(
            &KafkaConfig::default(),
            "t",
            &json!({}),
            &ElasticSearchConfig::default(),
            Some(&BatchingSpec {
                count: Some(50),
                period: Some("1s".to_string()),
            }),
        );
        let bulk = &config["output"]["broker"]["outputs"][1]["http_client"];
        assert_eq!(bulk["batching"]["count"], 50);
        assert_eq!(bulk["batching"]["period"], "1s");
    }
}
