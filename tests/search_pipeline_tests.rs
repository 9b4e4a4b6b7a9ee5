//! # Search Pipeline Tests
//!
//! Builds the full ingestion stream document the way the ingester controller
//! does and converges it against the in-memory Benthos admin API.

use serde_json::json;

use stack_operator::controller::benthos::stream::sync_stream;
use stack_operator::controller::components::payments::event_pipeline;
use stack_operator::controller::ingester::stream_config;
use stack_operator::crd::configuration::BatchingSpec;
use stack_operator::crd::shared::{
    ElasticSearchConfig, KafkaConfig, KafkaSaslConfig,
};
use stack_operator::external::benthos::InMemoryBenthos;

fn kafka() -> KafkaConfig {
    KafkaConfig {
        brokers: vec!["kafka-0:9092".to_string(), "kafka-1:9092".to_string()],
        tls: true,
        sasl: Some(KafkaSaslConfig {
            username: "stack".to_string(),
            password: "secret".to_string(),
            mechanism: None,
        }),
    }
}

fn elastic() -> ElasticSearchConfig {
    ElasticSearchConfig {
        scheme: "https".to_string(),
        host: "es.infra.svc".to_string(),
        port: 9200,
        basic_auth: None,
    }
}

#[tokio::test]
async fn ingestion_stream_lands_on_the_server() {
    let benthos = InMemoryBenthos::new();
    let config = stream_config(
        &kafka(),
        "acme-payments",
        &event_pipeline("payments"),
        &elastic(),
        Some(&BatchingSpec {
            count: Some(100),
            period: Some("5s".to_string()),
        }),
    );

    sync_stream(&benthos, "acme-payments-ingester", &config)
        .await
        .unwrap();

    let remote = benthos.stream_config("acme-payments-ingester").unwrap();
    assert_eq!(remote["input"]["kafka"]["topics"][0], "acme-payments");
    assert_eq!(remote["input"]["kafka"]["tls"]["enabled"], true);
    assert_eq!(remote["input"]["kafka"]["sasl"]["mechanism"], "PLAIN");
    assert_eq!(remote["input"]["kafka"]["sasl"]["user"], "stack");
    let bulk = &remote["output"]["broker"]["outputs"][1]["http_client"];
    assert_eq!(bulk["url"], "https://es.infra.svc:9200/_bulk");
    assert_eq!(bulk["batching"]["count"], 100);
    // The pipeline fragment is carried verbatim.
    assert_eq!(remote["pipeline"], event_pipeline("payments"));
}

#[tokio::test]
async fn topic_change_is_repaired_in_place() {
    let benthos = InMemoryBenthos::new();
    let before = stream_config(&kafka(), "acme-payments", &json!({}), &elastic(), None);
    sync_stream(&benthos, "ingester", &before).await.unwrap();

    let after = stream_config(&kafka(), "acme-transfers", &json!({}), &elastic(), None);
    sync_stream(&benthos, "ingester", &after).await.unwrap();

    assert_eq!(benthos.stream_count(), 1);
    let remote = benthos.stream_config("ingester").unwrap();
    assert_eq!(remote["input"]["kafka"]["topics"][0], "acme-transfers");
}
