//! # Child Spec Derivation
//!
//! Pure functions turning a Stack plus its merged effective Configuration
//! into the six component specs. Database names, collector topics, and the
//! control client credentials all follow the stack name.

use kube::ResourceExt;

use crate::controller::error::ReconcilerError;
use crate::crd::components::{
    AuthComponentSpec, ControlComponentSpec, LedgerComponentSpec, PaymentsComponentSpec,
    SearchComponentSpec, WebhooksComponentSpec,
};
use crate::crd::configuration::ConfigurationSpec;
use crate::crd::shared::{CollectorConfig, IngressSpec, StaticClient};
use crate::crd::stack::Stack;

/// Names of the child resources inside the stack's namespace.
pub mod names {
    pub const AUTH: &str = "auth";
    pub const LEDGER: &str = "ledger";
    pub const PAYMENTS: &str = "payments";
    pub const SEARCH: &str = "search";
    pub const WEBHOOKS: &str = "webhooks";
    pub const CONTROL: &str = "control";
}

/// Seed static clients followed by the stack's extra ones.
pub fn static_clients(stack: &Stack, effective: &ConfigurationSpec) -> Vec<StaticClient> {
    let mut clients = effective
        .services
        .auth
        .as_ref()
        .map(|auth| auth.static_clients.clone())
        .unwrap_or_default();
    clients.extend(stack.spec.static_clients.clone());
    clients
}

/// Fill a per-service ingress override with the stack's host, a default
/// path, and the global TLS and annotation defaults. `None` stays `None`:
/// a service without an override gets no ingress.
fn derive_ingress(
    stack: &Stack,
    effective: &ConfigurationSpec,
    service: Option<&IngressSpec>,
    default_path: &str,
) -> Option<IngressSpec> {
    let service = service?;
    let global = effective.ingress.as_ref();

    let mut annotations = global.map(|g| g.annotations.clone()).unwrap_or_default();
    annotations.extend(service.annotations.clone());

    Some(IngressSpec {
        host: Some(
            service
                .host
                .clone()
                .unwrap_or_else(|| stack.spec.host.clone()),
        ),
        path: Some(
            service
                .path
                .clone()
                .unwrap_or_else(|| default_path.to_string()),
        ),
        tls: service
            .tls
            .clone()
            .or_else(|| global.and_then(|g| g.tls.clone())),
        annotations,
    })
}

fn collector(stack: &Stack, effective: &ConfigurationSpec, service: &str) -> Option<CollectorConfig> {
    effective.kafka.as_ref().map(|kafka| CollectorConfig {
        kafka: kafka.clone(),
        topic: format!("{}-{}", stack.name_any(), service),
    })
}

fn search_reference(effective: &ConfigurationSpec) -> Option<String> {
    effective
        .services
        .search
        .as_ref()
        .map(|_| names::SEARCH.to_string())
}

pub fn auth_component(stack: &Stack, effective: &ConfigurationSpec) -> Option<AuthComponentSpec> {
    let auth = effective.services.auth.as_ref()?;
    Some(AuthComponentSpec {
        image: auth.image.clone(),
        postgres: auth.postgres.clone(),
        database: format!("{}-auth", stack.name_any()),
        base_url: stack.spec.auth_issuer(),
        signing_key: auth.signing_key.clone(),
        delegated_oidc: auth.delegated_oidc.clone(),
        static_clients: static_clients(stack, effective),
        dev_mode: stack.spec.debug,
        ingress: derive_ingress(stack, effective, auth.ingress.as_ref(), "/api/auth"),
        monitoring: effective.monitoring.clone(),
    })
}

pub fn ledger_component(
    stack: &Stack,
    effective: &ConfigurationSpec,
) -> Option<LedgerComponentSpec> {
    let ledger = effective.services.ledger.as_ref()?;
    Some(LedgerComponentSpec {
        image: ledger.image.clone(),
        postgres: ledger.postgres.clone(),
        database: format!("{}-ledger", stack.name_any()),
        locking: ledger.locking.clone(),
        auth_client: None,
        collector: collector(stack, effective, names::LEDGER),
        search_index: effective
            .services
            .search
            .as_ref()
            .map(|_| stack.name_any()),
        ingress: derive_ingress(stack, effective, ledger.ingress.as_ref(), "/api/ledger"),
        monitoring: effective.monitoring.clone(),
        scaling: ledger.scaling.clone(),
    })
}

pub fn payments_component(
    stack: &Stack,
    effective: &ConfigurationSpec,
) -> Option<PaymentsComponentSpec> {
    let payments = effective.services.payments.as_ref()?;
    let mut mongodb = payments.mongodb.clone();
    if mongodb.database.is_empty() {
        mongodb.database = stack.name_any();
    }
    Some(PaymentsComponentSpec {
        image: payments.image.clone(),
        mongodb,
        auth_client: None,
        collector: collector(stack, effective, names::PAYMENTS),
        search_reference: search_reference(effective),
        ingress: derive_ingress(stack, effective, payments.ingress.as_ref(), "/api/payments"),
        monitoring: effective.monitoring.clone(),
    })
}

pub fn search_component(
    stack: &Stack,
    effective: &ConfigurationSpec,
) -> Option<SearchComponentSpec> {
    let search = effective.services.search.as_ref()?;
    Some(SearchComponentSpec {
        image: search.image.clone(),
        benthos_image: search.benthos_image.clone(),
        elastic_search: search.elastic_search.clone(),
        kafka: effective.kafka.clone().unwrap_or_default(),
        index: stack.name_any(),
        batching: search.batching.clone(),
        ingress: derive_ingress(stack, effective, search.ingress.as_ref(), "/api/search"),
        monitoring: effective.monitoring.clone(),
        scaling: search.scaling.clone(),
    })
}

pub fn webhooks_component(
    stack: &Stack,
    effective: &ConfigurationSpec,
) -> Option<WebhooksComponentSpec> {
    let webhooks = effective.services.webhooks.as_ref()?;
    let mut mongodb = webhooks.mongodb.clone();
    if mongodb.database.is_empty() {
        mongodb.database = stack.name_any();
    }
    Some(WebhooksComponentSpec {
        image: webhooks.image.clone(),
        mongodb,
        collector: collector(stack, effective, names::WEBHOOKS),
        search_reference: search_reference(effective),
        ingress: derive_ingress(stack, effective, webhooks.ingress.as_ref(), "/api/webhooks"),
        monitoring: effective.monitoring.clone(),
    })
}

/// The control UI authenticates with the second static client; its first
/// secret is the UI's client secret. A missing client or secret is a
/// permanent error surfaced on the `ControlReady` condition.
pub fn control_component(
    stack: &Stack,
    effective: &ConfigurationSpec,
) -> Option<Result<ControlComponentSpec, ReconcilerError>> {
    let control = effective.services.control.as_ref()?;

    let clients = static_clients(stack, effective);
    let ui_client = match clients.get(1) {
        Some(client) => client,
        None => return Some(Err(ReconcilerError::MissingControlClient)),
    };
    let secret = match ui_client.secrets.first() {
        Some(secret) => secret.clone(),
        None => return Some(Err(ReconcilerError::MissingControlClient)),
    };

    Some(Ok(ControlComponentSpec {
        image: control.image.clone(),
        api_url_front: format!("{}/api", stack.spec.base_url()),
        api_url_back: format!("{}/api", stack.spec.base_url()),
        auth_client_id: ui_client.id.clone(),
        auth_client_secret: secret,
        ingress: derive_ingress(stack, effective, control.ingress.as_ref(), "/"),
        monitoring: effective.monitoring.clone(),
        scaling: control.scaling.clone(),
        env: Default::default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::configuration::{
        AuthSpec, ControlSpec, LedgerSpec, SearchSpec, ServicesSpec, WebhooksSpec,
    };
    use crate::crd::shared::KafkaConfig;
    use crate::crd::stack::StackSpec;

    fn stack() -> Stack {
        Stack::new(
            "acme",
            StackSpec {
                seed: "default".to_string(),
                namespace: "acme".to_string(),
                host: "acme.example.com".to_string(),
                scheme: "https".to_string(),
                ..Default::default()
            },
        )
    }

    fn with_services(services: ServicesSpec) -> ConfigurationSpec {
        ConfigurationSpec {
            services,
            kafka: Some(KafkaConfig {
                brokers: vec!["kafka:9092".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn auth_database_and_issuer_follow_the_stack() {
        let effective = with_services(ServicesSpec {
            auth: Some(AuthSpec::default()),
            ..Default::default()
        });
        let auth = auth_component(&stack(), &effective).unwrap();
        assert_eq!(auth.database, "acme-auth");
        assert_eq!(auth.base_url, "https://acme.example.com/api/auth");
    }

    #[test]
    fn ledger_collector_topic_follows_the_stack() {
        let effective = with_services(ServicesSpec {
            ledger: Some(LedgerSpec::default()),
            search: Some(SearchSpec::default()),
            ..Default::default()
        });
        let ledger = ledger_component(&stack(), &effective).unwrap();
        assert_eq!(ledger.database, "acme-ledger");
        assert_eq!(ledger.collector.unwrap().topic, "acme-ledger");
        assert_eq!(ledger.search_index.as_deref(), Some("acme"));
    }

    #[test]
    fn collector_absent_without_message_bus() {
        let mut effective = with_services(ServicesSpec {
            webhooks: Some(WebhooksSpec::default()),
            ..Default::default()
        });
        effective.kafka = None;
        let webhooks = webhooks_component(&stack(), &effective).unwrap();
        assert!(webhooks.collector.is_none());
        assert_eq!(webhooks.mongodb.database, "acme");
    }

    #[test]
    fn disabled_service_derives_nothing() {
        let effective = with_services(ServicesSpec::default());
        assert!(ledger_component(&stack(), &effective).is_none());
        assert!(search_component(&stack(), &effective).is_none());
    }

    #[test]
    fn control_requires_the_second_static_client() {
        let mut effective = with_services(ServicesSpec {
            control: Some(ControlSpec::default()),
            auth: Some(AuthSpec {
                static_clients: vec![StaticClient {
                    id: "gateway".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        });
        let outcome = control_component(&stack(), &effective).unwrap();
        assert!(matches!(
            outcome,
            Err(ReconcilerError::MissingControlClient)
        ));

        effective
            .services
            .auth
            .as_mut()
            .unwrap()
            .static_clients
            .push(StaticClient {
                id: "control".to_string(),
                secrets: vec!["s3cret".to_string()],
                ..Default::default()
            });
        let control = control_component(&stack(), &effective).unwrap().unwrap();
        assert_eq!(control.auth_client_id, "control");
        assert_eq!(control.auth_client_secret, "s3cret");
    }

    #[test]
    fn global_tls_and_annotations_fold_into_service_ingress() {
        use crate::crd::shared::{IngressGlobalSpec, IngressTls};

        let mut effective = with_services(ServicesSpec {
            ledger: Some(LedgerSpec {
                ingress: Some(IngressSpec {
                    annotations: std::collections::BTreeMap::from([(
                        "b".to_string(),
                        "override".to_string(),
                    )]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        effective.ingress = Some(IngressGlobalSpec {
            tls: Some(IngressTls {
                enabled: true,
                secret_name: Some("acme-tls".to_string()),
            }),
            annotations: std::collections::BTreeMap::from([
                ("a".to_string(), "base".to_string()),
                ("b".to_string(), "base".to_string()),
            ]),
        });

        let ingress = ledger_component(&stack(), &effective)
            .unwrap()
            .ingress
            .unwrap();
        assert_eq!(ingress.annotations["a"], "base");
        assert_eq!(ingress.annotations["b"], "override");
        let tls = ingress.tls.unwrap();
        assert!(tls.enabled);
        assert_eq!(tls.secret_name.as_deref(), Some("acme-tls"));
    }

    #[test]
    fn ingress_defaults_fill_host_and_path() {
        let effective = with_services(ServicesSpec {
            ledger: Some(LedgerSpec {
                ingress: Some(IngressSpec::default()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let ledger = ledger_component(&stack(), &effective).unwrap();
        let ingress = ledger.ingress.unwrap();
        assert_eq!(ingress.host.as_deref(), Some("acme.example.com"));
        assert_eq!(ingress.path.as_deref(), Some("/api/ledger"));
    }
}
