//! # Configuration Merge
//!
//! Field-by-field merge of a Configuration seed with a Stack's partial
//! overrides. Scalars replace the base when non-zero, options when present,
//! arrays concatenate (base then override), maps union with the override
//! winning on key collisions.

use std::collections::BTreeMap;

use crate::crd::configuration::{
    AuthSpec, BatchingSpec, ConfigurationSpec, ControlSpec, DelegatedOidcSpec, LedgerSpec,
    PaymentsSpec, SearchSpec, ServicesSpec, WebhooksSpec,
};
use crate::crd::shared::{
    ElasticSearchBasicAuth, ElasticSearchConfig, ImageSpec, IngressGlobalSpec, IngressSpec,
    IngressTls, KafkaConfig, KafkaSaslConfig, MongoDbConfig, MonitoringSpec, OtlpSpec,
    PostgresConfig, RedisConfig, ScalingSpec, TracesSpec,
};

/// Override-wins merge. `self` is the base (the seed), `other` the override.
pub trait Merge: Sized {
    fn merge(self, other: Self) -> Self;
}

impl Merge for String {
    fn merge(self, other: Self) -> Self {
        if other.is_empty() {
            self
        } else {
            other
        }
    }
}

impl Merge for bool {
    fn merge(self, other: Self) -> Self {
        self || other
    }
}

macro_rules! merge_numeric {
    ($($ty:ty),+) => {$(
        impl Merge for $ty {
            fn merge(self, other: Self) -> Self {
                if other == 0 { self } else { other }
            }
        }
    )+};
}

merge_numeric!(u16, u32, i32, i64);

impl<T: Merge> Merge for Option<T> {
    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Some(base), Some(over)) => Some(base.merge(over)),
            (None, over @ Some(_)) => over,
            (base, None) => base,
        }
    }
}

impl<T> Merge for Vec<T> {
    fn merge(mut self, mut other: Self) -> Self {
        self.append(&mut other);
        self
    }
}

impl<K: Ord, V> Merge for BTreeMap<K, V> {
    fn merge(mut self, other: Self) -> Self {
        self.extend(other);
        self
    }
}

macro_rules! merge_fields {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl Merge for $ty {
            fn merge(mut self, other: Self) -> Self {
                $(self.$field = self.$field.merge(other.$field);)+
                self
            }
        }
    };
}

merge_fields!(ConfigurationSpec { monitoring, services, ingress, kafka });
merge_fields!(ServicesSpec { auth, ledger, payments, search, webhooks, control });
merge_fields!(AuthSpec { image, postgres, signing_key, delegated_oidc, static_clients, ingress });
merge_fields!(DelegatedOidcSpec { issuer, client_id, client_secret });
merge_fields!(LedgerSpec { image, postgres, locking, ingress, scaling });
merge_fields!(PaymentsSpec { image, mongodb, ingress });
merge_fields!(SearchSpec { image, benthos_image, elastic_search, batching, ingress, scaling });
merge_fields!(BatchingSpec { count, period });
merge_fields!(WebhooksSpec { image, mongodb, ingress });
merge_fields!(ControlSpec { image, ingress, scaling });
merge_fields!(ImageSpec { image, image_pull_secrets });
merge_fields!(ScalingSpec { enabled, min_replicas, max_replicas, cpu });
merge_fields!(IngressSpec { host, path, tls, annotations });
merge_fields!(IngressTls { enabled, secret_name });
merge_fields!(IngressGlobalSpec { tls, annotations });
merge_fields!(PostgresConfig { host, port, username, password, create_database });
merge_fields!(MongoDbConfig { host, port, use_srv, username, password, database });
merge_fields!(KafkaConfig { brokers, tls, sasl });
merge_fields!(KafkaSaslConfig { username, password, mechanism });
merge_fields!(ElasticSearchConfig { scheme, host, port, basic_auth });
merge_fields!(ElasticSearchBasicAuth { username, password });
merge_fields!(MonitoringSpec { traces });
merge_fields!(TracesSpec { otlp });
merge_fields!(OtlpSpec { endpoint, port, insecure, mode });
merge_fields!(RedisConfig { uri, tls });

/// Effective spec for one Stack: the seed merged with the stack's overrides.
pub fn effective_spec(
    seed: &ConfigurationSpec,
    overrides: Option<&ConfigurationSpec>,
) -> ConfigurationSpec {
    match overrides {
        Some(overrides) => seed.clone().merge(overrides.clone()),
        None => seed.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::shared::ImagePullSecretRef;

    #[test]
    fn override_wins_on_nested_scalar() {
        let base = ConfigurationSpec {
            monitoring: Some(MonitoringSpec {
                traces: Some(TracesSpec {
                    otlp: Some(OtlpSpec {
                        endpoint: "remote".to_string(),
                        ..Default::default()
                    }),
                }),
            }),
            ..Default::default()
        };
        let overrides = ConfigurationSpec {
            monitoring: Some(MonitoringSpec {
                traces: Some(TracesSpec {
                    otlp: Some(OtlpSpec {
                        endpoint: "localhost".to_string(),
                        ..Default::default()
                    }),
                }),
            }),
            ..Default::default()
        };
        let merged = base.merge(overrides);
        assert_eq!(
            merged
                .monitoring
                .unwrap()
                .traces
                .unwrap()
                .otlp
                .unwrap()
                .endpoint,
            "localhost"
        );
    }

    #[test]
    fn arrays_concatenate_base_then_override() {
        let base = ConfigurationSpec {
            services: ServicesSpec {
                auth: Some(AuthSpec {
                    image: ImageSpec {
                        image_pull_secrets: vec![ImagePullSecretRef {
                            name: "ref1".to_string(),
                        }],
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let overrides = ConfigurationSpec {
            services: ServicesSpec {
                auth: Some(AuthSpec {
                    image: ImageSpec {
                        image_pull_secrets: vec![ImagePullSecretRef {
                            name: "ref2".to_string(),
                        }],
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = base.merge(overrides);
        let secrets = merged.services.auth.unwrap().image.image_pull_secrets;
        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[0].name, "ref1");
        assert_eq!(secrets[1].name, "ref2");
    }

    #[test]
    fn maps_union_with_override_winning() {
        let base = IngressGlobalSpec {
            tls: None,
            annotations: BTreeMap::from([
                ("kept".to_string(), "base".to_string()),
                ("replaced".to_string(), "base".to_string()),
            ]),
        };
        let overrides = IngressGlobalSpec {
            tls: None,
            annotations: BTreeMap::from([("replaced".to_string(), "override".to_string())]),
        };
        let merged = base.merge(overrides);
        assert_eq!(merged.annotations["kept"], "base");
        assert_eq!(merged.annotations["replaced"], "override");
    }

    #[test]
    fn missing_override_keeps_base() {
        let base = ConfigurationSpec {
            kafka: Some(KafkaConfig {
                brokers: vec!["kafka:9092".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = effective_spec(&base, None);
        assert_eq!(merged, base);
    }

    #[test]
    fn override_adds_absent_service() {
        // A service missing from the seed but present on the Stack override
        // becomes enabled.
        let base = ConfigurationSpec::default();
        let overrides = ConfigurationSpec {
            services: ServicesSpec {
                ledger: Some(LedgerSpec::default()),
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = effective_spec(&base, Some(&overrides));
        assert!(merged.services.ledger.is_some());
        assert!(merged.services.payments.is_none());
    }
}
