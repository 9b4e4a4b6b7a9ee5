//! Validation of a merged effective spec. Errors are aggregated so one pass
//! reports every problem instead of the first.

use crate::controller::error::ReconcilerError;
use crate::crd::configuration::ConfigurationSpec;
use crate::crd::stack::Stack;

pub fn validate(stack: &Stack, effective: &ConfigurationSpec) -> Result<(), ReconcilerError> {
    let mut errors = Vec::new();

    if stack.spec.host.is_empty() {
        errors.push("spec.host must not be empty".to_string());
    }
    if stack.spec.namespace.is_empty() {
        errors.push("spec.namespace must not be empty".to_string());
    }

    if let Some(auth) = &effective.services.auth {
        if auth.image.image.is_empty() {
            errors.push("services.auth.image must not be empty".to_string());
        }
        if auth.postgres.host.is_empty() {
            errors.push("services.auth.postgres.host must not be empty".to_string());
        }
    }
    if let Some(ledger) = &effective.services.ledger {
        if ledger.image.image.is_empty() {
            errors.push("services.ledger.image must not be empty".to_string());
        }
        if ledger.postgres.host.is_empty() {
            errors.push("services.ledger.postgres.host must not be empty".to_string());
        }
    }
    if let Some(payments) = &effective.services.payments {
        if payments.image.image.is_empty() {
            errors.push("services.payments.image must not be empty".to_string());
        }
        if payments.mongodb.host.is_empty() {
            errors.push("services.payments.mongodb.host must not be empty".to_string());
        }
    }
    if let Some(webhooks) = &effective.services.webhooks {
        if webhooks.image.image.is_empty() {
            errors.push("services.webhooks.image must not be empty".to_string());
        }
        if webhooks.mongodb.host.is_empty() {
            errors.push("services.webhooks.mongodb.host must not be empty".to_string());
        }
    }
    if let Some(search) = &effective.services.search {
        if search.image.image.is_empty() {
            errors.push("services.search.image must not be empty".to_string());
        }
        if search.elastic_search.host.is_empty() {
            errors.push("services.search.elasticSearch.host must not be empty".to_string());
        }
    }
    if let Some(control) = &effective.services.control {
        if control.image.image.is_empty() {
            errors.push("services.control.image must not be empty".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ReconcilerError::InvalidConfiguration(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::configuration::{AuthSpec, PaymentsSpec, ServicesSpec};
    use crate::crd::stack::StackSpec;

    fn stack() -> Stack {
        Stack::new(
            "main",
            StackSpec {
                seed: "default".to_string(),
                namespace: "main".to_string(),
                host: "stack.example.com".to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn empty_effective_spec_is_valid() {
        assert!(validate(&stack(), &ConfigurationSpec::default()).is_ok());
    }

    #[test]
    fn errors_aggregate_across_services() {
        let effective = ConfigurationSpec {
            services: ServicesSpec {
                auth: Some(AuthSpec::default()),
                payments: Some(PaymentsSpec::default()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = validate(&stack(), &effective).unwrap_err();
        match err {
            ReconcilerError::InvalidConfiguration(errors) => {
                assert_eq!(errors.len(), 4);
                assert!(errors.iter().any(|e| e.contains("services.auth.image")));
                assert!(errors.iter().any(|e| e.contains("mongodb.host")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_host_is_reported() {
        let mut stack = stack();
        stack.spec.host = String::new();
        let err = validate(&stack, &ConfigurationSpec::default()).unwrap_err();
        assert!(matches!(err, ReconcilerError::InvalidConfiguration(e) if e.len() == 1));
    }
}
