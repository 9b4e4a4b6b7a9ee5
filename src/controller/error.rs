//! # Reconciler Errors
//!
//! Error kinds surfaced by mutators, classified for the requeue policy:
//! `NotFound` is a sentinel that never propagates past the create-vs-update
//! decision, configuration errors surface on conditions, everything else
//! requeues with backoff (there is no dead-letter).

use thiserror::Error;

use crate::external::ExternalError;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// External resource absent; decides create vs update at the call site
    #[error("not found")]
    NotFound,

    /// Stack references a Configuration that does not exist
    #[error("configuration '{0}' not found")]
    ConfigurationNotFound(String),

    /// Merged spec failed validation; aggregated per-field errors
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    /// Control derivation requires a second static client (the UI) with at
    /// least one secret on the effective auth spec
    #[error("control requires a second static auth client carrying a secret")]
    MissingControlClient,

    /// Remote 5xx, conflict on an orchestrator write, DNS failure
    #[error("{context}: {source}")]
    Transient {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// Bad input we cannot retry into success; surfaced on a condition and
    /// still requeued
    #[error("{context}: {message}")]
    Permanent { context: String, message: String },

    #[error("{context}: {source}")]
    Kube {
        context: String,
        #[source]
        source: kube::Error,
    },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: ExternalError,
    },

    #[error("serializing resource: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcilerError {
    pub fn transient(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Transient {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn permanent(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Attach a human-readable contextual tag to errors from a sub-step.
///
/// Mirrors the wrapping every mutator applies around each operation
/// ("Reconciling deployment", "Reading scope by metadata", ...).
pub trait TagError<T> {
    fn tag(self, context: &str) -> Result<T, ReconcilerError>;
}

impl<T> TagError<T> for Result<T, kube::Error> {
    fn tag(self, context: &str) -> Result<T, ReconcilerError> {
        self.map_err(|source| match &source {
            kube::Error::Api(api_err) if api_err.code == 404 => ReconcilerError::NotFound,
            _ => ReconcilerError::Kube {
                context: context.to_string(),
                source,
            },
        })
    }
}

impl<T> TagError<T> for Result<T, ExternalError> {
    fn tag(self, context: &str) -> Result<T, ReconcilerError> {
        self.map_err(|source| match source {
            ExternalError::NotFound => ReconcilerError::NotFound,
            other => ReconcilerError::External {
                context: context.to_string(),
                source: other,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kube_404_maps_to_not_found_sentinel() {
        let err = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });
        let tagged: Result<(), _> = Err(err).tag("Reading child");
        assert!(tagged.unwrap_err().is_not_found());
    }

    #[test]
    fn external_not_found_maps_to_sentinel() {
        let tagged: Result<(), _> = Err(ExternalError::NotFound).tag("Reading scope");
        assert!(tagged.unwrap_err().is_not_found());
    }

    #[test]
    fn invalid_configuration_joins_field_errors() {
        let err = ReconcilerError::InvalidConfiguration(vec![
            "services.ledger.postgres.host: required".to_string(),
            "host: required".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("services.ledger.postgres.host"));
        assert!(msg.contains("host: required"));
    }
}
