//! # External API Adapters
//!
//! HTTP adapters for the state the operator owns outside the orchestrator:
//! OAuth scopes/clients on a remote auth server, stream definitions on a
//! running Benthos server, and the index template on the search backend.
//!
//! Every adapter is a trait so mutator logic is testable against the
//! in-memory implementations; production adapters are stateless reqwest
//! clients.

pub mod benthos;
pub mod oauth;
pub mod search;

pub use benthos::{BenthosApi, HttpBenthos, InMemoryBenthos, StreamDetail};
pub use oauth::{
    AuthServerApi, ClientOptions, ClientRecord, HttpAuthServer, InMemoryAuthServer, ScopeRecord,
};
pub use search::SearchBackend;

use thiserror::Error;

/// Errors from the external admin APIs.
///
/// `NotFound` is a sentinel distinguished by every caller (create vs update,
/// cleanup-on-delete treats it as success); all other non-2xx responses are
/// wrapped with their status and body.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ExternalError {
    /// Classify a non-2xx response, reading the body for the error message.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        if status == 404 {
            return Self::NotFound;
        }
        let body = response.text().await.unwrap_or_default();
        Self::UnexpectedStatus { status, body }
    }
}
