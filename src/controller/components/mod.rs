//! Per-service component mutators. Each one follows the same template:
//! mark `Progressing`, reconcile workload then service then ingress, run the
//! component's own side effects, derive `Ready`.

pub mod auth;
pub mod common;
pub mod control;
pub mod ledger;
pub mod payments;
pub mod search;
pub mod webhooks;

pub use auth::AuthMutator;
pub use control::ControlMutator;
pub use ledger::LedgerMutator;
pub use payments::PaymentsMutator;
pub use search::SearchMutator;
pub use webhooks::WebhooksMutator;
