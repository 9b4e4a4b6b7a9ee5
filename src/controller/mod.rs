//! # Controllers
//!
//! The reconciliation kernel, the shared helpers (upserts, finalizers, env
//! and ingress composition), and one mutator per owned kind.

pub mod apply;
pub mod benthos;
pub mod components;
pub mod env;
pub mod error;
pub mod finalizer;
pub mod ingester;
pub mod ingress;
pub mod kernel;
pub mod oauth;
pub mod stack;
pub mod workload;

pub use error::ReconcilerError;
pub use kernel::Mutator;
