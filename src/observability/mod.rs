//! # Observability
//!
//! Prometheus metrics and the HTTP server exposing them alongside the
//! health probes.

pub mod metrics;
pub mod server;

pub use server::{start_server, ServerState};
