//! # Stack Operator
//!
//! A Kubernetes operator that materializes declarative financial-services
//! Stacks and keeps them converged.
//!
//! ## Overview
//!
//! A cluster-scoped `Stack` resource names a shared `Configuration` seed and
//! optionally overrides parts of it. The operator:
//!
//! 1. **Merges seed and overrides** - Deep-merges the Stack's overrides onto
//!    the referenced Configuration to produce the effective settings
//! 2. **Derives per-service components** - Creates one namespaced component
//!    resource per enabled service (auth, ledger, payments, search, webhooks,
//!    control), each reconciled by its own controller into Deployments,
//!    Services, Ingresses, and autoscalers
//! 3. **Manages OAuth records** - Creates and adopts scopes and clients on
//!    each Stack's auth server, including transient scope grants between
//!    peers
//! 4. **Runs search ingestion** - Deploys a Benthos streams server and keeps
//!    one stream per event source synchronized against its admin API, piping
//!    Kafka topics into Elasticsearch
//!
//! ## Features
//!
//! - **Fan-out on seed edits**: Configuration changes re-trigger every Stack
//!   referencing the edited seed
//! - **Adoption by metadata**: remote OAuth records are stamped with their
//!   owner's coordinates so ids survive a crash between a side effect and
//!   the status write
//! - **Finalizer-backed cleanup**: remote scopes, clients, and streams are
//!   deleted before the owning resource is released
//! - **Prometheus metrics**: reconciliation, status-write, and error
//!   counters per controller
//! - **Health probes**: HTTP endpoints for liveness and readiness checks
//!
//! ## Usage
//!
//! See the [README.md](../README.md) for detailed usage instructions and
//! examples.

pub mod constants;
pub mod controller;
pub mod crd;
pub mod external;
pub mod observability;
pub mod runtime;
