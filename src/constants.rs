//! # Constants
//!
//! Controller-wide defaults. Anything tunable at runtime comes from
//! environment variables in `runtime::initialization`; these are the fixed
//! protocol and naming constants.

/// Field manager for every apply/merge patch issued by the operator
pub const FIELD_MANAGER: &str = "stack-operator";

/// API group of the operator's own CRDs, also the finalizer prefix
pub const API_GROUP: &str = "stack.fstack.dev";

/// Traefik provider suffix injected into router middleware references
pub const MESH_PROVIDER: &str = "kubernetescrd";

/// In-cluster service DNS suffix
pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";

/// Port every managed service listens on
pub const SERVICE_PORT: u16 = 8080;

/// Benthos admin API port
pub const BENTHOS_ADMIN_PORT: u16 = 4195;

/// Consumer group shared by every search ingestion stream
pub const SEARCH_CONSUMER_GROUP: &str = "search";

/// Kafka checkpoint limit on ingestion streams
pub const SEARCH_CHECKPOINT_LIMIT: u32 = 1024;

/// Liveness probe path exposed by every managed service
pub const HEALTHCHECK_PATH: &str = "/_healthcheck";

/// Name of the per-stack routing middleware object
pub const AUTH_MIDDLEWARE_NAME: &str = "auth-middleware";

/// Requeue delay after a reconciliation error
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 30;

/// Requeue delay while waiting on a missing dependency (peer scope, server id)
pub const DEFAULT_PENDING_REQUEUE_SECS: u64 = 10;

/// Default HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8082;
