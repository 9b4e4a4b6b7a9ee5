//! # Ingress Helper
//!
//! Per-service ingress built from the component's ingress spec. Global
//! defaults are already folded in during child derivation; here the spec is
//! only resolved against fallbacks and materialised. Every generated ingress
//! routes through the stack's auth middleware, injected as the first entry
//! of the router middleware annotation.

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec as NetIngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::Api;
use kube::Client;
use std::collections::BTreeMap;

use super::apply::{apply, delete_if_present};
use super::error::ReconcilerError;
use crate::constants::{AUTH_MIDDLEWARE_NAME, MESH_PROVIDER, SERVICE_PORT};
use crate::crd::shared::IngressSpec;

/// The fully-resolved ingress for one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIngress {
    pub host: String,
    pub path: String,
    pub tls_enabled: bool,
    pub tls_secret_name: Option<String>,
    pub annotations: BTreeMap<String, String>,
}

const MIDDLEWARES_ANNOTATION: &str = "traefik.ingress.kubernetes.io/router.middlewares";

/// Resolve a component's ingress spec, filling absent host and path with
/// the given fallbacks. `None` means no ingress.
pub fn resolve_ingress(
    service: Option<&IngressSpec>,
    default_host: &str,
    default_path: &str,
) -> Option<ResolvedIngress> {
    let service = service?;

    Some(ResolvedIngress {
        host: service
            .host
            .clone()
            .unwrap_or_else(|| default_host.to_string()),
        path: service
            .path
            .clone()
            .unwrap_or_else(|| default_path.to_string()),
        tls_enabled: service.tls.as_ref().map(|t| t.enabled).unwrap_or(false),
        tls_secret_name: service.tls.as_ref().and_then(|t| t.secret_name.clone()),
        annotations: service.annotations.clone(),
    })
}

/// Prepend `<ns>-auth-middleware@<mesh>` to the router middlewares
/// annotation, keeping any entries already present.
pub fn inject_middleware(
    annotations: &mut BTreeMap<String, String>,
    namespace: &str,
) {
    let middleware = format!("{namespace}-{AUTH_MIDDLEWARE_NAME}@{MESH_PROVIDER}");
    let value = match annotations.get(MIDDLEWARES_ANNOTATION) {
        Some(existing) if !existing.is_empty() => format!("{middleware}, {existing}"),
        _ => middleware,
    };
    annotations.insert(MIDDLEWARES_ANNOTATION.to_string(), value);
}

pub fn build_ingress(
    name: &str,
    namespace: &str,
    resolved: &ResolvedIngress,
    owner: OwnerReference,
) -> Ingress {
    let mut annotations = resolved.annotations.clone();
    inject_middleware(&mut annotations, namespace);

    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(annotations),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(NetIngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(resolved.host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(resolved.path.clone()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: name.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(i32::from(SERVICE_PORT)),
                                    name: None,
                                }),
                            }),
                            resource: None,
                        },
                    }],
                }),
            }]),
            tls: resolved.tls_enabled.then(|| {
                vec![IngressTLS {
                    hosts: Some(vec![resolved.host.clone()]),
                    secret_name: resolved.tls_secret_name.clone(),
                }]
            }),
            ..Default::default()
        }),
        status: None,
    }
}

pub async fn reconcile_ingress(
    client: &Client,
    name: &str,
    namespace: &str,
    resolved: &ResolvedIngress,
    owner: OwnerReference,
) -> Result<(), ReconcilerError> {
    let api: Api<Ingress> = Api::namespaced(client.clone(), namespace);
    let ingress = build_ingress(name, namespace, resolved, owner);
    apply(&api, &ingress, "Reconciling ingress").await?;
    Ok(())
}

pub async fn delete_ingress(
    client: &Client,
    name: &str,
    namespace: &str,
) -> Result<(), ReconcilerError> {
    let api: Api<Ingress> = Api::namespaced(client.clone(), namespace);
    delete_if_present(&api, name, "Deleting ingress").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::shared::IngressTls;

    #[test]
    fn absent_override_disables_ingress() {
        assert!(resolve_ingress(None, "h", "/api/ledger").is_none());
    }

    #[test]
    fn fallbacks_fill_host_and_path() {
        let service = IngressSpec {
            host: None,
            path: None,
            tls: Some(IngressTls {
                enabled: true,
                secret_name: None,
            }),
            annotations: BTreeMap::from([("b".to_string(), "override".to_string())]),
        };
        let resolved = resolve_ingress(Some(&service), "fallback", "/api/ledger").unwrap();
        assert_eq!(resolved.host, "fallback");
        assert_eq!(resolved.path, "/api/ledger");
        assert!(resolved.tls_enabled);
        assert_eq!(resolved.annotations["b"], "override");
    }

    #[test]
    fn middleware_prepends_to_existing_entries() {
        let mut annotations = BTreeMap::from([(
            MIDDLEWARES_ANNOTATION.to_string(),
            "other-ns-ratelimit@kubernetescrd".to_string(),
        )]);
        inject_middleware(&mut annotations, "acme");
        assert_eq!(
            annotations[MIDDLEWARES_ANNOTATION],
            "acme-auth-middleware@kubernetescrd, other-ns-ratelimit@kubernetescrd"
        );
    }

    #[test]
    fn middleware_set_when_absent() {
        let mut annotations = BTreeMap::new();
        inject_middleware(&mut annotations, "acme");
        assert_eq!(
            annotations[MIDDLEWARES_ANNOTATION],
            "acme-auth-middleware@kubernetescrd"
        );
    }

    #[test]
    fn build_ingress_injects_middleware_and_tls() {
        let resolved = ResolvedIngress {
            host: "acme.example.com".to_string(),
            path: "/api/ledger".to_string(),
            tls_enabled: true,
            tls_secret_name: Some("acme-tls".to_string()),
            annotations: BTreeMap::new(),
        };
        let ingress = build_ingress("ledger", "acme", &resolved, OwnerReference::default());
        let annotations = ingress.metadata.annotations.unwrap();
        assert!(annotations[MIDDLEWARES_ANNOTATION].starts_with("acme-auth-middleware@"));
        let tls = ingress.spec.unwrap().tls.unwrap();
        assert_eq!(tls[0].secret_name.as_deref(), Some("acme-tls"));
    }
}
