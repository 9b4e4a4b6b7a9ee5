//! # Stack Mutator
//!
//! Composes a Configuration seed and a Stack's overrides into the effective
//! spec, then fans out into the namespace, the routing middleware, and one
//! child resource per enabled service. Children carry a delete-blocking
//! owner reference so deleting the Stack cascades.
//!
//! Editing a Configuration re-enqueues every Stack whose `spec.seed` names
//! it, through a watch backed by a Stack reflector store.

pub mod derive;
pub mod merge;
pub mod validation;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::info;

use super::apply::{apply, delete_if_present, owner_reference};
use super::error::{ReconcilerError, TagError};
use super::kernel::Mutator;
use crate::constants::AUTH_MIDDLEWARE_NAME;
use crate::crd::components::{
    AuthComponent, ControlComponent, LedgerComponent, PaymentsComponent, SearchComponent,
    WebhooksComponent,
};
use crate::crd::condition::{
    aggregate_ready, remove_condition, set_condition, types, Condition, ConditionHolder,
};
use crate::crd::configuration::Configuration;
use crate::crd::middleware::{Middleware, MiddlewareSpec};
use crate::crd::stack::Stack;

pub struct StackMutator {
    client: Client,
    /// Reflector-backed view of every Stack, for the Configuration fan-out.
    stacks: Store<Stack>,
}

impl StackMutator {
    pub fn new(client: Client, stacks: Store<Stack>) -> Self {
        Self { client, stacks }
    }

    /// Upsert one child when the service is enabled, delete it otherwise.
    /// Failures are recorded on the child's condition and remembered; the
    /// remaining children are still attempted.
    #[allow(clippy::too_many_arguments)]
    async fn sync_child<K>(
        &self,
        api: &Api<K>,
        name: &str,
        desired: Option<K>,
        condition_type: &'static str,
        context: &str,
        generation: Option<i64>,
        conditions: &mut Vec<Condition>,
        required: &mut Vec<&'static str>,
        first_error: &mut Option<ReconcilerError>,
    ) where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        match desired {
            Some(obj) => {
                required.push(condition_type);
                match apply(api, &obj, context).await {
                    Ok(_) => set_condition(
                        conditions,
                        Condition::satisfied(condition_type, generation),
                    ),
                    Err(err) => {
                        set_condition(
                            conditions,
                            Condition::failed(condition_type, generation, err.to_string()),
                        );
                        first_error.get_or_insert(err);
                    }
                }
            }
            None => match delete_if_present(api, name, context).await {
                Ok(()) => remove_condition(conditions, condition_type),
                Err(err) => {
                    required.push(condition_type);
                    set_condition(
                        conditions,
                        Condition::failed(condition_type, generation, err.to_string()),
                    );
                    first_error.get_or_insert(err);
                }
            },
        }
    }
}

fn owned<K>(mut obj: K, namespace: &str, owner: OwnerReference) -> K
where
    K: Resource<DynamicType = ()>,
{
    obj.meta_mut().namespace = Some(namespace.to_string());
    obj.meta_mut().owner_references = Some(vec![owner]);
    obj
}

#[async_trait]
impl Mutator for StackMutator {
    type Resource = Stack;

    fn name(&self) -> &'static str {
        "stack"
    }

    fn register(&self, controller: Controller<Stack>) -> Controller<Stack> {
        let store = self.stacks.clone();
        controller
            .owns(
                Api::<Namespace>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<Middleware>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<AuthComponent>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<LedgerComponent>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<PaymentsComponent>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<SearchComponent>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<WebhooksComponent>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .owns(
                Api::<ControlComponent>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .watches(
                Api::<Configuration>::all(self.client.clone()),
                watcher::Config::default(),
                move |configuration| {
                    let seed = configuration.name_any();
                    store
                        .state()
                        .into_iter()
                        .filter(|stack| stack.spec.seed == seed)
                        .map(|stack| ObjectRef::from_obj(stack.as_ref()))
                        .collect::<Vec<_>>()
                },
            )
    }

    async fn mutate(&self, stack: &mut Stack) -> Result<Option<Action>, ReconcilerError> {
        let generation = stack.meta().generation;
        let namespace = stack.spec.namespace.clone();

        let configurations: Api<Configuration> = Api::all(self.client.clone());
        let Some(configuration) = configurations
            .get_opt(&stack.spec.seed)
            .await
            .tag("Loading configuration seed")?
        else {
            let err = ReconcilerError::ConfigurationNotFound(stack.spec.seed.clone());
            set_condition(
                stack.conditions_mut(),
                Condition::failed(types::READY, generation, err.to_string()),
            );
            return Err(err);
        };

        let effective = merge::effective_spec(&configuration.spec, stack.spec.overrides.as_ref());
        if let Err(err) = validation::validate(stack, &effective) {
            set_condition(
                stack.conditions_mut(),
                Condition::failed(types::READY, generation, err.to_string()),
            );
            return Err(err);
        }

        let owner = owner_reference(stack);

        // Namespace and middleware first; everything else lives inside them.
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let ns_obj = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.clone()),
                owner_references: Some(vec![owner.clone()]),
                ..Default::default()
            },
            ..Default::default()
        };
        if let Err(err) = apply(&namespaces, &ns_obj, "Reconciling namespace").await {
            set_condition(
                stack.conditions_mut(),
                Condition::failed(types::NAMESPACE_READY, generation, err.to_string()),
            );
            return Err(err);
        }
        set_condition(
            stack.conditions_mut(),
            Condition::satisfied(types::NAMESPACE_READY, generation),
        );

        let middlewares: Api<Middleware> = Api::namespaced(self.client.clone(), &namespace);
        let middleware = owned(
            Middleware::new(
                AUTH_MIDDLEWARE_NAME,
                MiddlewareSpec::auth_plugin(&stack.spec.auth_issuer()),
            ),
            &namespace,
            owner.clone(),
        );
        if let Err(err) = apply(&middlewares, &middleware, "Reconciling auth middleware").await {
            set_condition(
                stack.conditions_mut(),
                Condition::failed(types::MIDDLEWARE_READY, generation, err.to_string()),
            );
            return Err(err);
        }
        set_condition(
            stack.conditions_mut(),
            Condition::satisfied(types::MIDDLEWARE_READY, generation),
        );

        // Derive every child before touching conditions; derivation is pure.
        let auth = derive::auth_component(stack, &effective)
            .map(|spec| owned(AuthComponent::new(derive::names::AUTH, spec), &namespace, owner.clone()));
        let ledger = derive::ledger_component(stack, &effective)
            .map(|spec| owned(LedgerComponent::new(derive::names::LEDGER, spec), &namespace, owner.clone()));
        let payments = derive::payments_component(stack, &effective)
            .map(|spec| owned(PaymentsComponent::new(derive::names::PAYMENTS, spec), &namespace, owner.clone()));
        let search = derive::search_component(stack, &effective)
            .map(|spec| owned(SearchComponent::new(derive::names::SEARCH, spec), &namespace, owner.clone()));
        let webhooks = derive::webhooks_component(stack, &effective)
            .map(|spec| owned(WebhooksComponent::new(derive::names::WEBHOOKS, spec), &namespace, owner.clone()));
        let control = derive::control_component(stack, &effective);

        let mut required: Vec<&'static str> =
            vec![types::NAMESPACE_READY, types::MIDDLEWARE_READY];
        let mut first_error: Option<ReconcilerError> = None;
        let mut conditions = std::mem::take(stack.conditions_mut());

        self.sync_child(
            &Api::namespaced(self.client.clone(), &namespace),
            derive::names::AUTH,
            auth,
            types::AUTH_READY,
            "Reconciling auth component",
            generation,
            &mut conditions,
            &mut required,
            &mut first_error,
        )
        .await;
        self.sync_child(
            &Api::namespaced(self.client.clone(), &namespace),
            derive::names::LEDGER,
            ledger,
            types::LEDGER_READY,
            "Reconciling ledger component",
            generation,
            &mut conditions,
            &mut required,
            &mut first_error,
        )
        .await;
        self.sync_child(
            &Api::namespaced(self.client.clone(), &namespace),
            derive::names::PAYMENTS,
            payments,
            types::PAYMENTS_READY,
            "Reconciling payments component",
            generation,
            &mut conditions,
            &mut required,
            &mut first_error,
        )
        .await;
        self.sync_child(
            &Api::namespaced(self.client.clone(), &namespace),
            derive::names::SEARCH,
            search,
            types::SEARCH_READY,
            "Reconciling search component",
            generation,
            &mut conditions,
            &mut required,
            &mut first_error,
        )
        .await;
        self.sync_child(
            &Api::namespaced(self.client.clone(), &namespace),
            derive::names::WEBHOOKS,
            webhooks,
            types::WEBHOOKS_READY,
            "Reconciling webhooks component",
            generation,
            &mut conditions,
            &mut required,
            &mut first_error,
        )
        .await;

        match control {
            Some(Err(err)) => {
                // Control stays as-is; the missing client is surfaced and
                // requeued, not cascaded into a delete.
                required.push(types::CONTROL_READY);
                set_condition(
                    &mut conditions,
                    Condition::failed(types::CONTROL_READY, generation, err.to_string()),
                );
                first_error.get_or_insert(err);
            }
            other => {
                let desired = other.map(|outcome| {
                    outcome.map(|spec| {
                        owned(
                            ControlComponent::new(derive::names::CONTROL, spec),
                            &namespace,
                            owner.clone(),
                        )
                    })
                });
                let desired = match desired {
                    Some(Ok(obj)) => Some(obj),
                    _ => None,
                };
                self.sync_child(
                    &Api::namespaced(self.client.clone(), &namespace),
                    derive::names::CONTROL,
                    desired,
                    types::CONTROL_READY,
                    "Reconciling control component",
                    generation,
                    &mut conditions,
                    &mut required,
                    &mut first_error,
                )
                .await;
            }
        }

        aggregate_ready(&mut conditions, &required, generation);
        *stack.conditions_mut() = conditions;

        match first_error {
            Some(err) => Err(err),
            None => {
                info!(stack = %stack.name_any(), "stack converged");
                Ok(None)
            }
        }
    }
}
