//! # Condition Model
//!
//! Tri-state conditions attached to every resource status. Conditions are
//! keyed by type: at most one entry per type, insertion order preserved.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types used across the operator's resources.
pub mod types {
    pub const PROGRESSING: &str = "Progressing";
    pub const READY: &str = "Ready";
    pub const DEPLOYMENT_READY: &str = "DeploymentReady";
    pub const SERVICE_READY: &str = "ServiceReady";
    pub const INGRESS_READY: &str = "IngressReady";
    pub const HPA_READY: &str = "HPAReady";
    pub const BENTHOS_READY: &str = "BenthosReady";
    pub const INGESTION_STREAM_READY: &str = "IngestionStreamReady";
    pub const SECRET_READY: &str = "SecretReady";
    pub const POD_READY: &str = "PodReady";
    pub const CLIENT_CREATED: &str = "ClientCreated";
    pub const CLIENT_UPDATED: &str = "ClientUpdated";
    pub const SCOPES_SYNCHRONIZED: &str = "ScopesSynchronized";

    // Stack-level conditions, one per derived child.
    pub const NAMESPACE_READY: &str = "NamespaceReady";
    pub const MIDDLEWARE_READY: &str = "MiddlewareReady";
    pub const AUTH_READY: &str = "AuthReady";
    pub const LEDGER_READY: &str = "LedgerReady";
    pub const PAYMENTS_READY: &str = "PaymentsReady";
    pub const SEARCH_READY: &str = "SearchReady";
    pub const CONTROL_READY: &str = "ControlReady";
    pub const WEBHOOKS_READY: &str = "WebhooksReady";
}

/// Status of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition represents a single observation of a resource's state
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Generation of the spec this condition was observed against
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last transition time (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(
        r#type: impl Into<String>,
        status: ConditionStatus,
        observed_generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: r#type.into(),
            status,
            observed_generation,
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            message: None,
        }
    }

    /// Shorthand for a `status=True` condition at the given generation.
    pub fn satisfied(r#type: impl Into<String>, generation: Option<i64>) -> Self {
        Self::new(r#type, ConditionStatus::True, generation)
    }

    /// Shorthand for a `status=False` condition carrying an error message.
    pub fn failed(
        r#type: impl Into<String>,
        generation: Option<i64>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(r#type, ConditionStatus::False, generation).with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Access to the conditions array of a resource's status.
///
/// Implemented by every custom resource the kernel drives; lets the generic
/// driver diff conditions without knowing the concrete status type.
pub trait ConditionHolder {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

/// Set a condition, replacing any existing entry of the same type in place
/// (preserving insertion order) or appending otherwise.
///
/// When the existing entry has the same status and observed generation, it is
/// kept untouched so a no-op reconciliation does not move transition times.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        if existing.status == condition.status
            && existing.observed_generation == condition.observed_generation
            && existing.message == condition.message
        {
            return;
        }
        *existing = condition;
    } else {
        conditions.push(condition);
    }
}

pub fn get_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Remove a condition by type. Used when a sub-resource is disabled and its
/// readiness is no longer meaningful.
pub fn remove_condition(conditions: &mut Vec<Condition>, r#type: &str) {
    conditions.retain(|c| c.r#type != r#type);
}

/// Kernel predicate deciding whether a status write is needed.
///
/// True iff the counts differ, or some condition type present in `actual` is
/// missing from `updated` or differs in status or observed generation.
pub fn conditions_changed(actual: &[Condition], updated: &[Condition]) -> bool {
    if actual.len() != updated.len() {
        return true;
    }
    for current in actual {
        match get_condition(updated, &current.r#type) {
            None => return true,
            Some(next) => {
                if next.status != current.status
                    || next.observed_generation != current.observed_generation
                {
                    return true;
                }
            }
        }
    }
    false
}

/// Derive the aggregate `Ready` condition.
///
/// `Ready=True` iff every required sub-condition is True and `Progressing`
/// is absent or False.
pub fn aggregate_ready(
    conditions: &mut Vec<Condition>,
    required: &[&str],
    generation: Option<i64>,
) {
    let progressing = get_condition(conditions, types::PROGRESSING)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false);
    let all_true = required.iter().all(|t| {
        get_condition(conditions, t)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    });
    let status = if all_true && !progressing {
        ConditionStatus::True
    } else {
        ConditionStatus::False
    };
    set_condition(conditions, Condition::new(types::READY, status, generation));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_condition_replaces_in_place() {
        let mut conds = vec![
            Condition::satisfied("A", Some(1)),
            Condition::satisfied("B", Some(1)),
            Condition::satisfied("C", Some(1)),
        ];
        set_condition(&mut conds, Condition::failed("B", Some(2), "boom"));
        assert_eq!(conds.len(), 3);
        assert_eq!(conds[1].r#type, "B");
        assert_eq!(conds[1].status, ConditionStatus::False);
        assert_eq!(conds[1].observed_generation, Some(2));
        // Order preserved
        assert_eq!(conds[0].r#type, "A");
        assert_eq!(conds[2].r#type, "C");
    }

    #[test]
    fn set_condition_appends_new_type() {
        let mut conds = vec![Condition::satisfied("A", Some(1))];
        set_condition(&mut conds, Condition::satisfied("B", Some(1)));
        assert_eq!(conds.len(), 2);
        assert_eq!(conds[1].r#type, "B");
    }

    #[test]
    fn set_condition_keeps_transition_time_when_unchanged() {
        let mut conds = vec![Condition::satisfied("A", Some(3))];
        let before = conds[0].last_transition_time.clone();
        set_condition(&mut conds, Condition::satisfied("A", Some(3)));
        assert_eq!(conds[0].last_transition_time, before);
    }

    #[test]
    fn conditions_changed_detects_status_flip() {
        let actual = vec![Condition::satisfied("A", Some(1))];
        let updated = vec![Condition::failed("A", Some(1), "err")];
        assert!(conditions_changed(&actual, &updated));
    }

    #[test]
    fn conditions_changed_detects_generation_bump() {
        let actual = vec![Condition::satisfied("A", Some(1))];
        let updated = vec![Condition::satisfied("A", Some(2))];
        assert!(conditions_changed(&actual, &updated));
    }

    #[test]
    fn conditions_changed_false_on_identical_pass() {
        // Property: running the mutator twice without changes must not
        // trigger a second status write.
        let actual = vec![
            Condition::satisfied("DeploymentReady", Some(4)),
            Condition::satisfied("ServiceReady", Some(4)),
            Condition::satisfied("Ready", Some(4)),
        ];
        let updated = actual.clone();
        assert!(!conditions_changed(&actual, &updated));
    }

    #[test]
    fn conditions_changed_detects_removed_condition() {
        let actual = vec![
            Condition::satisfied("A", Some(1)),
            Condition::satisfied("B", Some(1)),
        ];
        let updated = vec![
            Condition::satisfied("A", Some(1)),
            Condition::satisfied("C", Some(1)),
        ];
        assert!(conditions_changed(&actual, &updated));
    }

    #[test]
    fn aggregate_ready_requires_all_and_not_progressing() {
        let mut conds = vec![
            Condition::satisfied("DeploymentReady", Some(1)),
            Condition::satisfied("ServiceReady", Some(1)),
        ];
        aggregate_ready(&mut conds, &["DeploymentReady", "ServiceReady"], Some(1));
        assert_eq!(
            get_condition(&conds, types::READY).unwrap().status,
            ConditionStatus::True
        );

        set_condition(
            &mut conds,
            Condition::new(types::PROGRESSING, ConditionStatus::True, Some(1)),
        );
        aggregate_ready(&mut conds, &["DeploymentReady", "ServiceReady"], Some(1));
        assert_eq!(
            get_condition(&conds, types::READY).unwrap().status,
            ConditionStatus::False
        );
    }
}
