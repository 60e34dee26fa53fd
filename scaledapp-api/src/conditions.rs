//! Keyed condition bookkeeping for [`ScaledAppStatus`](crate::ScaledAppStatus).
//!
//! Conditions live in an ordered `Vec<Condition>` with at most one entry per
//! `type`. Updates go through [`upsert_condition`], which preserves
//! `lastTransitionTime` whenever the condition's `status` value is unchanged
//! so that no-op reconcile passes never perturb the stored status.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::Utc;

/// Workload has the desired number of available replicas.
pub const TYPE_AVAILABLE: &str = "Available";
/// Workload has the desired number of ready replicas.
pub const TYPE_READY: &str = "Ready";
/// An invariant violation (e.g. unserializable selector) was observed.
pub const TYPE_DEGRADED: &str = "Degraded";

/// Condition status values as the apiserver expects them.
pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";
pub const STATUS_UNKNOWN: &str = "Unknown";

/// Build a condition stamped with the current time.
pub fn new_condition(type_: &str, status: &str, reason: &str, message: &str) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Time(Utc::now()),
        observed_generation: None,
    }
}

/// Insert or update `candidate`, keyed by its `type`.
///
/// If an entry of the same type exists with the same `status` value, only
/// reason/message/observedGeneration are refreshed and the original
/// `lastTransitionTime` is kept. A changed `status` value replaces the entry
/// in place, keeping insertion order for unrelated types.
pub fn upsert_condition(conditions: &mut Vec<Condition>, candidate: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == candidate.type_) {
        Some(existing) => {
            if existing.status == candidate.status {
                existing.reason = candidate.reason;
                existing.message = candidate.message;
                existing.observed_generation = candidate.observed_generation;
            } else {
                *existing = candidate;
            }
        }
        None => conditions.push(candidate),
    }
}

/// Look up a condition by type.
pub fn get_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True when a condition of the given type exists with status `True`.
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    get_condition(conditions, type_).is_some_and(|c| c.status == STATUS_TRUE)
}
