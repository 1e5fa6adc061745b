//! Escalation conditions and rules.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Advisory severity attached to the resulting record. Matching is
/// first-match-in-list-order, never by priority; do not sort rules by
/// this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// An injected, non-serializable predicate for the `custom` condition.
/// Isolated behind this trait so the other variants remain
/// data-serializable.
pub trait CustomPredicate: Send + Sync {
    fn matches(&self, ctx: &EvaluationContext) -> bool;
}

impl<F> CustomPredicate for F
where
    F: Fn(&EvaluationContext) -> bool + Send + Sync,
{
    fn matches(&self, ctx: &EvaluationContext) -> bool {
        self(ctx)
    }
}

/// The closed set of conditions a rule can match against.
#[derive(Clone)]
pub enum EscalationCondition {
    ResourceExceeded {
        resource: String,
        threshold: f64,
    },
    ExecutionFailed {
        handler_name: Option<String>,
        consecutive_failures: Option<u32>,
    },
    TimeoutExceeded {
        threshold_ms: i64,
    },
    SandboxViolation {
        violation_type: String,
    },
    TrustBelow {
        level: i32,
    },
    Custom {
        predicate: Arc<dyn CustomPredicate>,
    },
}

impl std::fmt::Debug for EscalationCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceExceeded { resource, threshold } => f
                .debug_struct("ResourceExceeded")
                .field("resource", resource)
                .field("threshold", threshold)
                .finish(),
            Self::ExecutionFailed { handler_name, consecutive_failures } => f
                .debug_struct("ExecutionFailed")
                .field("handler_name", handler_name)
                .field("consecutive_failures", consecutive_failures)
                .finish(),
            Self::TimeoutExceeded { threshold_ms } => f
                .debug_struct("TimeoutExceeded")
                .field("threshold_ms", threshold_ms)
                .finish(),
            Self::SandboxViolation { violation_type } => f
                .debug_struct("SandboxViolation")
                .field("violation_type", violation_type)
                .finish(),
            Self::TrustBelow { level } => {
                f.debug_struct("TrustBelow").field("level", level).finish()
            }
            Self::Custom { .. } => f.debug_struct("Custom").finish_non_exhaustive(),
        }
    }
}

/// The signals an execution carries at evaluation time, consulted by
/// [`EscalationCondition::matches`].
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub execution_id: String,
    pub handler_name: Option<String>,
    pub resource_usage: Option<HashMap<String, f64>>,
    pub wall_time_ms: Option<i64>,
    pub error: Option<String>,
    pub consecutive_failures: Option<u32>,
    pub violation_type: Option<String>,
    pub trust_level: Option<i32>,
    pub extra: HashMap<String, Value>,
}

impl EscalationCondition {
    /// Evaluates this condition against `ctx`. `custom` predicates are run
    /// behind a panic guard: a panicking predicate is logged and treated
    /// as a non-match rather than unwinding into the engine.
    pub fn matches(&self, ctx: &EvaluationContext) -> bool {
        match self {
            EscalationCondition::ResourceExceeded { resource, threshold } => ctx
                .resource_usage
                .as_ref()
                .and_then(|usage| usage.get(resource))
                .is_some_and(|value| *value > *threshold),
            EscalationCondition::ExecutionFailed {
                handler_name,
                consecutive_failures,
            } => {
                if ctx.error.is_none() {
                    return false;
                }
                if let Some(expected) = handler_name {
                    if ctx.handler_name.as_deref() != Some(expected.as_str()) {
                        return false;
                    }
                }
                if let Some(threshold) = consecutive_failures {
                    return ctx.consecutive_failures.unwrap_or(0) >= *threshold;
                }
                true
            }
            EscalationCondition::TimeoutExceeded { threshold_ms } => {
                ctx.wall_time_ms.is_some_and(|wall| wall > *threshold_ms)
            }
            EscalationCondition::SandboxViolation { violation_type } => ctx
                .violation_type
                .as_deref()
                .is_some_and(|v| v == violation_type),
            EscalationCondition::TrustBelow { level } => {
                ctx.trust_level.is_some_and(|actual| actual < *level)
            }
            EscalationCondition::Custom { predicate } => {
                let predicate = predicate.clone();
                let ctx = ctx.clone();
                catch_unwind(AssertUnwindSafe(move || predicate.matches(&ctx))).unwrap_or_else(|_| {
                    warn!("custom escalation predicate panicked, treating as non-match");
                    false
                })
            }
        }
    }
}

/// A rule binding a condition to an escalation recipient, timeout, and
/// priority.
#[derive(Debug, Clone)]
pub struct EscalationRule {
    pub id: String,
    pub name: String,
    pub condition: EscalationCondition,
    pub escalate_to: String,
    /// ISO-8601 duration string, e.g. `"PT1H"`.
    pub timeout: String,
    pub priority: EscalationPriority,
    pub auto_terminate_on_timeout: bool,
    pub require_acknowledgement: bool,
    pub metadata: HashMap<String, Value>,
}

impl EscalationRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        condition: EscalationCondition,
        escalate_to: impl Into<String>,
        timeout: impl Into<String>,
        priority: EscalationPriority,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            condition,
            escalate_to: escalate_to.into(),
            timeout: timeout.into(),
            priority,
            auto_terminate_on_timeout: false,
            require_acknowledgement: false,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_auto_terminate(mut self, auto_terminate: bool) -> Self {
        self.auto_terminate_on_timeout = auto_terminate;
        self
    }

    #[must_use]
    pub fn with_require_acknowledgement(mut self, require: bool) -> Self {
        self.require_acknowledgement = require;
        self
    }
}
