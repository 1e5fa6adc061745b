//! Escalation record lifecycle.

use std::collections::HashMap;

use serde_json::Value;

use super::rule::{EscalationPriority, EscalationRule};

/// Status of an [`EscalationRecord`]. `Resolved` and `Expired` are
/// terminal: the record is removed from the active map the instant it
/// reaches either one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStatus {
    Pending,
    Acknowledged,
    Resolved,
    Expired,
}

impl EscalationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EscalationStatus::Resolved | EscalationStatus::Expired)
    }
}

/// A persistent record raised when an execution breaches a rule.
#[derive(Debug, Clone)]
pub struct EscalationRecord {
    pub id: String,
    pub execution_id: String,
    pub tenant_id: String,
    pub intent_id: String,
    pub rule: EscalationRule,
    pub reason: String,
    pub priority: EscalationPriority,
    pub status: EscalationStatus,
    pub escalated_to: String,
    pub violation: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at_ms: Option<i64>,
    pub resolution_action: Option<String>,
    pub timeout_at_ms: i64,
    pub created_at_ms: i64,
    pub metadata: HashMap<String, Value>,
}
