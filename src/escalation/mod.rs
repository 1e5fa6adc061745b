//! Escalation engine (C5): rule evaluation, record lifecycle, and the
//! periodic timeout sweep.

mod duration;
mod engine;
mod record;
mod rule;

pub use duration::parse_duration_ms;
pub use engine::{EscalationEngine, ExecutionTerminator, DEFAULT_SCAN_INTERVAL, ESCALATION_TIMEOUT_REASON};
pub use record::{EscalationRecord, EscalationStatus};
pub use rule::{CustomPredicate, EscalationCondition, EscalationPriority, EscalationRule, EvaluationContext};
