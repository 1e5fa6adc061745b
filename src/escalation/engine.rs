//! Escalation engine (C5): rule evaluation and escalation lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::warn;

use super::{
    duration::parse_duration_ms,
    record::{EscalationRecord, EscalationStatus},
    rule::{EscalationRule, EvaluationContext},
};
use crate::tenant::TenantId;

/// Default interval for the background timeout sweep.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(30_000);

/// The reason handed to [`ExecutionTerminator::terminate`] when a timed-out
/// escalation auto-terminates its execution.
pub const ESCALATION_TIMEOUT_REASON: &str = "escalation timeout";

/// Abstract callback the engine invokes to ask the tracker (C4) to abort
/// an execution. Kept as a trait object so the engine never depends on
/// the tracker concretely.
pub trait ExecutionTerminator: Send + Sync {
    fn terminate(&self, execution_id: &str, reason: &str);
}

impl<F> ExecutionTerminator for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn terminate(&self, execution_id: &str, reason: &str) {
        self(execution_id, reason)
    }
}

/// Rule-matching and escalation-record lifecycle manager.
///
/// The rule store is an ordered list: [`Self::evaluate`] always returns
/// the first matching rule in insertion order, never the
/// highest-priority one. `priority` on the resulting record is advisory
/// metadata only.
pub struct EscalationEngine {
    rules: RwLock<Vec<EscalationRule>>,
    active: DashMap<String, EscalationRecord>,
    terminator: Option<Arc<dyn ExecutionTerminator>>,
    scan_handle: RwLock<Option<JoinHandle<()>>>,
    shutting_down: Arc<AtomicBool>,
}

impl Default for EscalationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationEngine {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            active: DashMap::new(),
            terminator: None,
            scan_handle: RwLock::new(None),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_terminator(mut self, terminator: Arc<dyn ExecutionTerminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn add_rule(&self, rule: EscalationRule) {
        self.rules.write().push(rule);
    }

    pub fn remove_rule(&self, rule_id: &str) {
        self.rules.write().retain(|r| r.id != rule_id);
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<EscalationRule> {
        self.rules.read().iter().find(|r| r.id == rule_id).cloned()
    }

    pub fn rules(&self) -> Vec<EscalationRule> {
        self.rules.read().clone()
    }

    /// Returns the first rule whose condition matches `ctx`, in list
    /// order.
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Option<EscalationRule> {
        self.rules
            .read()
            .iter()
            .find(|rule| rule.condition.matches(ctx))
            .cloned()
    }

    /// Creates a pending escalation record and inserts it into the active
    /// map.
    #[allow(clippy::too_many_arguments)]
    pub fn escalate(
        &self,
        execution_id: impl Into<String>,
        tenant_id: impl Into<String>,
        intent_id: impl Into<String>,
        rule: EscalationRule,
        reason: impl Into<String>,
        violation: Option<String>,
        now_ms: i64,
    ) -> EscalationRecord {
        let id = uuid::Uuid::new_v4().to_string();
        let timeout_ms = parse_duration_ms(&rule.timeout);
        let record = EscalationRecord {
            id: id.clone(),
            execution_id: execution_id.into(),
            tenant_id: tenant_id.into(),
            intent_id: intent_id.into(),
            escalated_to: rule.escalate_to.clone(),
            priority: rule.priority,
            status: EscalationStatus::Pending,
            reason: reason.into(),
            violation,
            resolved_by: None,
            resolved_at_ms: None,
            resolution_action: None,
            timeout_at_ms: now_ms + timeout_ms,
            created_at_ms: now_ms,
            metadata: rule.metadata.clone(),
            rule,
        };
        self.active.insert(id, record.clone());
        record
    }

    /// `pending → acknowledged`. Already-acknowledged or terminal records
    /// are a warn no-op.
    pub fn acknowledge(&self, id: &str, actor: &str) {
        match self.active.get_mut(id) {
            Some(mut record) if record.status == EscalationStatus::Pending => {
                record.status = EscalationStatus::Acknowledged;
            }
            Some(record) => {
                warn!(
                    escalation_id = id,
                    actor,
                    status = ?record.status,
                    "acknowledge on non-pending escalation, ignoring"
                );
            }
            None => warn!(escalation_id = id, actor, "acknowledge on unknown escalation, ignoring"),
        }
    }

    /// `pending | acknowledged → resolved`, then removes the record from
    /// the active map. Already-terminal records are a warn no-op.
    pub fn resolve(
        &self,
        id: &str,
        actor: &str,
        action: impl Into<String>,
        notes: Option<String>,
        now_ms: i64,
    ) {
        let should_remove = match self.active.get_mut(id) {
            Some(mut record) if !record.status.is_terminal() => {
                record.status = EscalationStatus::Resolved;
                record.resolved_by = Some(actor.to_string());
                record.resolved_at_ms = Some(now_ms);
                record.resolution_action = Some(action.into());
                if let Some(notes) = notes {
                    record
                        .metadata
                        .insert("resolutionNotes".to_string(), notes.into());
                }
                true
            }
            Some(record) => {
                warn!(escalation_id = id, actor, status = ?record.status, "resolve on terminal escalation, ignoring");
                false
            }
            None => {
                warn!(escalation_id = id, actor, "resolve on unknown escalation, ignoring");
                false
            }
        };
        if should_remove {
            self.active.remove(id);
        }
    }

    /// Records in {pending, acknowledged}, optionally filtered by tenant.
    pub fn get_active(&self, tenant_id: Option<&TenantId>) -> Vec<EscalationRecord> {
        self.active
            .iter()
            .map(|e| e.value().clone())
            .filter(|record| !record.status.is_terminal())
            .filter(|record| match tenant_id {
                Some(tenant) => record.tenant_id == tenant.as_str(),
                None => true,
            })
            .collect()
    }

    pub fn get_pending(&self) -> Vec<EscalationRecord> {
        self.active
            .iter()
            .map(|e| e.value().clone())
            .filter(|record| record.status == EscalationStatus::Pending)
            .collect()
    }

    /// A single atomic snapshot sweep: for each active record in
    /// {pending, acknowledged} whose `timeoutAt` has passed, sets it
    /// `expired`, invokes the terminator if `autoTerminateOnTimeout`, and
    /// removes it. Taking the snapshot up front means a concurrent
    /// resolve during the sweep cannot be double-finalized.
    pub fn run_timeout_scan_once(&self, now_ms: i64) {
        let snapshot: Vec<(String, EscalationRecord)> = self
            .active
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (id, record) in snapshot {
            if record.status.is_terminal() || record.timeout_at_ms > now_ms {
                continue;
            }
            let Some(mut entry) = self.active.get_mut(&id) else {
                continue;
            };
            if entry.status.is_terminal() {
                continue;
            }
            entry.status = EscalationStatus::Expired;
            let execution_id = entry.execution_id.clone();
            let auto_terminate = entry.rule.auto_terminate_on_timeout;
            drop(entry);

            if auto_terminate {
                if let Some(terminator) = &self.terminator {
                    terminator.terminate(&execution_id, ESCALATION_TIMEOUT_REASON);
                }
            }
            self.active.remove(&id);
        }
    }

    /// Starts the background timeout sweep on `interval`. Idempotent:
    /// starting an already-running scanner replaces it.
    pub fn start_timeout_scan(self: &Arc<Self>, interval: Duration) {
        self.stop_timeout_scan();
        self.shutting_down.store(false, Ordering::SeqCst);
        let engine = Arc::clone(self);
        let shutting_down = Arc::clone(&self.shutting_down);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                let now_ms = now_millis();
                engine.run_timeout_scan_once(now_ms);
            }
        });
        *self.scan_handle.write() = Some(handle);
    }

    /// Stopping an already-stopped scanner is a no-op.
    pub fn stop_timeout_scan(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        if let Some(handle) = self.scan_handle.write().take() {
            handle.abort();
        }
    }

    /// Stops the scan, then clears the active map. A non-empty map at
    /// shutdown is an observability signal, not an error.
    pub fn shutdown(&self) {
        self.stop_timeout_scan();
        if !self.active.is_empty() {
            warn!(
                remaining = self.active.len(),
                "escalation engine shutting down with active records"
            );
        }
        self.active.clear();
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
