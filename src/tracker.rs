//! Active execution tracker (C4).
//!
//! Two in-memory indices, mirroring the dual-index layout a qualified
//! tool inventory cache uses: a primary `executionId →
//! ActiveExecution` map and a secondary `tenantId → set<executionId>`
//! map. Removal always clears both, and an emptied tenant set is itself
//! removed via `remove_if`, not merely left dangling.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    context::ExecutionContext,
    error::{CognigateError, CognigateResult},
    tenant::TenantId,
};

/// Lifecycle status of a tracked execution. Transitions are not enforced
/// by the tracker itself — see the module doc note below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Terminated,
}

/// A capability to signal cancellation with a reason. Any concrete type
/// exposing signal + observable reason suffices; this wraps a
/// [`CancellationToken`] plus a reason cell rather than baking in a
/// platform-specific construct.
#[derive(Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    reason: Arc<parking_lot::Mutex<Option<String>>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Signals cancellation, recording `reason` if this is the first
    /// signal. Idempotent: a later call with a different reason does not
    /// overwrite the first.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// An opaque, caller-supplied handle for observing execution resource
/// usage. The tracker stores it but never inspects its contents.
pub type ResourceMonitor = Arc<dyn std::any::Any + Send + Sync>;

/// A mutable record owned by the tracker. [`ActiveExecutionTracker::get`]
/// and [`ActiveExecutionTracker::snapshot`] hand out clones of this rather
/// than references, so a caller can read a consistent view without holding
/// a shard lock open.
#[derive(Clone)]
pub struct ActiveExecution {
    pub execution_id: String,
    pub tenant_id: TenantId,
    pub intent_id: String,
    pub handler_name: String,
    pub status: ExecutionStatus,
    pub started_at_ms: i64,
    pub deadline_ms: i64,
    pub cancel_handle: CancelHandle,
    pub resource_monitor: Option<ResourceMonitor>,
    pub context: ExecutionContext,
}

/// Indexed registry of in-flight executions.
///
/// Status transitions are not validated here: `update_status` accepts any
/// value and trusts the orchestration layer above it as the source of
/// truth, per the permissive behavior this is ported from.
pub struct ActiveExecutionTracker {
    by_id: DashMap<String, ActiveExecution>,
    by_tenant: DashMap<TenantId, HashSet<String>>,
}

impl Default for ActiveExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveExecutionTracker {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_tenant: DashMap::new(),
        }
    }

    /// Fails if `execution_id` is already tracked. Deadline is taken from
    /// `ctx.deadline_ms` when it is at or after `now`, else recomputed as
    /// `now + ctx.resource_limits.timeout_ms()`.
    pub fn track(
        &self,
        execution_id: String,
        ctx: ExecutionContext,
        cancel_handle: CancelHandle,
        now_ms: i64,
    ) -> CognigateResult<()> {
        if self.by_id.contains_key(&execution_id) {
            return Err(CognigateError::DuplicateTracking(execution_id));
        }

        let deadline_ms = if ctx.deadline_ms >= now_ms {
            ctx.deadline_ms
        } else {
            now_ms + ctx.resource_limits.timeout_ms() as i64
        };

        let tenant_id = TenantId::new(ctx.tenant_id.clone());
        let entry = ActiveExecution {
            execution_id: execution_id.clone(),
            tenant_id: tenant_id.clone(),
            intent_id: ctx.intent.id.clone(),
            handler_name: ctx.handler.clone(),
            status: ExecutionStatus::Pending,
            started_at_ms: now_ms,
            deadline_ms,
            cancel_handle,
            resource_monitor: None,
            context: ctx,
        };

        self.by_id.insert(execution_id.clone(), entry);
        self.by_tenant
            .entry(tenant_id)
            .or_default()
            .insert(execution_id);
        Ok(())
    }

    /// Returns `true` iff `execution_id` is tracked.
    pub fn contains(&self, execution_id: &str) -> bool {
        self.by_id.contains_key(execution_id)
    }

    /// Soft lookup; unknown ids are not an error.
    pub fn status(&self, execution_id: &str) -> Option<ExecutionStatus> {
        self.by_id.get(execution_id).map(|e| e.status)
    }

    pub fn tenant_of(&self, execution_id: &str) -> Option<TenantId> {
        self.by_id.get(execution_id).map(|e| e.tenant_id.clone())
    }

    /// Full-record lookup. Unknown ids return `None`, not an error.
    pub fn get(&self, execution_id: &str) -> Option<ActiveExecution> {
        self.by_id.get(execution_id).map(|e| e.value().clone())
    }

    /// A point-in-time clone of every tracked execution. Diagnostic-only:
    /// the returned `Vec` is immediately stale with respect to concurrent
    /// `track`/`remove` calls.
    pub fn snapshot(&self) -> Vec<ActiveExecution> {
        self.by_id.iter().map(|e| e.value().clone()).collect()
    }

    /// Removes `execution_id` from both indices, deleting the tenant set
    /// if it becomes empty.
    pub fn remove(&self, execution_id: &str) -> Option<TenantId> {
        let (_, entry) = self.by_id.remove(execution_id)?;
        if let Some(mut set) = self.by_tenant.get_mut(&entry.tenant_id) {
            set.remove(execution_id);
        }
        self.by_tenant
            .remove_if(&entry.tenant_id, |_, set| set.is_empty());
        Some(entry.tenant_id)
    }

    /// No-op with a warning if `execution_id` is unknown; otherwise a
    /// single-field mutation.
    pub fn update_status(&self, execution_id: &str, status: ExecutionStatus) {
        match self.by_id.get_mut(execution_id) {
            Some(mut entry) => entry.status = status,
            None => warn!(execution_id, "update_status on unknown execution, ignoring"),
        }
    }

    /// Fails loudly if `execution_id` is not tracked.
    pub fn set_resource_monitor(
        &self,
        execution_id: &str,
        monitor: ResourceMonitor,
    ) -> CognigateResult<()> {
        match self.by_id.get_mut(execution_id) {
            Some(mut entry) => {
                entry.resource_monitor = Some(monitor);
                Ok(())
            }
            None => Err(CognigateError::NotTracked(execution_id.to_string())),
        }
    }

    pub fn count_by_tenant(&self, tenant_id: &TenantId) -> usize {
        self.by_tenant
            .get(tenant_id)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    pub fn count(&self) -> usize {
        self.by_id.len()
    }

    /// Execution ids tracked for `tenant_id`.
    pub fn get_by_tenant(&self, tenant_id: &TenantId) -> Vec<String> {
        self.by_tenant
            .get(tenant_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Linear scan returning the ids of every entry whose deadline has
    /// passed. Read-only by design: acting on expiry is the
    /// orchestration layer's decision.
    pub fn get_expired(&self, now_ms: i64) -> Vec<String> {
        self.by_id
            .iter()
            .filter(|e| now_ms > e.deadline_ms)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Signals cancellation with `reason` on every tracked execution and
    /// marks it terminated. A snapshot of ids is taken first so the sweep
    /// is unaffected by concurrent inserts; cancel errors on individual
    /// handles are logged, not propagated, so one failure cannot abort
    /// the rest of the sweep.
    pub fn terminate_all(&self, reason: &str) {
        let ids: Vec<String> = self.by_id.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some(mut entry) = self.by_id.get_mut(&id) {
                entry.cancel_handle.cancel(reason.to_string());
                entry.status = ExecutionStatus::Terminated;
            } else {
                warn!(execution_id = %id, "terminate_all: execution vanished mid-sweep");
            }
        }
    }
}
