//! The outbound repository contract (§6).
//!
//! The core treats persistence as an opaque collaborator: an
//! implementation is expected to wrap a real store (and a circuit
//! breaker) behind this trait. Nothing in this crate calls these methods
//! yet directly — they exist as the documented seam a host wires the
//! tracker/escalation engine's audit and history needs through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CognigateResult;

/// Default page size for paginated listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Hard ceiling on page size regardless of what a caller requests.
pub const MAX_PAGE_SIZE: u32 = 1_000;

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
}

/// Offset-based pagination. Listings are ordered by `createdAt` (or
/// `eventTime` for events) descending unless stated otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Pagination {
    pub fn effective_limit(&self) -> u32 {
        clamp_limit(self.limit)
    }
}

/// A persisted execution row. Soft delete clears `context`/`metadata`/
/// `outputs` and stamps `deleted_at`; structural fields survive for
/// audit-trail continuity. Timestamps serialize as ISO-8601 UTC, the
/// persistence-side representation; the core's in-memory types use
/// epoch-ms (see [`crate::time`]) and convert at this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRow {
    pub execution_id: String,
    pub tenant_id: String,
    pub intent_id: String,
    pub status: String,
    pub context: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub outputs: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A chronological event attached to an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub execution_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tenant_id: String,
    pub event_type: String,
    pub severity: AuditSeverity,
    pub execution_id: Option<String>,
    pub intent_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub detail: serde_json::Value,
}

/// Filter parameters for [`ExecutionRepository::query_audit_records`].
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub tenant_id: String,
    pub event_type: Option<String>,
    pub severity: Option<AuditSeverity>,
    pub execution_id: Option<String>,
    pub intent_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

/// A persisted escalation row, mirroring [`crate::escalation::EscalationRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRow {
    pub id: String,
    pub execution_id: String,
    pub tenant_id: String,
    pub intent_id: String,
    pub status: String,
    pub priority: String,
    pub escalated_to: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Aggregate execution statistics scoped by `(tenant_id, since)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub running: u64,
    pub avg_duration_ms: f64,
    pub total_retries: u64,
}

/// The abstract store the execution governance core consumes. All
/// operations are expected to be wrapped by the host in a circuit
/// breaker; repeated failures must surface as a distinguishable error
/// rather than hanging the caller.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create_execution(&self, row: ExecutionRow) -> CognigateResult<()>;
    async fn get_execution(&self, execution_id: &str) -> CognigateResult<Option<ExecutionRow>>;
    async fn list_executions(
        &self,
        tenant_id: &str,
        pagination: Pagination,
    ) -> CognigateResult<Vec<ExecutionRow>>;
    async fn update_execution(&self, row: ExecutionRow) -> CognigateResult<()>;
    /// Clears `context`/`metadata`/`outputs` and stamps `deleted_at`.
    async fn soft_delete_execution(
        &self,
        execution_id: &str,
        now: DateTime<Utc>,
    ) -> CognigateResult<()>;
    /// Removes the execution and its events/escalations in one transaction.
    async fn hard_delete_execution(&self, execution_id: &str) -> CognigateResult<()>;

    async fn append_execution_event(&self, event: ExecutionEvent) -> CognigateResult<()>;
    /// Chronological by `occurred_at`.
    async fn list_execution_events(
        &self,
        execution_id: &str,
        pagination: Pagination,
    ) -> CognigateResult<Vec<ExecutionEvent>>;

    async fn insert_audit_record(&self, record: AuditRecord) -> CognigateResult<()>;
    async fn insert_audit_records(&self, records: Vec<AuditRecord>) -> CognigateResult<()>;
    async fn query_audit_records(&self, query: AuditQuery) -> CognigateResult<Vec<AuditRecord>>;

    async fn create_escalation(&self, row: EscalationRow) -> CognigateResult<()>;
    async fn get_escalation(&self, id: &str) -> CognigateResult<Option<EscalationRow>>;
    async fn update_escalation(&self, row: EscalationRow) -> CognigateResult<()>;
    async fn list_active_escalations_by_tenant(
        &self,
        tenant_id: &str,
    ) -> CognigateResult<Vec<EscalationRow>>;

    /// Retention scan: rows soft-deleted before `ts`.
    async fn executions_deleted_before(&self, ts: DateTime<Utc>) -> CognigateResult<Vec<ExecutionRow>>;

    async fn execution_stats(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
    ) -> CognigateResult<ExecutionStats>;
}
