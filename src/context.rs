//! Execution context construction (C3).
//!
//! Validates an [`Intent`]/[`Decision`] pair, merges resource limits, and
//! emits an immutable [`ExecutionContext`] the tracker (C4) then owns a
//! by-value copy of. Identifier generation (execution/correlation/trace
//! ids, span ids) follows the approval manager's convention of
//! minting a fresh `Uuid` per record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{CognigateError, CognigateResult},
    model::{Decision, DecisionAction, Intent, ResourceLimits},
};

/// An immutable, fully-resolved execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub intent: Intent,
    pub decision: Decision,
    pub tenant_id: String,
    pub resource_limits: ResourceLimits,
    pub handler: String,
    pub parent_execution_id: Option<String>,
    pub correlation_id: String,
    pub trace_id: String,
    pub span_id: String,
    pub priority: i32,
    pub metadata: HashMap<String, Value>,
    /// Epoch-ms deadline, `created_at + timeoutMs`.
    pub deadline_ms: i64,
    pub created_at_ms: i64,
}

/// Inputs to [`ExecutionContextBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct BuildParams {
    pub intent: Option<Intent>,
    pub decision: Option<Decision>,
    pub handler: Option<String>,
    pub resource_limits: Option<ResourceLimits>,
    pub priority: Option<i32>,
    pub metadata: Option<HashMap<String, Value>>,
    pub correlation_id: Option<String>,
    pub trace_id: Option<String>,
}

/// Overrides accepted by [`ExecutionContextBuilder::create_child`]. Unset
/// (`None`) fields are ignored rather than clearing the parent's value.
#[derive(Debug, Clone, Default)]
pub struct ChildOverrides {
    pub resource_limits: Option<ResourceLimits>,
    pub handler: Option<String>,
    pub priority: Option<i32>,
    pub metadata: Option<HashMap<String, Value>>,
    pub parent_execution_id: Option<String>,
}

const DEFAULT_HANDLER: &str = "default";
const DEFAULT_PRIORITY: i32 = 0;

/// Stateless; all state lives in the contexts it produces.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionContextBuilder;

impl ExecutionContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Validates `params` and mints a fresh [`ExecutionContext`].
    pub fn build(&self, params: BuildParams, now_ms: i64) -> CognigateResult<ExecutionContext> {
        let intent = params
            .intent
            .ok_or_else(|| CognigateError::ValidationFailure("intent is required".to_string()))?;
        let decision = params.decision.ok_or_else(|| {
            CognigateError::ValidationFailure("decision is required".to_string())
        })?;

        if intent.tenant_id.trim().is_empty() {
            return Err(CognigateError::ValidationFailure(
                "tenantId must not be empty".to_string(),
            ));
        }
        if decision.intent_id != intent.id {
            return Err(CognigateError::ValidationFailure(format!(
                "decision.intentId ({}) does not match intent.id ({})",
                decision.intent_id, intent.id
            )));
        }
        if !matches!(decision.action, DecisionAction::Allow | DecisionAction::Monitor) {
            return Err(CognigateError::ValidationFailure(
                "decision does not authorize execution".to_string(),
            ));
        }

        let resource_limits = ResourceLimits::unset().merge(
            &params.resource_limits.unwrap_or_else(ResourceLimits::unset),
        );
        let deadline_ms = now_ms + resource_limits.timeout_ms() as i64;

        Ok(ExecutionContext {
            execution_id: new_id(),
            tenant_id: intent.tenant_id.clone(),
            intent,
            decision,
            resource_limits,
            handler: params.handler.unwrap_or_else(|| DEFAULT_HANDLER.to_string()),
            parent_execution_id: None,
            correlation_id: params.correlation_id.unwrap_or_else(new_id),
            trace_id: params.trace_id.unwrap_or_else(new_id),
            span_id: new_span_id(),
            priority: params.priority.unwrap_or(DEFAULT_PRIORITY),
            metadata: params.metadata.unwrap_or_default(),
            deadline_ms,
            created_at_ms: now_ms,
        })
    }

    /// Post-hoc validation beyond what `build` already enforces: positive
    /// `timeoutMs`, positive `maxMemoryMb`, non-empty handler, and a
    /// sane (non-negative) deadline relative to creation.
    pub fn validate(&self, ctx: &ExecutionContext) -> CognigateResult<()> {
        if ctx.tenant_id.trim().is_empty() {
            return Err(CognigateError::ValidationFailure(
                "tenantId must not be empty".to_string(),
            ));
        }
        if ctx.decision.intent_id != ctx.intent.id {
            return Err(CognigateError::ValidationFailure(format!(
                "decision.intentId ({}) does not match intent.id ({})",
                ctx.decision.intent_id, ctx.intent.id
            )));
        }
        if !matches!(ctx.decision.action, DecisionAction::Allow | DecisionAction::Monitor) {
            return Err(CognigateError::ValidationFailure(
                "decision does not authorize execution".to_string(),
            ));
        }
        if ctx.resource_limits.timeout_ms() == 0 {
            return Err(CognigateError::ValidationFailure(
                "timeoutMs must be positive".to_string(),
            ));
        }
        if ctx.resource_limits.max_memory_mb() == 0 {
            return Err(CognigateError::ValidationFailure(
                "maxMemoryMb must be positive".to_string(),
            ));
        }
        if ctx.handler.trim().is_empty() {
            return Err(CognigateError::ValidationFailure(
                "handler must not be empty when supplied".to_string(),
            ));
        }
        if ctx.deadline_ms < ctx.created_at_ms {
            return Err(CognigateError::ValidationFailure(
                "deadline must not precede creation".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds a child context that inherits tenant, intent, decision,
    /// correlation, trace, handler, priority, and metadata from `parent`;
    /// generates a fresh executionId and spanId; computes a fresh
    /// deadline from `overrides.resourceLimits.timeoutMs ← parent.timeoutMs`.
    pub fn create_child(
        &self,
        parent: &ExecutionContext,
        overrides: ChildOverrides,
        now_ms: i64,
    ) -> ExecutionContext {
        let resource_limits = parent.resource_limits.merge(
            &overrides.resource_limits.unwrap_or_else(ResourceLimits::unset),
        );
        let deadline_ms = now_ms + resource_limits.timeout_ms() as i64;

        ExecutionContext {
            execution_id: new_id(),
            intent: parent.intent.clone(),
            decision: parent.decision.clone(),
            tenant_id: parent.tenant_id.clone(),
            resource_limits,
            handler: overrides.handler.unwrap_or_else(|| parent.handler.clone()),
            parent_execution_id: Some(
                overrides
                    .parent_execution_id
                    .unwrap_or_else(|| parent.execution_id.clone()),
            ),
            correlation_id: parent.correlation_id.clone(),
            trace_id: parent.trace_id.clone(),
            span_id: new_span_id(),
            priority: overrides.priority.unwrap_or(parent.priority),
            metadata: overrides.metadata.unwrap_or_else(|| parent.metadata.clone()),
            deadline_ms,
            created_at_ms: now_ms,
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A 16-character span id: the tail of a v4 UUID with hyphens stripped.
fn new_span_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[raw.len() - 16..].to_string()
}
