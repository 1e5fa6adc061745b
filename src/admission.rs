//! Rate admission controller (C2).
//!
//! Evaluates four independent time horizons per tenant — burst (5s),
//! per-minute, per-hour request rate, and per-minute execution rate plus a
//! concurrent-execution ceiling — and synthesizes the resulting decision
//! into both IETF-draft and legacy `X-RateLimit-*` HTTP headers. Windows
//! are kept per-tenant in a [`DashMap`], the same structure the rate limiter
//! crate's `RateLimiter` uses for its per-tenant `CallWindow`s.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::CognigateError,
    tenant::{TenantId, Tier},
    window::SlidingWindow,
};

const BURST_WINDOW: Duration = Duration::from_secs(5);
const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const HOUR_WINDOW: Duration = Duration::from_secs(3_600);

/// Per-tier rate/quota ceilings (§3 RateLimitConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub burst_limit: u32,
    pub executions_per_minute: u32,
    pub concurrent_executions: u32,
}

impl RateLimitConfig {
    /// The shipped tier table (§3).
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                requests_per_minute: 30,
                requests_per_hour: 500,
                burst_limit: 5,
                executions_per_minute: 10,
                concurrent_executions: 5,
            },
            Tier::Pro => Self {
                requests_per_minute: 150,
                requests_per_hour: 5_000,
                burst_limit: 25,
                executions_per_minute: 50,
                concurrent_executions: 20,
            },
            Tier::Enterprise => Self {
                requests_per_minute: 500,
                requests_per_hour: 25_000,
                burst_limit: 50,
                executions_per_minute: 200,
                concurrent_executions: 100,
            },
        }
    }

    fn apply(&self, overrides: &RateLimitOverrides) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: overrides.requests_per_minute.unwrap_or(self.requests_per_minute),
            requests_per_hour: overrides.requests_per_hour.unwrap_or(self.requests_per_hour),
            burst_limit: overrides.burst_limit.unwrap_or(self.burst_limit),
            executions_per_minute: overrides
                .executions_per_minute
                .unwrap_or(self.executions_per_minute),
            concurrent_executions: overrides
                .concurrent_executions
                .unwrap_or(self.concurrent_executions),
        }
    }
}

/// A partial override of a tier's limits. `None` fields inherit from
/// whatever they're layered on top of (tier default, then constructor-wide
/// overrides, then per-tenant overrides — rightmost wins, §3).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RateLimitOverrides {
    pub requests_per_minute: Option<u32>,
    pub requests_per_hour: Option<u32>,
    pub burst_limit: Option<u32>,
    pub executions_per_minute: Option<u32>,
    pub concurrent_executions: Option<u32>,
}

/// A successful admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at_ms: i64,
}

/// A successful execution-admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimitOutcome {
    pub remaining: u64,
    pub reset_at_ms: i64,
}

#[derive(Default)]
struct TenantWindows {
    burst: SlidingWindow,
    minute: SlidingWindow,
    hour: SlidingWindow,
    exec_minute: SlidingWindow,
    concurrent: i64,
}

/// Per-tenant rate and concurrency admission.
pub struct RateAdmissionController {
    global_overrides: RateLimitOverrides,
    tenant_overrides: DashMap<TenantId, RateLimitOverrides>,
    windows: DashMap<TenantId, TenantWindows>,
}

impl Default for RateAdmissionController {
    fn default() -> Self {
        Self::new()
    }
}

impl RateAdmissionController {
    pub fn new() -> Self {
        Self {
            global_overrides: RateLimitOverrides::default(),
            tenant_overrides: DashMap::new(),
            windows: DashMap::new(),
        }
    }

    /// Applies constructor-wide overrides on top of every tier's defaults.
    #[must_use]
    pub fn with_overrides(mut self, overrides: RateLimitOverrides) -> Self {
        self.global_overrides = overrides;
        self
    }

    /// Per-tenant overrides, applied on top of the constructor-wide ones.
    pub fn set_tenant_overrides(&self, tenant: &TenantId, overrides: RateLimitOverrides) {
        self.tenant_overrides.insert(tenant.clone(), overrides);
    }

    /// Effective limits for `tenant` at `tier`: tier default, then
    /// constructor-wide overrides, then per-tenant overrides (§3).
    pub fn effective_limits(&self, tenant: &TenantId, tier: Tier) -> RateLimitConfig {
        let mut limits = RateLimitConfig::for_tier(tier).apply(&self.global_overrides);
        if let Some(overrides) = self.tenant_overrides.get(tenant) {
            limits = limits.apply(&overrides);
        }
        limits
    }

    /// Burst → minute → hour. The first horizon that one more record would
    /// violate is the denial reason.
    pub fn check_limit(
        &self,
        tenant: &TenantId,
        tier: Tier,
        now_ms: i64,
    ) -> Result<RateLimitOutcome, CognigateError> {
        let limits = self.effective_limits(tenant, tier);
        let mut windows = self.windows.entry(tenant.clone()).or_default();

        if !windows.burst.admit(now_ms, BURST_WINDOW, limits.burst_limit as usize) {
            let info = windows.burst.denial_info(now_ms, BURST_WINDOW);
            return Err(CognigateError::AdmissionDenied {
                reason: "Burst rate limit exceeded".to_string(),
                remaining: 0,
                reset_at_ms: info.reset_at_ms,
                retry_after_ms: info.retry_after_ms,
            });
        }
        if !windows
            .minute
            .admit(now_ms, MINUTE_WINDOW, limits.requests_per_minute as usize)
        {
            let info = windows.minute.denial_info(now_ms, MINUTE_WINDOW);
            return Err(CognigateError::AdmissionDenied {
                reason: "Per-minute rate limit exceeded".to_string(),
                remaining: 0,
                reset_at_ms: info.reset_at_ms,
                retry_after_ms: info.retry_after_ms,
            });
        }
        if !windows
            .hour
            .admit(now_ms, HOUR_WINDOW, limits.requests_per_hour as usize)
        {
            let info = windows.hour.denial_info(now_ms, HOUR_WINDOW);
            return Err(CognigateError::AdmissionDenied {
                reason: "Per-hour rate limit exceeded".to_string(),
                remaining: 0,
                reset_at_ms: info.reset_at_ms,
                retry_after_ms: info.retry_after_ms,
            });
        }

        let minute_remaining =
            (limits.requests_per_minute as i64 - windows.minute.count_in_window(now_ms, MINUTE_WINDOW) as i64)
                .max(0);
        let hour_remaining =
            (limits.requests_per_hour as i64 - windows.hour.count_in_window(now_ms, HOUR_WINDOW) as i64).max(0);

        Ok(RateLimitOutcome {
            limit: limits.requests_per_minute as u64,
            remaining: minute_remaining.min(hour_remaining) as u64,
            reset_at_ms: windows.minute.reset_at(now_ms, MINUTE_WINDOW),
        })
    }

    /// Inserts into all three request horizons. Separate from
    /// [`Self::check_limit`] so callers can choose to consume a slot only
    /// on successful downstream processing.
    pub fn record_request(&self, tenant: &TenantId, now_ms: i64) {
        let mut windows = self.windows.entry(tenant.clone()).or_default();
        windows.burst.record(now_ms, BURST_WINDOW);
        windows.minute.record(now_ms, MINUTE_WINDOW);
        windows.hour.record(now_ms, HOUR_WINDOW);
    }

    /// Concurrent ceiling first, then executions-per-minute.
    pub fn check_execution_limit(
        &self,
        tenant: &TenantId,
        tier: Tier,
        now_ms: i64,
    ) -> Result<ExecutionLimitOutcome, CognigateError> {
        let limits = self.effective_limits(tenant, tier);
        let mut windows = self.windows.entry(tenant.clone()).or_default();

        if windows.concurrent >= limits.concurrent_executions as i64 {
            return Err(CognigateError::AdmissionDenied {
                reason: format!(
                    "Concurrent execution limit reached ({}/{})",
                    windows.concurrent, limits.concurrent_executions
                ),
                remaining: 0,
                reset_at_ms: now_ms,
                retry_after_ms: 0,
            });
        }
        if !windows.exec_minute.admit(
            now_ms,
            MINUTE_WINDOW,
            limits.executions_per_minute as usize,
        ) {
            let info = windows.exec_minute.denial_info(now_ms, MINUTE_WINDOW);
            return Err(CognigateError::AdmissionDenied {
                reason: "Execution rate limit exceeded".to_string(),
                remaining: 0,
                reset_at_ms: info.reset_at_ms,
                retry_after_ms: info.retry_after_ms,
            });
        }

        let concurrent_remaining =
            (limits.concurrent_executions as i64 - windows.concurrent).max(0);
        let exec_remaining = (limits.executions_per_minute as i64
            - windows.exec_minute.count_in_window(now_ms, MINUTE_WINDOW) as i64)
            .max(0);

        Ok(ExecutionLimitOutcome {
            remaining: concurrent_remaining.min(exec_remaining) as u64,
            reset_at_ms: windows.exec_minute.reset_at(now_ms, MINUTE_WINDOW),
        })
    }

    /// Inserts into the exec-minute window and increments the concurrent
    /// counter.
    pub fn record_execution(&self, tenant: &TenantId, now_ms: i64) {
        let mut windows = self.windows.entry(tenant.clone()).or_default();
        windows.exec_minute.record(now_ms, MINUTE_WINDOW);
        windows.concurrent += 1;
    }

    /// Decrements the concurrent counter, clamped to zero. Idempotent
    /// below zero so duplicate completion notices cannot free phantom
    /// slots.
    pub fn complete_execution(&self, tenant: &TenantId) {
        if let Some(mut windows) = self.windows.get_mut(tenant) {
            windows.concurrent = (windows.concurrent - 1).max(0);
        }
    }

    /// Clears all windows and the concurrent counter for `tenant` (admin
    /// operation).
    pub fn reset_tenant(&self, tenant: &TenantId) {
        self.windows.remove(tenant);
    }

    /// Forcibly sets the concurrent counter to `actual_count`, returning
    /// the prior value. Supplemental reconcile operation (§9): a host can
    /// periodically pair this with
    /// `ActiveExecutionTracker::count_by_tenant` to correct drift between
    /// this controller and the tracker without coupling them
    /// transactionally.
    pub fn reconcile_concurrent(&self, tenant: &TenantId, actual_count: u64) -> i64 {
        let mut windows = self.windows.entry(tenant.clone()).or_default();
        let prior = windows.concurrent;
        windows.concurrent = actual_count as i64;
        prior
    }
}

/// Converts a rate-limit outcome (or denial) to HTTP header pairs: both
/// the IETF-draft names and the legacy `X-RateLimit-*` equivalents, plus
/// `Retry-After` when denied. `remaining`/`reset` are clamped to ≥ 0;
/// `reset` is ceil-converted from ms to seconds.
pub fn outcome_headers(
    result: &Result<RateLimitOutcome, CognigateError>,
    now_ms: i64,
) -> Vec<(&'static str, String)> {
    match result {
        Ok(outcome) => {
            let reset_secs = ceil_ms_to_secs((outcome.reset_at_ms - now_ms).max(0));
            vec![
                ("RateLimit-Limit", outcome.limit.to_string()),
                ("RateLimit-Remaining", outcome.remaining.to_string()),
                ("RateLimit-Reset", reset_secs.to_string()),
                ("X-RateLimit-Limit", outcome.limit.to_string()),
                ("X-RateLimit-Remaining", outcome.remaining.to_string()),
                ("X-RateLimit-Reset", reset_secs.to_string()),
            ]
        }
        Err(CognigateError::AdmissionDenied {
            remaining,
            reset_at_ms,
            retry_after_ms,
            ..
        }) => {
            let reset_secs = ceil_ms_to_secs((*reset_at_ms - now_ms).max(0));
            let retry_secs = ceil_ms_to_secs((*retry_after_ms).max(0));
            vec![
                ("RateLimit-Remaining", remaining.to_string()),
                ("RateLimit-Reset", reset_secs.to_string()),
                ("X-RateLimit-Remaining", remaining.to_string()),
                ("X-RateLimit-Reset", reset_secs.to_string()),
                ("Retry-After", retry_secs.to_string()),
            ]
        }
        Err(_) => Vec::new(),
    }
}

fn ceil_ms_to_secs(ms: i64) -> i64 {
    (ms + 999) / 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_denial_scenario() {
        // Tier=free (burstLimit=5). Six checks interleaved with records at
        // t=0..4ms allow the first five; the sixth denies (§8 scenario 1).
        let controller = RateAdmissionController::new();
        let tenant = TenantId::new("t1");
        for t in 0..5 {
            assert!(controller.check_limit(&tenant, Tier::Free, t).is_ok());
            controller.record_request(&tenant, t);
        }
        let result = controller.check_limit(&tenant, Tier::Free, 4);
        match result {
            Err(CognigateError::AdmissionDenied {
                reason,
                remaining,
                retry_after_ms,
                ..
            }) => {
                assert_eq!(reason, "Burst rate limit exceeded");
                assert_eq!(remaining, 0);
                assert!((4_990..=4_996).contains(&retry_after_ms));
            }
            other => panic!("expected burst denial, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_ceiling_scenario() {
        // Tier=free (concurrentExecutions=5) (§8 scenario 2).
        let controller = RateAdmissionController::new();
        let tenant = TenantId::new("t1");
        for t in 0..5 {
            assert!(controller
                .check_execution_limit(&tenant, Tier::Free, t)
                .is_ok());
            controller.record_execution(&tenant, t);
        }
        let denied = controller.check_execution_limit(&tenant, Tier::Free, 5);
        match denied {
            Err(CognigateError::AdmissionDenied { reason, .. }) => {
                assert!(reason.contains("Concurrent execution limit reached (5/5)"));
            }
            other => panic!("expected concurrency denial, got {other:?}"),
        }

        controller.complete_execution(&tenant);
        let outcome = controller
            .check_execution_limit(&tenant, Tier::Free, 6)
            .expect("should admit after completion");
        assert_eq!(outcome.remaining, 1);
    }

    #[test]
    fn test_complete_execution_idempotent_floor() {
        let controller = RateAdmissionController::new();
        let tenant = TenantId::new("t1");
        controller.complete_execution(&tenant);
        controller.complete_execution(&tenant);
        let outcome = controller
            .check_execution_limit(&tenant, Tier::Free, 0)
            .unwrap();
        assert_eq!(outcome.remaining, 5);
    }

    #[test]
    fn test_effective_limits_precedence() {
        let controller = RateAdmissionController::new().with_overrides(RateLimitOverrides {
            requests_per_minute: Some(999),
            ..Default::default()
        });
        let tenant = TenantId::new("t1");
        controller.set_tenant_overrides(
            &tenant,
            RateLimitOverrides {
                burst_limit: Some(1),
                ..Default::default()
            },
        );
        let limits = controller.effective_limits(&tenant, Tier::Free);
        assert_eq!(limits.requests_per_minute, 999);
        assert_eq!(limits.burst_limit, 1);
        // unset fields still fall back to the tier default.
        assert_eq!(limits.requests_per_hour, 500);
    }

    #[test]
    fn test_reset_tenant_clears_counters() {
        let controller = RateAdmissionController::new();
        let tenant = TenantId::new("t1");
        controller.record_execution(&tenant, 0);
        controller.reset_tenant(&tenant);
        let outcome = controller
            .check_execution_limit(&tenant, Tier::Free, 1)
            .unwrap();
        assert_eq!(outcome.remaining, 5);
    }

    #[test]
    fn test_reconcile_concurrent_returns_prior() {
        let controller = RateAdmissionController::new();
        let tenant = TenantId::new("t1");
        controller.record_execution(&tenant, 0);
        controller.record_execution(&tenant, 0);
        let prior = controller.reconcile_concurrent(&tenant, 0);
        assert_eq!(prior, 2);
        let outcome = controller
            .check_execution_limit(&tenant, Tier::Free, 1)
            .unwrap();
        assert_eq!(outcome.remaining, 5);
    }

    #[test]
    fn test_outcome_headers_allow_and_deny() {
        let controller = RateAdmissionController::new();
        let tenant = TenantId::new("t1");
        let ok = controller.check_limit(&tenant, Tier::Free, 0);
        let headers = outcome_headers(&ok, 0);
        assert!(headers.iter().any(|(k, _)| *k == "RateLimit-Limit"));
        assert!(headers.iter().any(|(k, _)| *k == "X-RateLimit-Remaining"));

        for t in 0..5 {
            controller.record_request(&tenant, t);
        }
        let denied = controller.check_limit(&tenant, Tier::Free, 4);
        let headers = outcome_headers(&denied, 4);
        assert!(headers.iter().any(|(k, _)| *k == "Retry-After"));
    }
}
