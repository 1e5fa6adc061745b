//! End-to-end scenarios spanning the rate admission controller, the
//! execution context builder, the active execution tracker, and the
//! escalation engine, plus the cross-component invariants they jointly
//! uphold.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use cognigate_core::admission::RateAdmissionController;
use cognigate_core::context::{BuildParams, ExecutionContextBuilder};
use cognigate_core::escalation::{
    EscalationCondition, EscalationEngine, EscalationPriority, EscalationRule,
    EvaluationContext, ESCALATION_TIMEOUT_REASON,
};
use cognigate_core::model::{Decision, DecisionAction, Intent};
use cognigate_core::tenant::{TenantId, Tier};
use cognigate_core::tracker::{ActiveExecutionTracker, CancelHandle};
use cognigate_core::CognigateError;
use serde_json::Value;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

static INIT: Once = Once::new();

/// Brings up a `tracing` subscriber once per test binary so the escalation
/// scanner's `warn!`/`debug!` output is visible under `RUST_LOG`.
fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::WARN.into())
                    .from_env_lossy(),
            )
            .try_init();
    });
}

fn intent(id: &str, tenant: &str) -> Intent {
    Intent {
        id: id.to_string(),
        tenant_id: tenant.to_string(),
        handler: None,
        resource_limits: None,
        payload: Value::Null,
    }
}

fn allow(intent_id: &str) -> Decision {
    Decision {
        intent_id: intent_id.to_string(),
        action: DecisionAction::Allow,
        reason: None,
    }
}

#[test]
fn test_burst_denial_at_sixth_request() {
    let controller = RateAdmissionController::new();
    let tenant = TenantId::new("tenant-a");
    for t in 0..5 {
        controller.check_limit(&tenant, Tier::Free, t).unwrap();
        controller.record_request(&tenant, t);
    }
    let err = controller.check_limit(&tenant, Tier::Free, 4).unwrap_err();
    match err {
        CognigateError::AdmissionDenied {
            reason,
            remaining,
            retry_after_ms,
            ..
        } => {
            assert_eq!(reason, "Burst rate limit exceeded");
            assert_eq!(remaining, 0);
            assert!((4_990..=4_996).contains(&retry_after_ms));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_concurrent_ceiling_then_recovery() {
    let controller = RateAdmissionController::new();
    let tenant = TenantId::new("tenant-a");
    for t in 0..5 {
        controller.check_execution_limit(&tenant, Tier::Free, t).unwrap();
        controller.record_execution(&tenant, t);
    }
    let err = controller
        .check_execution_limit(&tenant, Tier::Free, 5)
        .unwrap_err();
    match err {
        CognigateError::AdmissionDenied { reason, .. } => {
            assert!(reason.contains("Concurrent execution limit reached (5/5)"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    controller.complete_execution(&tenant);
    let outcome = controller
        .check_execution_limit(&tenant, Tier::Free, 6)
        .unwrap();
    assert_eq!(outcome.remaining, 1);
}

#[test]
fn test_escalation_on_resource_overshoot() {
    let engine = EscalationEngine::new();
    engine.add_rule(
        EscalationRule::new(
            "mem-rule",
            "memory overshoot",
            EscalationCondition::ResourceExceeded {
                resource: "memoryMb".to_string(),
                threshold: 400.0,
            },
            "oncall",
            "PT30M",
            EscalationPriority::High,
        )
        .with_auto_terminate(true),
    );

    let mut usage = HashMap::new();
    usage.insert("memoryMb".to_string(), 512.0);
    let ctx = EvaluationContext {
        execution_id: "e1".to_string(),
        resource_usage: Some(usage),
        ..Default::default()
    };

    let rule = engine.evaluate(&ctx).expect("rule should match");
    let record = engine.escalate("e1", "tenant-a", "intent-1", rule, "memory exceeded", None, 0);

    assert_eq!(record.timeout_at_ms, 1_800_000);
    assert_eq!(
        record.status,
        cognigate_core::escalation::EscalationStatus::Pending
    );
}

#[test]
fn test_escalation_timeout_auto_terminates_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let engine = EscalationEngine::new().with_terminator(Arc::new(
        move |_execution_id: &str, reason: &str| {
            assert_eq!(reason, "escalation timeout");
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
    ));

    let rule = EscalationRule::new(
        "timeout-rule",
        "timeout",
        EscalationCondition::TimeoutExceeded { threshold_ms: 1_000 },
        "oncall",
        "PT1M",
        EscalationPriority::Medium,
    )
    .with_auto_terminate(true);

    let record = engine.escalate("e1", "tenant-a", "intent-1", rule, "slow", None, 0);
    assert!(record.timeout_at_ms > 0);

    engine.run_timeout_scan_once(record.timeout_at_ms + 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(engine.get_active(None).is_empty());

    // a second sweep over the (now-removed) record must not re-invoke the callback
    engine.run_timeout_scan_once(record.timeout_at_ms + 1_000);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rejection_of_unauthorized_decision() {
    let builder = ExecutionContextBuilder::new();
    let err = builder
        .build(
            BuildParams {
                intent: Some(intent("i1", "tenant-a")),
                decision: Some(Decision {
                    intent_id: "i1".to_string(),
                    action: DecisionAction::Deny,
                    reason: Some("policy veto".to_string()),
                }),
                ..Default::default()
            },
            0,
        )
        .unwrap_err();
    match err {
        cognigate_core::CognigateError::ValidationFailure(msg) => {
            assert!(msg.contains("does not authorize execution"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_child_context_parentage() {
    let builder = ExecutionContextBuilder::new();
    let parent = builder
        .build(
            BuildParams {
                intent: Some(intent("i1", "tenant-a")),
                decision: Some(allow("i1")),
                ..Default::default()
            },
            0,
        )
        .unwrap();

    let child = builder.create_child(
        &parent,
        cognigate_core::context::ChildOverrides {
            resource_limits: Some(cognigate_core::model::ResourceLimits {
                timeout_ms: Some(1_000),
                ..cognigate_core::model::ResourceLimits::unset()
            }),
            ..Default::default()
        },
        0,
    );

    assert_eq!(child.deadline_ms, 1_000);
    assert_ne!(child.execution_id, parent.execution_id);
    assert_eq!(child.correlation_id, parent.correlation_id);
}

#[test]
fn test_tracker_count_by_tenant_matches_membership() {
    let tracker = ActiveExecutionTracker::new();
    let builder = ExecutionContextBuilder::new();
    let tenant = TenantId::new("tenant-a");

    for i in 0..3 {
        let ctx = builder
            .build(
                BuildParams {
                    intent: Some(intent(&format!("i{i}"), "tenant-a")),
                    decision: Some(allow(&format!("i{i}"))),
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        tracker
            .track(format!("e{i}"), ctx, CancelHandle::new(), 0)
            .unwrap();
    }

    assert_eq!(tracker.count_by_tenant(&tenant), 3);
    for i in 0..3 {
        let entry = tracker.get(&format!("e{i}")).expect("tracked execution");
        assert_eq!(entry.tenant_id, tenant);
    }
    tracker.remove("e0");
    assert_eq!(tracker.count_by_tenant(&tenant), 2);
    assert!(tracker.get("e0").is_none());
}

/// End-to-end: a real background scan tick (not `run_timeout_scan_once`
/// called directly) expires an escalation and, via the terminator
/// callback, cancels and unregisters the execution it was raised against.
#[tokio::test]
async fn test_escalation_scanner_terminates_tracked_execution() {
    init_test_logging();

    let tracker = Arc::new(ActiveExecutionTracker::new());
    let builder = ExecutionContextBuilder::new();
    let ctx = builder
        .build(
            BuildParams {
                intent: Some(intent("i1", "tenant-a")),
                decision: Some(allow("i1")),
                ..Default::default()
            },
            0,
        )
        .unwrap();
    let cancel_handle = CancelHandle::new();
    tracker
        .track("e1".to_string(), ctx, cancel_handle.clone(), 0)
        .unwrap();

    let tracker_for_terminator = Arc::clone(&tracker);
    let engine = Arc::new(EscalationEngine::new().with_terminator(Arc::new(
        move |execution_id: &str, reason: &str| {
            if let Some(entry) = tracker_for_terminator.get(execution_id) {
                entry.cancel_handle.cancel(reason.to_string());
            }
            tracker_for_terminator.remove(execution_id);
        },
    )));

    let rule = EscalationRule::new(
        "timeout-rule",
        "slow execution",
        EscalationCondition::TimeoutExceeded { threshold_ms: 1 },
        "oncall",
        "PT1S",
        EscalationPriority::Medium,
    )
    .with_auto_terminate(true);
    engine.escalate("e1", "tenant-a", "i1", rule, "slow", None, 0);

    engine.start_timeout_scan(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop_timeout_scan();

    assert!(engine.get_active(None).is_empty());
    assert!(!tracker.contains("e1"));
    assert!(cancel_handle.is_cancelled());
    assert_eq!(
        cancel_handle.reason(),
        Some(ESCALATION_TIMEOUT_REASON.to_string())
    );
}

#[test]
fn test_reconcile_concurrent_drift_between_admission_and_tracker() {
    let controller = RateAdmissionController::new();
    let tracker = ActiveExecutionTracker::new();
    let builder = ExecutionContextBuilder::new();
    let tenant = TenantId::new("tenant-a");

    let ctx = builder
        .build(
            BuildParams {
                intent: Some(intent("i1", "tenant-a")),
                decision: Some(allow("i1")),
                ..Default::default()
            },
            0,
        )
        .unwrap();
    tracker
        .track("e1".to_string(), ctx, CancelHandle::new(), 0)
        .unwrap();

    // caller forgot to pair recordExecution with track: the rate
    // controller's counter has drifted from the tracker's.
    let actual = tracker.count_by_tenant(&tenant) as u64;
    let prior = controller.reconcile_concurrent(&tenant, actual);
    assert_eq!(prior, 0);

    let outcome = controller
        .check_execution_limit(&tenant, Tier::Free, 1)
        .unwrap();
    assert_eq!(outcome.remaining, 4);
}
