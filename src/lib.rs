//! Execution governance core for the Cognigate constrained execution
//! runtime.
//!
//! ## Modules
//!
//! - [`window`]: per-tenant sliding-window timestamp counter (C1)
//! - [`admission`]: four-horizon rate and concurrency admission (C2)
//! - [`context`]: execution context construction and validation (C3)
//! - [`tracker`]: indexed registry of in-flight executions (C4)
//! - [`escalation`]: rule evaluation and escalation record lifecycle (C5)
//! - [`repository`]: the outbound persistence contract (interface only)
//!
//! ## Shared Types
//!
//! - [`TenantId`] / [`Tier`]: tenant identity and rate-limit tier
//! - [`Intent`] / [`Decision`] / [`ResourceLimits`]: data the core consumes

pub mod admission;
pub mod context;
pub mod error;
pub mod escalation;
pub mod model;
pub mod repository;
pub mod tenant;
pub mod time;
pub mod tracker;
pub mod window;

pub use admission::{RateAdmissionController, RateLimitConfig, RateLimitOverrides};
pub use context::{BuildParams, ChildOverrides, ExecutionContext, ExecutionContextBuilder};
pub use error::{CognigateError, CognigateResult};
pub use escalation::{EscalationEngine, EscalationRecord, EscalationRule, EscalationStatus};
pub use model::{Decision, DecisionAction, Intent, ResourceLimits};
pub use repository::ExecutionRepository;
pub use tenant::{TenantId, Tier};
pub use tracker::{ActiveExecution, ActiveExecutionTracker, CancelHandle, ExecutionStatus};
