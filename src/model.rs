//! Shared data shapes: resource limits, intents, and the authorization
//! decisions that gate execution (§3).

use serde::{Deserialize, Serialize};

/// Per-execution resource ceilings. Missing fields fall back to the
/// documented defaults below when merged via [`ResourceLimits::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_mb: Option<u64>,
    pub max_cpu_percent: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub max_network_requests: Option<u32>,
    pub max_file_system_ops: Option<u32>,
    pub max_concurrent_ops: Option<u32>,
    pub max_payload_size_bytes: Option<u64>,
    pub max_retries: Option<u32>,
    pub network_timeout_ms: Option<u64>,
}

impl ResourceLimits {
    pub const DEFAULT_MAX_MEMORY_MB: u64 = 512;
    pub const DEFAULT_MAX_CPU_PERCENT: u32 = 80;
    pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
    pub const DEFAULT_MAX_NETWORK_REQUESTS: u32 = 100;
    pub const DEFAULT_MAX_FILE_SYSTEM_OPS: u32 = 1_000;
    pub const DEFAULT_MAX_CONCURRENT_OPS: u32 = 10;
    pub const DEFAULT_MAX_PAYLOAD_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 30_000;

    /// An all-fields-unset record; every accessor falls back to the
    /// documented default.
    pub fn unset() -> Self {
        Self {
            max_memory_mb: None,
            max_cpu_percent: None,
            timeout_ms: None,
            max_network_requests: None,
            max_file_system_ops: None,
            max_concurrent_ops: None,
            max_payload_size_bytes: None,
            max_retries: None,
            network_timeout_ms: None,
        }
    }

    pub fn max_memory_mb(&self) -> u64 {
        self.max_memory_mb.unwrap_or(Self::DEFAULT_MAX_MEMORY_MB)
    }

    pub fn max_cpu_percent(&self) -> u32 {
        self.max_cpu_percent
            .unwrap_or(Self::DEFAULT_MAX_CPU_PERCENT)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or(Self::DEFAULT_TIMEOUT_MS)
    }

    pub fn max_network_requests(&self) -> u32 {
        self.max_network_requests
            .unwrap_or(Self::DEFAULT_MAX_NETWORK_REQUESTS)
    }

    pub fn max_file_system_ops(&self) -> u32 {
        self.max_file_system_ops
            .unwrap_or(Self::DEFAULT_MAX_FILE_SYSTEM_OPS)
    }

    pub fn max_concurrent_ops(&self) -> u32 {
        self.max_concurrent_ops
            .unwrap_or(Self::DEFAULT_MAX_CONCURRENT_OPS)
    }

    pub fn max_payload_size_bytes(&self) -> u64 {
        self.max_payload_size_bytes
            .unwrap_or(Self::DEFAULT_MAX_PAYLOAD_SIZE_BYTES)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(Self::DEFAULT_MAX_RETRIES)
    }

    pub fn network_timeout_ms(&self) -> u64 {
        self.network_timeout_ms
            .unwrap_or(Self::DEFAULT_NETWORK_TIMEOUT_MS)
    }

    /// Merges `self` (defaults) left-to-right with `overrides`: any field
    /// set in `overrides` wins, everything else is inherited from `self`.
    pub fn merge(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            max_memory_mb: overrides.max_memory_mb.or(self.max_memory_mb),
            max_cpu_percent: overrides.max_cpu_percent.or(self.max_cpu_percent),
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
            max_network_requests: overrides.max_network_requests.or(self.max_network_requests),
            max_file_system_ops: overrides.max_file_system_ops.or(self.max_file_system_ops),
            max_concurrent_ops: overrides.max_concurrent_ops.or(self.max_concurrent_ops),
            max_payload_size_bytes: overrides
                .max_payload_size_bytes
                .or(self.max_payload_size_bytes),
            max_retries: overrides.max_retries.or(self.max_retries),
            network_timeout_ms: overrides.network_timeout_ms.or(self.network_timeout_ms),
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::unset()
    }
}

/// The verdict an upstream authorization step attaches to an [`Intent`].
/// Only `Allow`/`Monitor` reach this subsystem — anything else is rejected
/// by [`crate::context::ExecutionContextBuilder`] before a context is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Monitor,
    Deny,
}

/// A client-authored request to perform work, already admitted by an
/// upstream policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub resource_limits: Option<ResourceLimits>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The upstream authorization verdict attached to an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub intent_id: String,
    pub action: DecisionAction,
    #[serde(default)]
    pub reason: Option<String>,
}
