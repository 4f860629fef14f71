//! Data model for the pool cache.
//!
//! A [`FunctionGroup`] holds every known instance of one function plus the
//! scaling counters for it. Only the coordinator ever touches these; callers
//! see them through [`FunctionSnapshot`] and [`CapacitySignal`].

use super::error::PoolCacheError;
use crate::quantity::CpuQuantity;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Entry
// =============================================================================

/// One live or launching instance at a given address.
#[derive(Debug)]
pub(crate) struct Entry<V> {
    /// Caller-owned instance descriptor. Never inspected here.
    pub value: Arc<V>,
    /// Invocations currently assigned to this instance.
    pub active_requests: usize,
    pub current_cpu_usage: CpuQuantity,
    pub cpu_limit: CpuQuantity,
}

impl<V> Entry<V> {
    pub fn new(value: Arc<V>, cpu_limit: CpuQuantity) -> Self {
        Self {
            value,
            active_requests: 0,
            current_cpu_usage: CpuQuantity::ZERO,
            cpu_limit,
        }
    }

    /// An instance takes new work only while below the per-instance limit
    /// and not over its CPU limit.
    pub fn is_eligible(&self, requests_per_pod: usize) -> bool {
        self.active_requests < requests_per_pod && self.current_cpu_usage <= self.cpu_limit
    }

    pub fn is_idle(&self) -> bool {
        self.active_requests == 0
    }
}

// =============================================================================
// Function Group
// =============================================================================

/// All instances and scaling state for one function.
#[derive(Debug)]
pub(crate) struct FunctionGroup<V> {
    /// Cold starts in flight that have not registered yet.
    pub specialization_in_progress: usize,
    /// Callers told to wait for a new instance.
    pub svc_waiting: usize,
    /// Instances keyed by address. Ordered so the admission scan is
    /// deterministic.
    pub svcs: BTreeMap<String, Entry<V>>,
}

impl<V> Default for FunctionGroup<V> {
    fn default() -> Self {
        Self {
            specialization_in_progress: 0,
            svc_waiting: 0,
            svcs: BTreeMap::new(),
        }
    }
}

impl<V> FunctionGroup<V> {
    pub fn total_active(&self) -> usize {
        self.svcs.values().map(|e| e.active_requests).sum()
    }

    /// True when nothing references the group any more.
    pub fn is_reclaimable(&self) -> bool {
        self.svcs.is_empty() && self.specialization_in_progress == 0 && self.svc_waiting == 0
    }

    pub fn snapshot(&self, function: &str) -> FunctionSnapshot {
        FunctionSnapshot {
            function: function.to_string(),
            specialization_in_progress: self.specialization_in_progress,
            svc_waiting: self.svc_waiting,
            instances: self
                .svcs
                .iter()
                .map(|(address, entry)| InstanceSnapshot {
                    address: address.clone(),
                    active_requests: entry.active_requests,
                    current_cpu_usage: entry.current_cpu_usage,
                    cpu_limit: entry.cpu_limit,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Replies
// =============================================================================

/// Capacity figures reported alongside every acquire.
///
/// `capacity` estimates how many more requests the function can absorb
/// counting in-flight cold starts; it goes negative when callers are
/// already queued beyond what the pool can serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacitySignal {
    pub capacity: i64,
    pub specialization_in_progress: usize,
    pub svc_waiting: usize,
}

/// Full reply to an acquire: the outcome plus the capacity signal.
#[derive(Debug)]
pub struct AcquireResponse<V> {
    pub outcome: Result<Arc<V>, PoolCacheError>,
    pub capacity: CapacitySignal,
}

impl<V> AcquireResponse<V> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Point-in-time view of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub address: String,
    pub active_requests: usize,
    pub current_cpu_usage: CpuQuantity,
    pub cpu_limit: CpuQuantity,
}

/// Point-in-time view of one function group, instances ordered by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSnapshot {
    pub function: String,
    pub specialization_in_progress: usize,
    pub svc_waiting: usize,
    pub instances: Vec<InstanceSnapshot>,
}

impl FunctionSnapshot {
    pub fn instance(&self, address: &str) -> Option<&InstanceSnapshot> {
        self.instances.iter().find(|i| i.address == address)
    }

    pub fn total_active(&self) -> usize {
        self.instances.iter().map(|i| i.active_requests).sum()
    }
}
