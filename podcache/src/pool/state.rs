//! Cache state and the admission algorithm.
//!
//! [`PoolState`] is plain synchronous code. It is owned by exactly one
//! coordinator task, which is what makes every method here atomic with
//! respect to concurrent callers.

use super::error::PoolCacheError;
use super::types::{AcquireResponse, CapacitySignal, Entry, FunctionGroup, FunctionSnapshot};
use crate::config::PoolCacheConfig;
use crate::quantity::CpuQuantity;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Converts a count for the capacity signal, clamping at `i64::MAX`.
fn saturating_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// All function groups, keyed by function name.
pub(crate) struct PoolState<V> {
    groups: BTreeMap<String, FunctionGroup<V>>,
    reclaim_empty_groups: bool,
}

impl<V> PoolState<V> {
    pub fn new(config: &PoolCacheConfig) -> Self {
        Self {
            groups: BTreeMap::new(),
            reclaim_empty_groups: config.reclaim_empty_groups,
        }
    }

    fn group_mut(&mut self, function: &str) -> &mut FunctionGroup<V> {
        self.groups.entry(function.to_string()).or_default()
    }

    /// Drops the group if reclamation is enabled and nothing refers to it.
    fn maybe_reclaim(&mut self, function: &str) {
        if !self.reclaim_empty_groups {
            return;
        }
        let reclaimable = self
            .groups
            .get(function)
            .is_some_and(FunctionGroup::is_reclaimable);
        if reclaimable {
            self.groups.remove(function);
            info!(function, "Reclaimed empty function group");
        }
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Finds an eligible instance or reports why there is none.
    ///
    /// Instances are scanned in address order and the first one below
    /// `requests_per_pod` and within its CPU limit is taken. Without one, the
    /// caller is either told to scale up (and counted as waiting) or, if the
    /// pool already holds `concurrency` instances, rejected.
    pub fn acquire(
        &mut self,
        function: &str,
        requests_per_pod: usize,
        concurrency: usize,
    ) -> AcquireResponse<V> {
        let Some(group) = self.groups.get_mut(function) else {
            return AcquireResponse {
                outcome: Err(PoolCacheError::unknown_function(function)),
                capacity: CapacitySignal::default(),
            };
        };

        let total_active = group.total_active();
        let pods = group
            .specialization_in_progress
            .saturating_add(group.svcs.len());
        let in_flight = total_active.saturating_add(group.svc_waiting);
        let capacity = saturating_i64(pods)
            .saturating_mul(saturating_i64(requests_per_pod))
            .saturating_sub(saturating_i64(in_flight));
        let mut signal = CapacitySignal {
            capacity,
            specialization_in_progress: group.specialization_in_progress,
            svc_waiting: group.svc_waiting,
        };

        let selected = group
            .svcs
            .iter_mut()
            .find(|(_, entry)| entry.is_eligible(requests_per_pod));

        if let Some((address, entry)) = selected {
            entry.active_requests += 1;
            debug!(
                function,
                address = %address,
                active_requests = entry.active_requests,
                "Increased active requests on acquire"
            );
            return AcquireResponse {
                outcome: Ok(Arc::clone(&entry.value)),
                capacity: signal,
            };
        }

        if group.svcs.len() >= concurrency {
            return AcquireResponse {
                outcome: Err(PoolCacheError::TooManyRequests {
                    function: function.to_string(),
                    concurrency,
                }),
                capacity: signal,
            };
        }

        group.svc_waiting += 1;
        signal.capacity = signal.capacity.saturating_sub(1);
        AcquireResponse {
            outcome: Err(PoolCacheError::no_eligible_instance(function)),
            capacity: signal,
        }
    }

    // =========================================================================
    // Instance lifecycle
    // =========================================================================

    /// Inserts or replaces the instance at `address`.
    ///
    /// The registration itself counts as one active request, and it
    /// satisfies one waiting caller if any are queued.
    pub fn register(
        &mut self,
        function: &str,
        address: &str,
        value: Arc<V>,
        cpu_limit: CpuQuantity,
    ) {
        let group = self.group_mut(function);
        group.svc_waiting = group.svc_waiting.saturating_sub(1);

        let entry = group
            .svcs
            .entry(address.to_string())
            .and_modify(|e| e.value = Arc::clone(&value))
            .or_insert_with(|| Entry::new(value, cpu_limit));
        entry.cpu_limit = cpu_limit;
        entry.active_requests += 1;

        debug!(
            function,
            address,
            active_requests = entry.active_requests,
            cpu_limit = %cpu_limit,
            "Increased active requests on register"
        );
    }

    /// Returns one unit of work from the instance. Over-release is logged
    /// and ignored.
    pub fn release(&mut self, function: &str, address: &str) {
        let Some(entry) = self
            .groups
            .get_mut(function)
            .and_then(|g| g.svcs.get_mut(address))
        else {
            debug!(function, address, "Release for unknown instance ignored");
            return;
        };

        if entry.active_requests == 0 {
            warn!(
                function,
                address,
                active_requests = entry.active_requests,
                "Invalid request to decrease active requests"
            );
            return;
        }

        entry.active_requests -= 1;
        debug!(
            function,
            address,
            active_requests = entry.active_requests,
            "Decreased active requests"
        );
    }

    pub fn remove(&mut self, function: &str, address: &str) -> Result<(), PoolCacheError> {
        let group = self
            .groups
            .get_mut(function)
            .ok_or_else(|| PoolCacheError::unknown_function(function))?;

        if group.svcs.remove(address).is_some() {
            debug!(function, address, "Removed instance");
        }
        self.maybe_reclaim(function);
        Ok(())
    }

    pub fn update_load(&mut self, function: &str, address: &str, cpu_usage: CpuQuantity) {
        if let Some(entry) = self.group_mut(function).svcs.get_mut(address) {
            entry.current_cpu_usage = cpu_usage;
            return;
        }
        debug!(function, address, "CPU update for unknown instance ignored");
        self.maybe_reclaim(function);
    }

    // =========================================================================
    // Specialization
    // =========================================================================

    pub fn specialization_begin(&mut self, function: &str) {
        self.group_mut(function).specialization_in_progress += 1;
    }

    pub fn specialization_end(&mut self, function: &str) {
        let group = self.group_mut(function);
        group.specialization_in_progress = group.specialization_in_progress.saturating_sub(1);
        self.maybe_reclaim(function);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every instance with no active requests, ordered by function then
    /// address.
    pub fn list_idle(&self) -> Vec<Arc<V>> {
        self.groups
            .iter()
            .flat_map(|(function, group)| {
                group.svcs.iter().filter_map(move |(address, entry)| {
                    if entry.is_idle() {
                        debug!(
                            function = %function,
                            address = %address,
                            "Instance has no active requests"
                        );
                        Some(Arc::clone(&entry.value))
                    } else {
                        None
                    }
                })
            })
            .collect()
    }

    pub fn inspect(&self, function: &str) -> Option<FunctionSnapshot> {
        self.groups.get(function).map(|g| g.snapshot(function))
    }

    #[cfg(test)]
    pub fn contains_group(&self, function: &str) -> bool {
        self.groups.contains_key(function)
    }
}
