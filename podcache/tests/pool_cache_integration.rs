//! Integration tests for the pool cache.
//!
//! These exercise the public handle end to end, with the coordinator running
//! as a real tokio task:
//! - Register / acquire / release / remove lifecycles
//! - CPU-based eligibility
//! - Concurrency ceiling vs. scale-up signalling
//! - Idle listing
//! - Consistency under many concurrent callers

use podcache::{
    CpuQuantity, ErrorKind, NotFoundReason, PoolCache, PoolCacheConfig, PoolCacheError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// Test Helpers
// =============================================================================

/// Stand-in for the executor's function service record.
#[derive(Debug, PartialEq, Eq)]
struct FuncSvc {
    function: String,
    address: String,
}

fn svc(function: &str, address: &str) -> Arc<FuncSvc> {
    Arc::new(FuncSvc {
        function: function.to_string(),
        address: address.to_string(),
    })
}

fn cpu(s: &str) -> CpuQuantity {
    s.parse().expect("valid quantity")
}

fn new_cache() -> PoolCache<FuncSvc> {
    PoolCache::new(PoolCacheConfig::default())
}

async fn active_requests(cache: &PoolCache<FuncSvc>, function: &str, address: &str) -> usize {
    cache
        .inspect(function)
        .await
        .unwrap()
        .and_then(|s| s.instance(address).map(|i| i.active_requests))
        .unwrap_or_else(|| panic!("no instance {}/{}", function, address))
}

async fn svc_waiting(cache: &PoolCache<FuncSvc>, function: &str) -> usize {
    cache.inspect(function).await.unwrap().unwrap().svc_waiting
}

// =============================================================================
// Concrete Scenarios
// =============================================================================

#[tokio::test]
async fn test_register_then_acquire_returns_instance() {
    let cache = new_cache();
    let x = svc("f", "ip1");
    cache.register("f", "ip1", Arc::clone(&x), cpu("45m")).await.unwrap();

    let got = cache.acquire("f", 5, 10).await.unwrap();

    assert!(Arc::ptr_eq(&got, &x));
    assert_eq!(active_requests(&cache, "f", "ip1").await, 2);
}

#[tokio::test]
async fn test_removed_instance_not_listed_idle() {
    let cache = new_cache();
    cache.register("g", "ip2", svc("g", "ip2"), cpu("50m")).await.unwrap();
    cache.register("g", "ip22", svc("g", "ip22"), cpu("33m")).await.unwrap();
    cache.register("h", "ip3", svc("h", "ip3"), cpu("33m")).await.unwrap();

    cache.remove("g", "ip2").await.unwrap();

    // Remaining instances all hold their registration request
    assert!(cache.list_idle().await.unwrap().is_empty());

    cache.release("g", "ip22").await.unwrap();
    let idle = cache.list_idle().await.unwrap();
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0].address, "ip22");
    assert!(idle.iter().all(|v| v.address != "ip2"));
}

#[tokio::test]
async fn test_cpu_over_limit_is_ineligible_until_load_drops() {
    let cache = new_cache();
    cache.register("c", "100", svc("c", "100"), cpu("3m")).await.unwrap();
    cache.update_load("c", "100", cpu("4m")).await.unwrap();

    let err = cache.acquire("c", 5, 10).await.unwrap_err();
    assert!(err.should_scale_up(), "expected scale-up signal, got {err}");
    assert_eq!(svc_waiting(&cache, "c").await, 1);

    cache.update_load("c", "100", cpu("2m")).await.unwrap();
    let got = cache.acquire("c", 5, 10).await.unwrap();
    assert_eq!(got.address, "100");
}

#[tokio::test]
async fn test_acquire_unknown_function_does_not_create_it() {
    let cache = new_cache();

    let err = cache.acquire("ghost", 5, 10).await.unwrap_err();

    assert_eq!(
        err,
        PoolCacheError::NotFound {
            function: "ghost".to_string(),
            reason: NotFoundReason::UnknownFunction,
        }
    );
    assert!(cache.inspect("ghost").await.unwrap().is_none());

    // Still unknown on the second try, so no waiter was counted anywhere
    let err = cache.acquire("ghost", 5, 10).await.unwrap_err();
    assert!(!err.should_scale_up());
}

#[tokio::test]
async fn test_saturated_pool_at_ceiling_rejects() {
    let cache = new_cache();
    let concurrency = 3;
    let requests_per_pod = 2;

    for addr in ["a", "b", "c"] {
        cache.register("f", addr, svc("f", addr), cpu("1")).await.unwrap();
    }
    // Each registration holds one slot; one acquire per instance fills it
    for _ in 0..concurrency {
        cache.acquire("f", requests_per_pod, concurrency).await.unwrap();
    }
    for addr in ["a", "b", "c"] {
        assert_eq!(active_requests(&cache, "f", addr).await, requests_per_pod);
    }

    for _ in 0..3 {
        let err = cache
            .acquire("f", requests_per_pod, concurrency)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooManyRequests);
    }
    assert_eq!(svc_waiting(&cache, "f").await, 0);
}

#[tokio::test]
async fn test_over_release_is_harmless() {
    let cache = new_cache();
    cache.register("f", "a", svc("f", "a"), cpu("10m")).await.unwrap();
    cache.release("f", "a").await.unwrap();

    cache.release("f", "a").await.unwrap();
    cache.release("f", "a").await.unwrap();

    assert_eq!(active_requests(&cache, "f", "a").await, 0);
    let got = cache.acquire("f", 1, 1).await.unwrap();
    assert_eq!(got.address, "a");
    assert_eq!(active_requests(&cache, "f", "a").await, 1);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_ceiling_counts_cpu_ineligible_instances() {
    let cache = new_cache();
    cache.register("f", "a", svc("f", "a"), cpu("100m")).await.unwrap();
    cache.register("f", "b", svc("f", "b"), cpu("100m")).await.unwrap();
    cache.update_load("f", "a", cpu("200m")).await.unwrap();
    cache.update_load("f", "b", cpu("150m")).await.unwrap();

    let err = cache.acquire("f", 10, 2).await.unwrap_err();
    assert!(err.is_too_many_requests());

    // Raising the ceiling turns the same state into a scale-up signal
    let err = cache.acquire("f", 10, 3).await.unwrap_err();
    assert!(err.should_scale_up());
}

#[tokio::test]
async fn test_round_trip_register_remove() {
    let cache = new_cache();
    cache.register("f", "a", svc("f", "a"), cpu("1")).await.unwrap();
    cache.remove("f", "a").await.unwrap();

    let snapshot = cache.inspect("f").await.unwrap().unwrap();
    assert!(snapshot.instance("a").is_none());

    let response = cache.acquire_with_capacity("f", 5, 10).await.unwrap();
    assert!(response.outcome.unwrap_err().should_scale_up());
    // Empty pool, nothing in flight: 0 - 0 - 1
    assert_eq!(response.capacity.capacity, -1);
}

#[tokio::test]
async fn test_remove_unknown_function_is_not_found() {
    let cache = new_cache();
    let err = cache.remove("nope", "a").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_idle_listing_tracks_acquire_and_release() {
    let cache = new_cache();
    cache.register("f", "a", svc("f", "a"), cpu("1")).await.unwrap();
    cache.release("f", "a").await.unwrap();
    assert_eq!(cache.list_idle().await.unwrap().len(), 1);

    cache.acquire("f", 5, 10).await.unwrap();
    assert!(cache.list_idle().await.unwrap().is_empty());

    cache.release("f", "a").await.unwrap();
    let idle = cache.list_idle().await.unwrap();
    assert_eq!(idle.len(), 1);
    assert_eq!(idle[0].function, "f");
}

#[tokio::test]
async fn test_scale_up_flow_with_specialization() {
    let cache = new_cache();
    cache.register("f", "a", svc("f", "a"), cpu("1")).await.unwrap();

    // Instance busy (registration holds the only slot)
    let response = cache.acquire_with_capacity("f", 1, 5).await.unwrap();
    assert!(response.outcome.unwrap_err().should_scale_up());
    assert_eq!(svc_waiting(&cache, "f").await, 1);

    // Orchestrator launches a new instance
    cache.specialization_begin("f").await.unwrap();
    let response = cache.acquire_with_capacity("f", 1, 5).await.unwrap();
    assert_eq!(response.capacity.specialization_in_progress, 1);
    assert_eq!(response.capacity.svc_waiting, 1);

    cache.register("f", "b", svc("f", "b"), cpu("1")).await.unwrap();
    cache.specialization_end("f").await.unwrap();

    let snapshot = cache.inspect("f").await.unwrap().unwrap();
    assert_eq!(snapshot.specialization_in_progress, 0);
    assert_eq!(snapshot.svc_waiting, 1);
    assert_eq!(snapshot.instances.len(), 2);
}

#[tokio::test]
async fn test_zero_requests_per_pod_never_admits() {
    let cache = new_cache();
    cache.register("f", "a", svc("f", "a"), cpu("1")).await.unwrap();

    let err = cache.acquire("f", 0, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TooManyRequests);
    assert_eq!(svc_waiting(&cache, "f").await, 0);

    let err = cache.acquire("f", 0, 10).await.unwrap_err();
    assert!(err.should_scale_up());
    assert_eq!(svc_waiting(&cache, "f").await, 1);

    let err = cache.acquire("unknown", 0, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!err.should_scale_up());
}

#[tokio::test]
async fn test_huge_requests_per_pod_keeps_coordinator_alive() {
    let cache = new_cache();
    cache.register("f", "a", svc("f", "a"), cpu("1")).await.unwrap();

    let response = cache
        .acquire_with_capacity("f", usize::MAX, 10)
        .await
        .unwrap();
    assert_eq!(response.outcome.unwrap().address, "a");
    assert!(response.capacity.capacity > 0);

    cache.register("f", "b", svc("f", "b"), cpu("1")).await.unwrap();
    let got = cache.acquire("f", i64::MAX as usize, 10).await.unwrap();
    assert_eq!(got.address, "a");

    // Still serving afterwards
    let got = cache.acquire("f", 5, 10).await.unwrap();
    assert_eq!(got.address, "a");
    assert_eq!(active_requests(&cache, "f", "a").await, 4);
}

#[tokio::test]
async fn test_reclaim_empty_groups_enabled() {
    let cache = PoolCache::new(PoolCacheConfig::default().with_reclaim_empty_groups(true));
    cache.register("f", "a", svc("f", "a"), cpu("1")).await.unwrap();
    cache.remove("f", "a").await.unwrap();

    assert!(cache.inspect("f").await.unwrap().is_none());
    let err = cache.acquire("f", 5, 10).await.unwrap_err();
    assert!(!err.should_scale_up());
}

#[tokio::test]
async fn test_empty_groups_kept_by_default() {
    let cache = new_cache();
    cache.register("f", "a", svc("f", "a"), cpu("1")).await.unwrap();
    cache.remove("f", "a").await.unwrap();

    let snapshot = cache.inspect("f").await.unwrap().unwrap();
    assert!(snapshot.instances.is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquire_release_stays_consistent() {
    const INSTANCES: usize = 4;
    const REQUESTS_PER_POD: usize = 3;
    const TASKS: usize = 32;
    const ROUNDS: usize = 50;

    let cache = new_cache();
    let mut held: HashMap<String, Arc<AtomicUsize>> = HashMap::new();
    for i in 0..INSTANCES {
        let addr = format!("10.0.0.{}", i);
        cache.register("f", &addr, svc("f", &addr), cpu("1")).await.unwrap();
        held.insert(addr, Arc::new(AtomicUsize::new(0)));
    }
    let held = Arc::new(held);
    let successes = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let cache = cache.clone();
        let held = Arc::clone(&held);
        let successes = Arc::clone(&successes);
        handles.push(tokio::spawn(async move {
            for _ in 0..ROUNDS {
                match cache.acquire("f", REQUESTS_PER_POD, INSTANCES).await {
                    Ok(instance) => {
                        let counter = &held[&instance.address];
                        // Registration holds one slot on every instance
                        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        assert!(now < REQUESTS_PER_POD, "instance over-admitted: {}", now);
                        successes.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        counter.fetch_sub(1, Ordering::SeqCst);
                        cache.release("f", &instance.address).await.unwrap();
                    }
                    Err(e) => assert!(e.is_too_many_requests(), "unexpected error: {e}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(successes.load(Ordering::SeqCst) > 0);
    let snapshot = cache.inspect("f").await.unwrap().unwrap();
    for instance in &snapshot.instances {
        assert_eq!(instance.active_requests, 1, "{}", instance.address);
    }
    assert_eq!(snapshot.svc_waiting, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_all_visible() {
    let cache = new_cache();

    let mut handles = Vec::new();
    for i in 0..64 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            let function = format!("fn-{}", i % 4);
            let addr = format!("addr-{}", i);
            cache
                .register(&function, &addr, svc(&function, &addr), cpu("1"))
                .await
                .unwrap();
            cache.specialization_begin(&function).await.unwrap();
            cache.specialization_end(&function).await.unwrap();
            cache.release(&function, &addr).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.list_idle().await.unwrap().len(), 64);
    for i in 0..4 {
        let snapshot = cache.inspect(&format!("fn-{}", i)).await.unwrap().unwrap();
        assert_eq!(snapshot.instances.len(), 16);
        assert_eq!(snapshot.specialization_in_progress, 0);
    }
}

#[tokio::test]
async fn test_fire_and_forget_visible_to_next_acquire() {
    let cache = new_cache();
    // No awaiting of any reply between these: hand-off order alone decides
    cache.register("f", "a", svc("f", "a"), cpu("1")).await.unwrap();
    cache.update_load("f", "a", cpu("2")).await.unwrap();

    assert!(cache.acquire("f", 5, 10).await.unwrap_err().should_scale_up());
}
