//! Public operation surface of the pool cache.
//!
//! [`PoolCache`] is a cheap, cloneable handle. Each method turns one call
//! into a [`Request`], hands it to the coordinator, and waits for the
//! coordinator to accept it. Methods whose kind produces a result then also
//! wait on a reply channel created for that call alone.

use super::coordinator::Coordinator;
use super::error::PoolCacheError;
use super::request::{Envelope, Request};
use super::types::{AcquireResponse, FunctionSnapshot};
use crate::config::PoolCacheConfig;
use crate::quantity::CpuQuantity;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Intake depth. Callers still wait for acceptance, so this only lets one
/// envelope sit ready while the coordinator finishes the previous one.
const INTAKE_CAPACITY: usize = 1;

/// Handle to a running pool cache.
///
/// The coordinator task is spawned on construction and runs until the last
/// handle is dropped.
///
/// # Example
///
/// ```ignore
/// use podcache::{CpuQuantity, PoolCache, PoolCacheConfig};
///
/// let cache = PoolCache::new(PoolCacheConfig::default());
/// cache.register("hello", "10.0.0.7:8888", pod, "250m".parse()?).await?;
///
/// match cache.acquire("hello", 5, 10).await {
///     Ok(pod) => forward(pod).await,
///     Err(e) if e.should_scale_up() => launch_new_instance().await,
///     Err(e) => return Err(e.into()),
/// }
/// ```
pub struct PoolCache<V> {
    intake: mpsc::Sender<Envelope<V>>,
}

impl<V> Clone for PoolCache<V> {
    fn clone(&self) -> Self {
        Self {
            intake: self.intake.clone(),
        }
    }
}

impl<V> fmt::Debug for PoolCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolCache")
            .field("running", &!self.intake.is_closed())
            .finish()
    }
}

impl<V: Send + Sync + 'static> PoolCache<V> {
    /// Creates the cache and spawns its coordinator.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new(config: PoolCacheConfig) -> Self {
        let (intake, rx) = mpsc::channel(INTAKE_CAPACITY);
        tokio::spawn(Coordinator::new(&config, rx).run());
        Self { intake }
    }

    /// Hands a request to the coordinator and waits until it is accepted.
    async fn hand_off(&self, request: Request<V>) -> Result<(), PoolCacheError> {
        let (envelope, accepted) = Envelope::new(request);
        self.intake
            .send(envelope)
            .await
            .map_err(|_| PoolCacheError::Stopped)?;
        accepted.await.map_err(|_| PoolCacheError::Stopped)
    }

    async fn call<T>(
        &self,
        request: Request<V>,
        reply: oneshot::Receiver<T>,
    ) -> Result<T, PoolCacheError> {
        self.hand_off(request).await?;
        reply.await.map_err(|_| PoolCacheError::Stopped)
    }

    // =========================================================================
    // Reply-bearing operations
    // =========================================================================

    /// Obtains an eligible instance for one invocation.
    ///
    /// On success the instance's active count has already been incremented;
    /// call [`release`](Self::release) when the invocation completes.
    ///
    /// # Errors
    ///
    /// - `NotFound` with [`NoEligibleInstance`](super::NotFoundReason::NoEligibleInstance):
    ///   launch a new instance, the caller has been counted as waiting.
    /// - `NotFound` with [`UnknownFunction`](super::NotFoundReason::UnknownFunction):
    ///   nothing was ever registered for `function`.
    /// - `TooManyRequests`: the pool is at `concurrency` instances; do not
    ///   scale up, shed or queue upstream.
    pub async fn acquire(
        &self,
        function: &str,
        requests_per_pod: usize,
        concurrency: usize,
    ) -> Result<Arc<V>, PoolCacheError> {
        let response = self
            .acquire_with_capacity(function, requests_per_pod, concurrency)
            .await?;
        debug!(
            function,
            requests_per_pod,
            concurrency,
            capacity = response.capacity.capacity,
            specialization_in_progress = response.capacity.specialization_in_progress,
            svc_waiting = response.capacity.svc_waiting,
            success = response.is_success(),
            "Acquire"
        );
        response.outcome
    }

    /// Same as [`acquire`](Self::acquire) but also returns the capacity
    /// signal. The outer error is only ever `Stopped`.
    pub async fn acquire_with_capacity(
        &self,
        function: &str,
        requests_per_pod: usize,
        concurrency: usize,
    ) -> Result<AcquireResponse<V>, PoolCacheError> {
        let (request, reply) = Request::acquire(function, requests_per_pod, concurrency);
        self.call(request, reply).await
    }

    /// Evicts the instance at `address`.
    ///
    /// Fails with `NotFound` only if the function itself is unknown.
    pub async fn remove(&self, function: &str, address: &str) -> Result<(), PoolCacheError> {
        let (request, reply) = Request::remove(function, address);
        self.call(request, reply).await?
    }

    /// Lists every instance with no active requests.
    pub async fn list_idle(&self) -> Result<Vec<Arc<V>>, PoolCacheError> {
        let (request, reply) = Request::list_idle();
        self.call(request, reply).await
    }

    /// Returns a snapshot of one function's state, or `None` if unknown.
    pub async fn inspect(&self, function: &str) -> Result<Option<FunctionSnapshot>, PoolCacheError> {
        let (request, reply) = Request::inspect(function);
        self.call(request, reply).await
    }

    // =========================================================================
    // Fire-and-forget operations
    // =========================================================================

    /// Publishes a ready instance. Counts as one active request on it.
    pub async fn register(
        &self,
        function: &str,
        address: &str,
        value: Arc<V>,
        cpu_limit: CpuQuantity,
    ) -> Result<(), PoolCacheError> {
        self.hand_off(Request::Register {
            function: function.to_string(),
            address: address.to_string(),
            value,
            cpu_limit,
        })
        .await
    }

    /// Returns an instance to the pool after an invocation completes.
    pub async fn release(&self, function: &str, address: &str) -> Result<(), PoolCacheError> {
        self.hand_off(Request::Release {
            function: function.to_string(),
            address: address.to_string(),
        })
        .await
    }

    /// Reports current CPU usage for an instance.
    pub async fn update_load(
        &self,
        function: &str,
        address: &str,
        cpu_usage: CpuQuantity,
    ) -> Result<(), PoolCacheError> {
        self.hand_off(Request::UpdateLoad {
            function: function.to_string(),
            address: address.to_string(),
            cpu_usage,
        })
        .await
    }

    /// Marks the start of a cold start for `function`.
    pub async fn specialization_begin(&self, function: &str) -> Result<(), PoolCacheError> {
        self.hand_off(Request::SpecializationBegin {
            function: function.to_string(),
        })
        .await
    }

    /// Marks the end of a cold start for `function`.
    pub async fn specialization_end(&self, function: &str) -> Result<(), PoolCacheError> {
        self.hand_off(Request::SpecializationEnd {
            function: function.to_string(),
        })
        .await
    }
}
