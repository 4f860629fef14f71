//! podcache - admission-control cache for a serverless function executor
//!
//! Tracks which warm instances exist for each function, hands out an
//! eligible instance per invocation, and produces the capacity signal the
//! orchestrator uses to decide when to launch more.
//!
//! # Example
//!
//! ```ignore
//! use podcache::{PoolCache, PoolCacheConfig};
//! use std::sync::Arc;
//!
//! let cache = PoolCache::new(PoolCacheConfig::default());
//! cache.register("hello", "10.0.0.7", Arc::new(pod), "250m".parse()?).await?;
//!
//! let pod = cache.acquire("hello", 5, 10).await?;
//! // ... serve the invocation ...
//! cache.release("hello", "10.0.0.7").await?;
//! ```

pub mod config;
pub mod logging;
pub mod pool;
pub mod quantity;

pub use config::{PoolCacheConfig, Settings};
pub use pool::{
    AcquireResponse, CapacitySignal, ErrorKind, FunctionSnapshot, InstanceSnapshot,
    NotFoundReason, PoolCache, PoolCacheError, RequestKind,
};
pub use quantity::{CpuQuantity, QuantityParseError};

/// Version of the podcache library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
