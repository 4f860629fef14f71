//! Admission-control cache of warm function instances.
//!
//! The cache tracks, per function, every registered instance (pod) with its
//! active request count and CPU load, plus in-flight cold starts and callers
//! waiting for capacity. It decides whether an invocation can reuse an
//! instance and tells the orchestrator when a new one should be launched.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐
//! │ PoolCache  │──┐
//! └────────────┘  │
//! ┌────────────┐  │   Envelope    ┌──────────────────┐
//! │ PoolCache  │──┼─────────────► │   Coordinator    │
//! │  (clone)   │  │   (mpsc)      │                  │
//! └────────────┘  │               │  owns PoolState  │
//! ┌────────────┐  │               │  one request at  │
//! │ PoolCache  │──┘               │  a time          │
//! └────────────┘                  └────────┬─────────┘
//!       ▲                                  │
//!       └──────── oneshot reply ───────────┘
//!                 (reply-bearing kinds only)
//! ```
//!
//! All state lives in the coordinator task. Handles never share memory with
//! it, so there are no locks: the order in which requests are accepted is
//! the order in which they take effect.
//!
//! # Orchestrator contract
//!
//! | Result of `acquire` | Meaning | Orchestrator action |
//! |---------------------|---------|---------------------|
//! | `Ok(instance)` | instance reserved | forward, then `release` |
//! | `NotFound` + `should_scale_up()` | pool can grow | `specialization_begin`, launch, `register`, `specialization_end` |
//! | `NotFound` (unknown function) | never registered | cold start path |
//! | `TooManyRequests` | pool at ceiling | back-pressure, no scale up |

mod coordinator;
mod error;
mod handle;
mod request;
mod state;
mod types;

pub use error::{ErrorKind, NotFoundReason, PoolCacheError};
pub use handle::PoolCache;
pub use request::RequestKind;
pub use types::{AcquireResponse, CapacitySignal, FunctionSnapshot, InstanceSnapshot};
