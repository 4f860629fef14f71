//! Request types handed to the pool cache coordinator.
//!
//! Every operation on the cache becomes one [`Request`] value. Kinds that
//! produce a result carry their own `oneshot` reply sender, created fresh
//! for each call; kinds that don't reply carry none, so the coordinator has
//! nothing it could block on for them.
//!
//! ```text
//! ┌──────────┐   Envelope { request, accepted }   ┌─────────────┐
//! │ PoolCache│ ─────────────────────────────────► │ Coordinator │
//! │ (caller) │ ◄──────── accepted (always) ────── │   (task)    │
//! │          │ ◄──────── reply (some kinds) ───── │             │
//! └──────────┘                                    └─────────────┘
//! ```

use super::error::PoolCacheError;
use super::types::{AcquireResponse, FunctionSnapshot};
use crate::quantity::CpuQuantity;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

// =============================================================================
// Request Kind
// =============================================================================

/// The operation a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Acquire,
    Register,
    Release,
    Remove,
    UpdateLoad,
    SpecializationBegin,
    SpecializationEnd,
    ListIdle,
    Inspect,
}

impl RequestKind {
    /// Returns true if the coordinator sends a reply for this kind.
    ///
    /// Fixed per kind; callers of non-replying kinds never wait for one.
    pub fn expects_reply(self) -> bool {
        match self {
            RequestKind::Acquire
            | RequestKind::Remove
            | RequestKind::ListIdle
            | RequestKind::Inspect => true,
            RequestKind::Register
            | RequestKind::Release
            | RequestKind::UpdateLoad
            | RequestKind::SpecializationBegin
            | RequestKind::SpecializationEnd => false,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Acquire => "acquire",
            RequestKind::Register => "register",
            RequestKind::Release => "release",
            RequestKind::Remove => "remove",
            RequestKind::UpdateLoad => "update-load",
            RequestKind::SpecializationBegin => "specialization-begin",
            RequestKind::SpecializationEnd => "specialization-end",
            RequestKind::ListIdle => "list-idle",
            RequestKind::Inspect => "inspect",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Request
// =============================================================================

/// One operation for the coordinator.
pub(crate) enum Request<V> {
    Acquire {
        function: String,
        requests_per_pod: usize,
        concurrency: usize,
        reply: oneshot::Sender<AcquireResponse<V>>,
    },
    Register {
        function: String,
        address: String,
        value: Arc<V>,
        cpu_limit: CpuQuantity,
    },
    Release {
        function: String,
        address: String,
    },
    Remove {
        function: String,
        address: String,
        reply: oneshot::Sender<Result<(), PoolCacheError>>,
    },
    UpdateLoad {
        function: String,
        address: String,
        cpu_usage: CpuQuantity,
    },
    SpecializationBegin {
        function: String,
    },
    SpecializationEnd {
        function: String,
    },
    ListIdle {
        reply: oneshot::Sender<Vec<Arc<V>>>,
    },
    Inspect {
        function: String,
        reply: oneshot::Sender<Option<FunctionSnapshot>>,
    },
}

impl<V> Request<V> {
    pub fn acquire(
        function: impl Into<String>,
        requests_per_pod: usize,
        concurrency: usize,
    ) -> (Self, oneshot::Receiver<AcquireResponse<V>>) {
        let (reply, rx) = oneshot::channel();
        let request = Request::Acquire {
            function: function.into(),
            requests_per_pod,
            concurrency,
            reply,
        };
        (request, rx)
    }

    pub fn remove(
        function: impl Into<String>,
        address: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Result<(), PoolCacheError>>) {
        let (reply, rx) = oneshot::channel();
        let request = Request::Remove {
            function: function.into(),
            address: address.into(),
            reply,
        };
        (request, rx)
    }

    pub fn list_idle() -> (Self, oneshot::Receiver<Vec<Arc<V>>>) {
        let (reply, rx) = oneshot::channel();
        (Request::ListIdle { reply }, rx)
    }

    pub fn inspect(
        function: impl Into<String>,
    ) -> (Self, oneshot::Receiver<Option<FunctionSnapshot>>) {
        let (reply, rx) = oneshot::channel();
        let request = Request::Inspect {
            function: function.into(),
            reply,
        };
        (request, rx)
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Acquire { .. } => RequestKind::Acquire,
            Request::Register { .. } => RequestKind::Register,
            Request::Release { .. } => RequestKind::Release,
            Request::Remove { .. } => RequestKind::Remove,
            Request::UpdateLoad { .. } => RequestKind::UpdateLoad,
            Request::SpecializationBegin { .. } => RequestKind::SpecializationBegin,
            Request::SpecializationEnd { .. } => RequestKind::SpecializationEnd,
            Request::ListIdle { .. } => RequestKind::ListIdle,
            Request::Inspect { .. } => RequestKind::Inspect,
        }
    }

    /// Function name the request targets, if any.
    pub fn function(&self) -> Option<&str> {
        match self {
            Request::Acquire { function, .. }
            | Request::Register { function, .. }
            | Request::Release { function, .. }
            | Request::Remove { function, .. }
            | Request::UpdateLoad { function, .. }
            | Request::SpecializationBegin { function }
            | Request::SpecializationEnd { function }
            | Request::Inspect { function, .. } => Some(function),
            Request::ListIdle { .. } => None,
        }
    }
}

impl<V> fmt::Debug for Request<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("kind", &self.kind())
            .field("function", &self.function())
            .field("expects_reply", &self.kind().expects_reply())
            .finish()
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A request plus the acceptance signal for the hand-off.
///
/// The coordinator fires `accepted` as soon as it takes the envelope off the
/// intake, before processing. Callers await it, so a call returns only once
/// its own request has been taken.
pub(crate) struct Envelope<V> {
    pub request: Request<V>,
    pub accepted: oneshot::Sender<()>,
}

impl<V> Envelope<V> {
    pub fn new(request: Request<V>) -> (Self, oneshot::Receiver<()>) {
        let (accepted, rx) = oneshot::channel();
        (Self { request, accepted }, rx)
    }
}
