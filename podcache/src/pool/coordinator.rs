//! The coordinator task: the only code that touches cache state.
//!
//! Requests arrive one at a time over the intake channel. For each one the
//! coordinator first signals acceptance, then applies it to [`PoolState`]
//! to completion, then sends the reply if the kind has one. Nothing in the
//! loop awaits anything except the next request, so a request is never
//! interleaved with another.

use super::request::{Envelope, Request};
use super::state::PoolState;
use crate::config::PoolCacheConfig;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Owns the cache state and drains the intake.
pub(crate) struct Coordinator<V> {
    state: PoolState<V>,
    intake: mpsc::Receiver<Envelope<V>>,
}

impl<V: Send + Sync + 'static> Coordinator<V> {
    pub fn new(config: &PoolCacheConfig, intake: mpsc::Receiver<Envelope<V>>) -> Self {
        Self {
            state: PoolState::new(config),
            intake,
        }
    }

    /// Runs until every sender is dropped.
    pub async fn run(mut self) {
        debug!("Pool cache coordinator started");

        while let Some(Envelope { request, accepted }) = self.intake.recv().await {
            // The caller may already have given up; the request still applies.
            let _ = accepted.send(());
            trace!(?request, "Processing request");
            self.handle(request);
        }

        debug!("Pool cache coordinator stopped");
    }

    fn handle(&mut self, request: Request<V>) {
        // Reply sends below are oneshot and never block. A dropped receiver
        // means the caller stopped waiting, which is not an error here.
        match request {
            Request::Acquire {
                function,
                requests_per_pod,
                concurrency,
                reply,
            } => {
                let response = self.state.acquire(&function, requests_per_pod, concurrency);
                let _ = reply.send(response);
            }
            Request::Register {
                function,
                address,
                value,
                cpu_limit,
            } => {
                self.state.register(&function, &address, value, cpu_limit);
            }
            Request::Release { function, address } => {
                self.state.release(&function, &address);
            }
            Request::Remove {
                function,
                address,
                reply,
            } => {
                let result = self.state.remove(&function, &address);
                let _ = reply.send(result);
            }
            Request::UpdateLoad {
                function,
                address,
                cpu_usage,
            } => {
                self.state.update_load(&function, &address, cpu_usage);
            }
            Request::SpecializationBegin { function } => {
                self.state.specialization_begin(&function);
            }
            Request::SpecializationEnd { function } => {
                self.state.specialization_end(&function);
            }
            Request::ListIdle { reply } => {
                let _ = reply.send(self.state.list_idle());
            }
            Request::Inspect { function, reply } => {
                let _ = reply.send(self.state.inspect(&function));
            }
        }
    }
}
