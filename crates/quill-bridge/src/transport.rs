//! The channel between host and engine.
//!
//! Host to engine: script evaluations keyed by invocation id. Engine to host:
//! raw posted messages and evaluation completions. Neither direction blocks.

use crate::error::Result;
use crate::pending::{EvalOutcome, InvocationId};
use std::time::Duration;

/// Something the engine sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A message the engine posted to its message handler.
    Posted(String),
    /// An evaluation finished.
    Completed {
        invocation: InvocationId,
        outcome: EvalOutcome,
    },
}

/// Backend that hosts the engine.
///
/// Hosts with an event-driven web view deliver inbound traffic by calling
/// [`Surface::on_receive`](crate::Surface::on_receive) and
/// [`Surface::complete`](crate::Surface::complete) directly; backends that
/// run the engine out of process queue it for [`Transport::pump`] instead.
pub trait Transport {
    /// Navigate the engine to the base document.
    fn load(&mut self, base_url: &str) -> Result<()>;

    /// Start evaluating `script`. The outcome is reported later under `invocation`.
    fn evaluate(&mut self, invocation: InvocationId, script: &str) -> Result<()>;

    /// Inbound traffic received since the last call.
    fn pump(&mut self) -> Vec<Inbound> {
        Vec::new()
    }

    /// Block until inbound traffic is queued or `timeout` passes.
    ///
    /// Returns false on timeout. Backends without a queue never block.
    fn wait(&mut self, timeout: Duration) -> bool {
        let _ = timeout;
        false
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn load(&mut self, base_url: &str) -> Result<()> {
        (**self).load(base_url)
    }

    fn evaluate(&mut self, invocation: InvocationId, script: &str) -> Result<()> {
        (**self).evaluate(invocation, script)
    }

    fn pump(&mut self) -> Vec<Inbound> {
        (**self).pump()
    }

    fn wait(&mut self, timeout: Duration) -> bool {
        (**self).wait(timeout)
    }

    fn shutdown(&mut self) -> Result<()> {
        (**self).shutdown()
    }
}
