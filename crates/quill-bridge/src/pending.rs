//! Completion bookkeeping for in-flight commands.
//!
//! Commands are multiplexed over one channel and may complete in any order,
//! so completions are matched by invocation id rather than queue position.
//! Every entry is resolved exactly once: by its completion, or by teardown.

use crate::error::{BridgeError, Result};
use futures::channel::oneshot;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Key of one in-flight evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(pub u64);

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the engine handed back for one evaluation: a value, or its error text.
pub type EvalOutcome = std::result::Result<Option<Value>, String>;

/// Why a command was resolved without reaching the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    NotReady,
    TornDown,
}

impl From<SkipReason> for BridgeError {
    fn from(reason: SkipReason) -> Self {
        match reason {
            SkipReason::NotReady => BridgeError::NotReady,
            SkipReason::TornDown => BridgeError::TornDown,
        }
    }
}

/// Successful resolution of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The engine ran the command and returned this value.
    Done(Option<Value>),
    /// The command was treated as a no-op.
    Skipped(SkipReason),
}

impl Reply {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Reply::Done(value) => value.as_ref(),
            Reply::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Reply::Skipped(_))
    }
}

pub type CommandResult = Result<Reply>;

pub(crate) type Callback = Box<dyn FnOnce(CommandResult)>;

pub(crate) struct Entry<S> {
    pub command: &'static str,
    pub steps: Vec<S>,
    pub callback: Option<Callback>,
}

/// Unordered table of in-flight commands.
///
/// `S` is the caller's internal continuation type; an entry's steps run in
/// order before the external callback when the entry resolves.
pub(crate) struct PendingTable<S> {
    next_id: u64,
    entries: HashMap<InvocationId, Entry<S>>,
}

impl<S> PendingTable<S> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: HashMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        command: &'static str,
        steps: Vec<S>,
        callback: Option<Callback>,
    ) -> InvocationId {
        let id = InvocationId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            Entry {
                command,
                steps,
                callback,
            },
        );
        id
    }

    /// Remove an entry. A second take of the same id returns `None`.
    pub fn take(&mut self, id: InvocationId) -> Option<Entry<S>> {
        self.entries.remove(&id)
    }

    pub fn drain(&mut self) -> Vec<Entry<S>> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Future resolving to a command's result.
#[derive(Debug)]
pub struct CommandFuture {
    rx: oneshot::Receiver<CommandResult>,
}

impl CommandFuture {
    /// A callback that resolves the returned future.
    pub(crate) fn channel() -> (Callback, Self) {
        let (tx, rx) = oneshot::channel();
        let callback: Callback = Box::new(move |result| {
            // The caller may have stopped waiting.
            let _ = tx.send(result);
        });
        (callback, Self { rx })
    }
}

impl Future for CommandFuture {
    type Output = CommandResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(BridgeError::TornDown)),
            Poll::Pending => Poll::Pending,
        }
    }
}
