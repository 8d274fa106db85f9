//! Undo commit handshake.
//!
//! A mutating command completing does not mean its undo entry exists yet.
//! The engine announces the push separately with an `undoSet` event, and
//! anything that wants to undo a mutation must wait for that second signal.

use crate::error::{BridgeError, Result};
use crate::pending::CommandFuture;
use futures::channel::oneshot;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Number of `undoSet` events observed at some point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UndoMark(pub u64);

/// Identifies one mutation waiting for its own `undoSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CommitTicket(u64);

type Signal = oneshot::Sender<Result<UndoMark>>;

/// Counts `undoSet` events and wakes whoever waits for them.
///
/// Two kinds of waiters exist. Mark waiters resolve on any `undoSet` after
/// their mark. Commit waiters belong to one mutation each and are settled
/// oldest first, one per `undoSet`, since the engine pushes undo entries in
/// the order it ran the mutations.
#[derive(Debug, Default)]
pub(crate) struct UndoCoordinator {
    observed: u64,
    waiters: Vec<Signal>,
    commits: VecDeque<(CommitTicket, Signal)>,
    next_ticket: u64,
}

impl UndoCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) -> UndoMark {
        UndoMark(self.observed)
    }

    /// Resolves once an `undoSet` later than `mark` has been observed.
    pub fn since(&mut self, mark: UndoMark) -> UndoSetFuture {
        if self.observed > mark.0 {
            return UndoSetFuture::ready(UndoMark(self.observed));
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        UndoSetFuture {
            state: WaitState::Waiting(rx),
        }
    }

    /// Queue a mutation behind every mutation still waiting for its entry.
    pub fn expect_commit(&mut self) -> (CommitTicket, UndoSetFuture) {
        let ticket = CommitTicket(self.next_ticket);
        self.next_ticket += 1;
        let (tx, rx) = oneshot::channel();
        self.commits.push_back((ticket, tx));
        (
            ticket,
            UndoSetFuture {
                state: WaitState::Waiting(rx),
            },
        )
    }

    /// The mutation will never push an entry; reject its signal and drop it
    /// from the queue so it cannot take a later mutation's `undoSet`.
    pub fn cancel_commit(&mut self, ticket: CommitTicket, reason: String) {
        let Some(index) = self.commits.iter().position(|(t, _)| *t == ticket) else {
            return;
        };
        if let Some((_, tx)) = self.commits.remove(index) {
            let _ = tx.send(Err(BridgeError::InvalidState(reason)));
        }
    }

    pub fn outstanding_commits(&self) -> usize {
        self.commits.len()
    }

    pub fn record_undo_set(&mut self) -> UndoMark {
        self.observed += 1;
        let mark = UndoMark(self.observed);
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(mark));
        }
        if let Some((_, tx)) = self.commits.pop_front() {
            let _ = tx.send(Ok(mark));
        }
        mark
    }

    /// Drop every waiter; their futures resolve to [`BridgeError::TornDown`].
    pub fn abandon(&mut self) {
        self.waiters.clear();
        self.commits.clear();
    }
}

#[derive(Debug)]
enum WaitState {
    Ready(Option<UndoMark>),
    Rejected(Option<BridgeError>),
    Waiting(oneshot::Receiver<Result<UndoMark>>),
}

/// Future resolving when the engine confirms an undo entry was pushed.
#[derive(Debug)]
pub struct UndoSetFuture {
    state: WaitState,
}

impl UndoSetFuture {
    fn ready(mark: UndoMark) -> Self {
        Self {
            state: WaitState::Ready(Some(mark)),
        }
    }

    /// A signal that will never come, resolved up front with `error`.
    pub(crate) fn rejected(error: BridgeError) -> Self {
        Self {
            state: WaitState::Rejected(Some(error)),
        }
    }
}

impl Future for UndoSetFuture {
    type Output = Result<UndoMark>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            WaitState::Ready(mark) => match mark.take() {
                Some(mark) => Poll::Ready(Ok(mark)),
                None => Poll::Ready(Err(BridgeError::InvalidState(
                    "undo signal polled after completion".to_string(),
                ))),
            },
            WaitState::Rejected(error) => Poll::Ready(Err(error.take().unwrap_or_else(|| {
                BridgeError::InvalidState("undo signal polled after completion".to_string())
            }))),
            WaitState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(BridgeError::TornDown)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

/// The two signals of a mutating command, awaitable independently.
#[derive(Debug)]
pub struct Mutation {
    /// The command itself finished.
    pub completion: CommandFuture,
    /// The engine pushed this mutation's undo entry. Rejected when the
    /// command failed or was skipped.
    pub committed: UndoSetFuture,
}
