//! Cache entry state machine.
//!
//! Every (result-type, descriptor) key owns one [`EntrySlot`] whose lifecycle
//! is `Unrequested -> Computing -> {Resolved, Unprofitable, Failed}`. The slot
//! serializes concurrent requests for its key: the first caller computes,
//! later callers block on the condition variable and receive the memoized
//! outcome. A terminal state is never left - repeated queries are answered
//! from memory, including repeated failures.
//!
//! Re-entrancy is the one illegal transition: if the thread currently in
//! `Computing` asks for the same key again, the analysis dependency graph has
//! a cycle. That is a programming error in an engine, detected by thread id
//! and converted into the fatal
//! [`Error::AnalysisCycle`](crate::Error::AnalysisCycle) instead of a
//! deadlock.

use std::{
    any::Any,
    sync::{Arc, Condvar, Mutex},
    thread::ThreadId,
};

use crate::{Error, Result};

/// A type-erased, shareable analysis result.
pub type AnyResult = Arc<dyn Any + Send + Sync>;

/// Internal state of one cache entry.
enum EntryState {
    /// No one has requested this key yet.
    Unrequested,
    /// A thread is computing; the id detects re-entrant self-dependency.
    Computing(ThreadId),
    /// The engine produced a result.
    Resolved(AnyResult),
    /// The method was definitively ruled unprofitable.
    Unprofitable,
    /// The engine failed; the error is replayed on every later request.
    Failed(Error),
}

/// What a finished computation published into the slot.
pub enum Outcome {
    /// A concrete result object.
    Resolved(AnyResult),
    /// The definitive unprofitable marker.
    Unprofitable,
    /// A recoverable failure to memoize.
    Failed(Error),
}

/// The claim a caller gets back from [`EntrySlot::claim`].
pub enum Claim {
    /// This caller must compute the result and publish it.
    Compute,
    /// Another caller already computed; here is the memoized outcome.
    Ready(Result<AnyResult>),
}

impl std::fmt::Debug for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compute => f.write_str("Compute"),
            Self::Ready(Ok(_)) => f.write_str("Ready(Ok(..))"),
            Self::Ready(Err(e)) => f.debug_tuple("Ready").field(&Err::<(), _>(e)).finish(),
        }
    }
}

/// One per-key synchronization slot.
pub struct EntrySlot {
    state: Mutex<EntryState>,
    ready: Condvar,
}

impl EntrySlot {
    /// Creates a slot in the `Unrequested` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EntryState::Unrequested),
            ready: Condvar::new(),
        }
    }

    /// Claims the slot for computation or waits for the published outcome.
    ///
    /// `unprofitable` builds the error returned for the unprofitable state;
    /// `cycle` builds the fatal error for re-entrant claims.
    ///
    /// # Errors
    ///
    /// - The memoized failure, if the slot already failed.
    /// - The `cycle` error if the calling thread is already computing this
    ///   slot.
    /// - [`Error::LockError`] if the mutex was poisoned by a panicking worker.
    pub fn claim(
        &self,
        unprofitable: impl Fn() -> Error,
        cycle: impl Fn() -> Error,
    ) -> Result<Claim> {
        let mut state = self.state.lock().map_err(|_| Error::LockError)?;
        loop {
            match &*state {
                EntryState::Unrequested => {
                    *state = EntryState::Computing(std::thread::current().id());
                    return Ok(Claim::Compute);
                }
                EntryState::Computing(owner) => {
                    if *owner == std::thread::current().id() {
                        return Err(cycle());
                    }
                    state = self.ready.wait(state).map_err(|_| Error::LockError)?;
                }
                EntryState::Resolved(result) => {
                    return Ok(Claim::Ready(Ok(Arc::clone(result))));
                }
                EntryState::Unprofitable => return Ok(Claim::Ready(Err(unprofitable()))),
                EntryState::Failed(error) => return Ok(Claim::Ready(Err(error.clone()))),
            }
        }
    }

    /// Publishes the outcome of a computation and wakes all waiters.
    ///
    /// Only the caller that received [`Claim::Compute`] may publish, exactly
    /// once.
    pub fn publish(&self, outcome: Outcome) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| Error::LockError)?;
        *state = match outcome {
            Outcome::Resolved(result) => EntryState::Resolved(result),
            Outcome::Unprofitable => EntryState::Unprofitable,
            Outcome::Failed(error) => EntryState::Failed(error),
        };
        drop(state);
        self.ready.notify_all();
        Ok(())
    }
}

impl Default for EntrySlot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EntrySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.lock() {
            Ok(guard) => match &*guard {
                EntryState::Unrequested => "unrequested",
                EntryState::Computing(_) => "computing",
                EntryState::Resolved(_) => "resolved",
                EntryState::Unprofitable => "unprofitable",
                EntryState::Failed(_) => "failed",
            },
            Err(_) => "poisoned",
        };
        write!(f, "EntrySlot({state})")
    }
}
