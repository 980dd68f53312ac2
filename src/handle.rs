//! Read-side handle for a submitted operation.
//!
//! Each submitted operation gets exactly one completion slot. The slot is
//! write-once: it admits a single transition out of [`Completion::Pending`]
//! and rejects every later write, which is what makes a late result from an
//! operation that ignored cancellation harmlessly discardable.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, OperationError, Result};
use crate::scope::{PhaseCell, ScopePhase};

/// Terminal-state machine for one operation.
#[derive(Debug)]
pub(crate) enum Completion<T> {
    Pending,
    Succeeded(T),
    Failed(Arc<OperationError>),
    Cancelled,
}

/// Completion slot shared between the scope, the spawned task, and the
/// caller-facing [`Handle`].
pub(crate) struct Slot<T> {
    state: Mutex<Completion<T>>,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(Completion::Pending),
        }
    }

    /// Record a terminal outcome. Only the first write out of `Pending`
    /// lands; returns whether this write was the one that landed.
    pub(crate) fn complete(&self, outcome: Completion<T>) -> bool {
        debug_assert!(!matches!(outcome, Completion::Pending));
        let mut state = self.state.lock();
        if matches!(*state, Completion::Pending) {
            *state = outcome;
            true
        } else {
            false
        }
    }

    /// Force a still-pending slot to `Cancelled`. Returns whether the slot
    /// was actually pending.
    pub(crate) fn cancel_if_pending(&self) -> bool {
        self.complete(Completion::Cancelled)
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), Completion::Pending)
    }

    fn state_name(&self) -> &'static str {
        match *self.state.lock() {
            Completion::Pending => "pending",
            Completion::Succeeded(_) => "succeeded",
            Completion::Failed(_) => "failed",
            Completion::Cancelled => "cancelled",
        }
    }
}

/// Handle to one submitted operation.
///
/// Returned by [`Scope::submit`](crate::Scope::submit). The handle is
/// inert until the scope has been joined; reading it earlier fails with
/// [`Error::NotReady`] even when the underlying operation already finished.
pub struct Handle<T> {
    slot: Arc<Slot<T>>,
    phase: Arc<PhaseCell>,
    index: usize,
}

impl<T> Handle<T> {
    pub(crate) fn new(slot: Arc<Slot<T>>, phase: Arc<PhaseCell>, index: usize) -> Self {
        Self { slot, phase, index }
    }

    /// Submission index of this handle within its scope.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T: Clone> Handle<T> {
    /// The operation's result.
    ///
    /// The value is retained, not consumed: repeated calls return clones of
    /// the same value.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if the scope has not reached `Joined` (or
    ///   `ShutDown`).
    /// - [`Error::Failed`] wrapping the original failure if the operation
    ///   failed.
    /// - [`Error::Cancelled`] if the operation was cancelled.
    pub fn result(&self) -> Result<T> {
        match self.phase.get() {
            ScopePhase::Joined | ScopePhase::ShutDown => {},
            ScopePhase::Open | ScopePhase::Joining => return Err(Error::NotReady),
        }
        match &*self.slot.state.lock() {
            Completion::Succeeded(value) => Ok(value.clone()),
            Completion::Failed(err) => Err(Error::Failed(err.clone())),
            Completion::Cancelled => Err(Error::Cancelled),
            Completion::Pending => Err(Error::NotReady),
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            phase: self.phase.clone(),
            index: self.index,
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.index)
            .field("state", &self.slot.state_name())
            .field("phase", &self.phase.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_write_once() {
        let slot: Slot<u32> = Slot::new();
        assert!(slot.is_pending());

        assert!(slot.complete(Completion::Succeeded(7)));
        assert!(!slot.is_pending());

        // Later writes are rejected and the first outcome is retained.
        assert!(!slot.complete(Completion::Succeeded(9)));
        assert!(!slot.cancel_if_pending());
        assert!(matches!(*slot.state.lock(), Completion::Succeeded(7)));
    }

    #[test]
    fn cancel_if_pending_only_hits_pending_slots() {
        let slot: Slot<u32> = Slot::new();
        assert!(slot.cancel_if_pending());
        assert!(!slot.cancel_if_pending());
        assert_eq!(slot.state_name(), "cancelled");
    }

    #[test]
    fn result_is_gated_on_scope_phase() {
        let slot = Arc::new(Slot::new());
        let phase = Arc::new(PhaseCell::new());
        let handle = Handle::new(slot.clone(), phase.clone(), 0);

        // Operation finished, but the scope has not been joined.
        assert!(slot.complete(Completion::Succeeded("done".to_string())));
        assert!(matches!(handle.result(), Err(Error::NotReady)));

        phase.set(ScopePhase::Joined);
        assert_eq!(handle.result().unwrap(), "done");
        // Repeatable: the value is retained, not consumed.
        assert_eq!(handle.result().unwrap(), "done");
    }

    #[test]
    fn failed_and_cancelled_states_map_to_errors() {
        let phase = Arc::new(PhaseCell::new());
        phase.set(ScopePhase::Joined);

        let failed = Arc::new(Slot::new());
        failed.complete(Completion::Failed(Arc::new(OperationError::new("boom"))));
        let handle: Handle<String> = Handle::new(failed, phase.clone(), 0);
        match handle.result() {
            Err(Error::Failed(err)) => assert_eq!(err.message(), "boom"),
            other => panic!("expected Failed, got {other:?}"),
        }

        let cancelled = Arc::new(Slot::new());
        cancelled.cancel_if_pending();
        let handle: Handle<String> = Handle::new(cancelled, phase, 1);
        assert!(matches!(handle.result(), Err(Error::Cancelled)));
    }
}
