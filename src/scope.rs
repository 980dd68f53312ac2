//! Fail-fast scope: eager fan-out, join, and cancellation broadcast.
//!
//! A [`Scope`] launches each submitted operation on its own Tokio task and
//! funnels completions through an internal channel. [`Scope::join`] drains
//! that channel until every operation succeeded or the first failure
//! arrives; on failure it broadcasts cancellation once, forces the
//! remaining pending handles to `Cancelled`, and reclaims every task it
//! spawned before the caller can observe the joined state.
//!
//! The completion channel is the linearization point for failure
//! detection: "first failure" means first received on that channel, which
//! is completion order, not submission order.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::context::OperationContext;
use crate::error::{Error, OperationError, Result};
use crate::handle::{Completion, Handle, Slot};

/// Lifecycle phase of a [`Scope`].
///
/// Phases only move forward: `Open → Joining → Joined → ShutDown`.
/// `ShutDown` is reached on every exit path, including early drop from
/// `Open` or `Joining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScopePhase {
    /// Accepting submissions.
    Open = 0,
    /// `join()` is in progress; submissions are rejected.
    Joining = 1,
    /// The termination condition was reached; handles are readable.
    Joined = 2,
    /// The scope has been torn down; all tasks are reclaimed or aborted.
    ShutDown = 3,
}

/// Atomic cell holding the scope phase, shared with every handle.
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ScopePhase::Open as u8))
    }

    pub(crate) fn get(&self) -> ScopePhase {
        match self.0.load(Ordering::Acquire) {
            0 => ScopePhase::Open,
            1 => ScopePhase::Joining,
            2 => ScopePhase::Joined,
            _ => ScopePhase::ShutDown,
        }
    }

    pub(crate) fn set(&self, phase: ScopePhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

/// Event sent by a task when its operation settles on its own (success or
/// failure). Cancelled settles are not reported; join never waits on them.
struct Settled {
    index: usize,
    failure: Option<Arc<OperationError>>,
}

/// Builder for [`Scope`].
#[derive(Debug, Default)]
pub struct ScopeBuilder {
    name: Option<String>,
}

impl ScopeBuilder {
    /// Name the scope; the name appears as a field on the scope's tracing
    /// output.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build the scope.
    pub fn build<T: Send + 'static>(self) -> Scope<T> {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        Scope {
            name: self.name.map_or_else(|| Arc::from("scope"), Arc::from),
            phase: Arc::new(PhaseCell::new()),
            cancel: CancellationToken::new(),
            slots: Vec::new(),
            tasks: JoinSet::new(),
            settled_tx,
            settled_rx,
            succeeded: 0,
            first_failure: None,
        }
    }
}

/// Concurrent fail-fast scope.
///
/// Submitted operations run concurrently, one Tokio task each. [`join`]
/// suspends until all succeed or the first fails; on failure the remaining
/// in-flight operations are signaled for cancellation and their results
/// discarded. Results become readable through each operation's [`Handle`]
/// only after the join completes.
///
/// Dropping the scope — on any exit path, including an error raised in the
/// owning block — cancels outstanding work and aborts any task still
/// running, so no spawned work outlives the scope.
///
/// [`join`]: Scope::join
///
/// # Example
///
/// ```rust
/// use taskscope::Scope;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut scope: Scope<String> = Scope::new();
/// let temp = scope.submit(|_ctx| async { Ok("temp-ok".to_string()) })?;
/// let fx = scope.submit(|_ctx| async { Ok("fx-ok".to_string()) })?;
///
/// scope.join().await;
/// scope.check_failures()?;
///
/// assert_eq!(temp.result()?, "temp-ok");
/// assert_eq!(fx.result()?, "fx-ok");
/// # Ok(())
/// # }
/// ```
pub struct Scope<T> {
    name: Arc<str>,
    phase: Arc<PhaseCell>,
    cancel: CancellationToken,
    slots: Vec<Arc<Slot<T>>>,
    tasks: JoinSet<()>,
    settled_tx: mpsc::UnboundedSender<Settled>,
    settled_rx: mpsc::UnboundedReceiver<Settled>,
    /// Successes drained from the channel so far. Lives on the scope, not
    /// the join call, so a join interrupted by an external timer resumes
    /// where it left off.
    succeeded: usize,
    /// First failure by completion order, recorded by the join that
    /// observed it. Retained for idempotent re-joins and `check_failures`.
    first_failure: Option<Arc<OperationError>>,
}

impl<T: Send + 'static> Scope<T> {
    /// Create an unnamed scope.
    pub fn new() -> Self {
        ScopeBuilder::default().build()
    }

    /// Start building a scope.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::default()
    }

    /// Submit an operation for immediate concurrent execution.
    ///
    /// The operation receives an [`OperationContext`] through which the
    /// scope signals cooperative cancellation. Execution starts eagerly:
    /// the operation may already be running (or finished) before `join` is
    /// called, but its outcome stays unreadable until then.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScopeClosed`] once the scope has left the `Open`
    /// phase.
    pub fn submit<F, Fut>(&mut self, op: F) -> Result<Handle<T>>
    where
        F: FnOnce(OperationContext) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, OperationError>> + Send + 'static,
    {
        if self.phase.get() != ScopePhase::Open {
            return Err(Error::ScopeClosed);
        }

        let index = self.slots.len();
        let slot = Arc::new(Slot::new());
        self.slots.push(slot.clone());

        let ctx = OperationContext::new(self.cancel.child_token(), index);
        let cancel = self.cancel.clone();
        let tx = self.settled_tx.clone();
        let name = self.name.clone();
        trace!(scope = %name, index, "submitting operation");

        let task_slot = slot.clone();
        self.tasks.spawn(async move {
            // Race the operation against the broadcast token so that even
            // an operation that never checks its context is detached at
            // its next await point. Biased: an operation that finishes on
            // the same wakeup that delivered the signal keeps its outcome.
            let outcome = tokio::select! {
                biased;
                result = op(ctx) => match result {
                    Ok(value) => Completion::Succeeded(value),
                    Err(err) => Completion::Failed(Arc::new(err)),
                },
                () = cancel.cancelled() => Completion::Cancelled,
            };

            let failure = match &outcome {
                Completion::Failed(err) => Some(err.clone()),
                _ => None,
            };
            let was_cancelled = matches!(outcome, Completion::Cancelled);
            let landed = task_slot.complete(outcome);
            trace!(scope = %name, index, landed, "operation settled");

            if landed && !was_cancelled {
                // The receiver lives as long as the scope; a send can only
                // fail mid-teardown, where the outcome is discarded anyway.
                let _ = tx.send(Settled { index, failure });
            }
        });

        Ok(Handle::new(slot, self.phase.clone(), index))
    }

    /// Suspend until every operation succeeded or the first failure is
    /// observed.
    ///
    /// On the failure path, cancellation is broadcast once to all
    /// remaining in-flight operations, their handles are forced to
    /// `Cancelled`, and every spawned task is reclaimed before this
    /// returns — cooperative operations stop promptly, and the rest are
    /// detached at their next await point. `join` itself never raises;
    /// use [`check_failures`](Self::check_failures) afterwards.
    ///
    /// Idempotent: a second call returns immediately with the same
    /// terminal condition. With zero submissions it returns immediately.
    pub async fn join(&mut self) {
        match self.phase.get() {
            ScopePhase::Joined | ScopePhase::ShutDown => return,
            ScopePhase::Open | ScopePhase::Joining => {},
        }
        self.phase.set(ScopePhase::Joining);

        let total = self.slots.len();
        debug!(scope = %self.name, total, "joining scope");

        while self.succeeded < total && self.first_failure.is_none() {
            // The scope holds its own sender, so the channel cannot close
            // while settles are outstanding.
            match self.settled_rx.recv().await {
                Some(Settled {
                    index,
                    failure: Some(err),
                }) => {
                    debug!(
                        scope = %self.name,
                        index,
                        error = %err,
                        "operation failed; cancelling remaining work"
                    );
                    self.first_failure = Some(err);
                },
                Some(Settled { index, failure: None }) => {
                    trace!(scope = %self.name, index, "operation succeeded");
                    self.succeeded += 1;
                },
                None => break,
            }
        }

        if self.first_failure.is_some() {
            self.cancel.cancel();
            // Terminal states are write-once, so anything that finishes
            // after this point has its result discarded.
            for slot in &self.slots {
                slot.cancel_if_pending();
            }
        }

        // Reclaim every spawned task before the caller can observe Joined.
        while self.tasks.join_next().await.is_some() {}

        self.phase.set(ScopePhase::Joined);
        debug!(
            scope = %self.name,
            succeeded = self.succeeded,
            failed = self.first_failure.is_some(),
            "scope joined"
        );
    }

    /// Surface the scope's terminal failure, if any.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if called before `join` completed.
    /// - [`Error::Aggregate`] wrapping the first failure by completion
    ///   order if any operation failed.
    pub fn check_failures(&self) -> Result<()> {
        match self.phase.get() {
            ScopePhase::Joined | ScopePhase::ShutDown => {},
            ScopePhase::Open | ScopePhase::Joining => return Err(Error::NotReady),
        }
        match &self.first_failure {
            Some(err) => Err(Error::Aggregate(err.clone())),
            None => Ok(()),
        }
    }

    /// Explicit teardown: cancel outstanding work, reclaim every task, and
    /// force non-terminal handles to `Cancelled`.
    ///
    /// Safe to call in any phase; after it returns the scope is
    /// `ShutDown` and no task it spawned is still running. Dropping the
    /// scope without calling this aborts outstanding tasks instead of
    /// awaiting them.
    pub async fn shutdown(&mut self) {
        if self.phase.get() == ScopePhase::ShutDown {
            return;
        }
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
        for slot in &self.slots {
            slot.cancel_if_pending();
        }
        self.phase.set(ScopePhase::ShutDown);
        debug!(scope = %self.name, "scope shut down");
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ScopePhase {
        self.phase.get()
    }

    /// Number of submitted operations.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no operations have been submitted.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of operations that have not yet reached a terminal state.
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_pending()).count()
    }
}

impl<T: Send + 'static> Default for Scope<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Scope<T> {
    fn drop(&mut self) {
        // Signal first so cooperative operations see the flag even while
        // the JoinSet is aborting them.
        self.cancel.cancel();
        for slot in &self.slots {
            slot.cancel_if_pending();
        }
        self.phase.set(ScopePhase::ShutDown);
        // Dropping the JoinSet aborts any task still running.
    }
}

impl<T> fmt::Debug for Scope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("phase", &self.phase.get())
            .field("operations", &self.slots.len())
            .field("pending", &self.slots.iter().filter(|s| s.is_pending()).count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_rejected_after_join() {
        let mut scope: Scope<u32> = Scope::new();
        scope.submit(|_ctx| async { Ok(1) }).unwrap();
        scope.join().await;

        let err = scope.submit(|_ctx| async { Ok(2) }).unwrap_err();
        assert!(matches!(err, Error::ScopeClosed));
    }

    #[tokio::test]
    async fn phase_progresses_through_lifecycle() {
        let mut scope: Scope<u32> = Scope::<u32>::builder().name("lifecycle").build();
        assert_eq!(scope.phase(), ScopePhase::Open);
        assert!(scope.is_empty());

        scope.submit(|_ctx| async { Ok(1) }).unwrap();
        assert_eq!(scope.len(), 1);

        scope.join().await;
        assert_eq!(scope.phase(), ScopePhase::Joined);
        assert_eq!(scope.pending(), 0);

        scope.shutdown().await;
        assert_eq!(scope.phase(), ScopePhase::ShutDown);
    }

    #[tokio::test]
    async fn check_failures_before_join_is_not_ready() {
        let mut scope: Scope<u32> = Scope::new();
        scope.submit(|_ctx| async { Ok(1) }).unwrap();
        assert!(matches!(scope.check_failures(), Err(Error::NotReady)));
        scope.join().await;
        assert!(scope.check_failures().is_ok());
    }

    #[tokio::test]
    async fn join_with_zero_operations_returns_immediately() {
        let mut scope: Scope<u32> = Scope::new();
        scope.join().await;
        assert_eq!(scope.phase(), ScopePhase::Joined);
        assert!(scope.check_failures().is_ok());
    }

    #[tokio::test]
    async fn shutdown_from_open_forces_handles_to_cancelled() {
        let mut scope: Scope<u32> = Scope::new();
        let handle = scope
            .submit(|ctx| async move {
                ctx.cancelled().await;
                Err(OperationError::new("stopped"))
            })
            .unwrap();

        scope.shutdown().await;
        // ShutDown makes handles readable; the never-finished operation
        // reads back as cancelled.
        match handle.result() {
            Err(Error::Cancelled) | Err(Error::Failed(_)) => {},
            other => panic!("expected cancelled or failed, got {other:?}"),
        }
    }

    #[test]
    fn debug_formats_without_leaking_values() {
        let scope: Scope<String> = Scope::<String>::builder().name("fmt").build();
        let rendered = format!("{scope:?}");
        assert!(rendered.contains("fmt"));
        assert!(rendered.contains("Open"));
    }
}
