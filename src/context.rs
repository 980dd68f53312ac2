//! Cancellation capability handed to each operation.

use tokio_util::sync::CancellationToken;

use crate::error::OperationError;

/// Capability passed to every submitted operation.
///
/// Cancellation is cooperative: the scope signals it once (on first failure
/// or at teardown) and the operation is expected to stop promptly where
/// feasible — by polling [`is_cancelled`](Self::is_cancelled) between
/// internal steps, by racing a blocking call against
/// [`cancelled`](Self::cancelled), or by bailing out at a
/// [`checkpoint`](Self::checkpoint). An operation that ignores the signal
/// is allowed to run to completion; its result is discarded.
///
/// The context is cheap to clone and can be moved into inner futures.
#[derive(Clone, Debug)]
pub struct OperationContext {
    cancel: CancellationToken,
    index: usize,
}

impl OperationContext {
    pub(crate) fn new(cancel: CancellationToken, index: usize) -> Self {
        Self { cancel, index }
    }

    /// Whether cancellation has been signaled for this scope.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when cancellation is signaled.
    ///
    /// Intended for `tokio::select!` against a long call in progress:
    ///
    /// ```rust,ignore
    /// tokio::select! {
    ///     response = client.get(url) => handle(response),
    ///     _ = ctx.cancelled() => return Err("cancelled".into()),
    /// }
    /// ```
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Bail out early if cancellation has been signaled.
    ///
    /// # Errors
    ///
    /// Returns an [`OperationError`] when the scope has requested
    /// cancellation.
    pub fn checkpoint(&self) -> Result<(), OperationError> {
        if self.cancel.is_cancelled() {
            Err(OperationError::new("cancelled by scope"))
        } else {
            Ok(())
        }
    }

    /// Submission index of the operation this context belongs to.
    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_passes_until_cancelled() {
        let token = CancellationToken::new();
        let ctx = OperationContext::new(token.child_token(), 0);
        assert!(!ctx.is_cancelled());
        assert!(ctx.checkpoint().is_ok());

        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.checkpoint().is_err());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_signal() {
        let token = CancellationToken::new();
        let ctx = OperationContext::new(token.child_token(), 3);
        assert_eq!(ctx.index(), 3);

        token.cancel();
        // Must not hang once the signal is set.
        ctx.cancelled().await;
    }
}
