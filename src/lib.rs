//! Fail-fast structured concurrency for Tokio.
//!
//! `taskscope` provides a single primitive, the [`Scope`]: launch a fixed
//! set of independent async operations concurrently, wait for all of them
//! to finish or for the first failure, and deterministically propagate
//! cancellation and results.
//!
//! The model follows the fork/join-with-fail-fast shape: a scope is
//! constructed, operations are submitted (each returning a [`Handle`]),
//! [`Scope::join`] suspends until the terminal condition is reached,
//! [`Scope::check_failures`] raises if anything failed, and only then do
//! the handles give up their values.
//!
//! # Example
//!
//! ```rust
//! use taskscope::Scope;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut scope: Scope<String> = Scope::<String>::builder().name("quotes").build();
//!
//! let temperature = scope.submit(|_ctx| async {
//!     // stand-in for an outbound call
//!     Ok("temp-ok".to_string())
//! })?;
//! let exchange_rate = scope.submit(|ctx| async move {
//!     ctx.checkpoint()?;
//!     Ok("fx-ok".to_string())
//! })?;
//!
//! scope.join().await;
//! scope.check_failures()?;
//!
//! assert_eq!(temperature.result()?, "temp-ok");
//! assert_eq!(exchange_rate.result()?, "fx-ok");
//! # Ok(())
//! # }
//! ```
//!
//! # Cancellation
//!
//! Cancellation is cooperative and broadcast exactly once, on the first
//! observed failure (or at teardown). Every operation receives an
//! [`OperationContext`] it can poll or await; an operation that ignores
//! the signal is detached at its next await point, and a result produced
//! after the broadcast is discarded. When the owning block exits early —
//! including via an unrelated error — dropping the scope guarantees no
//! spawned task outlives it.
//!
//! # Failure propagation
//!
//! Individual failures are captured on their handle and never thrown
//! across task boundaries. [`Scope::check_failures`] surfaces the first
//! failure **by completion order** as [`Error::Aggregate`]; a caller who
//! skips it can still inspect each handle through [`Handle::result`].

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod handle;
pub mod scope;

pub use context::OperationContext;
pub use error::{Error, OperationError, Result};
pub use handle::Handle;
pub use scope::{Scope, ScopeBuilder, ScopePhase};
