//! The shared contract every throttle/debounce instance implements
//! (`spec.md` §4.1).

use std::sync::Arc;

use crate::error::RateLimitError;

/// Result of `invoke`/`flush`: `Ok(Some(value))` when an execution (this
/// call's own, or one it joined) produced a value; `Ok(None)` when policy
/// dictated no new execution and no prior result exists yet; `Err` for
/// cancellation or the wrapped operation's own failure.
///
/// The error is `Arc`-wrapped for the same reason `R` is in the `Ok` arm:
/// every joined caller shares one broadcast outcome (`spec.md`'s
/// promise-consistency invariant), and `Arc` gets there without requiring
/// `E: Clone` from the wrapped operation.
pub type InvokeResult<R, E> = Result<Option<Arc<R>>, Arc<RateLimitError<E>>>;

/// The public surface of a Rate-Limited Callable: invoke, cancel, flush,
/// and a pending check.
#[async_trait::async_trait]
pub trait RateLimiter<Args, R, E>: Send + Sync
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	/// Invokes the wrapped operation subject to this instance's policy.
	async fn invoke(&self, args: Args) -> InvokeResult<R, E>;

	/// Cancels the armed timer and rejects any outstanding caller with
	/// [`RateLimitError::Cancelled`]. Idempotent.
	fn cancel(&self);

	/// If pending arguments exist and no abort is in effect, executes the
	/// wrapped operation with them immediately and resolves any outstanding
	/// caller with the result. Otherwise resolves with the last known
	/// result.
	async fn flush(&self) -> InvokeResult<R, E>;

	/// True iff a result is currently pending (a joined caller is awaiting
	/// a scheduled or in-flight execution).
	fn is_pending(&self) -> bool;
}
