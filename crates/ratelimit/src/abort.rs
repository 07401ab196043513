//! Cancellation-token helpers: a plain controller, a timeout-triggered
//! controller, and an N-way combinator.
//!
//! Built directly on [`tokio_util::sync::CancellationToken`], which already
//! gives once-only, GC-able listener semantics — the source's hand-rolled
//! abort-signal machinery (`spec.md` §4.7) is a restatement of what this
//! type provides natively.

use std::future::Future as _;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A plain cancellation source: exposes a cloneable `signal` and an
/// idempotent `abort()`.
#[derive(Debug, Clone)]
pub struct AbortController {
	token: CancellationToken,
}

impl AbortController {
	/// Creates a new, unfired controller.
	pub fn new() -> Self {
		Self { token: CancellationToken::new() }
	}

	/// Returns a clone of the underlying signal for registering with a
	/// rate-limited instance via `ThrottleOptions`/`DebounceOptions::abort_signal`.
	pub fn signal(&self) -> CancellationToken {
		self.token.clone()
	}

	/// Fires the signal. Idempotent: a second call is a no-op.
	pub fn abort(&self) {
		self.token.cancel();
	}

	/// True once `abort()` has been called.
	pub fn is_aborted(&self) -> bool {
		self.token.is_cancelled()
	}
}

impl Default for AbortController {
	fn default() -> Self {
		Self::new()
	}
}

/// An [`AbortController`] that also fires on its own after `timeout` elapses.
pub struct TimeoutAbortController {
	inner: AbortController,
	_timer: JoinHandle<()>,
}

impl TimeoutAbortController {
	/// Creates a controller that aborts after `timeout`, or earlier if
	/// [`TimeoutAbortController::abort`] is called explicitly.
	pub fn new(timeout: Duration) -> Self {
		let inner = AbortController::new();
		let token = inner.signal();
		let timer = tokio::spawn(async move {
			tokio::time::sleep(timeout).await;
			token.cancel();
		});
		Self { inner, _timer: timer }
	}

	/// Returns a clone of the underlying signal.
	pub fn signal(&self) -> CancellationToken {
		self.inner.signal()
	}

	/// Fires the signal early. Idempotent.
	pub fn abort(&self) {
		self.inner.abort();
	}

	/// True once the timeout elapsed or `abort()` was called.
	pub fn is_aborted(&self) -> bool {
		self.inner.is_aborted()
	}
}

impl Drop for TimeoutAbortController {
	fn drop(&mut self) {
		self._timer.abort();
	}
}

/// Combines N signals into one: the returned token fires as soon as any
/// input fires.
///
/// Already-cancelled inputs short-circuit immediately. Otherwise one
/// background task races all inputs' `cancelled()` futures and cancels the
/// derived token on the first to resolve, then exits — satisfying the
/// "once-only" listener requirement without per-input bookkeeping that would
/// need manual deregistration.
pub fn combine_abort_signals(signals: &[CancellationToken]) -> CancellationToken {
	let derived = CancellationToken::new();

	if signals.iter().any(CancellationToken::is_cancelled) {
		derived.cancel();
		return derived;
	}

	if signals.is_empty() {
		return derived;
	}

	let sources: Vec<CancellationToken> = signals.to_vec();
	let sink = derived.clone();
	tokio::spawn(async move {
		wait_for_any(&sources).await;
		sink.cancel();
	});

	derived
}

/// Waits for the first of an arbitrary number of tokens to cancel, without
/// pulling in a `futures`-style `select_all` dependency for a single call
/// site. Each `cancelled()` future is boxed so the poll loop below does not
/// need every token's listener future to be `Unpin`.
async fn wait_for_any(tokens: &[CancellationToken]) {
	let mut waiters: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = ()> + '_>>> =
		tokens.iter().map(|t| Box::pin(t.cancelled()) as _).collect();

	std::future::poll_fn(move |cx| {
		for waiter in waiters.iter_mut() {
			if waiter.as_mut().poll(cx).is_ready() {
				return std::task::Poll::Ready(());
			}
		}
		std::task::Poll::Pending
	})
	.await;
}
