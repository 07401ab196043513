//! High/medium-precision debounce (`spec.md` §4.3).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::engine::{Config, EngineShared, fire_trailing};
use crate::error::RateLimitError;
use crate::op::AsyncOperation;
use crate::rate_limiter::{InvokeResult, RateLimiter};

/// A debounced wrapper: execution is deferred until `wait` has elapsed
/// with no further calls, re-arming the timer on every call during the
/// quiet period. Shares its engine plumbing with [`crate::Throttle`] —
/// the two differ only in `invoke`'s policy, per `spec.md` §4.3.
pub struct Debounce<Args, R, E> {
	shared: Arc<EngineShared<Args, R, E>>,
	_abort_listener: JoinHandle<()>,
}

impl<Args, R, E> Debounce<Args, R, E>
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	pub(crate) fn new(op: Arc<dyn AsyncOperation<Args, R, E>>, clock: Arc<dyn Clock>, config: Config, abort: CancellationToken) -> Self {
		let shared = Arc::new(EngineShared::new(op, clock, config, abort));
		let listener = spawn_abort_listener(Arc::clone(&shared));
		Self { shared, _abort_listener: listener }
	}
}

fn spawn_abort_listener<Args, R, E>(shared: Arc<EngineShared<Args, R, E>>) -> JoinHandle<()>
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	tokio::spawn(async move {
		shared.abort.clone().cancelled().await;
		shared.inner.lock().clear_timer();
		shared.settle_pending(Err(Arc::new(RateLimitError::Aborted)));
		debug!("ratelimit.debounce: external abort fired");
	})
}

impl<Args, R, E> Drop for Debounce<Args, R, E> {
	fn drop(&mut self) {
		self._abort_listener.abort();
	}
}

#[async_trait::async_trait]
impl<Args, R, E> RateLimiter<Args, R, E> for Debounce<Args, R, E>
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	async fn invoke(&self, args: Args) -> InvokeResult<R, E> {
		if self.shared.is_aborted() {
			return Err(Arc::new(RateLimitError::Aborted));
		}

		let config = self.shared.config;
		let now = self.shared.clock.now();

		let fire_leading = {
			let mut inner = self.shared.inner.lock();
			inner.clear_timer();
			let window_elapsed = inner.last_exec_time.is_none() || inner.last_exec_time.is_some_and(|t| self.shared.clock.elapsed_since(t) >= config.wait);
			config.leading && window_elapsed
		};

		if fire_leading {
			trace!("ratelimit.debounce: leading execution");
			// A leading execution always settles and returns on the spot
			// (`spec.md` §4.3 step 3's explicit "return"), never arming a
			// trailing timer of its own. No pending slot should exist here
			// in correct operation, but resolve one if found rather than
			// drop its callers (invariant 6).
			let superseded = {
				let mut inner = self.shared.inner.lock();
				inner.last_exec_time = Some(now);
				inner.first_suppressed_at = None;
				inner.take_pending()
			};
			if let Some(slot) = superseded {
				slot.resolve(Err(Arc::new(RateLimitError::Cancelled)));
			}
			return match self.shared.op.call(args).await {
				Ok(value) => {
					let value = Arc::new(value);
					self.shared.inner.lock().last_result = Some(Arc::clone(&value));
					Ok(Some(value))
				}
				Err(error) => Err(Arc::new(RateLimitError::Operation(error))),
			};
		}

		{
			let mut inner = self.shared.inner.lock();
			inner.last_args = Some(args);
		}

		if !config.trailing {
			// `leading:true, trailing:false` mid-burst: no timer to arm and
			// nothing will ever consume `last_args` until the next leading
			// opportunity. Resolving immediately with the last known result
			// short-circuits what would otherwise be a permanently dangling
			// slot (`spec.md` §9's third open question).
			return Ok(self.shared.inner.lock().last_result.clone());
		}

		let mut rx = {
			let mut inner = self.shared.inner.lock();
			inner.first_suppressed_at.get_or_insert(now);
			inner.pending_or_insert().subscribe()
		};
		arm_timer(&self.shared);

		trace!("ratelimit.debounce: armed trailing timer");
		match rx.recv().await {
			Ok(outcome) => outcome,
			Err(_closed) => Err(Arc::new(RateLimitError::Cancelled)),
		}
	}

	fn cancel(&self) {
		let mut inner = self.shared.inner.lock();
		inner.clear_timer();
		inner.has_executed_in_burst = false;
		inner.first_suppressed_at = None;
		// Unlike throttle, debounce clears `last_args` on cancel (`spec.md`
		// §4.1): a subsequent `flush()` must return `last_result` with no
		// execution, not re-run the cancelled burst's stale arguments.
		inner.last_args = None;
		let slot = inner.take_pending();
		drop(inner);
		if let Some(slot) = slot {
			slot.resolve(Err(Arc::new(RateLimitError::Cancelled)));
		}
		debug!("ratelimit.debounce: cancelled");
	}

	async fn flush(&self) -> InvokeResult<R, E> {
		let args = {
			let mut inner = self.shared.inner.lock();
			inner.clear_timer();
			inner.first_suppressed_at = None;
			inner.last_args.take()
		};

		match args {
			Some(args) if !self.shared.is_aborted() => match self.shared.op.call(args).await {
				Ok(value) => {
					let value = Arc::new(value);
					self.shared.inner.lock().last_result = Some(Arc::clone(&value));
					self.shared.settle_pending(Ok(Some(Arc::clone(&value))));
					Ok(Some(value))
				}
				Err(error) => {
					let error = Arc::new(RateLimitError::Operation(error));
					self.shared.settle_pending(Err(Arc::clone(&error)));
					Err(error)
				}
			},
			_ => {
				let result = self.shared.inner.lock().last_result.clone();
				self.shared.settle_pending(Ok(result.clone()));
				Ok(result)
			}
		}
	}

	fn is_pending(&self) -> bool {
		self.shared.inner.lock().pending.is_some()
	}
}

/// Arms the trailing timer for `wait`, honouring `max_wait` relative to the
/// first suppressed call of the current burst (not the last execution —
/// with `leading: false` there may not have been one yet; see
/// `Inner::first_suppressed_at`).
fn arm_timer<Args, R, E>(shared: &Arc<EngineShared<Args, R, E>>)
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	let elapsed = {
		let inner = shared.inner.lock();
		inner.first_suppressed_at.map(|t| shared.clock.elapsed_since(t)).unwrap_or(Duration::ZERO)
	};
	let delay = shared.trailing_delay(elapsed);

	let owned = Arc::clone(shared);
	let handle = tokio::spawn(async move {
		tokio::time::sleep(delay).await;
		fire_trailing(owned).await;
	});
	shared.inner.lock().timer = Some(handle);
}
