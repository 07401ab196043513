//! High/medium-precision throttle (`spec.md` §4.2).

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

/// A throttled wrapper: at most one execution per `wait` window, with
/// optional leading and/or trailing edge firing.
pub struct Throttle<Args, R, E> {
	shared: Arc<EngineShared<Args, R, E>>,
	_abort_listener: JoinHandle<()>,
}

impl<Args, R, E> Throttle<Args, R, E>
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

/// Spawns the long-lived task that proactively rejects a pending slot if
/// the external abort signal fires while idle (no in-flight `invoke`/`flush`
/// is around to observe it synchronously). Lives for the instance's
/// lifetime; torn down by `Throttle`'s `Drop` impl, which is the Rust
/// realization of `spec.md` §3's "invoked ... on instance finalization" for
/// `abortCleanup` (see `DESIGN.md`).
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
		debug!("ratelimit.throttle: external abort fired");
	})
}

impl<Args, R, E> Drop for Throttle<Args, R, E> {
	fn drop(&mut self) {
		self._abort_listener.abort();
	}
}

enum Decision<Args> {
	Lead(Args),
	Join,
	Neither,
}

#[async_trait::async_trait]
impl<Args, R, E> RateLimiter<Args, R, E> for Throttle<Args, R, E>
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	async fn invoke(&self, args: Args) -> InvokeResult<R, E> {
		if self.shared.is_aborted() {
			return Err(Arc::new(RateLimitError::Aborted));
		}

		let now = self.shared.clock.now();
		let config = self.shared.config;

		let (decision, superseded) = {
			let mut inner = self.shared.inner.lock();
			let elapsed = inner.last_exec_time.map(|t| self.shared.clock.elapsed_since(t));
			let window_elapsed = inner.last_exec_time.is_none() || elapsed.is_some_and(|e| e >= config.wait);

			if config.leading && window_elapsed {
				inner.last_exec_time = Some(now);
				inner.has_executed_in_burst = true;
				inner.clear_timer();
				let superseded = inner.take_pending();
				inner.last_args = if config.trailing { Some(args.clone()) } else { None };
				(Decision::Lead(args), superseded)
			} else if config.trailing {
				inner.last_args = Some(args);
				inner.clear_timer();
				let _ = inner.pending_or_insert();
				(Decision::Join, None)
			} else {
				(Decision::Neither, None)
			}
		};

		// A dangling slot here is unreachable in correct operation (see
		// `DESIGN.md`), but if one is ever found, resolve it rather than
		// dropping its callers (invariant 6).
		if let Some(slot) = superseded {
			slot.resolve(Err(Arc::new(RateLimitError::Cancelled)));
		}

		match decision {
			Decision::Lead(args) => {
				trace!("ratelimit.throttle: leading execution");
				match self.shared.op.call(args).await {
					Ok(value) => {
						let value = Arc::new(value);
						self.shared.inner.lock().last_result = Some(Arc::clone(&value));
						Ok(Some(value))
					}
					Err(error) => Err(Arc::new(RateLimitError::Operation(error))),
				}
			}
			Decision::Join => {
				let elapsed = {
					let inner = self.shared.inner.lock();
					inner.last_exec_time.map(|t| self.shared.clock.elapsed_since(t)).unwrap_or(Duration::ZERO)
				};
				let delay = self.shared.trailing_delay(elapsed);

				let mut rx = {
					let inner = self.shared.inner.lock();
					inner.pending.as_ref().expect("just inserted").subscribe()
				};

				let shared = Arc::clone(&self.shared);
				let handle = tokio::spawn(async move {
					tokio::time::sleep(delay).await;
					fire_trailing(shared).await;
				});
				self.shared.inner.lock().timer = Some(handle);

				trace!(delay_ms = delay.as_millis() as u64, "ratelimit.throttle: armed trailing timer");
				match rx.recv().await {
					Ok(outcome) => outcome,
					// The sender was dropped without sending — can only
					// happen if the instance itself is torn down mid-wait.
					Err(_closed) => Err(Arc::new(RateLimitError::Cancelled)),
				}
			}
			Decision::Neither => Ok(self.shared.inner.lock().last_result.clone()),
		}
	}

	fn cancel(&self) {
		let mut inner = self.shared.inner.lock();
		inner.clear_timer();
		let slot = inner.take_pending();
		drop(inner);
		if let Some(slot) = slot {
			slot.resolve(Err(Arc::new(RateLimitError::Cancelled)));
		}
		debug!("ratelimit.throttle: cancelled");
	}

	async fn flush(&self) -> InvokeResult<R, E> {
		let args = {
			let mut inner = self.shared.inner.lock();
			inner.clear_timer();
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
