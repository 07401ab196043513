//! Shared plumbing between [`crate::Throttle`] and [`crate::Debounce`]:
//! configuration, the locked [`Inner`] state, and the trailing-edge timer
//! callback both policies fire identically (`spec.md` §4.2/§4.3 "Timer
//! callback" paragraphs are worded the same for both).

mod state;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub(crate) use state::{Inner, PendingSlot, SlotOutcome};

use crate::clock::Clock;
use crate::error::RateLimitError;
use crate::op::AsyncOperation;

/// Validated construction parameters shared by throttle and debounce.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Config {
	pub(crate) wait: Duration,
	pub(crate) leading: bool,
	pub(crate) trailing: bool,
	pub(crate) max_wait: Option<Duration>,
}

/// Everything a throttle/debounce instance needs that does not change after
/// construction, plus the one `Mutex` guarding everything that does.
pub(crate) struct EngineShared<Args, R, E> {
	pub(crate) op: Arc<dyn AsyncOperation<Args, R, E>>,
	pub(crate) clock: Arc<dyn Clock>,
	pub(crate) config: Config,
	pub(crate) abort: CancellationToken,
	pub(crate) inner: Mutex<Inner<Args, R, E>>,
}

impl<Args, R, E> EngineShared<Args, R, E>
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	pub(crate) fn new(
		op: Arc<dyn AsyncOperation<Args, R, E>>,
		clock: Arc<dyn Clock>,
		config: Config,
		abort: CancellationToken,
	) -> Self {
		Self { op, clock, config, abort, inner: Mutex::new(Inner::default()) }
	}

	/// Delay for a newly armed trailing timer, honouring `max_wait` relative
	/// to `elapsed` (`spec.md` §4.2 step 3 / §4.3 step 4: `min(wait, maxWait
	/// - elapsed)` when `maxWait` is set and `elapsed > 0`). Callers pick the
	/// anchor `elapsed` is measured from: throttle measures from the last
	/// real execution (stamped at burst start by its leading edge); debounce
	/// measures from the first suppressed call of the current burst, since
	/// it may have no real execution to anchor to yet (see
	/// `Inner::first_suppressed_at`).
	pub(crate) fn trailing_delay(&self, elapsed: Duration) -> Duration {
		match self.config.max_wait {
			Some(max_wait) if elapsed > Duration::ZERO => {
				let remaining = max_wait.saturating_sub(elapsed);
				self.config.wait.min(remaining)
			}
			_ => self.config.wait,
		}
	}

	/// Resolves the current pending slot (if any) with `outcome`, clearing
	/// it so `is_pending()` observes `false` immediately after.
	pub(crate) fn settle_pending(&self, outcome: SlotOutcome<R, E>) {
		let slot = self.inner.lock().take_pending();
		if let Some(slot) = slot {
			slot.resolve(outcome);
		}
	}

	/// True if the external abort signal has fired.
	pub(crate) fn is_aborted(&self) -> bool {
		self.abort.is_cancelled()
	}
}

/// The trailing-edge timer callback shared by throttle and debounce:
/// consumes `last_args`, executes the wrapped operation outside the lock,
/// and settles the pending slot with the outcome. If `last_args` is absent
/// (nothing accumulated since the timer was armed — can happen after a
/// `flush()` raced the timer), resolves with `last_result` instead.
pub(crate) async fn fire_trailing<Args, R, E>(shared: Arc<EngineShared<Args, R, E>>)
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	if shared.is_aborted() {
		shared.settle_pending(Err(Arc::new(RateLimitError::Aborted)));
		return;
	}

	let args = {
		let mut inner = shared.inner.lock();
		inner.timer = None;
		inner.has_executed_in_burst = false;
		inner.first_suppressed_at = None;
		inner.last_args.take()
	};

	let Some(args) = args else {
		let fallback = shared.inner.lock().last_result.clone();
		shared.settle_pending(Ok(fallback));
		return;
	};

	{
		let mut inner = shared.inner.lock();
		inner.last_exec_time = Some(shared.clock.now());
	}

	trace!("ratelimit.timer: firing trailing execution");
	let outcome = shared.op.call(args).await;
	match outcome {
		Ok(value) => {
			let value = Arc::new(value);
			shared.inner.lock().last_result = Some(Arc::clone(&value));
			shared.settle_pending(Ok(Some(value)));
		}
		Err(error) => {
			shared.settle_pending(Err(Arc::new(RateLimitError::Operation(error))));
		}
	}
}
