//! Fire-and-forget tier (`spec.md` §4.5): no result channel, no
//! `cancel`/`flush`/`is_pending` surface — the contract is narrowed at
//! the type level rather than left dangling on an instance that can't
//! honor it (`spec.md` §9's second open question).

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::clock::{Clock, CoarseClock, Instant};
use crate::engine::Config;
use crate::op::AsyncOperation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FastMode {
	Throttle,
	Debounce,
}

struct LowInner<Args> {
	timer: Option<JoinHandle<()>>,
	last_exec_time: Option<Instant>,
	last_args: Option<Args>,
	has_executed_in_burst: bool,
	/// Debounce mode only: timestamp of the first call in the currently
	/// suppressed burst, used to anchor `max_wait` instead of
	/// `last_exec_time` (which stays `None` for the whole burst when
	/// `leading` is off — see the non-fast `Inner::first_suppressed_at`).
	first_suppressed_at: Option<Instant>,
}

impl<Args> Default for LowInner<Args> {
	fn default() -> Self {
		Self { timer: None, last_exec_time: None, last_args: None, has_executed_in_burst: false, first_suppressed_at: None }
	}
}

impl<Args> LowInner<Args> {
	fn clear_timer(&mut self) {
		if let Some(handle) = self.timer.take() {
			handle.abort();
		}
	}
}

/// State shared with the detached trailing-timer task, mirroring
/// [`crate::engine::EngineShared`]'s split between `Arc`-owned shared
/// state and the instance wrapper that owns the abort listener.
struct LowShared<Args, R, E> {
	op: Arc<dyn AsyncOperation<Args, R, E>>,
	clock: Arc<dyn Clock>,
	config: Config,
	abort: CancellationToken,
	mode: FastMode,
	inner: Mutex<LowInner<Args>>,
}

/// A rate-limited wrapper with no result channel: each decision either
/// spawns the wrapped operation fire-and-forget, or drops the call.
/// Errors are logged and swallowed (`spec.md` §4.5) — there is no caller
/// left to hand them to.
pub struct FireAndForget<Args, R, E> {
	shared: Arc<LowShared<Args, R, E>>,
	_abort_listener: JoinHandle<()>,
}

impl<Args, R, E> FireAndForget<Args, R, E>
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	pub(crate) fn new(op: Arc<dyn AsyncOperation<Args, R, E>>, config: Config, abort: CancellationToken, mode: FastMode) -> Self {
		let clock: Arc<dyn Clock> = Arc::new(CoarseClock::default());
		let shared = Arc::new(LowShared { op, clock, config, abort, mode, inner: Mutex::new(LowInner::default()) });
		let listener = spawn_abort_listener(Arc::clone(&shared));
		Self { shared, _abort_listener: listener }
	}

	/// Feeds one call through the rate-limiting policy. Returns
	/// immediately; any resulting execution runs on a detached task.
	pub fn invoke(&self, args: Args) {
		if self.shared.abort.is_cancelled() {
			trace!("ratelimit.fast: dropped call, aborted");
			return;
		}

		match self.shared.mode {
			FastMode::Throttle => invoke_throttle(&self.shared, args),
			FastMode::Debounce => invoke_debounce(&self.shared, args),
		}
	}
}

impl<Args, R, E> Drop for FireAndForget<Args, R, E> {
	fn drop(&mut self) {
		self._abort_listener.abort();
		self.shared.inner.lock().clear_timer();
	}
}

fn spawn_abort_listener<Args, R, E>(shared: Arc<LowShared<Args, R, E>>) -> JoinHandle<()>
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	tokio::spawn(async move {
		shared.abort.clone().cancelled().await;
		shared.inner.lock().clear_timer();
	})
}

enum Decision<Args> {
	Fire(Args),
	Arm,
	Drop,
}

fn invoke_throttle<Args, R, E>(shared: &Arc<LowShared<Args, R, E>>, args: Args)
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	let now = shared.clock.now();

	let decision = {
		let mut inner = shared.inner.lock();
		let window_elapsed =
			inner.last_exec_time.is_none() || inner.last_exec_time.is_some_and(|t| shared.clock.elapsed_since(t) >= shared.config.wait);

		if shared.config.leading && window_elapsed {
			inner.last_exec_time = Some(now);
			inner.has_executed_in_burst = true;
			inner.clear_timer();
			inner.last_args = if shared.config.trailing { Some(args.clone()) } else { None };
			Decision::Fire(args)
		} else if shared.config.trailing {
			inner.last_args = Some(args);
			inner.clear_timer();
			Decision::Arm
		} else {
			Decision::Drop
		}
	};

	match decision {
		Decision::Fire(args) => {
			trace!("ratelimit.fast.throttle: leading execution");
			spawn_call(Arc::clone(&shared.op), args);
		}
		Decision::Arm => arm_trailing(shared),
		Decision::Drop => trace!("ratelimit.fast.throttle: dropped call"),
	}
}

fn invoke_debounce<Args, R, E>(shared: &Arc<LowShared<Args, R, E>>, args: Args)
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	let now = shared.clock.now();

	let fire_leading = {
		let mut inner = shared.inner.lock();
		inner.clear_timer();
		let window_elapsed =
			inner.last_exec_time.is_none() || inner.last_exec_time.is_some_and(|t| shared.clock.elapsed_since(t) >= shared.config.wait);
		shared.config.leading && window_elapsed
	};

	if fire_leading {
		trace!("ratelimit.fast.debounce: leading execution");
		let mut inner = shared.inner.lock();
		inner.last_exec_time = Some(now);
		inner.first_suppressed_at = None;
		drop(inner);
		spawn_call(Arc::clone(&shared.op), args);
		return;
	}

	{
		let mut inner = shared.inner.lock();
		inner.last_args = Some(args);
		if shared.config.trailing {
			inner.first_suppressed_at.get_or_insert(now);
		}
	}

	if shared.config.trailing {
		arm_trailing(shared);
	} else {
		trace!("ratelimit.fast.debounce: dropped call, trailing disabled");
	}
}

fn arm_trailing<Args, R, E>(shared: &Arc<LowShared<Args, R, E>>)
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	// Throttle anchors `max_wait` to the last real execution (stamped at
	// burst start by its leading edge); debounce anchors to the first
	// suppressed call of the burst, since it may have no execution yet.
	let elapsed = {
		let inner = shared.inner.lock();
		let anchor = match shared.mode {
			FastMode::Throttle => inner.last_exec_time,
			FastMode::Debounce => inner.first_suppressed_at,
		};
		anchor.map(|t| shared.clock.elapsed_since(t)).unwrap_or_default()
	};
	let delay = match shared.config.max_wait {
		Some(max_wait) if !elapsed.is_zero() => shared.config.wait.min(max_wait.saturating_sub(elapsed)),
		_ => shared.config.wait,
	};

	let owned = Arc::clone(shared);
	let handle = tokio::spawn(async move {
		tokio::time::sleep(delay).await;
		if owned.abort.is_cancelled() {
			return;
		}
		let args = {
			let mut inner = owned.inner.lock();
			inner.timer = None;
			inner.has_executed_in_burst = false;
			inner.first_suppressed_at = None;
			inner.last_args.take()
		};
		if let Some(args) = args {
			owned.inner.lock().last_exec_time = Some(owned.clock.now());
			let _ = spawn_call(Arc::clone(&owned.op), args).await;
		}
	});

	shared.inner.lock().timer = Some(handle);
}

fn spawn_call<Args, R, E>(op: Arc<dyn AsyncOperation<Args, R, E>>, args: Args) -> JoinHandle<()>
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	tokio::spawn(async move {
		if let Err(error) = op.call(args).await {
			warn!(%error, "ratelimit.fast: swallowed operation error");
		}
	})
}
