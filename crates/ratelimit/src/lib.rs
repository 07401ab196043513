//! Async rate-limiting engine for Evildoer: throttle, debounce, batch
//! throttling, and the cancellation primitives they share.
//!
//! # Policies
//!
//! - [`throttle`] — at most one execution per window, with configurable
//!   leading/trailing edges and an optional `max_wait` forcing clause.
//! - [`debounce`] — execution deferred until calls go quiet for `wait`.
//! - [`throttle_batch`] — accumulate arguments, flush as one call by size
//!   or time.
//! - [`throttle_fast`]/[`debounce_fast`] — the same policies with the
//!   result channel stripped for hot paths that cannot afford even one
//!   allocation per call (typing indicators, cursor broadcasts).
//!
//! Every callable built by `throttle`/`debounce` implements
//! [`RateLimiter`]: callers that arrive while an execution is scheduled or
//! in flight observe the *same* outcome as every other caller joined to
//! that slot, not independent ones (see [`engine`]'s module docs).
//!
//! # Precision
//!
//! [`Precision::High`] reads the runtime's monotonic clock on every
//! decision. [`Precision::Medium`] rounds to a coarse tick, trading a
//! small amount of scheduling drift for a cheaper clock read, while still
//! providing the full [`RateLimiter`] surface. `Precision::Low` has no
//! constructor here — it does not exist as a value callers can pass in;
//! it exists only as the tier [`throttle_fast`]/[`debounce_fast`] use
//! implicitly, narrowing the type itself rather than leaving dead methods
//! on a low-precision instance.

pub mod abort;
pub mod batch;
pub mod clock;
pub(crate) mod engine;
pub mod error;
pub mod op;

mod debounce;
mod low_precision;
mod options;
mod rate_limiter;
mod throttle;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use abort::{AbortController, TimeoutAbortController, combine_abort_signals};
pub use batch::{BatchOperation, BatchThrottle};
pub use clock::{Clock, Precision};
pub use debounce::Debounce;
pub use error::{ConfigError, ConfigResult, RateLimitError};
pub use low_precision::FireAndForget;
pub use op::AsyncOperation;
pub use options::{BatchOptions, DebounceOptions, FastOptions, ThrottleOptions};
pub use rate_limiter::{InvokeResult, RateLimiter};
pub use throttle::Throttle;
pub use tokio_util::sync::CancellationToken;

use clock::clock_for;
use low_precision::FastMode;

/// Wraps `op` in a [`Throttle`]. `wait` is the window length; see
/// [`ThrottleOptions`] for leading/trailing/`max_wait`/precision/abort
/// knobs. Returns [`ConfigError`] if `wait` is zero, `max_wait` is set
/// below `wait`, or `Precision::Low` was requested (use
/// [`throttle_fast`] for that tier).
pub fn throttle<Args, R, E>(op: impl AsyncOperation<Args, R, E>, wait: Duration, options: ThrottleOptions) -> ConfigResult<Throttle<Args, R, E>>
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	let (config, abort, precision) = options.into_config(wait)?;
	let clock = clock_for(precision);
	Ok(Throttle::new(Arc::new(op), clock, config, abort))
}

/// Wraps `op` in a [`Debounce`]. See [`throttle`] for the shared
/// validation rules; [`DebounceOptions`] defaults `leading` to `false`.
pub fn debounce<Args, R, E>(op: impl AsyncOperation<Args, R, E>, wait: Duration, options: DebounceOptions) -> ConfigResult<Debounce<Args, R, E>>
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	let (config, abort, precision) = options.into_config(wait)?;
	let clock = clock_for(precision);
	Ok(Debounce::new(Arc::new(op), clock, config, abort))
}

/// Wraps `op` in a fire-and-forget throttle: no result channel, no
/// `cancel`/`flush`/`is_pending`. `E` must be [`fmt::Display`] so a
/// swallowed failure can still be logged.
pub fn throttle_fast<Args, R, E>(op: impl AsyncOperation<Args, R, E>, wait: Duration, options: FastOptions) -> ConfigResult<FireAndForget<Args, R, E>>
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	let (config, abort) = options.into_config(wait)?;
	Ok(FireAndForget::new(Arc::new(op), config, abort, FastMode::Throttle))
}

/// Wraps `op` in a fire-and-forget debounce. See [`throttle_fast`].
pub fn debounce_fast<Args, R, E>(op: impl AsyncOperation<Args, R, E>, wait: Duration, options: FastOptions) -> ConfigResult<FireAndForget<Args, R, E>>
where
	Args: Clone + Send + 'static,
	R: Send + Sync + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	let (config, abort) = options.into_config(wait)?;
	Ok(FireAndForget::new(Arc::new(op), config, abort, FastMode::Debounce))
}

/// Wraps `op` in a [`BatchThrottle`]. `wait` is the quiet-period length
/// between the last enqueue and an automatic flush; see [`BatchOptions`]
/// for `batch_size`/`max_wait`.
pub fn throttle_batch<Args, E>(op: impl BatchOperation<Args, E>, wait: Duration, options: BatchOptions) -> ConfigResult<BatchThrottle<Args, E>>
where
	Args: Send + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	let (batch_size, max_wait) = options.resolve(wait)?;
	Ok(BatchThrottle::new(Arc::new(op), batch_size, wait, max_wait))
}

/// Creates an [`AbortController`], the abort signal source accepted by
/// `abort_signal` on [`ThrottleOptions`]/[`DebounceOptions`]/[`FastOptions`].
pub fn create_abort_controller() -> AbortController {
	AbortController::new()
}

/// Creates a [`TimeoutAbortController`] that fires on its own after
/// `timeout`, or earlier if aborted explicitly.
pub fn create_timeout_abort_controller(timeout: Duration) -> TimeoutAbortController {
	TimeoutAbortController::new(timeout)
}
