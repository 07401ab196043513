//! Error types for rate-limited operations and their construction.

use std::time::Duration;

use thiserror::Error;

/// Failure surfaced to a caller of [`crate::RateLimiter::invoke`] or
/// [`crate::RateLimiter::flush`].
///
/// Carries the same three-way discriminator as the source system's
/// `name`-tagged rejections, but as an enum variant rather than a string
/// compare.
#[derive(Debug, Error)]
pub enum RateLimitError<E> {
	/// The external abort signal fired before or during scheduling.
	#[error("rate-limited operation aborted")]
	Aborted,
	/// `cancel()` was called explicitly; non-sticky, unlike `Aborted`.
	#[error("rate-limited operation cancelled")]
	Cancelled,
	/// The wrapped operation itself returned an error.
	#[error(transparent)]
	Operation(E),
}

impl<E> RateLimitError<E> {
	/// True for the two cancellation-kind variants (as opposed to
	/// [`RateLimitError::Operation`]).
	pub fn is_cancellation(&self) -> bool {
		matches!(self, Self::Aborted | Self::Cancelled)
	}
}

/// Fail-fast misconfiguration detected at construction time.
///
/// Unlike [`RateLimitError`], this is never returned from `invoke`/`flush` —
/// constructors validate eagerly so a misconfigured instance never exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
	/// `wait` was zero or negative.
	#[error("wait must be greater than zero")]
	NonPositiveWait,
	/// `max_wait` was set below `wait`.
	#[error("max_wait ({max_wait:?}) must be >= wait ({wait:?})")]
	MaxWaitBelowWait { wait: Duration, max_wait: Duration },
	/// `batch_size` was zero.
	#[error("batch_size must be at least 1")]
	EmptyBatch,
	/// `Precision::Low` was requested from an entry point that returns the
	/// full `RateLimiter` contract, which a low-precision instance cannot
	/// provide. Use `throttle_fast`/`debounce_fast` instead.
	#[error("low precision forfeits cancel/flush/is_pending; use throttle_fast/debounce_fast")]
	LowPrecisionUnsupported,
}

/// Crate-local result alias for construction-time validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
