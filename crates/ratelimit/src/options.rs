//! Construction-time options for each constructor family (`spec.md` §6's
//! options table), with the same fail-fast validation style as
//! `crates/config/src/error.rs`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::Precision;
use crate::engine::Config;
use crate::error::{ConfigError, ConfigResult};

/// Options recognized by [`crate::throttle`].
#[derive(Debug, Clone)]
pub struct ThrottleOptions {
	/// Execute at window start. Default `true`.
	pub leading: bool,
	/// Execute at window end. Default `true`.
	pub trailing: bool,
	/// Force execution within this many ms of the first suppressed call.
	pub max_wait: Option<Duration>,
	/// External cancellation source; `None` means never aborted.
	pub abort_signal: Option<CancellationToken>,
	/// Selects the clock. `Precision::Low` is rejected by `throttle()` —
	/// use `throttle_fast` instead.
	pub precision: Precision,
}

impl Default for ThrottleOptions {
	fn default() -> Self {
		Self { leading: true, trailing: true, max_wait: None, abort_signal: None, precision: Precision::High }
	}
}

/// Options recognized by [`crate::debounce`].
#[derive(Debug, Clone)]
pub struct DebounceOptions {
	/// Execute at window start. Default `false`.
	pub leading: bool,
	/// Execute at window end. Default `true`.
	pub trailing: bool,
	/// Force execution within this many ms of the first suppressed call.
	pub max_wait: Option<Duration>,
	/// External cancellation source; `None` means never aborted.
	pub abort_signal: Option<CancellationToken>,
	/// Selects the clock. `Precision::Low` is rejected by `debounce()` —
	/// use `debounce_fast` instead.
	pub precision: Precision,
}

impl Default for DebounceOptions {
	fn default() -> Self {
		Self { leading: false, trailing: true, max_wait: None, abort_signal: None, precision: Precision::High }
	}
}

/// Options recognized by `throttle_fast`/`debounce_fast` — no `precision`
/// field since the result channel (the only thing precision otherwise
/// affects the clock choice for) does not exist in the fire-and-forget
/// tiers; they always use a coarse clock per `spec.md` §4.5.
#[derive(Debug, Clone)]
pub struct FastOptions {
	/// Execute at window start.
	pub leading: bool,
	/// Execute at window end.
	pub trailing: bool,
	/// Force execution within this many ms of the first suppressed call.
	pub max_wait: Option<Duration>,
	/// External cancellation source; `None` means never aborted.
	pub abort_signal: Option<CancellationToken>,
}

impl Default for FastOptions {
	fn default() -> Self {
		Self { leading: true, trailing: true, max_wait: None, abort_signal: None }
	}
}

/// Options recognized by [`crate::throttle_batch`].
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
	/// Flush once this many items have been enqueued. Default 10.
	pub batch_size: usize,
	/// Flush a non-empty buffer this long after its first item, even if
	/// `batch_size` is never reached. Default `3 * wait`.
	pub max_wait: Option<Duration>,
}

impl Default for BatchOptions {
	fn default() -> Self {
		Self { batch_size: 10, max_wait: None }
	}
}

pub(crate) fn validate_wait(wait: Duration) -> ConfigResult<()> {
	if wait.is_zero() {
		return Err(ConfigError::NonPositiveWait);
	}
	Ok(())
}

pub(crate) fn validate_max_wait(wait: Duration, max_wait: Option<Duration>) -> ConfigResult<()> {
	if let Some(max_wait) = max_wait
		&& max_wait < wait
	{
		return Err(ConfigError::MaxWaitBelowWait { wait, max_wait });
	}
	Ok(())
}

impl ThrottleOptions {
	pub(crate) fn into_config(self, wait: Duration) -> ConfigResult<(Config, CancellationToken, Precision)> {
		validate_wait(wait)?;
		validate_max_wait(wait, self.max_wait)?;
		if self.precision == Precision::Low {
			return Err(ConfigError::LowPrecisionUnsupported);
		}
		let config = Config { wait, leading: self.leading, trailing: self.trailing, max_wait: self.max_wait };
		let abort = self.abort_signal.unwrap_or_default();
		Ok((config, abort, self.precision))
	}
}

impl DebounceOptions {
	pub(crate) fn into_config(self, wait: Duration) -> ConfigResult<(Config, CancellationToken, Precision)> {
		validate_wait(wait)?;
		validate_max_wait(wait, self.max_wait)?;
		if self.precision == Precision::Low {
			return Err(ConfigError::LowPrecisionUnsupported);
		}
		let config = Config { wait, leading: self.leading, trailing: self.trailing, max_wait: self.max_wait };
		let abort = self.abort_signal.unwrap_or_default();
		Ok((config, abort, self.precision))
	}
}

impl FastOptions {
	pub(crate) fn into_config(self, wait: Duration) -> ConfigResult<(Config, CancellationToken)> {
		validate_wait(wait)?;
		validate_max_wait(wait, self.max_wait)?;
		let config = Config { wait, leading: self.leading, trailing: self.trailing, max_wait: self.max_wait };
		let abort = self.abort_signal.unwrap_or_default();
		Ok((config, abort))
	}
}

impl BatchOptions {
	pub(crate) fn resolve(self, wait: Duration) -> ConfigResult<(usize, Duration)> {
		validate_wait(wait)?;
		if self.batch_size == 0 {
			return Err(ConfigError::EmptyBatch);
		}
		let max_wait = self.max_wait.unwrap_or(wait.saturating_mul(3));
		validate_max_wait(wait, Some(max_wait))?;
		Ok((self.batch_size, max_wait))
	}
}
