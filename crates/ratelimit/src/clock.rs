//! Per-tier time sources.
//!
//! High precision reads the runtime's monotonic clock directly. Medium
//! precision rounds down to a coarse tick, trading a bounded amount of
//! scheduling drift for (in a real deployment) a cheaper read. Both guard
//! against negative elapsed time, per `spec.md` §9.

use std::time::Duration;

pub use tokio::time::Instant;

/// Precision tier requested by a caller of [`crate::throttle`] /
/// [`crate::debounce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
	/// Monotonic clock, full promise-consistency. Default.
	#[default]
	High,
	/// Coarse clock, full promise-consistency.
	Medium,
	/// Coarse clock, no result channel. Not constructible through
	/// [`crate::throttle`]/[`crate::debounce`] — see `throttle_fast`/`debounce_fast`.
	Low,
}

/// Abstracts "now" and "elapsed since" so throttle/debounce state machines
/// are agnostic to which precision tier they were built with.
pub trait Clock: Send + Sync + 'static {
	/// Returns the current instant on this clock's time source.
	fn now(&self) -> Instant;

	/// Elapsed time since `earlier`, clamped to zero.
	///
	/// Never negative: a clock tick that appears to move backwards (coarse
	/// rounding, or the host clock's own imprecision) must not produce a
	/// negative `elapsed` that the throttle/debounce math could misread as
	/// "window already expired in the past".
	fn elapsed_since(&self, earlier: Instant) -> Duration {
		self.now().saturating_duration_since(earlier)
	}
}

/// High-precision clock: the runtime's monotonic `Instant`, unrounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Medium-precision clock: `Instant::now()` rounded down to the nearest
/// `tick`. Default tick is 15ms.
///
/// `Instant` has no epoch to round a timestamp against, so each `CoarseClock`
/// fixes its own reference point at construction and rounds relative to it.
/// Two `CoarseClock`s constructed at different times may therefore round to
/// different wall-clock boundaries; this only affects the phase of the
/// coarsening, not the bound on drift (`spec.md` §4.4's "one coarse-clock
/// tick").
#[derive(Debug, Clone, Copy)]
pub struct CoarseClock {
	tick: Duration,
	epoch: Instant,
}

impl CoarseClock {
	/// Default coarsening granularity.
	pub const DEFAULT_TICK: Duration = Duration::from_millis(15);

	/// Creates a coarse clock with a custom tick granularity.
	pub fn with_tick(tick: Duration) -> Self {
		Self { tick, epoch: Instant::now() }
	}
}

impl Default for CoarseClock {
	fn default() -> Self {
		Self::with_tick(Self::DEFAULT_TICK)
	}
}

impl Clock for CoarseClock {
	fn now(&self) -> Instant {
		let now = Instant::now();
		if self.tick.is_zero() {
			return now;
		}
		let since_epoch = now.saturating_duration_since(self.epoch).as_nanos();
		let tick_nanos = self.tick.as_nanos().max(1);
		let remainder_nanos = (since_epoch % tick_nanos) as u64;
		now.checked_sub(Duration::from_nanos(remainder_nanos)).unwrap_or(now)
	}
}

/// Picks the `Clock` implementation for a tier. `Precision::Low` has no
/// promise-bearing clock use in this crate (see [`crate::low_precision`]) but
/// is included for completeness of the dispatch table.
pub fn clock_for(precision: Precision) -> std::sync::Arc<dyn Clock> {
	match precision {
		Precision::High => std::sync::Arc::new(MonotonicClock),
		Precision::Medium | Precision::Low => std::sync::Arc::new(CoarseClock::default()),
	}
}
