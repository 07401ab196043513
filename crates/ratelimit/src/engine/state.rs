//! Shared state fields for throttle/debounce, per `spec.md` §3's data model
//! table. Field visibility mirrors `crates/editor/src/scheduler/state.rs`:
//! private to the crate, exposed only through `super`-scoped accessors on
//! `Throttle`/`Debounce`.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::clock::Instant;
use crate::error::RateLimitError;

/// Capacity of each per-slot broadcast channel. Exactly one value is ever
/// sent on a given slot's sender, so capacity 1 is sufficient; it exists
/// only to size the internal ring buffer, not to allow multiple sends.
const SLOT_CHANNEL_CAPACITY: usize = 1;

/// The value fanned out to every caller joined onto one scheduled slot.
/// `Clone` is required by `broadcast`; wrapping in `Arc` satisfies that
/// without requiring `R: Clone` or `E: Clone` from the wrapped operation.
///
/// `Option` mirrors `spec.md` §4.1's "promise of optional result": a call
/// that causes no new execution (and finds no prior `lastResult`) still
/// resolves successfully, with `None`, rather than erroring.
pub(crate) type SlotOutcome<R, E> = Result<Option<Arc<R>>, Arc<RateLimitError<E>>>;

/// A single scheduled-execution opportunity and the broadcast sender all
/// joined callers subscribe to.
pub(crate) struct PendingSlot<R, E> {
	pub(crate) tx: broadcast::Sender<SlotOutcome<R, E>>,
}

impl<R, E> PendingSlot<R, E> {
	pub(crate) fn new() -> Self {
		let (tx, _rx) = broadcast::channel(SLOT_CHANNEL_CAPACITY);
		Self { tx }
	}

	/// Subscribes a new joined caller; must be called before the slot is
	/// resolved for the caller to observe the outcome.
	pub(crate) fn subscribe(&self) -> broadcast::Receiver<SlotOutcome<R, E>> {
		self.tx.subscribe()
	}

	/// Resolves the slot. Ignored if there are no subscribers left (every
	/// caller dropped its receiver before the slot settled).
	pub(crate) fn resolve(self, outcome: SlotOutcome<R, E>) {
		let _ = self.tx.send(outcome);
	}
}

/// Transient, mutable engine state shared by [`crate::Throttle`] and
/// [`crate::Debounce`], guarded by a `parking_lot::Mutex` in both.
pub(crate) struct Inner<Args, R, E> {
	/// Handle to the single pending scheduler callback, or `None`.
	pub(crate) timer: Option<JoinHandle<()>>,
	/// Timestamp of the most recent real execution start, `None` if never.
	pub(crate) last_exec_time: Option<Instant>,
	/// Most recent argument tuple not yet consumed by an execution.
	pub(crate) last_args: Option<Args>,
	/// Result of the most recent successful execution.
	pub(crate) last_result: Option<Arc<R>>,
	/// Shared result-carrying slot for callers awaiting the next execution.
	pub(crate) pending: Option<PendingSlot<R, E>>,
	/// Throttle-only: whether the leading edge already fired within the
	/// current window.
	pub(crate) has_executed_in_burst: bool,
	/// Debounce-only: timestamp of the first call in the currently
	/// suppressed burst. `last_exec_time` cannot serve this role for
	/// debounce — with `leading: false` (the default) it stays `None` for
	/// the burst's entire lifetime, since no execution happens until the
	/// trailing edge fires. `max_wait` must be measured from this field,
	/// not `last_exec_time`, or it never bounds the initial burst.
	pub(crate) first_suppressed_at: Option<Instant>,
}

impl<Args, R, E> Default for Inner<Args, R, E> {
	fn default() -> Self {
		Self {
			timer: None,
			last_exec_time: None,
			last_args: None,
			last_result: None,
			pending: None,
			has_executed_in_burst: false,
			first_suppressed_at: None,
		}
	}
}

impl<Args, R, E> Inner<Args, R, E> {
	/// Aborts and clears any armed timer. Idempotent.
	pub(crate) fn clear_timer(&mut self) {
		if let Some(handle) = self.timer.take() {
			handle.abort();
		}
	}

	/// Takes the pending slot, if any, leaving `None` behind. Used by every
	/// resolution path so `is_pending()` reflects `false` the instant a
	/// slot is claimed for settlement, before the (possibly async) settling
	/// work happens.
	pub(crate) fn take_pending(&mut self) -> Option<PendingSlot<R, E>> {
		self.pending.take()
	}

	/// Returns the existing pending slot, or allocates and stores a fresh
	/// one.
	pub(crate) fn pending_or_insert(&mut self) -> &PendingSlot<R, E>
	where
		R: Send + Sync + 'static,
		E: Send + Sync + 'static,
	{
		self.pending.get_or_insert_with(PendingSlot::new)
	}
}
