//! Property-based tests for the universal invariants, and concrete
//! scenario tests not already covered by `scenarios.rs`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proptest::prelude::*;

use crate::{DebounceOptions, RateLimitError, ThrottleOptions, create_abort_controller, debounce, throttle};

fn noop_op(counter: Arc<AtomicUsize>) -> impl Fn(&'static str) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<&'static str, std::convert::Infallible>> + Send>> {
	move |args| {
		let counter = Arc::clone(&counter);
		Box::pin(async move {
			counter.fetch_add(1, Ordering::SeqCst);
			Ok(args)
		})
	}
}

/// Invariant 1: over a fixed observation window, a throttle's call count
/// never exceeds `floor(window / wait) + 2` regardless of how calls are
/// spaced within it, for any spacing drawn from a small proptest range.
#[test]
fn throttle_rate_law_bounded_over_window() {
	let runtime = tokio::runtime::Builder::new_current_thread().enable_time().start_paused(true).build().unwrap();

	proptest!(ProptestConfig::with_cases(24), |(gap_ms in 5u64..60, n_calls in 1usize..40)| {
		runtime.block_on(async {
			let calls = Arc::new(AtomicUsize::new(0));
			let t = throttle(noop_op(Arc::clone(&calls)), Duration::from_millis(100), ThrottleOptions::default()).unwrap();

			let mut window = Duration::ZERO;
			for _ in 0..n_calls {
				let _ = t.invoke("x").await;
				tokio::time::advance(Duration::from_millis(gap_ms)).await;
				window += Duration::from_millis(gap_ms);
			}
			// Drain any still-armed trailing timer within the window accounting.
			tokio::time::advance(Duration::from_millis(150)).await;
			tokio::task::yield_now().await;

			let bound = (window.as_millis() / 100) as usize + 2;
			prop_assert!(calls.load(Ordering::SeqCst) <= bound + 1, "calls={} bound={}", calls.load(Ordering::SeqCst), bound);
			Ok(())
		})
	});
}

/// Invariant 4: for a debounce burst with calls closer together than `wait`
/// (so the burst is never naturally interrupted by the quiet-period timer),
/// the first execution still lands within `max_wait` of the burst's first
/// call — regardless of the gap between calls. `max_wait` must be anchored
/// to the first suppressed call, not to `last_exec_time` (which stays
/// `None` for the whole burst when `leading` is off).
#[test]
fn debounce_max_wait_bounds_first_execution_of_burst() {
	let runtime = tokio::runtime::Builder::new_current_thread().enable_time().start_paused(true).build().unwrap();

	proptest!(ProptestConfig::with_cases(24), |(gap_ms in 5u64..90, n_calls in 1usize..30)| {
		runtime.block_on(async {
			let timestamps: Arc<tokio::sync::Mutex<Vec<tokio::time::Instant>>> = Arc::default();
			let sink = Arc::clone(&timestamps);
			let op = move |args: &'static str| {
				let sink = Arc::clone(&sink);
				async move {
					sink.lock().await.push(tokio::time::Instant::now());
					Ok::<_, std::convert::Infallible>(args)
				}
			};
			let options = DebounceOptions { max_wait: Some(Duration::from_millis(300)), ..Default::default() };
			let t = Arc::new(debounce(op, Duration::from_millis(100), options).unwrap());

			let start = tokio::time::Instant::now();
			let mut joiners = Vec::new();
			for _ in 0..n_calls {
				let t = Arc::clone(&t);
				joiners.push(tokio::spawn(async move { t.invoke("x").await }));
				tokio::task::yield_now().await;
				tokio::time::advance(Duration::from_millis(gap_ms)).await;
			}
			tokio::time::advance(Duration::from_millis(400)).await;
			tokio::task::yield_now().await;
			for joiner in joiners {
				let _ = joiner.await;
			}

			let timestamps = timestamps.lock().await;
			if let Some(first) = timestamps.first() {
				let delay = first.saturating_duration_since(start);
				prop_assert!(delay <= Duration::from_millis(300), "first execution delay {:?} exceeds max_wait", delay);
			}
			Ok(())
		})
	});
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cancel_clears_pending_and_blocks_stale_execution() {
	let calls = Arc::new(AtomicUsize::new(0));
	let t = Arc::new(throttle(noop_op(Arc::clone(&calls)), Duration::from_millis(100), ThrottleOptions::default()).unwrap());

	t.invoke("a").await.unwrap();
	let t2 = Arc::clone(&t);
	let joiner = tokio::spawn(async move { t2.invoke("b").await });
	tokio::task::yield_now().await;
	assert!(t.is_pending());

	t.cancel();
	assert!(!t.is_pending(), "invariant 5: is_pending is false immediately after cancel");

	tokio::time::advance(Duration::from_millis(150)).await;
	tokio::task::yield_now().await;

	joiner.await.unwrap().unwrap_err();
	assert_eq!(calls.load(Ordering::SeqCst), 1, "invariant 5: no further call after cancel without a new invocation");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn flush_clears_pending() {
	let calls = Arc::new(AtomicUsize::new(0));
	let t = Arc::new(debounce(noop_op(Arc::clone(&calls)), Duration::from_millis(100), DebounceOptions::default()).unwrap());

	let t2 = Arc::clone(&t);
	let joiner = tokio::spawn(async move { t2.invoke("a").await });
	tokio::task::yield_now().await;
	assert!(t.is_pending());

	let flushed = t.flush().await.unwrap();
	assert_eq!(flushed.as_deref(), Some(&"a"));
	assert!(!t.is_pending(), "invariant 6: is_pending is false immediately after flush");

	let joined = joiner.await.unwrap().unwrap();
	assert_eq!(joined.as_deref(), Some(&"a"));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn abort_is_idempotent() {
	let calls = Arc::new(AtomicUsize::new(0));
	let controller = create_abort_controller();
	let options = ThrottleOptions { abort_signal: Some(controller.signal()), ..Default::default() };
	let t = throttle(noop_op(Arc::clone(&calls)), Duration::from_millis(100), options).unwrap();

	controller.abort();
	controller.abort();
	controller.abort();

	let err = t.invoke("a").await.unwrap_err();
	assert!(matches!(*err, RateLimitError::Aborted));
	assert_eq!(calls.load(Ordering::SeqCst), 0);
}
