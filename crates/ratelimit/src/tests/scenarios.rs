//! Concrete scenario tests for throttle, debounce, batching, and
//! cancellation, using a paused virtual clock the way
//! `crates/broker/broker/src/core/tests/lease_management.rs` drives its
//! lease-expiry timers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::{ConfigError, DebounceOptions, RateLimitError, ThrottleOptions, create_abort_controller, debounce, throttle, throttle_batch};

fn counting_op(counter: Arc<AtomicUsize>) -> impl Fn(u32) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<u32, std::convert::Infallible>> + Send>> {
	move |args: u32| {
		let counter = Arc::clone(&counter);
		Box::pin(async move {
			counter.fetch_add(1, Ordering::SeqCst);
			Ok(args)
		})
	}
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn throttle_leading_edge_fires_immediately() {
	let calls = Arc::new(AtomicUsize::new(0));
	let t = throttle(counting_op(Arc::clone(&calls)), Duration::from_millis(100), ThrottleOptions::default()).unwrap();

	let result = t.invoke(1).await.unwrap();
	assert_eq!(result.as_deref(), Some(&1));
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn throttle_trailing_edge_coalesces_burst() {
	let calls = Arc::new(AtomicUsize::new(0));
	let t = Arc::new(throttle(counting_op(Arc::clone(&calls)), Duration::from_millis(100), ThrottleOptions::default()).unwrap());

	// Leading call fires immediately.
	assert_eq!(t.invoke(1).await.unwrap().as_deref(), Some(&1));
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	// Calls within the window join the trailing slot instead of firing.
	let t2 = Arc::clone(&t);
	let joiner = tokio::spawn(async move { t2.invoke(2).await });
	tokio::task::yield_now().await;
	assert_eq!(t.invoke(3).await.unwrap().as_deref(), Some(&1), "joined call observes the trailing outcome, not a new leading one");

	tokio::time::advance(Duration::from_millis(101)).await;
	tokio::task::yield_now().await;

	let joined_result = joiner.await.unwrap().unwrap();
	assert_eq!(joined_result.as_deref(), Some(&3), "trailing edge executes with the last queued args");
	assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn throttle_max_wait_forces_execution_during_continuous_calls() {
	let calls = Arc::new(AtomicUsize::new(0));
	let options = ThrottleOptions { max_wait: Some(Duration::from_millis(150)), ..Default::default() };
	let t = Arc::new(throttle(counting_op(Arc::clone(&calls)), Duration::from_millis(100), options).unwrap());

	assert_eq!(t.invoke(1).await.unwrap().as_deref(), Some(&1));

	// Each of these joins the same trailing slot and re-arms the timer, all
	// well under `wait` (100ms) apart, so an unbounded re-arm would keep
	// pushing the execution out forever. `max_wait` caps it at 150ms after
	// the leading execution regardless.
	let mut joiners = Vec::new();
	for (offset_ms, args) in [(0, 2), (30, 3), (60, 4), (90, 5)] {
		if offset_ms > 0 {
			tokio::time::advance(Duration::from_millis(offset_ms)).await;
		}
		let t = Arc::clone(&t);
		joiners.push(tokio::spawn(async move { t.invoke(args).await }));
		tokio::task::yield_now().await;
	}

	// 150ms after the leading execution, not 190ms (90 + a fresh 100ms wait).
	tokio::time::advance(Duration::from_millis(61)).await;
	tokio::task::yield_now().await;

	for joiner in joiners {
		let result = joiner.await.unwrap().unwrap();
		assert_eq!(result.as_deref(), Some(&5), "all joined callers observe the max_wait-forced execution with the last queued args");
	}
	assert_eq!(calls.load(Ordering::SeqCst), 2, "one leading + one max_wait-forced trailing execution");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn debounce_suppresses_rapid_calls_to_one_trailing_execution() {
	let calls = Arc::new(AtomicUsize::new(0));
	let t = Arc::new(debounce(counting_op(Arc::clone(&calls)), Duration::from_millis(100), DebounceOptions::default()).unwrap());

	let t1 = Arc::clone(&t);
	let j1 = tokio::spawn(async move { t1.invoke(1).await });
	tokio::task::yield_now().await;
	tokio::time::advance(Duration::from_millis(40)).await;

	let t2 = Arc::clone(&t);
	let j2 = tokio::spawn(async move { t2.invoke(2).await });
	tokio::task::yield_now().await;
	tokio::time::advance(Duration::from_millis(40)).await;

	let t3 = Arc::clone(&t);
	let j3 = tokio::spawn(async move { t3.invoke(3).await });
	tokio::task::yield_now().await;

	tokio::time::advance(Duration::from_millis(101)).await;
	tokio::task::yield_now().await;

	let (r1, r2, r3) = (j1.await.unwrap().unwrap(), j2.await.unwrap().unwrap(), j3.await.unwrap().unwrap());
	assert_eq!(r1.as_deref(), Some(&3));
	assert_eq!(r2.as_deref(), Some(&3));
	assert_eq!(r3.as_deref(), Some(&3), "all joined callers observe the same final-args outcome");
	assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one execution for the whole quiet burst");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn debounce_max_wait_forces_execution_during_continuous_calls() {
	let timestamps: Arc<tokio::sync::Mutex<Vec<tokio::time::Instant>>> = Arc::default();
	let sink = Arc::clone(&timestamps);
	let op = move |args: u32| {
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
	for i in 0..20u32 {
		let t = Arc::clone(&t);
		joiners.push(tokio::spawn(async move { t.invoke(i).await }));
		tokio::task::yield_now().await;
		tokio::time::advance(Duration::from_millis(25)).await;
	}
	// Drain any still-armed trailing timer past the last invocation.
	tokio::time::advance(Duration::from_millis(400)).await;
	tokio::task::yield_now().await;

	for joiner in joiners {
		let _ = joiner.await;
	}

	let timestamps = timestamps.lock().await;
	assert!(timestamps.len() <= 3, "expected at most 3 executions, got {}", timestamps.len());
	let first_delay = timestamps.first().expect("at least one forced execution").saturating_duration_since(start);
	assert!(
		first_delay <= Duration::from_millis(300),
		"first execution must land within max_wait of the first invocation, got {first_delay:?}"
	);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn debounce_cancel_clears_last_args_so_flush_does_not_reexecute() {
	let calls = Arc::new(AtomicUsize::new(0));
	let t = Arc::new(debounce(counting_op(Arc::clone(&calls)), Duration::from_millis(100), DebounceOptions::default()).unwrap());

	let t2 = Arc::clone(&t);
	let joiner = tokio::spawn(async move { t2.invoke(1).await });
	tokio::task::yield_now().await;
	assert!(t.is_pending());

	t.cancel();
	joiner.await.unwrap().unwrap_err();
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	let flushed = t.flush().await.unwrap();
	assert!(flushed.is_none(), "cancel must clear last_args so flush has nothing stale to re-execute");
	assert_eq!(calls.load(Ordering::SeqCst), 0, "flush after a debounce cancel must not invoke the operation with the cancelled arguments");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn cancel_rejects_pending_caller_without_executing() {
	let calls = Arc::new(AtomicUsize::new(0));
	let t = Arc::new(throttle(counting_op(Arc::clone(&calls)), Duration::from_millis(100), ThrottleOptions::default()).unwrap());

	assert_eq!(t.invoke(1).await.unwrap().as_deref(), Some(&1));

	let t2 = Arc::clone(&t);
	let joiner = tokio::spawn(async move { t2.invoke(2).await });
	tokio::task::yield_now().await;

	t.cancel();
	let err = joiner.await.unwrap().unwrap_err();
	assert!(matches!(*err, RateLimitError::Cancelled));
	assert_eq!(calls.load(Ordering::SeqCst), 1, "cancel must prevent the trailing execution");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn abort_signal_rejects_all_joined_callers() {
	let calls = Arc::new(AtomicUsize::new(0));
	let controller = create_abort_controller();
	let options = ThrottleOptions { abort_signal: Some(controller.signal()), ..Default::default() };
	let t = Arc::new(throttle(counting_op(Arc::clone(&calls)), Duration::from_millis(100), options).unwrap());

	assert_eq!(t.invoke(1).await.unwrap().as_deref(), Some(&1));

	let t2 = Arc::clone(&t);
	let joiner = tokio::spawn(async move { t2.invoke(2).await });
	tokio::task::yield_now().await;

	controller.abort();
	tokio::task::yield_now().await;

	let err = joiner.await.unwrap().unwrap_err();
	assert!(err.is_cancellation());
	assert_eq!(calls.load(Ordering::SeqCst), 1);

	let err = t.invoke(3).await.unwrap_err();
	assert!(matches!(*err, RateLimitError::Aborted));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn batch_flushes_on_reaching_batch_size() {
	let flushed: Arc<tokio::sync::Mutex<Vec<Vec<u32>>>> = Arc::default();
	let sink = Arc::clone(&flushed);
	let batch = throttle_batch(
		move |items: Vec<u32>| {
			let sink = Arc::clone(&sink);
			async move {
				sink.lock().await.push(items);
				Ok::<_, std::convert::Infallible>(())
			}
		},
		Duration::from_millis(100),
		crate::BatchOptions { batch_size: 3, max_wait: None },
	)
	.unwrap();

	batch.enqueue(1).await;
	batch.enqueue(2).await;
	assert_eq!(batch.pending_count(), 2);
	batch.enqueue(3).await;

	assert_eq!(batch.pending_count(), 0, "reaching batch_size flushes synchronously");
	assert_eq!(flushed.lock().await.as_slice(), &[vec![1, 2, 3]]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn batch_flushes_on_quiet_timer() {
	let flushed: Arc<tokio::sync::Mutex<Vec<Vec<u32>>>> = Arc::default();
	let sink = Arc::clone(&flushed);
	let batch = throttle_batch(
		move |items: Vec<u32>| {
			let sink = Arc::clone(&sink);
			async move {
				sink.lock().await.push(items);
				Ok::<_, std::convert::Infallible>(())
			}
		},
		Duration::from_millis(100),
		crate::BatchOptions { batch_size: 10, max_wait: None },
	)
	.unwrap();

	batch.enqueue(1).await;
	batch.enqueue(2).await;
	tokio::time::advance(Duration::from_millis(101)).await;
	tokio::task::yield_now().await;

	assert_eq!(flushed.lock().await.as_slice(), &[vec![1, 2]]);
	assert_eq!(batch.pending_count(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn rejects_misconfigured_max_wait() {
	let err = throttle(
		counting_op(Arc::new(AtomicUsize::new(0))),
		Duration::from_millis(100),
		ThrottleOptions { max_wait: Some(Duration::from_millis(10)), ..Default::default() },
	)
	.unwrap_err();
	assert_eq!(err, ConfigError::MaxWaitBelowWait { wait: Duration::from_millis(100), max_wait: Duration::from_millis(10) });
}
