//! Batch throttle (`spec.md` §4.6): accumulate argument tuples into a
//! buffer, flushing it as one call to a caller-provided batch operation
//! once `batch_size` is reached or `max_wait` elapses since the first
//! enqueue. Grounded on the teacher's pending-LSP-change accumulator
//! (`crates/editor/src/lsp/pending/mod.rs`), which buffers edits and
//! flushes them on a debounce/threshold policy the same shape as this
//! one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::clock::{Clock, Instant, MonotonicClock};
use crate::op::{AsyncOperation, BoxFuture};

/// The caller-provided batch operation: takes the whole accumulated
/// buffer and returns a future. Mirrors [`crate::op::AsyncOperation`] but
/// over `Vec<Args>` rather than a single `Args`.
pub trait BatchOperation<Args, E>: Send + Sync + 'static
where
	Args: Send + 'static,
	E: Send + Sync + 'static,
{
	fn call(&self, batch: Vec<Args>) -> BoxFuture<Result<(), E>>;
}

impl<F, Fut, Args, E> BatchOperation<Args, E> for F
where
	F: Fn(Vec<Args>) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<(), E>> + Send + 'static,
	Args: Send + 'static,
	E: Send + Sync + 'static,
{
	fn call(&self, batch: Vec<Args>) -> BoxFuture<Result<(), E>> {
		Box::pin(self(batch))
	}
}

struct BatchInner<Args> {
	buffer: Vec<Args>,
	first_enqueue_time: Option<Instant>,
	timer: Option<JoinHandle<()>>,
}

impl<Args> Default for BatchInner<Args> {
	fn default() -> Self {
		Self { buffer: Vec::new(), first_enqueue_time: None, timer: None }
	}
}

impl<Args> BatchInner<Args> {
	fn clear_timer(&mut self) {
		if let Some(handle) = self.timer.take() {
			handle.abort();
		}
	}

	fn take_batch(&mut self) -> Vec<Args> {
		self.first_enqueue_time = None;
		self.clear_timer();
		std::mem::take(&mut self.buffer)
	}
}

struct BatchShared<Args, E> {
	op: Arc<dyn BatchOperation<Args, E>>,
	clock: Arc<dyn Clock>,
	batch_size: usize,
	wait: Duration,
	max_wait: Duration,
	inner: Mutex<BatchInner<Args>>,
}

/// A batching wrapper: enqueued arguments accumulate until `batch_size`
/// is reached, `wait` elapses quietly, or `max_wait` elapses since the
/// first item in the current batch — whichever comes first.
pub struct BatchThrottle<Args, E> {
	shared: Arc<BatchShared<Args, E>>,
}

impl<Args, E> BatchThrottle<Args, E>
where
	Args: Send + 'static,
	E: fmt::Display + Send + Sync + 'static,
{
	pub(crate) fn new(op: Arc<dyn BatchOperation<Args, E>>, batch_size: usize, wait: Duration, max_wait: Duration) -> Self {
		let shared = Arc::new(BatchShared {
			op,
			clock: Arc::new(MonotonicClock),
			batch_size,
			wait,
			max_wait,
			inner: Mutex::new(BatchInner::default()),
		});
		Self { shared }
	}

	/// Enqueues `args`. May trigger an immediate synchronous flush if the
	/// buffer now meets `batch_size` or `max_wait` (`spec.md` §4.6 step 3),
	/// otherwise (re)arms the quiet-period timer.
	pub async fn enqueue(&self, args: Args) {
		let now = self.shared.clock.now();

		let due_now = {
			let mut inner = self.shared.inner.lock();
			if inner.buffer.is_empty() {
				inner.first_enqueue_time = Some(now);
			}
			inner.buffer.push(args);

			let age = inner.first_enqueue_time.map(|t| self.shared.clock.elapsed_since(t)).unwrap_or(Duration::ZERO);
			inner.buffer.len() >= self.shared.batch_size || age >= self.shared.max_wait
		};

		if due_now {
			self.shared.inner.lock().clear_timer();
			self.flush().await;
		} else {
			self.arm_timer();
		}
	}

	/// Hands the entire buffer to the batch operation and clears it. A
	/// no-op if the buffer is empty. Errors are logged and not retried —
	/// batching is eager and lossy-on-error by design (`spec.md` §4.6).
	pub async fn flush(&self) {
		let batch = self.shared.inner.lock().take_batch();
		if batch.is_empty() {
			return;
		}
		let size = batch.len();
		trace!(size, "ratelimit.batch: flushing");
		if let Err(error) = self.shared.op.call(batch).await {
			warn!(%error, size, "ratelimit.batch: flush failed, not retried");
		}
	}

	/// Number of arguments currently buffered, awaiting flush.
	pub fn pending_count(&self) -> usize {
		self.shared.inner.lock().buffer.len()
	}

	fn arm_timer(&self) {
		self.shared.inner.lock().clear_timer();
		let shared = Arc::clone(&self.shared);
		let wait = self.shared.wait;
		let handle = tokio::spawn(async move {
			tokio::time::sleep(wait).await;
			let batch = shared.inner.lock().take_batch();
			if batch.is_empty() {
				return;
			}
			let size = batch.len();
			trace!(size, "ratelimit.batch: timer flush");
			if let Err(error) = shared.op.call(batch).await {
				warn!(%error, size, "ratelimit.batch: flush failed, not retried");
			}
		});
		self.shared.inner.lock().timer = Some(handle);
	}
}

impl<Args, E> Drop for BatchThrottle<Args, E> {
	fn drop(&mut self) {
		self.shared.inner.lock().clear_timer();
	}
}
