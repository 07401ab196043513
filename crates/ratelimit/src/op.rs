//! The wrapped operation abstraction.

use std::future::Future;
use std::pin::Pin;

/// A boxed, owned future — the same idiom the teacher scheduler uses for
/// type-erased async work (`Pin<Box<dyn Future<Output = ()> + Send + 'static>>`
/// in `scheduler/types.rs`), generalized to carry a return value.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The wrapped operation whose invocation rate is controlled.
///
/// Implemented for any `Fn(Args) -> Fut` where `Fut: Future<Output =
/// Result<R, E>>`, so callers pass ordinary async closures; the engine
/// stores it behind `Arc<dyn AsyncOperation<..>>` to erase the concrete
/// closure/future types.
pub trait AsyncOperation<Args, R, E>: Send + Sync + 'static
where
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	/// Invokes the operation with `args`, returning its boxed result future.
	fn call(&self, args: Args) -> BoxFuture<Result<R, E>>;
}

impl<F, Fut, Args, R, E> AsyncOperation<Args, R, E> for F
where
	F: Fn(Args) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<R, E>> + Send + 'static,
	Args: Send + 'static,
	R: Send + Sync + 'static,
	E: Send + Sync + 'static,
{
	fn call(&self, args: Args) -> BoxFuture<Result<R, E>> {
		Box::pin(self(args))
	}
}
